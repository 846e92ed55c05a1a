use std::{
    error::Error,
    fmt::{Display, Formatter},
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParseValueError(pub &'static str);
impl Display for ParseValueError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Failed to parse value as {}", self.0))
    }
}
impl Error for ParseValueError {}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AllocError;
impl Display for AllocError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Failed to allocate pixel buffer")
    }
}
impl Error for AllocError {}

/// Where a PNG encoding failure came from
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EncodeError {
    /// The destination refused a write or flush
    Io,
    /// The codec itself rejected the image or its own state
    Codec,
}
impl Display for EncodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io => f.write_str("I/O error during PNG encoding"),
            Self::Codec => f.write_str("Error during PNG encoding"),
        }
    }
}
impl Error for EncodeError {}

/// Every way that writing a checkerboard PNG can fail
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WriteFileError {
    /// Image dimensions are zero or exceed what a PNG can address
    Configuration,
    /// The pixel buffer could not be allocated
    Allocation,
    /// The output file could not be opened, written, flushed, or closed
    Io,
    /// The codec failed while producing the header or scanlines
    Encoding,
}
impl Display for WriteFileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration => f.write_str("Invalid image configuration"),
            Self::Allocation => f.write_str("Out of memory"),
            Self::Io => f.write_str("I/O error while writing PNG file"),
            Self::Encoding => f.write_str("Failed to encode PNG file"),
        }
    }
}
impl Error for WriteFileError {}
