//! Everything related to turning a [`PixelBuffer`] into a PNG file
//!
//! Output is always 8-bit RGB truecolor and non-interlaced. The bitstream itself is produced by the `png` crate.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use error_stack::{report, Report, Result, ResultExt};
use strum::{Display, EnumString, VariantNames};

use crate::{
    error::{EncodeError, ParseValueError, WriteFileError},
    PixelBuffer,
};

/// PNG widths and heights are stored as 32-bit values, but may not exceed 2^31 - 1
pub const MAX_DIMENSION: u64 = i32::MAX as u64;

/// A zlib effort level between 0 and 9
///
/// The encoder offers three deflate presets, modeled on zlib levels 1, 6, and 9;
/// each level maps to the nearest of them.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompressionLevel(u8);
impl CompressionLevel {
    pub const FASTEST: Self = Self(0);
    pub const BEST: Self = Self(9);
    pub const DEFAULT: Self = Self(6);

    /// Create a new `CompressionLevel`
    ///
    /// Fails if `level` is outside the range `0..=9`
    pub fn new(level: u8) -> Result<Self, ParseValueError> {
        match level {
            val @ 0..=9 => Ok(Self(val)),
            bad => Err(report!(ParseValueError("CompressionLevel")))
                .attach_printable(format!("Must be between 0 and 9, found {bad}")),
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}
impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}
impl From<CompressionLevel> for png::Compression {
    fn from(level: CompressionLevel) -> Self {
        match level.0 {
            0..=3 => png::Compression::Fast,
            4..=7 => png::Compression::Default,
            _ => png::Compression::Best,
        }
    }
}

/// How each scanline is transformed before compression
///
/// The first five variants apply the same PNG filter type to every row.
/// [`Adaptive`](Self::Adaptive) picks a filter per row using the minimum sum of absolute differences heuristic.
#[derive(Clone, Copy, Debug, Default, Display, EnumString, VariantNames, PartialEq, Eq)]
pub enum FilterStrategy {
    #[strum(serialize = "none")]
    None,
    #[strum(serialize = "sub")]
    Sub,
    #[strum(serialize = "up")]
    Up,
    #[strum(serialize = "average")]
    Average,
    #[strum(serialize = "paeth")]
    Paeth,
    #[default]
    #[strum(serialize = "adaptive")]
    Adaptive,
}
impl FilterStrategy {
    fn apply<W: Write>(self, encoder: &mut png::Encoder<'_, W>) {
        let (filter, adaptive) = match self {
            Self::None => (png::FilterType::NoFilter, png::AdaptiveFilterType::NonAdaptive),
            Self::Sub => (png::FilterType::Sub, png::AdaptiveFilterType::NonAdaptive),
            Self::Up => (png::FilterType::Up, png::AdaptiveFilterType::NonAdaptive),
            Self::Average => (png::FilterType::Avg, png::AdaptiveFilterType::NonAdaptive),
            Self::Paeth => (png::FilterType::Paeth, png::AdaptiveFilterType::NonAdaptive),
            Self::Adaptive => (png::FilterType::Sub, png::AdaptiveFilterType::Adaptive),
        };
        encoder.set_filter(filter);
        encoder.set_adaptive_filter(adaptive);
    }
}

/// The dimensions written to the IHDR chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageHeader {
    pub width: u32,
    pub height: u32,
}
impl ImageHeader {
    pub const BYTES_PER_PIXEL: usize = 3;

    /// Bytes per scanline, not counting the filter type byte
    pub fn stride(&self) -> usize {
        self.width as usize * Self::BYTES_PER_PIXEL
    }
}

/// Checks that a square image `width` pixels across can be written as a PNG, and held in memory
///
/// Fails with [`WriteFileError::Configuration`] for empty images, which PNG cannot represent,
/// and for images wider than [`MAX_DIMENSION`].
pub fn check_dimensions(width: u64) -> Result<ImageHeader, WriteFileError> {
    if width == 0 {
        return Err(report!(WriteFileError::Configuration))
            .attach_printable("PNG images must be at least 1x1 pixels, found 0x0");
    }
    if width > MAX_DIMENSION {
        return Err(report!(WriteFileError::Configuration))
            .attach_printable(format!("Image is too wide to process: {width} pixels, PNG allows at most {MAX_DIMENSION}"));
    }
    let fits_in_memory = usize::try_from(width)
        .ok()
        .and_then(|w| w.checked_mul(ImageHeader::BYTES_PER_PIXEL))
        .and_then(|stride| stride.checked_add(1)?.checked_mul(stride / ImageHeader::BYTES_PER_PIXEL))
        .is_some();
    if !fits_in_memory {
        return Err(report!(WriteFileError::Configuration))
            .attach_printable(format!("Image is too large to process in memory: {width}x{width} pixels"));
    }
    Ok(ImageHeader {
        width: width as u32,
        height: width as u32,
    })
}

/// Sorts a `png` crate error into a failure of the underlying writer or of the codec itself
fn codec_report(err: png::EncodingError) -> Report<EncodeError> {
    let context = match &err {
        png::EncodingError::IoError(_) => EncodeError::Io,
        _ => EncodeError::Codec,
    };
    Report::new(err).change_context(context)
}

/// Writes one PNG image to any [`Write`]r
///
/// The encoder is consumed by [`Self::encode()`]; if encoding fails partway through, everything it owns,
/// including the writer, is dropped before the error reaches the caller.
pub struct PngEncoder<W: Write> {
    inner: W,
    level: CompressionLevel,
    filter: FilterStrategy,
}
impl<W: Write> PngEncoder<W> {
    pub fn new(inner: W, level: CompressionLevel, filter: FilterStrategy) -> Self {
        Self { inner, level, filter }
    }

    /// Writes the header, then every scanline of `pixels` in a single call, then the end marker
    ///
    /// The row table of `pixels` must agree with `header`.
    /// Returns the writer after flushing it.
    pub fn encode(mut self, header: &ImageHeader, pixels: &PixelBuffer) -> Result<W, EncodeError> {
        let _span_guard = tracing::trace_span!("encode", width = header.width, height = header.height).entered();

        let stride = header.stride();
        let rows = pixels.rows();
        if rows.len() != header.height as usize {
            return Err(report!(EncodeError::Codec))
                .attach_printable(format!("Row table has {} rows, but the header declares {}", rows.len(), header.height));
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != stride) {
            return Err(report!(EncodeError::Codec))
                .attach_printable(format!("Row {i} is {} bytes long, expected {stride}", row.len()));
        }

        let mut encoder = png::Encoder::new(&mut self.inner, header.width, header.height);
        encoder.set_color(png::ColorType::Rgb);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(self.level.into());
        self.filter.apply(&mut encoder);

        let mut writer = encoder.write_header()
            .map_err(codec_report)
            .attach_printable("Failed to write PNG header")?;
        writer.write_image_data(pixels.as_bytes())
            .map_err(codec_report)
            .attach_printable_lazy(|| format!("Failed to write {} scanlines", rows.len()))?;
        writer.finish()
            .map_err(codec_report)
            .attach_printable("Failed to finish PNG stream")?;
        tracing::trace!("Wrote {} scanlines", rows.len());

        Ok(self.inner)
    }
}

/// Encodes `pixels` as a PNG at `path`, creating or truncating the file
///
/// Anything the file itself refuses, whether while writing, flushing, or syncing to disk,
/// is reported as [`WriteFileError::Io`]; [`WriteFileError::Encoding`] is reserved for the codec.
/// If encoding fails partway through, the truncated file is left in place.
pub fn write_file(path: impl AsRef<Path>, pixels: &PixelBuffer, level: CompressionLevel, filter: FilterStrategy) -> Result<(), WriteFileError> {
    let path = path.as_ref();
    let path_str = path.to_string_lossy().to_string();
    let _span_guard = tracing::debug_span!("encoder_write_file", path = %path.display()).entered();

    let header = check_dimensions(pixels.width() as u64)?;

    let file = File::create(path)
        .change_context(WriteFileError::Io)
        .attach_printable_lazy(|| format!("Failed to open file {path_str} for writing"))?;
    tracing::debug!("Encoding {}x{} image at compression level {}, filter {filter}", header.width, header.height, level.get());

    let writer = PngEncoder::new(BufWriter::new(file), level, filter)
        .encode(&header, pixels)
        .map_err(|err| {
            tracing::warn!("Encoding failed, {path_str} is incomplete");
            let context = match err.current_context() {
                EncodeError::Io => WriteFileError::Io,
                EncodeError::Codec => WriteFileError::Encoding,
            };
            err.change_context(context)
        })
        .attach_printable_lazy(|| format!("While writing {path_str}"))?;

    let file = writer.into_inner()
        .map_err(|err| err.into_error())
        .change_context(WriteFileError::Io)
        .attach_printable_lazy(|| format!("Failed to flush file {path_str}"))?;
    file.sync_all()
        .change_context(WriteFileError::Io)
        .attach_printable_lazy(|| format!("Failed to close file {path_str}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::{Config, RandomBits};

    /// Accepts `budget` bytes, then fails every write
    struct FailAfter {
        budget: usize,
    }
    impl Write for FailAfter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            Ok(n)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn board(board_size: u32, cell_scale: u32, random_bits: u8) -> PixelBuffer {
        PixelBuffer::synthesize(&Config {
            board_size,
            cell_scale,
            random_bits: RandomBits::new(random_bits).unwrap(),
            ..Default::default()
        })
        .unwrap()
    }

    fn encode(pixels: &PixelBuffer, level: CompressionLevel, filter: FilterStrategy) -> Vec<u8> {
        let header = check_dimensions(pixels.width() as u64).unwrap();
        PngEncoder::new(vec![], level, filter)
            .encode(&header, pixels)
            .unwrap()
    }

    #[test]
    fn compression_level_range() {
        assert_eq!(CompressionLevel::new(0).unwrap(), CompressionLevel::FASTEST);
        assert_eq!(CompressionLevel::new(9).unwrap(), CompressionLevel::BEST);
        assert_eq!(CompressionLevel::default().get(), 6);
        let err = CompressionLevel::new(10).unwrap_err();
        assert_eq!(err.current_context(), &ParseValueError("CompressionLevel"));
    }

    #[test]
    fn compression_presets() {
        let preset = |level| png::Compression::from(CompressionLevel::new(level).unwrap());
        for level in 0..=3 {
            assert!(matches!(preset(level), png::Compression::Fast), "level {level}");
        }
        for level in 4..=7 {
            assert!(matches!(preset(level), png::Compression::Default), "level {level}");
        }
        for level in 8..=9 {
            assert!(matches!(preset(level), png::Compression::Best), "level {level}");
        }
    }

    #[test]
    fn strategy_names() {
        assert_eq!("paeth".parse::<FilterStrategy>().unwrap(), FilterStrategy::Paeth);
        assert_eq!(FilterStrategy::Adaptive.to_string(), "adaptive");
        assert_eq!(FilterStrategy::VARIANTS.len(), 6);
        assert!("median".parse::<FilterStrategy>().is_err());
    }

    #[test]
    fn dimensions() {
        let zero = check_dimensions(0).unwrap_err();
        assert_eq!(zero.current_context(), &WriteFileError::Configuration);
        let wide = check_dimensions(MAX_DIMENSION + 1).unwrap_err();
        assert_eq!(wide.current_context(), &WriteFileError::Configuration);
        assert_eq!(check_dimensions(1).unwrap(), ImageHeader { width: 1, height: 1 });
        assert_eq!(check_dimensions(640).unwrap().stride(), 1920);
    }

    #[test]
    fn layout() {
        let pixels = board(2, 3, 0);
        let out = encode(&pixels, CompressionLevel::default(), FilterStrategy::default());
        assert_eq!(out[..8], [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1A, b'\n']);
        // IHDR: length 13, then width 6, height 6, depth 8, RGB, and three zero method bytes
        assert_eq!(out[8..16], [0, 0, 0, 13, b'I', b'H', b'D', b'R']);
        assert_eq!(out[16..29], [0, 0, 0, 6, 0, 0, 0, 6, 8, 2, 0, 0, 0]);
        // 4-byte CRC and 4-byte IDAT length follow
        assert_eq!(out[37..41], *b"IDAT");
        assert_eq!(out[out.len() - 12..], [0, 0, 0, 0, b'I', b'E', b'N', b'D', 0xAE, 0x42, 0x60, 0x82]);
    }

    #[test]
    fn every_strategy_and_preset_decodes() {
        let pixels = board(5, 4, 3);
        for name in FilterStrategy::VARIANTS {
            for level in [CompressionLevel::FASTEST, CompressionLevel::DEFAULT, CompressionLevel::BEST] {
                let out = encode(&pixels, level, name.parse().unwrap());
                let mut reader = png::Decoder::new(out.as_slice()).read_info().unwrap();
                let mut buf = vec![0; reader.output_buffer_size()];
                let info = reader.next_frame(&mut buf).unwrap();
                assert_eq!(&buf[..info.buffer_size()], pixels.as_bytes(), "{name} at level {}", level.get());
            }
        }
    }

    #[test]
    fn writer_failure_is_an_io_error() {
        let pixels = board(8, 8, 2);
        let header = check_dimensions(64).unwrap();
        // fail at the signature, inside IHDR, and halfway through the image data
        for budget in [0, 20, 2000] {
            let err = PngEncoder::new(FailAfter { budget }, CompressionLevel::FASTEST, FilterStrategy::None)
                .encode(&header, &pixels)
                .err()
                .unwrap();
            assert_eq!(err.current_context(), &EncodeError::Io, "budget {budget}");
        }
    }

    #[test]
    fn row_table_must_match_header() {
        let pixels = board(4, 1, 0);

        let taller = ImageHeader { width: 4, height: 5 };
        let err = PngEncoder::new(vec![], CompressionLevel::default(), FilterStrategy::default())
            .encode(&taller, &pixels)
            .err()
            .unwrap();
        assert_eq!(err.current_context(), &EncodeError::Codec);

        let narrower = ImageHeader { width: 3, height: 4 };
        let err = PngEncoder::new(vec![], CompressionLevel::default(), FilterStrategy::default())
            .encode(&narrower, &pixels)
            .err()
            .unwrap();
        assert_eq!(err.current_context(), &EncodeError::Codec);
    }

    #[test]
    fn empty_buffer_is_rejected_before_opening_the_file() {
        let pixels = board(0, 5, 0);
        let path = std::env::temp_dir().join("checkerboard_png_unit_empty.png");
        let err = write_file(&path, &pixels, CompressionLevel::default(), FilterStrategy::default()).unwrap_err();
        assert_eq!(err.current_context(), &WriteFileError::Configuration);
        assert!(!path.exists());
    }
}
