//! Writes synthetic checkerboard test patterns as 8-bit RGB PNG files.
//!
//! A pattern is described by a [`Config`]: how many cells per side, how many pixels each cell spans,
//! and how much per-channel noise is sprinkled over every pixel. Dark cells stay near black and light
//! cells near white, so the parity of each cell survives any amount of noise the configuration allows.
//!
//! ```no_run
//! # use checkerboard_png::{Config, RandomBits};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config {
//!     board_size: 8,
//!     cell_scale: 16,
//!     random_bits: RandomBits::new(3)?,
//!     ..Default::default()
//! };
//! checkerboard_png::write_file("board.png", &config)?;
//! # Ok(())
//! # }
//! ```
//!
//! The two halves are also usable on their own: [`PixelBuffer::synthesize`] builds the pixels in memory,
//! and [`encoder::write_file`] or [`encoder::PngEncoder`] turn any such buffer into a PNG file.

use std::path::Path;

use error_stack::{report, Result, ResultExt};

pub mod error;
use error::{ParseValueError, WriteFileError};

pub mod pixels;
pub use pixels::{PixelBuffer, RowTable, Shade};

pub mod encoder;
use encoder::{CompressionLevel, FilterStrategy};

/// Everything needed to draw and encode one checkerboard
///
/// Built once and never mutated; pass it by reference to as many writers as you like.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Number of cells along each side of the board
    pub board_size: u32,
    /// Width and height of each cell, in pixels
    pub cell_scale: u32,
    /// Magnitude of the noise added to every channel of every pixel
    pub random_bits: RandomBits,
    /// zlib effort, from 0 (fastest) to 9 (smallest)
    pub compression_level: CompressionLevel,
    /// How scanlines are filtered before compression
    pub filter: FilterStrategy,
    /// Seed for the noise generator; the same seed always draws the same image
    pub seed: u64,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            board_size: 1024,
            cell_scale: 1,
            random_bits: RandomBits::default(),
            compression_level: CompressionLevel::default(),
            filter: FilterStrategy::default(),
            seed: 1,
        }
    }
}
impl Config {
    /// Side length of the square image, in pixels
    pub fn total_width(&self) -> u64 {
        self.board_size as u64 * self.cell_scale as u64
    }
}

/// Number of noise bits, between 0 and 8
///
/// The noise applied to a channel is a random byte masked with [`Self::noise_mask()`].
/// Note that even zero random bits yields a mask of 1.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct RandomBits(u8);
impl RandomBits {
    pub const MAX: u8 = 8;

    /// Fails if `bits` is greater than 8
    pub fn new(bits: u8) -> Result<Self, ParseValueError> {
        match bits {
            val if val <= Self::MAX => Ok(Self(val)),
            bad => Err(report!(ParseValueError("RandomBits")))
                .attach_printable(format!("Must be between 0 and {}, found {bad}", Self::MAX)),
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// `2^(bits + 1) - 1`
    ///
    /// For 8 bits this is 511, which is wider than a channel; only the low 8 bits ever reach the image.
    pub fn noise_mask(&self) -> u16 {
        (1u16 << (self.0 + 1)) - 1
    }
}

/// Draws the checkerboard described by `config` and writes it to `path` as a PNG
///
/// Dimensions are checked before anything is allocated, so an impossible configuration
/// fails fast with [`WriteFileError::Configuration`] and leaves no file behind.
pub fn write_file(path: impl AsRef<Path>, config: &Config) -> Result<(), WriteFileError> {
    let path = path.as_ref();
    let _span_guard = tracing::debug_span!("write_file", path = %path.display()).entered();

    let width = config.total_width();
    encoder::check_dimensions(width)
        .attach_printable_lazy(|| format!("board_size {} * cell_scale {}", config.board_size, config.cell_scale))?;

    let pixels = PixelBuffer::synthesize(config)
        .change_context(WriteFileError::Allocation)?;
    tracing::debug!("Synthesized {width}x{width} checkerboard ({} bytes)", pixels.as_bytes().len());

    encoder::write_file(path, &pixels, config.compression_level, config.filter)
}
