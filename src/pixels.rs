//! The checkerboard itself, as an owned buffer of RGB samples

use error_stack::{report, Result, ResultExt};
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::{error::AllocError, Config};

/// Whether a cell is drawn near black or near white
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shade {
    /// Channels start at 0 and are jittered upward
    Dark,
    /// Channels start at 255 and are jittered downward
    Light,
}
impl Shade {
    /// Cells where `row ^ col` is even are dark, the rest are light
    pub fn of_cell(row: u32, col: u32) -> Self {
        match (row ^ col) & 1 {
            0 => Self::Dark,
            _ => Self::Light,
        }
    }

    /// Applies `noise` (already drawn, not yet masked) to this shade's base value
    ///
    /// The mask can be up to 9 bits wide; the masked noise is truncated to a byte,
    /// exactly as storing it into an 8-bit channel would.
    pub fn channel(self, noise: u8, mask: u16) -> u8 {
        let jitter = (noise as u16 & mask) as u8;
        match self {
            Self::Dark => jitter,
            Self::Light => 255 ^ jitter,
        }
    }
}

/// One scanline per image row, each borrowing `3 * width` bytes from a [`PixelBuffer`]
pub type RowTable<'a> = Vec<&'a [u8]>;

/// A square, row-major, 8-bit RGB image
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer {
    width: usize,
    data: Vec<u8>,
}
impl PixelBuffer {
    pub const CHANNELS: usize = 3;

    /// Draws the checkerboard with noise from a ChaCha8 generator seeded by [`Config::seed`]
    pub fn synthesize(config: &Config) -> Result<Self, AllocError> {
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self::synthesize_with(config, &mut rng)
    }

    /// Draws the checkerboard, pulling one byte from `rng` per channel of every pixel
    ///
    /// Cells are visited in row-major order, and pixels within each cell likewise,
    /// so a given generator state always yields the same image.
    pub fn synthesize_with<R: RngCore>(config: &Config, rng: &mut R) -> Result<Self, AllocError> {
        let width = usize::try_from(config.total_width())
            .change_context(AllocError)
            .attach_printable_lazy(|| format!("Image width {} does not fit in memory", config.total_width()))?;
        let len = width
            .checked_mul(width)
            .and_then(|pixels| pixels.checked_mul(Self::CHANNELS))
            .ok_or(report!(AllocError))
            .attach_printable_lazy(|| format!("Unable to allocate output buffer for a {width}x{width} image"))?;

        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .change_context(AllocError)
            .attach_printable_lazy(|| format!("Unable to allocate output buffer of {len} bytes"))?;
        // placeholder only, the loops below overwrite every sample with exactly one draw
        data.resize(len, 0);

        let scale = config.cell_scale as usize;
        let mask = config.random_bits.noise_mask();
        for row in 0..config.board_size {
            for col in 0..config.board_size {
                let shade = Shade::of_cell(row, col);
                for x_pixel in 0..scale {
                    for y_pixel in 0..scale {
                        let global_row = row as usize * scale + x_pixel;
                        let global_col = col as usize * scale + y_pixel;
                        let offset = Self::CHANNELS * (global_row * width + global_col);
                        for sample in &mut data[offset..offset + Self::CHANNELS] {
                            *sample = shade.channel(rng.gen::<u8>(), mask);
                        }
                    }
                }
            }
        }

        Ok(Self { width, data })
    }

    /// Width in pixels
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels (always equal to the width)
    pub fn height(&self) -> usize {
        self.width
    }

    /// Bytes per scanline
    pub fn stride(&self) -> usize {
        self.width * Self::CHANNELS
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Returns the R, G, and B samples at the given position, or `None` if it lies outside the image
    pub fn pixel(&self, row: usize, col: usize) -> Option<[u8; 3]> {
        if row >= self.width || col >= self.width {
            return None;
        }
        let offset = row * self.stride() + col * Self::CHANNELS;
        let mut rgb = [0u8; 3];
        rgb.copy_from_slice(&self.data[offset..offset + Self::CHANNELS]);
        Some(rgb)
    }

    /// Slices the buffer into scanlines, top to bottom
    ///
    /// The table borrows the buffer, so the pixels can't be dropped or modified while it's in use.
    /// An empty image has an empty table.
    pub fn rows(&self) -> RowTable<'_> {
        if self.width == 0 {
            vec![]
        } else {
            self.data.chunks_exact(self.stride()).collect()
        }
    }
}
