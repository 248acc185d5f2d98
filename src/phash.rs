//! Perceptual image hashing
//!
//! 64-bit DCT hash: the image is reduced to 32x32 grayscale, transformed
//! with a 2-D DCT-II, and the lowest-frequency 8x8 block is thresholded
//! against its median. Minor rendering noise leaves the hash stable while
//! real content changes (new text, a different window) flip many bits.

use std::f64::consts::PI;
use std::fmt;

use image::imageops::FilterType;
use image::DynamicImage;

/// Side of the downsampled image fed to the DCT
const DCT_SIZE: usize = 32;
/// Side of the low-frequency block kept for the hash
const HASH_SIZE: usize = 8;

/// Fixed-length fingerprint of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PerceptualHash(pub u64);

impl PerceptualHash {
    /// Hash an image. Total: any decodable image produces a hash.
    pub fn of(image: &DynamicImage) -> Self {
        let gray = image.to_luma8();
        let small = image::imageops::resize(
            &gray,
            DCT_SIZE as u32,
            DCT_SIZE as u32,
            FilterType::Triangle,
        );

        let mut grid = [[0f64; DCT_SIZE]; DCT_SIZE];
        for (x, y, pixel) in small.enumerate_pixels() {
            grid[y as usize][x as usize] = pixel.0[0] as f64;
        }

        let spectrum = dct_2d(&grid);

        // median of the low-frequency block
        let mut block = [0f64; HASH_SIZE * HASH_SIZE];
        for row in 0..HASH_SIZE {
            for col in 0..HASH_SIZE {
                block[row * HASH_SIZE + col] = spectrum[row][col];
            }
        }
        let mut sorted = block;
        sorted.sort_by(f64::total_cmp);
        let median = (sorted[HASH_SIZE * HASH_SIZE / 2 - 1] + sorted[HASH_SIZE * HASH_SIZE / 2]) / 2.0;

        let mut bits = 0u64;
        for (index, value) in block.iter().enumerate() {
            if *value > median {
                bits |= 1 << index;
            }
        }
        PerceptualHash(bits)
    }

    /// Hamming distance to another hash (0-64)
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// 2-D DCT-II, rows then columns
fn dct_2d(grid: &[[f64; DCT_SIZE]; DCT_SIZE]) -> [[f64; DCT_SIZE]; DCT_SIZE] {
    let mut rows = [[0f64; DCT_SIZE]; DCT_SIZE];
    for (i, row) in grid.iter().enumerate() {
        rows[i] = dct_1d(row);
    }

    let mut out = [[0f64; DCT_SIZE]; DCT_SIZE];
    for col in 0..DCT_SIZE {
        let mut column = [0f64; DCT_SIZE];
        for row in 0..DCT_SIZE {
            column[row] = rows[row][col];
        }
        let transformed = dct_1d(&column);
        for row in 0..DCT_SIZE {
            out[row][col] = transformed[row];
        }
    }
    out
}

fn dct_1d(input: &[f64; DCT_SIZE]) -> [f64; DCT_SIZE] {
    let n = DCT_SIZE as f64;
    let mut out = [0f64; DCT_SIZE];
    for (k, slot) in out.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (i, value) in input.iter().enumerate() {
            sum += value * (PI / n * (i as f64 + 0.5) * k as f64).cos();
        }
        *slot = sum;
    }
    out
}
