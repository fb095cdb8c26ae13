//! Difference hash (dHash) image fingerprints.
//!
//! The image is converted to luma, stretched (aspect ratio ignored) to a 9x8
//! grid, and every horizontally adjacent sample pair contributes one bit:
//! `1` when the left sample is strictly brighter than the right one.
//! 8 rows x 8 pairs = 64 bits, row-major, most significant bit first.

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Anything smaller is treated as a corrupt or empty download.
pub const MIN_IMAGE_BYTES: usize = 1000;

// --- Grid geometry (load-bearing: changing either breaks hash comparability) ---
const GRID_WIDTH: u32 = 9;
const GRID_HEIGHT: u32 = 8;
const GRID_FILTER: FilterType = FilterType::Lanczos3;
const HEX_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("image too small: {size} bytes (minimum {MIN_IMAGE_BYTES})")]
    ImageTooSmall { size: usize },
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseFingerprintError {
    #[error("expected {HEX_LEN} hex characters, got {0}")]
    Length(usize),
    #[error("invalid hex digit in fingerprint {0:?}")]
    InvalidHex(String),
}

/// 64-bit dHash. Displays as exactly 16 lowercase, zero-padded hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Pack a row-major 9x8 luma grid into a fingerprint.
    ///
    /// Missing samples read as 0, so a short grid never panics.
    pub fn from_grid(grid: &[u8]) -> Self {
        let w = GRID_WIDTH as usize;
        let mut bits = 0u64;

        for y in 0..GRID_HEIGHT as usize {
            for x in 0..w - 1 {
                let left = grid.get(y * w + x).copied().unwrap_or(0);
                let right = grid.get(y * w + x + 1).copied().unwrap_or(0);
                bits = (bits << 1) | u64::from(left > right);
            }
        }

        Self(bits)
    }

    /// Number of differing bits. Diagnostic only; "same image" is exact equality.
    pub fn hamming_distance(self, other: Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = ParseFingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != HEX_LEN {
            return Err(ParseFingerprintError::Length(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseFingerprintError::InvalidHex(s.to_string()));
        }
        u64::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| ParseFingerprintError::InvalidHex(s.to_string()))
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = ParseFingerprintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_string()
    }
}

/// Compute the dHash of an encoded image (any format the `image` crate decodes).
pub fn compute_fingerprint(bytes: &[u8]) -> Result<Fingerprint, FingerprintError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(FingerprintError::ImageTooSmall { size: bytes.len() });
    }

    let luma = image::load_from_memory(bytes)?.to_luma8();
    let grid = image::imageops::resize(&luma, GRID_WIDTH, GRID_HEIGHT, GRID_FILTER);

    Ok(Fingerprint::from_grid(grid.as_raw()))
}

/// Read a file and compute its dHash.
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint, FingerprintError> {
    let bytes = std::fs::read(path)?;
    compute_fingerprint(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{bmp_bytes, noise_bmp};

    #[test]
    fn test_rejects_small_input() {
        let err = compute_fingerprint(&[0u8; 999]).unwrap_err();
        assert!(matches!(err, FingerprintError::ImageTooSmall { size: 999 }));
    }

    #[test]
    fn test_rejects_undecodable_input() {
        let err = compute_fingerprint(&vec![0xAB; 4096]).unwrap_err();
        assert!(matches!(err, FingerprintError::Decode(_)));
    }

    #[test]
    fn test_decreasing_gradient_sets_every_bit() {
        let bytes = bmp_bytes(64, 64, |x, _| 255 - (x * 255 / 63) as u8);
        let fp = compute_fingerprint(&bytes).unwrap();
        assert_eq!(fp.to_string(), "ffffffffffffffff");
    }

    #[test]
    fn test_increasing_gradient_clears_every_bit() {
        let bytes = bmp_bytes(64, 64, |x, _| (x * 255 / 63) as u8);
        let fp = compute_fingerprint(&bytes).unwrap();
        assert_eq!(fp.to_string(), "0000000000000000");
    }

    #[test]
    fn test_flat_image_is_zero() {
        let bytes = bmp_bytes(64, 64, |_, _| 128);
        assert_eq!(compute_fingerprint(&bytes).unwrap().bits(), 0);
    }

    #[test]
    fn test_aspect_ratio_is_ignored() {
        // Wide strip: stretched, not cropped, so all 8 rows still see the ramp.
        let bytes = bmp_bytes(200, 20, |x, _| 255 - (x * 255 / 199) as u8);
        let fp = compute_fingerprint(&bytes).unwrap();
        assert_eq!(fp.to_string(), "ffffffffffffffff");
    }

    #[test]
    fn test_deterministic_and_fixed_width() {
        let bytes = noise_bmp(64, 48, 7);
        let a = compute_fingerprint(&bytes).unwrap();
        let b = compute_fingerprint(&bytes).unwrap();
        assert_eq!(a, b);

        let hex = a.to_string();
        assert_eq!(hex.len(), 16);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_grid_bit_order() {
        let mut grid = [0u8; 72];
        // Row 0, pair 0 → most significant bit.
        grid[0] = 1;
        assert_eq!(Fingerprint::from_grid(&grid).to_string(), "8000000000000000");

        // Row 7, pair 7 → least significant bit.
        let mut grid = [0u8; 72];
        grid[7 * 9 + 7] = 1;
        assert_eq!(Fingerprint::from_grid(&grid).to_string(), "0000000000000001");
    }

    #[test]
    fn test_equal_samples_emit_zero() {
        let grid = [42u8; 72];
        assert_eq!(Fingerprint::from_grid(&grid).bits(), 0);
    }

    #[test]
    fn test_display_zero_pads() {
        assert_eq!(Fingerprint::from_bits(0xab).to_string(), "00000000000000ab");
    }

    #[test]
    fn test_parse() {
        let fp: Fingerprint = "00FF00ff00ff00ff".parse().unwrap();
        assert_eq!(fp.to_string(), "00ff00ff00ff00ff");

        assert_eq!(
            "abc".parse::<Fingerprint>(),
            Err(ParseFingerprintError::Length(3))
        );
        assert!(matches!(
            "+fffffffffffffff".parse::<Fingerprint>(),
            Err(ParseFingerprintError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let fp = Fingerprint::from_bits(1);
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, "\"0000000000000001\"");
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }

    #[test]
    fn test_hamming_distance() {
        let a = Fingerprint::from_bits(0b1011);
        let b = Fingerprint::from_bits(0b0001);
        assert_eq!(a.hamming_distance(b), 2);
        assert_eq!(a.hamming_distance(a), 0);
    }
}
