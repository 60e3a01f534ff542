//! Seeded random data generation
//!
//! Reproducible image payloads for upload tests. The same seed produces the
//! same bytes, so a failing upload can be replayed exactly.
//!
//! # Example
//!
//! ```rust
//! use freshscan_testkit::random::PseudoGenerator;
//!
//! let mut rng1 = PseudoGenerator::new(42);
//! let mut rng2 = PseudoGenerator::new(42);
//!
//! assert_eq!(rng1.jpeg_payload(256), rng2.jpeg_payload(256));
//! ```

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// JPEG SOI marker followed by a JFIF APP0 header
const JPEG_HEADER: [u8; 11] = [
    0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F', 0x00,
];

/// JPEG EOI marker
const JPEG_TRAILER: [u8; 2] = [0xFF, 0xD9];

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Seeded pseudo-random generator for reproducible test data
#[derive(Debug)]
pub struct PseudoGenerator {
    rng: StdRng,
}

impl PseudoGenerator {
    /// Create a new generator with the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generate random bytes of the specified length
    pub fn random_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        self.rng.fill(&mut bytes[..]);
        bytes
    }

    /// Bytes framed as a JPEG (recognisable by format sniffing)
    ///
    /// `len` is the total size; it is raised to fit the header and trailer.
    pub fn jpeg_payload(&mut self, len: usize) -> Vec<u8> {
        let body_len = len.saturating_sub(JPEG_HEADER.len() + JPEG_TRAILER.len());
        let mut data = Vec::with_capacity(JPEG_HEADER.len() + body_len + JPEG_TRAILER.len());
        data.extend_from_slice(&JPEG_HEADER);
        data.extend(self.random_bytes(body_len));
        data.extend_from_slice(&JPEG_TRAILER);
        data
    }

    /// Bytes starting with the PNG signature
    pub fn png_payload(&mut self, len: usize) -> Vec<u8> {
        let body_len = len.saturating_sub(PNG_SIGNATURE.len());
        let mut data = Vec::with_capacity(PNG_SIGNATURE.len() + body_len);
        data.extend_from_slice(&PNG_SIGNATURE);
        data.extend(self.random_bytes(body_len));
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reproducibility() {
        let mut rng1 = PseudoGenerator::new(12345);
        let mut rng2 = PseudoGenerator::new(12345);

        assert_eq!(rng1.random_bytes(100), rng2.random_bytes(100));
        assert_eq!(rng1.jpeg_payload(64), rng2.jpeg_payload(64));
    }

    #[test]
    fn test_different_seeds() {
        let mut rng1 = PseudoGenerator::new(1);
        let mut rng2 = PseudoGenerator::new(2);

        assert_ne!(rng1.random_bytes(100), rng2.random_bytes(100));
    }

    #[test]
    fn test_jpeg_payload_framing() {
        let mut rng = PseudoGenerator::new(7);
        let data = rng.jpeg_payload(1024);

        assert_eq!(data.len(), 1024);
        assert_eq!(&data[..3], &[0xFF, 0xD8, 0xFF]);
        assert_eq!(&data[data.len() - 2..], &JPEG_TRAILER);
    }

    #[test]
    fn test_jpeg_payload_minimum_size() {
        let mut rng = PseudoGenerator::new(7);
        let data = rng.jpeg_payload(0);
        assert_eq!(data.len(), JPEG_HEADER.len() + JPEG_TRAILER.len());
    }

    #[test]
    fn test_png_payload_signature() {
        let mut rng = PseudoGenerator::new(9);
        let data = rng.png_payload(32);
        assert_eq!(data.len(), 32);
        assert_eq!(&data[..8], &PNG_SIGNATURE);
    }
}
