//! Content hashing for deterministic rendering verification.
//!
//! Hashes the 8-bit RGBA form of each frame, which is exactly what a
//! sink would write, so two runs that hash equal produce identical files.

use sha2::{Digest, Sha256};

use crate::error::PyrffectResult;
use crate::frame::PixelBuffer;
use crate::sink::FrameSink;

/// A content hash digest (SHA-256, 32 bytes).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash {
    bytes: [u8; 32],
}

impl ContentHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

fn update_with(hasher: &mut Sha256, buffer: &PixelBuffer) {
    // Dimensions go in too, so equal bytes at different sizes differ.
    hasher.update((buffer.width as u64).to_le_bytes());
    hasher.update((buffer.height as u64).to_le_bytes());
    hasher.update(buffer.to_rgba8());
}

fn digest(hasher: Sha256) -> ContentHash {
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&hasher.finalize());
    ContentHash::from_bytes(bytes)
}

/// A [`FrameSink`] folding every frame into one running SHA-256.
#[derive(Clone, Default)]
pub struct HashSink {
    hasher: Sha256,
    frames: u64,
}

impl std::fmt::Debug for HashSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashSink")
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

impl HashSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames hashed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Digest of everything written so far, frame count included.
    pub fn digest(&self) -> ContentHash {
        let mut hasher = self.hasher.clone();
        hasher.update(self.frames.to_le_bytes());
        digest(hasher)
    }
}

impl FrameSink for HashSink {
    fn write_frame(&mut self, _index: u64, frame: &PixelBuffer) -> PyrffectResult<()> {
        update_with(&mut self.hasher, frame);
        self.frames += 1;
        Ok(())
    }
}
