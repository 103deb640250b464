use std::path::Path;

/// 128-bit cache key identifying one block by the backing object it lives
/// in and the physical offset at which it starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    /// Deterministically derives the key for the block starting at
    /// `physical_offset` in `path`.
    pub fn compute(path: &Path, physical_offset: u64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(path.as_os_str().as_encoded_bytes());
        hasher.update(&physical_offset.to_le_bytes());
        let digest = hasher.finalize();

        let mut out = [0_u8; 16];
        out.copy_from_slice(&digest.as_bytes()[..16]);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn to_hex(self) -> String {
        hex::encode(self.0)
    }
}
