use sha2::{Digest, Sha256};

/// Incremental fingerprint builder.
///
/// Every entry is fed as `label:value\n`, so reordering labels or moving a
/// value between labels always changes the digest.
#[derive(Clone, Default)]
pub struct FingerprintHasher {
    hasher: Sha256,
}

impl FingerprintHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one labelled entry.
    pub fn entry(&mut self, label: &str, value: &str) -> &mut Self {
        self.hasher.update(label.as_bytes());
        self.hasher.update(b":");
        self.hasher.update(value.as_bytes());
        self.hasher.update(b"\n");
        self
    }

    /// Finish and return the lowercase hex digest.
    pub fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}
