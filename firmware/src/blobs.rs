//! Firmware images and settings linked into the binary.

use ois_core::firmware::BlobSource;

/// Named images resolved by exact name.
#[derive(Copy, Clone, Debug)]
pub struct StaticBlobs {
    entries: &'static [(&'static str, &'static [u8])],
}

impl StaticBlobs {
    pub const fn new(entries: &'static [(&'static str, &'static [u8])]) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl BlobSource for StaticBlobs {
    type Blob = &'static [u8];

    fn fetch(&mut self, name: &str) -> Option<Self::Blob> {
        self.entries
            .iter()
            .find(|(entry, _)| *entry == name)
            .map(|(_, bytes)| *bytes)
    }
}
