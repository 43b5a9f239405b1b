//! Fixed-width byte codec for spillable records.

/// A record with a fixed-width byte encoding.
///
/// Every type that passes through a spilling sorter or a runs creator must
/// encode into exactly [`Record::BYTES`] bytes. Implementations use
/// little-endian field order so spill files are stable across platforms.
pub trait Record: Copy {
    /// Encoded width in bytes.
    const BYTES: usize;

    /// Encodes `self` into `out`, which is exactly [`Record::BYTES`] long.
    fn write_bytes(&self, out: &mut [u8]);

    /// Decodes a record from `buf`, which is exactly [`Record::BYTES`] long.
    fn read_bytes(buf: &[u8]) -> Self;
}

impl Record for u64 {
    const BYTES: usize = 8;

    fn write_bytes(&self, out: &mut [u8]) {
        out[..8].copy_from_slice(&self.to_le_bytes());
    }

    fn read_bytes(buf: &[u8]) -> Self {
        u64::from_le_bytes(buf[..8].try_into().expect("eight bytes"))
    }
}
