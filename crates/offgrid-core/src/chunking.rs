//! Splitting serialized frames into transfer-unit sized writes

/// Default write unit, a conservative payload size for a 247-byte ATT MTU
pub const DEFAULT_WRITE_CHUNK_SIZE: usize = 244;

/// Split `data` into consecutive slices of at most `unit` bytes.
///
/// Empty input yields no chunks. A `unit` of zero is treated as one byte so
/// the iterator always makes progress.
pub fn chunk_payload(data: &[u8], unit: usize) -> std::slice::Chunks<'_, u8> {
    data.chunks(unit.max(1))
}
