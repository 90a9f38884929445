pub mod key_generator;
pub mod primary_index;
pub mod subspace;

use crate::error::DockvError;

/// Version byte leading every metadata key, ahead of the coordinate
/// segments, so the key layout itself can evolve.
pub const KEY_VERSION: u8 = 0x01;

/// Terminator of an active metadata record's key.
pub const KEY_END: u8 = 0xFE;

/// Terminator of a soft-deleted record's key. Lower than `KEY_END` and above
/// every tuple type tag, so tombstones sort next to their active records
/// without colliding with interior segments.
pub const KEY_DROPPED_END: u8 = 0xFD;

/// Kind tag for primary-index metadata records.
pub(crate) const INDEX_KIND: u8 = 0x04;

pub(crate) const ENCODING_SUBSPACE_NAME: &[u8] = b"encoding";
pub(crate) const GENERATOR_SUBSPACE_NAME: &[u8] = b"generator";

pub fn u32_to_bytes(v: u32) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

pub fn bytes_to_u32(bytes: &[u8]) -> Result<u32, DockvError> {
    bytes
        .try_into()
        .map(u32::from_be_bytes)
        .map_err(|_| DockvError::Decode("id payload must be exactly 4 bytes".into()))
}
