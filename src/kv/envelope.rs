use crate::error::DockvError;
use serde::{Deserialize, Serialize};

/// Envelope version stamped on every write. `0` is reserved for the legacy
/// raw form and is never emitted.
pub const TABLE_DATA_VERSION: i32 = 1;

pub const ENCODING_RAW: u8 = 0;
pub const ENCODING_JSON: u8 = 1;

/// Legacy values predate the envelope: exactly four raw bytes holding a
/// big-endian u32 id.
const LEGACY_LEN: usize = 4;

/// The value envelope stored under every substrate key.
///
/// MessagePack-framed with named fields, so decoders ignore fields added by
/// later versions. `ver == 0` marks the legacy raw form; `ver >= 1` means
/// `raw_data` is a JSON body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableData {
    pub ver: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    #[serde(with = "serde_bytes")]
    pub raw_data: Vec<u8>,
    pub encoding: u8,
}

impl TableData {
    pub fn new(raw_data: Vec<u8>) -> Self {
        Self::with_version(TABLE_DATA_VERSION, raw_data)
    }

    pub fn with_version(ver: i32, raw_data: Vec<u8>) -> Self {
        Self {
            ver,
            created_at: None,
            updated_at: None,
            raw_data,
            encoding: ENCODING_JSON,
        }
    }

    pub fn is_legacy(&self) -> bool {
        self.ver == 0
    }

    pub fn encode(&self) -> Result<Vec<u8>, DockvError> {
        rmp_serde::to_vec_named(self).map_err(|e| DockvError::Encode(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<TableData, DockvError> {
        if bytes.len() == LEGACY_LEN {
            return Ok(TableData {
                ver: 0,
                created_at: None,
                updated_at: None,
                raw_data: bytes.to_vec(),
                encoding: ENCODING_RAW,
            });
        }

        rmp_serde::from_slice(bytes).map_err(|e| DockvError::Decode(e.to_string()))
    }
}
