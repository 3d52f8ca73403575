//! Binary wire encoding of one attribute counter.
//!
//! The Redis backend stores each counter as a compact protobuf record in a
//! hash field. The message layout is fixed; reordering tags would corrupt
//! every stored counter.

use prost::Message;

use crate::error::{Result, SluiceError};

use super::AttributeState;

/// Wire form of [`AttributeState`].
#[derive(Clone, PartialEq, Message)]
pub struct AttributeStateRecord {
    #[prost(int64, tag = "1")]
    pub bucket: i64,

    #[prost(int64, repeated, tag = "2")]
    pub logs: Vec<i64>,

    #[prost(int64, tag = "3")]
    pub last_updated: i64,
}

/// Encode one counter into its hash-field value.
pub fn encode_attribute(state: &AttributeState) -> std::result::Result<Vec<u8>, prost::EncodeError> {
    let record = AttributeStateRecord {
        bucket: state.bucket,
        logs: state.logs.clone(),
        last_updated: state.last_updated,
    };
    let mut buf = Vec::with_capacity(record.encoded_len());
    record.encode(&mut buf)?;
    Ok(buf)
}

/// Decode a hash-field value back into a counter.
///
/// `key` only labels the error on failure.
pub fn decode_attribute(bytes: &[u8], key: &str) -> Result<AttributeState> {
    let record = AttributeStateRecord::decode(bytes).map_err(|source| SluiceError::Decode {
        key: key.to_string(),
        source,
    })?;
    Ok(AttributeState {
        bucket: record.bucket,
        logs: record.logs,
        last_updated: record.last_updated,
    })
}
