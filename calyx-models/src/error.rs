use displaydoc::Display;
use calyx_serialization::SerializeError;
use thiserror::Error;

/// models result
pub type ModelsResult<T, E = ModelsError> = core::result::Result<T, E>;

/// models error
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum ModelsError {
    /// Serialization error: {0}
    SerializeError(String),
    /// Serialization error: {0}
    SerializationError(#[from] SerializeError),
    /// Deserialization error: {0}
    DeserializeError(String),
    /// `CalyxHash` error: {0}
    CalyxHashError(#[from] calyx_hash::CalyxHashError),
    /// `calyx_signature` error: {0}
    CalyxSignatureError(#[from] calyx_signature::CalyxSignatureError),
    /// address parsing error: {0}
    AddressParseError(String),
    /// invalid contract type: {0}
    InvalidContractType(u32),
    /// Time error {0}
    TimeError(#[from] calyx_time::TimeError),
}
