use displaydoc::Display;
use thiserror::Error;

/// Errors of the signature crate
#[non_exhaustive]
#[derive(Display, Error, Debug)]
pub enum CalyxSignatureError {
    /// parsing error : {0}
    ParsingError(String),

    /// error forwarded by engine: {0}
    EngineError(#[from] ed25519_dalek::SignatureError),
}
