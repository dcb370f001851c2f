//! Signature management

#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]
mod error;
mod signature_impl;

pub use error::CalyxSignatureError;
pub use signature_impl::{KeyPair, PublicKey, KEYPAIR_SIZE_BYTES, PUBLIC_KEY_SIZE_BYTES};
