//! Hash management crate

#![warn(missing_docs)]
#![warn(unused_crate_dependencies)]
pub use error::CalyxHashError;
pub use settings::HASH_SIZE_BYTES;

mod error;
mod hash;
pub use hash::*;
mod settings;
