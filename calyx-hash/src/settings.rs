/// Size of the digest in bytes
pub const HASH_SIZE_BYTES: usize = 32;
