use crate::error::CalyxSignatureError;
use rand::rngs::OsRng;
use std::str::FromStr;

/// Size of a serialized public key, in bytes
pub const PUBLIC_KEY_SIZE_BYTES: usize = ed25519_dalek::PUBLIC_KEY_LENGTH;
/// Size of a serialized keypair, in bytes
pub const KEYPAIR_SIZE_BYTES: usize = ed25519_dalek::KEYPAIR_LENGTH;

/// An ed25519 keypair.
///
/// The engine only ever generates throwaway keypairs for synthetic test
/// accounts; signing real transactions belongs to the wallet subsystem.
pub struct KeyPair(ed25519_dalek::Keypair);

impl KeyPair {
    /// Generate a fresh random keypair.
    ///
    /// # Example
    ///  ```
    /// # use calyx_signature::KeyPair;
    /// let keypair = KeyPair::generate();
    /// ```
    pub fn generate() -> Self {
        let mut rng = OsRng::default();
        KeyPair(ed25519_dalek::Keypair::generate(&mut rng))
    }

    /// Get the public key of the keypair
    pub fn get_public_key(&self) -> PublicKey {
        PublicKey(self.0.public)
    }

    /// Serialize the keypair as bytes
    pub fn to_bytes(&self) -> [u8; KEYPAIR_SIZE_BYTES] {
        self.0.to_bytes()
    }

    /// Deserialize a keypair from bytes
    pub fn from_bytes(data: &[u8; KEYPAIR_SIZE_BYTES]) -> Result<Self, CalyxSignatureError> {
        Ok(KeyPair(ed25519_dalek::Keypair::from_bytes(data)?))
    }
}

impl std::fmt::Display for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}",
            bs58::encode(self.0.secret.as_bytes())
                .with_check()
                .into_string()
        )
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl FromStr for KeyPair {
    type Err = CalyxSignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|err| CalyxSignatureError::ParsingError(format!("{}", err)))?;
        let secret = ed25519_dalek::SecretKey::from_bytes(&decoded)?;
        let public = ed25519_dalek::PublicKey::from(&secret);
        Ok(KeyPair(ed25519_dalek::Keypair { secret, public }))
    }
}

/// An ed25519 public key
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(ed25519_dalek::PublicKey);

impl PublicKey {
    /// Serialize the public key as bytes
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE_BYTES] {
        self.0.to_bytes()
    }

    /// Serialize the public key using `bs58` encoding with checksum
    pub fn to_bs58_check(&self) -> String {
        bs58::encode(self.to_bytes()).with_check().into_string()
    }

    /// Deserialize a public key from bytes
    pub fn from_bytes(data: &[u8; PUBLIC_KEY_SIZE_BYTES]) -> Result<Self, CalyxSignatureError> {
        Ok(PublicKey(ed25519_dalek::PublicKey::from_bytes(data)?))
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_bs58_check())
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl FromStr for PublicKey {
    type Err = CalyxSignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decoded = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|err| CalyxSignatureError::ParsingError(format!("{}", err)))?;
        Ok(PublicKey(ed25519_dalek::PublicKey::from_bytes(&decoded)?))
    }
}

impl ::serde::Serialize for PublicKey {
    /// Human-readable formats carry the bs58check text form, binary formats
    /// the raw key bytes.
    fn serialize<S: ::serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.collect_str(&self.to_bs58_check())
        } else {
            s.serialize_bytes(&self.to_bytes())
        }
    }
}

impl<'de> ::serde::Deserialize<'de> for PublicKey {
    fn deserialize<D: ::serde::Deserializer<'de>>(d: D) -> Result<PublicKey, D::Error> {
        use ::serde::de::Error;
        use ::serde::Deserialize;
        if d.is_human_readable() {
            let text = String::deserialize(d)?;
            PublicKey::from_str(&text).map_err(D::Error::custom)
        } else {
            let bytes = Vec::<u8>::deserialize(d)?;
            let raw: &[u8; PUBLIC_KEY_SIZE_BYTES] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| D::Error::invalid_length(bytes.len(), &"a 32-byte public key"))?;
            PublicKey::from_bytes(raw).map_err(D::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_generated_keys_differ() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.get_public_key().to_bytes(), b.get_public_key().to_bytes());
    }

    #[test]
    #[serial]
    fn test_keypair_bs58_roundtrip() {
        let keypair = KeyPair::generate();
        let serialized = keypair.to_string();
        let deserialized = KeyPair::from_str(&serialized).unwrap();
        assert_eq!(keypair.to_bytes(), deserialized.to_bytes());
    }

    #[test]
    #[serial]
    fn test_public_key_serde_json() {
        let public_key = KeyPair::generate().get_public_key();
        let serialized = serde_json::to_string(&public_key).unwrap();
        let deserialized: PublicKey = serde_json::from_str(&serialized).unwrap();
        assert_eq!(public_key, deserialized);
    }
}
