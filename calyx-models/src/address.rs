use crate::error::ModelsError;
use calyx_hash::{Hash, HashDeserializer};
use calyx_serialization::{
    DeserializeError, Deserializer, SerializeError, Serializer, U64VarIntDeserializer,
    U64VarIntSerializer,
};
use calyx_signature::PublicKey;
use nom::error::{context, ContextError, ParseError};
use nom::IResult;
use std::ops::Bound::Included;
use std::str::FromStr;

/// Size of a serialized address, in bytes
pub const ADDRESS_SIZE_BYTES: usize = calyx_hash::HASH_SIZE_BYTES;

const ADDRESS_PREFIX: char = 'C';
const ADDRESS_VERSION: u64 = 0;

/// An account address, derived from a public key
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Address(pub calyx_hash::Hash);

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let u64_serializer = U64VarIntSerializer::new();
        let mut bytes: Vec<u8> = Vec::new();
        u64_serializer
            .serialize(&ADDRESS_VERSION, &mut bytes)
            .map_err(|_| std::fmt::Error)?;
        bytes.extend(self.0.to_bytes());
        write!(
            f,
            "{}{}",
            ADDRESS_PREFIX,
            bs58::encode(bytes).with_check().into_string()
        )
    }
}

impl std::fmt::Debug for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl FromStr for Address {
    /// ## Example
    /// ```rust
    /// # use calyx_signature::KeyPair;
    /// # use calyx_models::address::Address;
    /// # use std::str::FromStr;
    /// let keypair = KeyPair::generate();
    /// let address = Address::from_public_key(&keypair.get_public_key());
    /// let text = address.to_string();
    /// let res_addr = Address::from_str(&text).unwrap();
    /// assert_eq!(address, res_addr);
    /// ```
    type Err = ModelsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match chars.next() {
            Some(prefix) if prefix == ADDRESS_PREFIX => {
                let data = chars.collect::<String>();
                let decoded_bs58_check = bs58::decode(data)
                    .with_check(None)
                    .into_vec()
                    .map_err(|_| ModelsError::AddressParseError(s.to_string()))?;
                let u64_deserializer = U64VarIntDeserializer::new(Included(0), Included(u64::MAX));
                let (rest, version) = u64_deserializer
                    .deserialize::<DeserializeError>(&decoded_bs58_check[..])
                    .map_err(|_| ModelsError::AddressParseError(s.to_string()))?;
                if version != ADDRESS_VERSION {
                    return Err(ModelsError::AddressParseError(s.to_string()));
                }
                Ok(Address(Hash::from_bytes(
                    rest.try_into()
                        .map_err(|_| ModelsError::AddressParseError(s.to_string()))?,
                )))
            }
            _ => Err(ModelsError::AddressParseError(s.to_string())),
        }
    }
}

impl Address {
    /// Computes the address associated with the given public key
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Address(Hash::compute_from(&public_key.to_bytes()))
    }

    /// Whether a string is a syntactically valid textual address
    pub fn is_valid(s: &str) -> bool {
        Address::from_str(s).is_ok()
    }

    /// Serialize the address as bytes
    pub fn to_bytes(&self) -> &[u8; ADDRESS_SIZE_BYTES] {
        self.0.to_bytes()
    }

    /// Deserialize an address from bytes
    pub fn from_bytes(data: &[u8; ADDRESS_SIZE_BYTES]) -> Address {
        Address(Hash::from_bytes(data))
    }
}

impl ::serde::Serialize for Address {
    /// Human-readable formats carry the prefixed text form, binary formats
    /// the raw hash bytes.
    fn serialize<S: ::serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if s.is_human_readable() {
            s.collect_str(self)
        } else {
            s.serialize_bytes(self.to_bytes())
        }
    }
}

impl<'de> ::serde::Deserialize<'de> for Address {
    fn deserialize<D: ::serde::Deserializer<'de>>(d: D) -> Result<Address, D::Error> {
        use ::serde::de::Error;
        use ::serde::Deserialize;
        if d.is_human_readable() {
            let text = String::deserialize(d)?;
            Address::from_str(&text).map_err(D::Error::custom)
        } else {
            let bytes = Vec::<u8>::deserialize(d)?;
            let raw: &[u8; ADDRESS_SIZE_BYTES] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| D::Error::invalid_length(bytes.len(), &"a 32-byte address"))?;
            Ok(Address::from_bytes(raw))
        }
    }
}

/// Serializer for `Address`
#[derive(Default, Clone)]
pub struct AddressSerializer;

impl AddressSerializer {
    /// Serializer constructor
    pub const fn new() -> Self {
        Self
    }
}

impl Serializer<Address> for AddressSerializer {
    fn serialize(&self, value: &Address, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        buffer.extend_from_slice(value.to_bytes());
        Ok(())
    }
}

/// Deserializer for `Address`
#[derive(Default, Clone)]
pub struct AddressDeserializer {
    hash_deserializer: HashDeserializer,
}

impl AddressDeserializer {
    /// Deserializer constructor
    pub const fn new() -> Self {
        Self {
            hash_deserializer: HashDeserializer::new(),
        }
    }
}

impl Deserializer<Address> for AddressDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Address, E> {
        context("Failed Address deserialization", |input| {
            self.hash_deserializer
                .deserialize(input)
                .map(|(rest, hash)| (rest, Address(hash)))
        })(buffer)
    }
}
