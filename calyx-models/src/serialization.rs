//! Length-prefixed serialization helpers shared by the model wire forms.

use calyx_serialization::{
    Deserializer, SerializeError, Serializer, U64VarIntDeserializer, U64VarIntSerializer,
};
use nom::bytes::complete::take;
use nom::error::{context, ContextError, ParseError};
use nom::IResult;
use std::ops::Bound;

/// Serializer for `Vec<u8>`: varint length followed by the raw bytes
#[derive(Clone)]
pub struct VecU8Serializer {
    len_serializer: U64VarIntSerializer,
}

impl VecU8Serializer {
    /// Creates a new `VecU8Serializer`
    pub const fn new() -> Self {
        Self {
            len_serializer: U64VarIntSerializer::new(),
        }
    }
}

impl Default for VecU8Serializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer<Vec<u8>> for VecU8Serializer {
    fn serialize(&self, value: &Vec<u8>, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        let len: u64 = value.len().try_into().map_err(|err| {
            SerializeError::NumberTooBig(format!("too many bytes to serialize: {}", err))
        })?;
        self.len_serializer.serialize(&len, buffer)?;
        buffer.extend(value);
        Ok(())
    }
}

/// Deserializer for `Vec<u8>`: varint length followed by the raw bytes
#[derive(Clone)]
pub struct VecU8Deserializer {
    len_deserializer: U64VarIntDeserializer,
}

impl VecU8Deserializer {
    /// Creates a new `VecU8Deserializer` with a length bound
    pub const fn new(min_length: Bound<u64>, max_length: Bound<u64>) -> Self {
        Self {
            len_deserializer: U64VarIntDeserializer::new(min_length, max_length),
        }
    }
}

impl Deserializer<Vec<u8>> for VecU8Deserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Vec<u8>, E> {
        context("Failed Vec<u8> deserialization", |input: &'a [u8]| {
            let (rest, len) = self.len_deserializer.deserialize(input)?;
            let (rest, bytes) = take(len as usize)(rest)?;
            Ok((rest, bytes.to_vec()))
        })(buffer)
    }
}

/// Serializer for `String`: varint byte length followed by the UTF-8 bytes
#[derive(Clone)]
pub struct StringSerializer {
    vec_u8_serializer: VecU8Serializer,
}

impl StringSerializer {
    /// Creates a new `StringSerializer`
    pub const fn new() -> Self {
        Self {
            vec_u8_serializer: VecU8Serializer::new(),
        }
    }
}

impl Default for StringSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer<String> for StringSerializer {
    fn serialize(&self, value: &String, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.vec_u8_serializer
            .serialize(&value.as_bytes().to_vec(), buffer)
    }
}

/// Deserializer for `String`: varint byte length followed by the UTF-8 bytes
#[derive(Clone)]
pub struct StringDeserializer {
    vec_u8_deserializer: VecU8Deserializer,
}

impl StringDeserializer {
    /// Creates a new `StringDeserializer` with a byte-length bound
    pub const fn new(min_length: Bound<u64>, max_length: Bound<u64>) -> Self {
        Self {
            vec_u8_deserializer: VecU8Deserializer::new(min_length, max_length),
        }
    }
}

impl Deserializer<String> for StringDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], String, E> {
        context("Failed String deserialization", |input: &'a [u8]| {
            let (rest, bytes) = self.vec_u8_deserializer.deserialize(input)?;
            let string = String::from_utf8(bytes).map_err(|_| {
                nom::Err::Error(ParseError::from_error_kind(
                    input,
                    nom::error::ErrorKind::Fail,
                ))
            })?;
            Ok((rest, string))
        })(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calyx_serialization::DeserializeError;
    use std::ops::Bound::Included;

    #[test]
    fn test_string_roundtrip() {
        let serializer = StringSerializer::new();
        let deserializer = StringDeserializer::new(Included(0), Included(u64::MAX));
        let value = "{\"method\":\"ping\"}".to_string();
        let mut buffer = Vec::new();
        serializer.serialize(&value, &mut buffer).unwrap();
        let (rest, decoded) = deserializer
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_vec_u8_length_bound() {
        let serializer = VecU8Serializer::new();
        let deserializer = VecU8Deserializer::new(Included(0), Included(4));
        let mut buffer = Vec::new();
        serializer.serialize(&vec![1, 2, 3, 4, 5], &mut buffer).unwrap();
        assert!(deserializer
            .deserialize::<DeserializeError>(&buffer)
            .is_err());
    }
}
