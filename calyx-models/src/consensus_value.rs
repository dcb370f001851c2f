use crate::error::ModelsError;
use crate::transaction::{Transaction, TransactionDeserializer, TransactionSerializer};
use calyx_hash::{Hash, HashDeserializer, HashSerializer};
use calyx_serialization::{
    Deserializer, SerializeError, Serializer, U32VarIntDeserializer, U32VarIntSerializer,
    U64VarIntDeserializer, U64VarIntSerializer,
};
use calyx_time::{CalyxTime, CalyxTimeDeserializer, CalyxTimeSerializer};
use nom::error::{context, ContextError, ParseError};
use nom::multi::length_count;
use nom::sequence::tuple;
use nom::{IResult, Parser};
use serde::{Deserialize, Serialize};
use std::ops::Bound::Included;

/// A proposed block payload: what the consensus layer asks the ledger to
/// pre-execute and what a commit finally applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusValue {
    /// sequence of the ledger this value would close
    pub ledger_seq: u64,
    /// close time of the ledger this value would close
    pub close_time: CalyxTime,
    /// hash of the previous ledger
    pub previous_ledger_hash: Hash,
    /// ordered transactions of the proposed block
    pub transactions: Vec<Transaction>,
}

impl ConsensusValue {
    /// Computes the fingerprint: the hash of the canonical wire form.
    ///
    /// Equal wire forms yield equal fingerprints; this is the key under which
    /// pre-executions are deduplicated and cached.
    pub fn compute_fingerprint(&self) -> Result<Hash, ModelsError> {
        let mut buffer = Vec::new();
        ConsensusValueSerializer::new().serialize(self, &mut buffer)?;
        Ok(Hash::compute_from(&buffer))
    }
}

/// Serializer for `ConsensusValue`
pub struct ConsensusValueSerializer {
    u64_serializer: U64VarIntSerializer,
    time_serializer: CalyxTimeSerializer,
    hash_serializer: HashSerializer,
    len_serializer: U32VarIntSerializer,
    transaction_serializer: TransactionSerializer,
}

impl ConsensusValueSerializer {
    /// Creates a `ConsensusValueSerializer`
    pub fn new() -> Self {
        Self {
            u64_serializer: U64VarIntSerializer::new(),
            time_serializer: CalyxTimeSerializer::new(),
            hash_serializer: HashSerializer::new(),
            len_serializer: U32VarIntSerializer::new(),
            transaction_serializer: TransactionSerializer::new(),
        }
    }
}

impl Default for ConsensusValueSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer<ConsensusValue> for ConsensusValueSerializer {
    fn serialize(
        &self,
        value: &ConsensusValue,
        buffer: &mut Vec<u8>,
    ) -> Result<(), SerializeError> {
        self.u64_serializer.serialize(&value.ledger_seq, buffer)?;
        self.time_serializer.serialize(&value.close_time, buffer)?;
        self.hash_serializer
            .serialize(&value.previous_ledger_hash, buffer)?;
        let count: u32 = value.transactions.len().try_into().map_err(|err| {
            SerializeError::NumberTooBig(format!("too many transactions: {}", err))
        })?;
        self.len_serializer.serialize(&count, buffer)?;
        for transaction in &value.transactions {
            self.transaction_serializer.serialize(transaction, buffer)?;
        }
        Ok(())
    }
}

/// Deserializer for `ConsensusValue`
pub struct ConsensusValueDeserializer {
    u64_deserializer: U64VarIntDeserializer,
    time_deserializer: CalyxTimeDeserializer,
    hash_deserializer: HashDeserializer,
    len_deserializer: U32VarIntDeserializer,
    transaction_deserializer: TransactionDeserializer,
}

impl ConsensusValueDeserializer {
    /// Creates a `ConsensusValueDeserializer`
    ///
    /// Arguments:
    /// * `max_transactions`: maximum number of transactions per consensus value
    /// * `max_operations`: maximum number of operations per transaction
    pub fn new(max_transactions: u32, max_operations: u32) -> Self {
        Self {
            u64_deserializer: U64VarIntDeserializer::new(Included(0), Included(u64::MAX)),
            time_deserializer: CalyxTimeDeserializer::new((
                Included(CalyxTime::from_millis(0)),
                Included(CalyxTime::from_millis(u64::MAX)),
            )),
            hash_deserializer: HashDeserializer::new(),
            len_deserializer: U32VarIntDeserializer::new(Included(0), Included(max_transactions)),
            transaction_deserializer: TransactionDeserializer::new(max_operations),
        }
    }
}

impl Deserializer<ConsensusValue> for ConsensusValueDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], ConsensusValue, E> {
        context("Failed ConsensusValue deserialization", |input| {
            tuple((
                |input| self.u64_deserializer.deserialize(input),
                |input| self.time_deserializer.deserialize(input),
                |input| self.hash_deserializer.deserialize(input),
                length_count(
                    |input| self.len_deserializer.deserialize(input),
                    |input| self.transaction_deserializer.deserialize(input),
                ),
            ))
            .parse(input)
        })(buffer)
        .map(
            |(rest, (ledger_seq, close_time, previous_ledger_hash, transactions))| {
                (
                    rest,
                    ConsensusValue {
                        ledger_seq,
                        close_time,
                        previous_ledger_hash,
                        transactions,
                    },
                )
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::transaction::Operation;
    use calyx_serialization::DeserializeError;
    use calyx_signature::KeyPair;

    fn sample_value(seq: u64) -> ConsensusValue {
        let source = Address::from_public_key(&KeyPair::generate().get_public_key());
        let dest = Address::from_public_key(&KeyPair::generate().get_public_key());
        ConsensusValue {
            ledger_seq: seq,
            close_time: CalyxTime::from_millis(1_000_000),
            previous_ledger_hash: Hash::compute_from(b"previous ledger"),
            transactions: vec![Transaction {
                source_address: source,
                operations: vec![Operation::Payment {
                    dest_address: dest,
                    input: "{\"method\":\"transfer\"}".to_string(),
                }],
            }],
        }
    }

    #[test]
    fn test_wire_roundtrip() {
        let value = sample_value(42);
        let mut buffer = Vec::new();
        ConsensusValueSerializer::new()
            .serialize(&value, &mut buffer)
            .unwrap();
        let (rest, decoded) = ConsensusValueDeserializer::new(1024, 16)
            .deserialize::<DeserializeError>(&buffer)
            .unwrap();
        assert!(rest.is_empty());
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_fingerprint_determinism() {
        // equal wire forms give equal fingerprints
        let value = sample_value(10);
        let clone = value.clone();
        assert_eq!(
            value.compute_fingerprint().unwrap(),
            clone.compute_fingerprint().unwrap()
        );

        // any field change gives a new fingerprint
        let mut other = value.clone();
        other.ledger_seq += 1;
        assert_ne!(
            value.compute_fingerprint().unwrap(),
            other.compute_fingerprint().unwrap()
        );
    }

    #[test]
    fn test_fingerprint_matches_manual_hash() {
        let value = sample_value(7);
        let mut buffer = Vec::new();
        ConsensusValueSerializer::new()
            .serialize(&value, &mut buffer)
            .unwrap();
        assert_eq!(
            value.compute_fingerprint().unwrap(),
            Hash::compute_from(&buffer)
        );
    }
}
