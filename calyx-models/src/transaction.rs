use crate::account::Contract;
use crate::address::{Address, AddressDeserializer, AddressSerializer};
use crate::ledger::ExecResult;
use crate::serialization::{StringDeserializer, StringSerializer};
use calyx_serialization::{
    Deserializer, SerializeError, Serializer, U32VarIntDeserializer, U32VarIntSerializer,
};
use calyx_time::CalyxTime;
use nom::error::{context, ContextError, ParseError};
use nom::multi::length_count;
use nom::sequence::tuple;
use nom::{IResult, Parser};
use serde::{Deserialize, Serialize};
use std::ops::Bound::Included;

/// An operation carried by a transaction.
///
/// The engine itself only ever synthesizes `Payment`; the remaining variants
/// exist on the wire and are interpreted by the external applier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// transfer to `dest_address`, triggering its contract with `input` as payload
    Payment {
        /// destination address
        dest_address: Address,
        /// payload handed to the destination contract, usually a JSON document
        input: String,
    },
    /// install a new account, optionally carrying a contract
    CreateAccount {
        /// address of the account to create
        dest_address: Address,
        /// contract installed at creation, if any
        contract: Option<Contract>,
    },
}

/// A transaction of a consensus value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// address emitting the transaction
    pub source_address: Address,
    /// ordered list of operations
    pub operations: Vec<Operation>,
}

/// Store entry for one applied instruction, as surfaced to test callers:
/// the transaction enriched with its ledger placement and terminal result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// the applied transaction
    pub transaction: Transaction,
    /// sequence of the ledger the transaction was applied in
    pub ledger_seq: u64,
    /// close time of that ledger
    pub close_time: CalyxTime,
    /// terminal result of the instruction
    pub result: ExecResult,
}

const OPERATION_PAYMENT_ID: u32 = 0;
const OPERATION_CREATE_ACCOUNT_ID: u32 = 1;

/// Serializer for `Operation`
pub struct OperationSerializer {
    id_serializer: U32VarIntSerializer,
    address_serializer: AddressSerializer,
    string_serializer: StringSerializer,
}

impl OperationSerializer {
    /// Creates an `OperationSerializer`
    pub const fn new() -> Self {
        Self {
            id_serializer: U32VarIntSerializer::new(),
            address_serializer: AddressSerializer::new(),
            string_serializer: StringSerializer::new(),
        }
    }
}

impl Default for OperationSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer<Operation> for OperationSerializer {
    fn serialize(&self, value: &Operation, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        match value {
            Operation::Payment {
                dest_address,
                input,
            } => {
                self.id_serializer.serialize(&OPERATION_PAYMENT_ID, buffer)?;
                self.address_serializer.serialize(dest_address, buffer)?;
                self.string_serializer.serialize(input, buffer)?;
            }
            Operation::CreateAccount {
                dest_address,
                contract,
            } => {
                self.id_serializer
                    .serialize(&OPERATION_CREATE_ACCOUNT_ID, buffer)?;
                self.address_serializer.serialize(dest_address, buffer)?;
                match contract {
                    Some(contract) => {
                        buffer.push(1);
                        self.id_serializer
                            .serialize(&(contract.contract_type as u32), buffer)?;
                        self.string_serializer.serialize(&contract.payload, buffer)?;
                    }
                    None => buffer.push(0),
                }
            }
        }
        Ok(())
    }
}

/// Deserializer for `Operation`
pub struct OperationDeserializer {
    id_deserializer: U32VarIntDeserializer,
    address_deserializer: AddressDeserializer,
    string_deserializer: StringDeserializer,
}

impl OperationDeserializer {
    /// Creates an `OperationDeserializer`
    pub const fn new() -> Self {
        Self {
            id_deserializer: U32VarIntDeserializer::new(Included(0), Included(u32::MAX)),
            address_deserializer: AddressDeserializer::new(),
            string_deserializer: StringDeserializer::new(Included(0), Included(u64::MAX)),
        }
    }
}

impl Default for OperationDeserializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deserializer<Operation> for OperationDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Operation, E> {
        context("Failed Operation deserialization", |input: &'a [u8]| {
            let (rest, id) = self.id_deserializer.deserialize(input)?;
            match id {
                OPERATION_PAYMENT_ID => {
                    let (rest, (dest_address, payment_input)) = tuple((
                        |input| self.address_deserializer.deserialize(input),
                        |input| self.string_deserializer.deserialize(input),
                    ))
                    .parse(rest)?;
                    Ok((
                        rest,
                        Operation::Payment {
                            dest_address,
                            input: payment_input,
                        },
                    ))
                }
                OPERATION_CREATE_ACCOUNT_ID => {
                    let (rest, dest_address) = self.address_deserializer.deserialize(rest)?;
                    let (rest, has_contract) = nom::bytes::complete::take(1usize)(rest)?;
                    match has_contract[0] {
                        0 => Ok((
                            rest,
                            Operation::CreateAccount {
                                dest_address,
                                contract: None,
                            },
                        )),
                        1 => {
                            let (rest, type_id) = self.id_deserializer.deserialize(rest)?;
                            let contract_type = type_id.try_into().map_err(|_| {
                                nom::Err::Error(ParseError::from_error_kind(
                                    input,
                                    nom::error::ErrorKind::Fail,
                                ))
                            })?;
                            let (rest, payload) = self.string_deserializer.deserialize(rest)?;
                            Ok((
                                rest,
                                Operation::CreateAccount {
                                    dest_address,
                                    contract: Some(Contract {
                                        contract_type,
                                        payload,
                                    }),
                                },
                            ))
                        }
                        _ => Err(nom::Err::Error(ParseError::from_error_kind(
                            input,
                            nom::error::ErrorKind::Fail,
                        ))),
                    }
                }
                _ => Err(nom::Err::Error(ParseError::from_error_kind(
                    input,
                    nom::error::ErrorKind::Fail,
                ))),
            }
        })(buffer)
    }
}

/// Serializer for `Transaction`
pub struct TransactionSerializer {
    address_serializer: AddressSerializer,
    len_serializer: U32VarIntSerializer,
    operation_serializer: OperationSerializer,
}

impl TransactionSerializer {
    /// Creates a `TransactionSerializer`
    pub const fn new() -> Self {
        Self {
            address_serializer: AddressSerializer::new(),
            len_serializer: U32VarIntSerializer::new(),
            operation_serializer: OperationSerializer::new(),
        }
    }
}

impl Default for TransactionSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl Serializer<Transaction> for TransactionSerializer {
    fn serialize(&self, value: &Transaction, buffer: &mut Vec<u8>) -> Result<(), SerializeError> {
        self.address_serializer
            .serialize(&value.source_address, buffer)?;
        let count: u32 = value.operations.len().try_into().map_err(|err| {
            SerializeError::NumberTooBig(format!("too many operations: {}", err))
        })?;
        self.len_serializer.serialize(&count, buffer)?;
        for operation in &value.operations {
            self.operation_serializer.serialize(operation, buffer)?;
        }
        Ok(())
    }
}

/// Deserializer for `Transaction`
pub struct TransactionDeserializer {
    address_deserializer: AddressDeserializer,
    len_deserializer: U32VarIntDeserializer,
    operation_deserializer: OperationDeserializer,
}

impl TransactionDeserializer {
    /// Creates a `TransactionDeserializer`
    ///
    /// Arguments:
    /// * `max_operations`: maximum number of operations per transaction
    pub const fn new(max_operations: u32) -> Self {
        Self {
            address_deserializer: AddressDeserializer::new(),
            len_deserializer: U32VarIntDeserializer::new(Included(0), Included(max_operations)),
            operation_deserializer: OperationDeserializer::new(),
        }
    }
}

impl Deserializer<Transaction> for TransactionDeserializer {
    fn deserialize<'a, E: ParseError<&'a [u8]> + ContextError<&'a [u8]>>(
        &self,
        buffer: &'a [u8],
    ) -> IResult<&'a [u8], Transaction, E> {
        context("Failed Transaction deserialization", |input| {
            tuple((
                |input| self.address_deserializer.deserialize(input),
                length_count(
                    |input| self.len_deserializer.deserialize(input),
                    |input| self.operation_deserializer.deserialize(input),
                ),
            ))
            .parse(input)
        })(buffer)
        .map(|(rest, (source_address, operations))| {
            (
                rest,
                Transaction {
                    source_address,
                    operations,
                },
            )
        })
    }
}
