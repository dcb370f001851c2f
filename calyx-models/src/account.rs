use crate::address::Address;
use crate::error::ModelsError;
use serde::{Deserialize, Serialize};

/// Discriminates which embedded interpreter runs a contract payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractType {
    /// javascript contract, run by the embedded JS engine
    Javascript,
    /// webassembly contract, run by the embedded WASM engine
    Wasm,
}

impl TryFrom<u32> for ContractType {
    type Error = ModelsError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ContractType::Javascript),
            1 => Ok(ContractType::Wasm),
            other => Err(ModelsError::InvalidContractType(other)),
        }
    }
}

impl std::fmt::Display for ContractType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ContractType::Javascript => write!(f, "javascript"),
            ContractType::Wasm => write!(f, "wasm"),
        }
    }
}

/// Contract payload attached to an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    /// interpreter discriminator
    pub contract_type: ContractType,
    /// contract source or bytecode, as handed to the interpreter
    pub payload: String,
}

/// A ledger account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// account address
    pub address: Address,
    /// contract installed on this account, if any
    pub contract: Option<Contract>,
}

impl Account {
    /// Creates a bare account with no contract
    pub fn new(address: Address) -> Self {
        Account {
            address,
            contract: None,
        }
    }

    /// Creates an account carrying a contract
    pub fn with_contract(address: Address, contract_type: ContractType, payload: String) -> Self {
        Account {
            address,
            contract: Some(Contract {
                contract_type,
                payload,
            }),
        }
    }
}
