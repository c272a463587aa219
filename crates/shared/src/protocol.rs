//! Minimal contract ABI used by the mint app: two view calls and the mint write.

use alloy_primitives::{keccak256, Address, Bytes, U256};
use serde::{Deserialize, Serialize};

use crate::error::AbiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateMutability {
    View,
    Nonpayable,
    Payable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AbiParam {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(rename = "internalType")]
    pub internal_type: &'static str,
}

const fn param(name: &'static str, kind: &'static str) -> AbiParam {
    AbiParam {
        name,
        kind,
        internal_type: kind,
    }
}

/// One `type: "function"` entry of a JSON ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AbiFunction {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'static str,
    pub inputs: &'static [AbiParam],
    pub outputs: &'static [AbiParam],
    #[serde(rename = "stateMutability")]
    pub state_mutability: StateMutability,
}

pub const BALANCE_OF: AbiFunction = AbiFunction {
    kind: "function",
    name: "balanceOf",
    inputs: &[param("", "address")],
    outputs: &[param("", "uint256")],
    state_mutability: StateMutability::View,
};

pub const TOTAL_SUPPLY: AbiFunction = AbiFunction {
    kind: "function",
    name: "totalSupply",
    inputs: &[],
    outputs: &[param("", "uint256")],
    state_mutability: StateMutability::View,
};

pub const MINT_QUANTITY: AbiFunction = AbiFunction {
    kind: "function",
    name: "mint",
    inputs: &[param("quantity", "uint256")],
    outputs: &[],
    state_mutability: StateMutability::Nonpayable,
};

pub const MINT_PAYABLE: AbiFunction = AbiFunction {
    kind: "function",
    name: "mint",
    inputs: &[],
    outputs: &[],
    state_mutability: StateMutability::Payable,
};

/// Argument values accepted by [`AbiFunction::encode_call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiValue {
    Address(Address),
    Uint(U256),
}

impl AbiValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Address(_) => "address",
            Self::Uint(_) => "uint256",
        }
    }

    fn word(&self) -> [u8; 32] {
        match self {
            Self::Address(address) => address.into_word().0,
            Self::Uint(value) => value.to_be_bytes::<32>(),
        }
    }
}

impl AbiFunction {
    /// Canonical signature, e.g. `balanceOf(address)`.
    pub fn signature(&self) -> String {
        let inputs = self
            .inputs
            .iter()
            .map(|p| p.kind)
            .collect::<Vec<_>>()
            .join(",");
        format!("{}({inputs})", self.name)
    }

    pub fn selector(&self) -> [u8; 4] {
        let hash = keccak256(self.signature().as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }

    /// Selector followed by one 32-byte word per static argument.
    pub fn encode_call(&self, args: &[AbiValue]) -> Result<Bytes, AbiError> {
        if args.len() != self.inputs.len() {
            return Err(AbiError::ArgumentCount {
                function: self.name,
                expected: self.inputs.len(),
                actual: args.len(),
            });
        }

        let mut data = Vec::with_capacity(4 + 32 * args.len());
        data.extend_from_slice(&self.selector());
        for (index, (input, arg)) in self.inputs.iter().zip(args).enumerate() {
            if input.kind != arg.type_name() {
                return Err(AbiError::ArgumentType {
                    function: self.name,
                    index,
                    expected: input.kind,
                    actual: arg.type_name(),
                });
            }
            data.extend_from_slice(&arg.word());
        }
        Ok(Bytes::from(data))
    }

    pub fn is_read_only(&self) -> bool {
        self.state_mutability == StateMutability::View
    }
}

/// Read-only calls the app issues against its contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewCall {
    BalanceOf(Address),
    TotalSupply,
}

impl ViewCall {
    pub fn function(&self) -> &'static AbiFunction {
        match self {
            Self::BalanceOf(_) => &BALANCE_OF,
            Self::TotalSupply => &TOTAL_SUPPLY,
        }
    }

    pub fn calldata(&self) -> Result<Bytes, AbiError> {
        match self {
            Self::BalanceOf(owner) => BALANCE_OF.encode_call(&[AbiValue::Address(*owner)]),
            Self::TotalSupply => TOTAL_SUPPLY.encode_call(&[]),
        }
    }
}

/// A state-changing call handed to the chain writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRequest {
    pub contract: Address,
    pub function: &'static AbiFunction,
    pub args: Vec<AbiValue>,
    pub value: U256,
}

impl WriteRequest {
    /// `mint(uint256 quantity)` with no attached value.
    pub fn mint_quantity(contract: Address, quantity: u64) -> Self {
        Self {
            contract,
            function: &MINT_QUANTITY,
            args: vec![AbiValue::Uint(U256::from(quantity))],
            value: U256::ZERO,
        }
    }

    /// `mint()` paying `price` (zero for a free mint).
    pub fn mint_payable(contract: Address, price: U256) -> Self {
        Self {
            contract,
            function: &MINT_PAYABLE,
            args: Vec::new(),
            value: price,
        }
    }

    pub fn calldata(&self) -> Result<Bytes, AbiError> {
        self.function.encode_call(&self.args)
    }

    /// Number of tokens this request issues to the caller.
    pub fn quantity(&self) -> U256 {
        match self.args.first() {
            Some(AbiValue::Uint(quantity)) => *quantity,
            _ => U256::from(1u64),
        }
    }
}

/// Confirmation returned by the writer once a mint is included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: alloy_primitives::B256,
    pub success: bool,
}
