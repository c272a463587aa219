use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::U256;

/// Which collaborator a degraded UI fragment traces back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    Connection,
    Read,
    Write,
}

/// Reasons a mint is refused before anything reaches the chain writer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MintRejected {
    #[error("controller is not mounted")]
    NotMounted,
    #[error("wallet is not connected")]
    NotConnected,
    #[error("quantity {quantity} is not one of the offered mint sizes")]
    InvalidQuantity { quantity: u64 },
    #[error("a mint is already in flight for this session")]
    AlreadyPending,
    #[error("this session already minted; wait for the balance to refresh")]
    AlreadyMinted,
    #[error("balance is not known yet")]
    BalanceUnknown,
    #[error("wallet balance {balance} reached the per-wallet cap of {cap}")]
    WalletCapReached { balance: U256, cap: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("at least one wallet connector must be configured")]
    NoConnectors,
    #[error("fixed-supply variant needs at least one mint quantity")]
    NoQuantities,
    #[error("mint quantities must be non-zero")]
    ZeroQuantity,
    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },
    #[error("post-mint refresh delays must be strictly ascending")]
    UnorderedRefreshDelays,
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("{function} expects {expected} arguments, got {actual}")]
    ArgumentCount {
        function: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{function} argument {index} expects {expected}, got {actual}")]
    ArgumentType {
        function: &'static str,
        index: usize,
        expected: &'static str,
        actual: &'static str,
    },
}
