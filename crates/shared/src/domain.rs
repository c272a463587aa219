use std::fmt;

pub use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident, $inner:ty) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(ChainId, u64);

/// Identifier of a wallet connector registered with the session, e.g. `farcaster-frame`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectorId(pub String);

impl ConnectorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Quantities offered by the fixed-supply variant.
pub const FIXED_SUPPLY_QUANTITIES: [u64; 5] = [1, 10, 100, 1000, 3000];

/// Client-side per-wallet cap mirrored from the free-mint contract.
pub const FREE_MINT_WALLET_CAP: u64 = 10;

/// Wallet connection as reported by the wallet session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub is_connected: bool,
    pub address: Option<Address>,
    pub chain_id: Option<ChainId>,
}

impl ConnectionState {
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn connected(address: Address, chain_id: ChainId) -> Self {
        Self {
            is_connected: true,
            address: Some(address),
            chain_id: Some(chain_id),
        }
    }
}

/// Lifecycle of the single mint request a session may have in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum MintRequestState {
    #[default]
    Idle,
    Pending,
    Success,
    Failed(String),
}

impl MintRequestState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed(_) => "failed",
        }
    }
}

/// Formats an integer with `,` thousands separators (`1000` -> `1,000`).
pub fn group_thousands(value: U256) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
