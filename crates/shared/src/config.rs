//! Immutable application configuration shared by the controller and its collaborators.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    domain::{Address, ChainId, ConnectorId, FIXED_SUPPLY_QUANTITIES, FREE_MINT_WALLET_CAP, U256},
    error::ConfigError,
    protocol::WriteRequest,
};

pub const DEFAULT_CONTRACT: &str = "0xF5766771A46766a27D28CB3427e4C27881D48360";
pub const DEFAULT_CONNECTOR: &str = "farcaster-frame";
pub const DEFAULT_ACKNOWLEDGEMENT: &str = "You minted your NFT!";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockExplorer {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDefinition {
    pub id: ChainId,
    pub name: String,
    pub native_currency: NativeCurrency,
    pub rpc_url: String,
    pub block_explorer: Option<BlockExplorer>,
}

impl ChainDefinition {
    pub fn base() -> Self {
        Self {
            id: ChainId(8453),
            name: "Base".into(),
            native_currency: NativeCurrency {
                name: "Ether".into(),
                symbol: "ETH".into(),
                decimals: 18,
            },
            rpc_url: "https://mainnet.base.org".into(),
            block_explorer: Some(BlockExplorer {
                name: "BaseScan".into(),
                url: "https://basescan.org".into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MintVariant {
    /// Caller picks one of a fixed set of quantities; `mint(uint256)`.
    FixedSupply { quantities: Vec<u64> },
    /// One token per click at a fixed price (zero for free); `mint()` payable.
    /// The contract enforces the cap, the client only mirrors it.
    FreeMint { wallet_cap: u64, price_wei: U256 },
}

impl MintVariant {
    pub fn fixed_supply() -> Self {
        Self::FixedSupply {
            quantities: FIXED_SUPPLY_QUANTITIES.to_vec(),
        }
    }

    pub fn free_mint() -> Self {
        Self::FreeMint {
            wallet_cap: FREE_MINT_WALLET_CAP,
            price_wei: U256::ZERO,
        }
    }

    /// Quantities rendered as mint buttons.
    pub fn offered_quantities(&self) -> Vec<u64> {
        match self {
            Self::FixedSupply { quantities } => quantities.clone(),
            Self::FreeMint { .. } => vec![1],
        }
    }

    pub fn accepts_quantity(&self, quantity: u64) -> bool {
        match self {
            Self::FixedSupply { quantities } => quantities.contains(&quantity),
            Self::FreeMint { .. } => quantity == 1,
        }
    }

    /// Whether a completed balance read returns a settled `Success` to `Idle`.
    pub fn resets_on_balance_read(&self) -> bool {
        matches!(self, Self::FreeMint { .. })
    }

    pub fn write_request(&self, contract: Address, quantity: u64) -> WriteRequest {
        match self {
            Self::FixedSupply { .. } => WriteRequest::mint_quantity(contract, quantity),
            Self::FreeMint { price_wei, .. } => WriteRequest::mint_payable(contract, *price_wei),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timings {
    pub supply_poll_ms: u64,
    pub post_mint_refresh_ms: Vec<u64>,
    pub reconnect_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            supply_poll_ms: 7000,
            post_mint_refresh_ms: vec![3000, 5000],
            reconnect_ms: 1500,
        }
    }
}

impl Timings {
    pub fn supply_poll(&self) -> Duration {
        Duration::from_millis(self.supply_poll_ms)
    }

    pub fn post_mint_refresh(&self) -> Vec<Duration> {
        self.post_mint_refresh_ms
            .iter()
            .copied()
            .map(Duration::from_millis)
            .collect()
    }

    pub fn reconnect(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }
}

/// Everything a session needs to know about the deployed app. Built once at
/// startup and handed to every collaborator; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintAppConfig {
    pub title: String,
    pub chain: ChainDefinition,
    pub connectors: Vec<ConnectorId>,
    pub contract: Address,
    pub variant: MintVariant,
    pub timings: Timings,
    pub embedded_in_frame: bool,
    pub acknowledgement: String,
}

impl MintAppConfig {
    pub fn new(contract: Address, variant: MintVariant) -> Self {
        Self {
            title: "EWCL".into(),
            chain: ChainDefinition::base(),
            connectors: vec![ConnectorId::new(DEFAULT_CONNECTOR)],
            contract,
            variant,
            timings: Timings::default(),
            embedded_in_frame: true,
            acknowledgement: DEFAULT_ACKNOWLEDGEMENT.into(),
        }
    }

    pub fn target_chain(&self) -> ChainId {
        self.chain.id
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connectors.is_empty() {
            return Err(ConfigError::NoConnectors);
        }
        if let MintVariant::FixedSupply { quantities } = &self.variant {
            if quantities.is_empty() {
                return Err(ConfigError::NoQuantities);
            }
            if quantities.contains(&0) {
                return Err(ConfigError::ZeroQuantity);
            }
        }
        if self.timings.supply_poll_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "supply_poll_ms",
            });
        }
        if self.timings.reconnect_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "reconnect_ms",
            });
        }
        if self
            .timings
            .post_mint_refresh_ms
            .windows(2)
            .any(|pair| pair[0] >= pair[1])
        {
            return Err(ConfigError::UnorderedRefreshDelays);
        }
        Ok(())
    }
}

impl Default for MintAppConfig {
    fn default() -> Self {
        Self::new(
            alloy_primitives::address!("F5766771A46766a27D28CB3427e4C27881D48360"),
            MintVariant::fixed_supply(),
        )
    }
}
