//! In-memory stand-in for the wallet library and the chain, for running the
//! mint page without a frame host or an RPC node.
//!
//! Confirmed mints only become visible to reads after `read_lag`, which
//! reproduces the stale read-after-write the post-mint refresh works around.

use std::{sync::Arc, time::Duration};

use alloy_primitives::{keccak256, B256};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use shared::{
    config::{MintAppConfig, MintVariant},
    domain::{Address, ChainId, ConnectionState, ConnectorId, U256},
    protocol::{TxReceipt, ViewCall, WriteRequest},
};
use tokio::{
    sync::{watch, Mutex},
    time::Instant,
};
use tracing::{debug, info};

use crate::{ChainReader, ChainWriter, WalletSession};

#[derive(Debug, Clone)]
struct MintEntry {
    owner: Address,
    quantity: U256,
    visible_at: Instant,
}

struct Ledger {
    initial_supply: U256,
    entries: Vec<MintEntry>,
    nonce: u64,
}

impl Ledger {
    fn visible(&self, now: Instant) -> impl Iterator<Item = &MintEntry> {
        self.entries
            .iter()
            .filter(move |entry| entry.visible_at <= now)
    }

    fn total_supply(&self, now: Instant) -> U256 {
        self.visible(now)
            .fold(self.initial_supply, |sum, entry| sum + entry.quantity)
    }

    fn balance_of(&self, owner: Address, now: Instant) -> U256 {
        self.visible(now)
            .filter(|entry| entry.owner == owner)
            .fold(U256::ZERO, |sum, entry| sum + entry.quantity)
    }

    /// Balance including mints whose reads are still lagging.
    fn settled_balance_of(&self, owner: Address) -> U256 {
        self.entries
            .iter()
            .filter(|entry| entry.owner == owner)
            .fold(U256::ZERO, |sum, entry| sum + entry.quantity)
    }

    fn settled_supply(&self) -> U256 {
        self.entries
            .iter()
            .fold(self.initial_supply, |sum, entry| sum + entry.quantity)
    }
}

pub struct SimulatedChain {
    config: Arc<MintAppConfig>,
    account: Address,
    starting_chain: ChainId,
    connectors: Vec<ConnectorId>,
    approve_connect: bool,
    max_supply: Option<U256>,
    read_lag: Duration,
    confirmation_delay: Duration,
    connection: watch::Sender<ConnectionState>,
    ledger: Mutex<Ledger>,
}

impl SimulatedChain {
    /// The wallet opens on mainnet, so the first connect is followed by a
    /// switch to the configured target chain.
    pub fn new(config: Arc<MintAppConfig>, account: Address) -> Self {
        let (connection, _) = watch::channel(ConnectionState::disconnected());
        let connectors = config.connectors.clone();
        Self {
            config,
            account,
            starting_chain: ChainId(1),
            connectors,
            approve_connect: true,
            max_supply: None,
            read_lag: Duration::ZERO,
            confirmation_delay: Duration::from_millis(1_200),
            connection,
            ledger: Mutex::new(Ledger {
                initial_supply: U256::ZERO,
                entries: Vec::new(),
                nonce: 0,
            }),
        }
    }

    pub fn with_initial_supply(mut self, supply: U256) -> Self {
        self.ledger.get_mut().initial_supply = supply;
        self
    }

    pub fn with_max_supply(mut self, max_supply: U256) -> Self {
        self.max_supply = Some(max_supply);
        self
    }

    pub fn with_read_lag(mut self, read_lag: Duration) -> Self {
        self.read_lag = read_lag;
        self
    }

    pub fn with_confirmation_delay(mut self, delay: Duration) -> Self {
        self.confirmation_delay = delay;
        self
    }

    /// A wallet that keeps ignoring the connect prompt.
    pub fn declining_connect(mut self) -> Self {
        self.approve_connect = false;
        self
    }

    /// Simulates the user disconnecting from the wallet UI.
    pub fn disconnect(&self) {
        self.connection.send_replace(ConnectionState::disconnected());
    }

    fn active_chain(&self) -> Option<ChainId> {
        self.connection.borrow().chain_id
    }

    /// Checks the write the way the deployed contract would; `Some(reason)` reverts.
    async fn revert_reason(&self, request: &WriteRequest) -> Option<String> {
        let ledger = self.ledger.lock().await;
        let quantity = request.quantity();
        if let Some(max_supply) = self.max_supply {
            if ledger.settled_supply() + quantity > max_supply {
                return Some(format!("max supply {max_supply} exceeded"));
            }
        }
        if let MintVariant::FreeMint {
            wallet_cap,
            price_wei,
        } = &self.config.variant
        {
            if request.value != *price_wei {
                return Some(format!(
                    "wrong payment: sent {} expected {price_wei}",
                    request.value
                ));
            }
            if ledger.settled_balance_of(self.account) + quantity > U256::from(*wallet_cap) {
                return Some(format!("wallet cap {wallet_cap} reached"));
            }
        }
        None
    }
}

#[async_trait]
impl WalletSession for SimulatedChain {
    fn connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    fn connectors(&self) -> Vec<ConnectorId> {
        self.connectors.clone()
    }

    async fn connect(&self, connector: &ConnectorId) -> Result<()> {
        if !self.connectors.contains(connector) {
            bail!("unknown connector {connector}");
        }
        if !self.approve_connect {
            debug!(%connector, "wallet: connect prompt ignored");
            return Ok(());
        }
        if self.connection.borrow().is_connected {
            return Ok(());
        }
        info!(%connector, account = %self.account, "wallet: connected");
        self.connection.send_replace(ConnectionState::connected(
            self.account,
            self.starting_chain,
        ));
        Ok(())
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<()> {
        if !self.connection.borrow().is_connected {
            bail!("cannot switch chain without a connected wallet");
        }
        if chain_id != self.config.target_chain() {
            bail!("chain {chain_id} is not configured");
        }
        if self.active_chain() == Some(chain_id) {
            return Ok(());
        }
        info!(chain_id = chain_id.0, "wallet: switched chain");
        self.connection
            .send_modify(|state| state.chain_id = Some(chain_id));
        Ok(())
    }
}

#[async_trait]
impl ChainReader for SimulatedChain {
    async fn call(&self, contract: Address, call: ViewCall) -> Result<U256> {
        if contract != self.config.contract {
            bail!("no contract deployed at {contract}");
        }
        let now = Instant::now();
        let ledger = self.ledger.lock().await;
        Ok(match call {
            ViewCall::TotalSupply => ledger.total_supply(now),
            ViewCall::BalanceOf(owner) => ledger.balance_of(owner, now),
        })
    }
}

#[async_trait]
impl ChainWriter for SimulatedChain {
    async fn submit(&self, request: WriteRequest) -> Result<TxReceipt> {
        let connection = self.connection.borrow().clone();
        if !connection.is_connected {
            return Err(anyhow!("wallet is not connected"));
        }
        if connection.chain_id != Some(self.config.target_chain()) {
            return Err(anyhow!(
                "wallet is on chain {:?}, expected {}",
                connection.chain_id.map(|id| id.0),
                self.config.target_chain()
            ));
        }
        if request.contract != self.config.contract {
            return Err(anyhow!("no contract deployed at {}", request.contract));
        }
        let calldata = request.calldata()?;

        tokio::time::sleep(self.confirmation_delay).await;

        let revert = self.revert_reason(&request).await;
        let mut ledger = self.ledger.lock().await;
        ledger.nonce += 1;
        let mut preimage = calldata.to_vec();
        preimage.extend_from_slice(self.account.as_slice());
        preimage.extend_from_slice(&ledger.nonce.to_be_bytes());
        let tx_hash: B256 = keccak256(&preimage);

        if let Some(reason) = revert {
            info!(%tx_hash, "chain: mint reverted: {reason}");
            return Ok(TxReceipt {
                tx_hash,
                success: false,
            });
        }

        ledger.entries.push(MintEntry {
            owner: self.account,
            quantity: request.quantity(),
            visible_at: Instant::now() + self.read_lag,
        });
        info!(%tx_hash, quantity = %request.quantity(), "chain: mint confirmed");
        Ok(TxReceipt {
            tx_hash,
            success: true,
        })
    }
}

#[cfg(test)]
#[path = "tests/simulated_tests.rs"]
mod tests;
