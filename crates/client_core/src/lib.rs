use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{Address, ChainId, ConnectionState, ConnectorId, MintRequestState, U256},
    error::FaultKind,
    protocol::{TxReceipt, ViewCall, WriteRequest},
};
use tokio::sync::watch;

mod controller;
pub mod simulated;
mod timers;
mod view;

pub use controller::{Collaborators, MintViewController};
pub use frame_host::{HostBridge, MintNotifier};
pub use timers::TimerSlot;
pub use view::{MintView, CONNECT_PROMPT};

/// Wallet connection owned by the external wallet library.
#[async_trait]
pub trait WalletSession: Send + Sync {
    /// Observable connection state; every change is pushed to receivers.
    fn connection(&self) -> watch::Receiver<ConnectionState>;
    /// Connectors in registration order.
    fn connectors(&self) -> Vec<ConnectorId>;
    /// May prompt the user; resolves when the request was handed off, not
    /// necessarily when the connection is established.
    async fn connect(&self, connector: &ConnectorId) -> Result<()>;
    async fn switch_chain(&self, chain_id: ChainId) -> Result<()>;
}

#[async_trait]
pub trait ChainReader: Send + Sync {
    async fn call(&self, contract: Address, call: ViewCall) -> Result<U256>;
}

#[async_trait]
pub trait ChainWriter: Send + Sync {
    /// Resolves once the write is confirmed or rejected; the request counts
    /// as pending for as long as this future is outstanding.
    async fn submit(&self, request: WriteRequest) -> Result<TxReceipt>;
}

pub struct MissingWalletSession {
    state: watch::Sender<ConnectionState>,
}

impl MissingWalletSession {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::disconnected());
        Self { state }
    }
}

impl Default for MissingWalletSession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletSession for MissingWalletSession {
    fn connection(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn connectors(&self) -> Vec<ConnectorId> {
        Vec::new()
    }

    async fn connect(&self, connector: &ConnectorId) -> Result<()> {
        Err(anyhow!("wallet session unavailable for connector {connector}"))
    }

    async fn switch_chain(&self, chain_id: ChainId) -> Result<()> {
        Err(anyhow!("wallet session unavailable; cannot switch to chain {chain_id}"))
    }
}

pub struct MissingChainReader;

#[async_trait]
impl ChainReader for MissingChainReader {
    async fn call(&self, contract: Address, call: ViewCall) -> Result<U256> {
        Err(anyhow!(
            "chain reader unavailable for {} on {contract}",
            call.function().name
        ))
    }
}

pub struct MissingChainWriter;

#[async_trait]
impl ChainWriter for MissingChainWriter {
    async fn submit(&self, request: WriteRequest) -> Result<TxReceipt> {
        Err(anyhow!(
            "chain writer unavailable for {} on {}",
            request.function.name,
            request.contract
        ))
    }
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    ViewChanged(MintView),
    MintStateChanged(MintRequestState),
    /// Fired exactly once per confirmed mint.
    MintAcknowledged(String),
    Degraded {
        fault: FaultKind,
        message: String,
    },
}
