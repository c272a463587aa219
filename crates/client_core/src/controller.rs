//! Reactive glue between wallet/chain collaborators and the mint page.
//!
//! Every state change funnels through [`ControllerState`] under one lock.
//! Work that waits on a collaborator or a timer runs on its own task and
//! captures the mount `session` it was started for; before it applies a
//! result it re-locks and checks that the same session is still mounted, so
//! nothing started before `unmount` can mutate state afterwards.

use std::sync::Arc;

use anyhow::anyhow;
use frame_host::{HostBridge, MintNotifier, MissingHostBridge, SilentNotifier};
use shared::{
    config::MintAppConfig,
    domain::{Address, ConnectionState, MintRequestState, U256},
    error::{FaultKind, MintRejected},
    protocol::{TxReceipt, ViewCall},
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    timers::TimerSlot,
    view::{check_mint_allowed, MintView},
    ChainReader, ChainWriter, ControllerEvent, MissingChainReader, MissingChainWriter,
    MissingWalletSession, WalletSession,
};

/// External capabilities the controller drives.
pub struct Collaborators {
    pub wallet: Arc<dyn WalletSession>,
    pub reader: Arc<dyn ChainReader>,
    pub writer: Arc<dyn ChainWriter>,
    pub host: Arc<dyn HostBridge>,
    pub notifier: Arc<dyn MintNotifier>,
}

impl Collaborators {
    pub fn missing() -> Self {
        Self {
            wallet: Arc::new(MissingWalletSession::new()),
            reader: Arc::new(MissingChainReader),
            writer: Arc::new(MissingChainWriter),
            host: Arc::new(MissingHostBridge),
            notifier: Arc::new(SilentNotifier),
        }
    }
}

#[derive(Default)]
struct ControllerState {
    mounted: bool,
    session: u64,
    ready_signalled: bool,
    /// `None` until the first wallet observation of the current mount.
    connection: Option<ConnectionState>,
    total_supply: Option<U256>,
    balance_of: Option<U256>,
    mint: MintRequestState,
    connection_watch: TimerSlot,
    supply_poll: TimerSlot,
    post_mint_refresh: TimerSlot,
    reconnect: TimerSlot,
}

impl ControllerState {
    fn is_live(&self, session: u64) -> bool {
        self.mounted && self.session == session
    }

    fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|connection| connection.is_connected)
    }

    fn address(&self) -> Option<Address> {
        self.connection
            .as_ref()
            .and_then(|connection| connection.address)
    }
}

pub struct MintViewController {
    config: Arc<MintAppConfig>,
    wallet: Arc<dyn WalletSession>,
    reader: Arc<dyn ChainReader>,
    writer: Arc<dyn ChainWriter>,
    host: Arc<dyn HostBridge>,
    notifier: Arc<dyn MintNotifier>,
    inner: Mutex<ControllerState>,
    events: broadcast::Sender<ControllerEvent>,
}

impl MintViewController {
    pub fn new(config: Arc<MintAppConfig>, collaborators: Collaborators) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            config,
            wallet: collaborators.wallet,
            reader: collaborators.reader,
            writer: collaborators.writer,
            host: collaborators.host,
            notifier: collaborators.notifier,
            inner: Mutex::new(ControllerState::default()),
            events,
        })
    }

    pub fn config(&self) -> &MintAppConfig {
        &self.config
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub async fn view(&self) -> MintView {
        let guard = self.inner.lock().await;
        self.render(&guard)
    }

    pub async fn mint_state(&self) -> MintRequestState {
        self.inner.lock().await.mint.clone()
    }

    pub async fn is_mounted(&self) -> bool {
        self.inner.lock().await.mounted
    }

    /// Starts the session: host readiness (once per controller), wallet
    /// observation with connection upkeep, and the first supply read.
    pub async fn mount(self: &Arc<Self>) {
        let (session, signal_ready) = {
            let mut guard = self.inner.lock().await;
            if guard.mounted {
                return;
            }
            guard.mounted = true;
            guard.session += 1;
            // Values and requests from an earlier mount belong to a dead session.
            guard.connection = None;
            guard.total_supply = None;
            guard.balance_of = None;
            guard.mint = MintRequestState::Idle;
            let signal_ready = !guard.ready_signalled;
            guard.ready_signalled = true;
            (guard.session, signal_ready)
        };

        if signal_ready {
            match self.host.signal_ready().await {
                Ok(()) => info!("frame: host signalled ready"),
                Err(err) => warn!("frame: ready signal failed: {err}"),
            }
        }

        info!(
            session,
            chain_id = self.config.target_chain().0,
            contract = %self.config.contract,
            "mint: controller mounted"
        );

        {
            let mut guard = self.inner.lock().await;
            if !guard.is_live(session) {
                return;
            }
            guard
                .connection_watch
                .replace(self.spawn_connection_watch(session));
        }

        self.spawn_supply_read(session);
    }

    /// Tears the session down. Every timer is cancelled; reads and writes
    /// still in flight complete against a dead session and are dropped.
    pub async fn unmount(&self) {
        let mut guard = self.inner.lock().await;
        if !guard.mounted {
            return;
        }
        guard.mounted = false;
        guard.connection_watch.cancel();
        guard.supply_poll.cancel();
        guard.post_mint_refresh.cancel();
        guard.reconnect.cancel();
        info!(session = guard.session, "mint: controller unmounted");
    }

    /// Connected: make sure the wallet sits on the target chain.
    /// Disconnected: ask the first registered connector to connect.
    /// Outcomes only show up through the wallet's connection observable.
    pub async fn ensure_connection(&self) {
        let session = {
            let guard = self.inner.lock().await;
            if !guard.mounted {
                return;
            }
            guard.session
        };
        self.ensure_connection_for(session).await;
    }

    async fn ensure_connection_for(&self, session: u64) {
        if !self.inner.lock().await.is_live(session) {
            return;
        }
        let is_connected = self.wallet.connection().borrow().is_connected;
        if is_connected {
            let _ = self.switch_to_target_chain().await;
        } else {
            self.connect_primary().await;
        }
    }

    pub async fn refresh_total_supply(self: &Arc<Self>) {
        let session = {
            let guard = self.inner.lock().await;
            if !guard.mounted {
                return;
            }
            guard.session
        };
        self.refresh_supply(session).await;
    }

    /// Re-reads the balance; a no-op without a connected address.
    pub async fn refresh_balance(self: &Arc<Self>) {
        let (session, owner) = {
            let guard = self.inner.lock().await;
            if !guard.mounted {
                return;
            }
            (guard.session, guard.address())
        };
        if let Some(owner) = owner {
            self.fetch_balance(session, owner).await;
        }
    }

    /// Validates and submits a mint of `quantity`. Returns once the write is
    /// in flight; settlement arrives through `MintStateChanged` events.
    pub async fn mint(self: &Arc<Self>, quantity: u64) -> Result<(), MintRejected> {
        let (session, request, view) = {
            let mut guard = self.inner.lock().await;
            if !guard.mounted {
                return Err(MintRejected::NotMounted);
            }
            if !self.config.variant.accepts_quantity(quantity) {
                return Err(MintRejected::InvalidQuantity { quantity });
            }
            check_mint_allowed(
                &self.config.variant,
                guard.is_connected(),
                guard.balance_of,
                &guard.mint,
            )?;
            guard.mint = MintRequestState::Pending;
            let request = self
                .config
                .variant
                .write_request(self.config.contract, quantity);
            (guard.session, request, self.render(&guard))
        };
        self.publish_mint_state(MintRequestState::Pending, view);
        info!(
            session,
            quantity,
            value = %request.value,
            "mint: request pending"
        );

        if let Err(err) = self.switch_to_target_chain().await {
            self.settle_mint(
                session,
                Err(anyhow!("chain switch rejected before mint: {err}")),
            )
            .await;
            return Ok(());
        }

        if !self.inner.lock().await.is_live(session) {
            debug!(session, "mint: unmounted during chain switch, dropping request");
            return Ok(());
        }

        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = controller.writer.submit(request).await;
            controller.settle_mint(session, outcome).await;
        });
        Ok(())
    }

    fn spawn_connection_watch(self: &Arc<Self>, session: u64) -> JoinHandle<()> {
        let mut updates = self.wallet.connection();
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let current = updates.borrow_and_update().clone();
            controller.apply_connection(session, current).await;
            while updates.changed().await.is_ok() {
                let current = updates.borrow_and_update().clone();
                controller.apply_connection(session, current).await;
            }
            debug!(session, "wallet: connection observable closed");
        })
    }

    async fn apply_connection(self: &Arc<Self>, session: u64, next: ConnectionState) {
        let (connected_changed, address_changed, view) = {
            let mut guard = self.inner.lock().await;
            if !guard.is_live(session) {
                return;
            }
            let previous = guard.connection.replace(next.clone());
            let connected_changed = previous
                .as_ref()
                .map_or(true, |prev| prev.is_connected != next.is_connected);
            let address_changed = previous
                .as_ref()
                .map_or(true, |prev| prev.address != next.address);

            if address_changed {
                guard.balance_of = None;
            }
            if connected_changed {
                if next.is_connected {
                    guard.reconnect.cancel();
                } else if self.config.embedded_in_frame {
                    guard.reconnect.replace(self.spawn_reconnect(session));
                }
            }
            (connected_changed, address_changed, self.render(&guard))
        };

        info!(
            session,
            connected = next.is_connected,
            address = ?next.address,
            chain_id = ?next.chain_id.map(|id| id.0),
            "wallet: connection updated"
        );
        let _ = self.events.send(ControllerEvent::ViewChanged(view));

        if connected_changed {
            let controller = Arc::clone(self);
            tokio::spawn(async move {
                controller.ensure_connection_for(session).await;
            });
        }
        if address_changed {
            if let Some(owner) = next.address {
                self.spawn_balance_read(session, owner);
            }
        }
    }

    fn spawn_reconnect(self: &Arc<Self>, session: u64) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        let period = self.config.timings.reconnect();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                if !controller.inner.lock().await.is_live(session) {
                    return;
                }
                debug!(session, "wallet: retrying frame connector");
                controller.connect_primary().await;
            }
        })
    }

    async fn connect_primary(&self) {
        let Some(connector) = self.wallet.connectors().into_iter().next() else {
            self.report_fault(FaultKind::Connection, "no wallet connector registered");
            return;
        };
        if let Err(err) = self.wallet.connect(&connector).await {
            self.report_fault(
                FaultKind::Connection,
                format!("connect via {connector} failed: {err}"),
            );
        }
    }

    async fn switch_to_target_chain(&self) -> anyhow::Result<()> {
        let chain_id = self.config.target_chain();
        self.wallet.switch_chain(chain_id).await.map_err(|err| {
            self.report_fault(
                FaultKind::Connection,
                format!("switch to chain {chain_id} failed: {err}"),
            );
            err
        })
    }

    fn spawn_supply_read(self: &Arc<Self>, session: u64) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.refresh_supply(session).await;
        });
    }

    fn spawn_balance_read(self: &Arc<Self>, session: u64, owner: Address) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            controller.fetch_balance(session, owner).await;
        });
    }

    /// Reads `totalSupply`. A new value (re)starts the poll timer; an equal
    /// value leaves the running timer alone. Nothing polls until a first read
    /// has succeeded.
    async fn refresh_supply(self: &Arc<Self>, session: u64) {
        let result = self
            .reader
            .call(self.config.contract, ViewCall::TotalSupply)
            .await;

        let view = {
            let mut guard = self.inner.lock().await;
            if !guard.is_live(session) {
                return;
            }
            match result {
                Ok(supply) => {
                    if guard.total_supply == Some(supply) {
                        None
                    } else {
                        guard.total_supply = Some(supply);
                        // May abort the poll task running this very call; it
                        // stops at its next await, after the update below.
                        guard
                            .supply_poll
                            .replace(self.spawn_supply_poll(session));
                        Some(self.render(&guard))
                    }
                }
                Err(err) => {
                    drop(guard);
                    self.report_fault(FaultKind::Read, format!("totalSupply read failed: {err}"));
                    return;
                }
            }
        };

        if let Some(view) = view {
            debug!(session, supply = ?view.total_supply, "supply: updated");
            let _ = self.events.send(ControllerEvent::ViewChanged(view));
        }
    }

    fn spawn_supply_poll(self: &Arc<Self>, session: u64) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        let period = self.config.timings.supply_poll();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                controller.refresh_supply(session).await;
            }
        })
    }

    /// Reads `balanceOf(owner)`. Dropped if the wallet moved to another
    /// address while the read was in flight.
    async fn fetch_balance(self: &Arc<Self>, session: u64, owner: Address) {
        let result = self
            .reader
            .call(self.config.contract, ViewCall::BalanceOf(owner))
            .await;

        let (view, reset) = {
            let mut guard = self.inner.lock().await;
            if !guard.is_live(session) {
                return;
            }
            if guard.address() != Some(owner) {
                debug!(session, %owner, "balance: dropping read for previous address");
                return;
            }
            match result {
                Ok(balance) => {
                    guard.balance_of = Some(balance);
                    let reset = guard.mint.is_success()
                        && self.config.variant.resets_on_balance_read();
                    if reset {
                        guard.mint = MintRequestState::Idle;
                    }
                    (self.render(&guard), reset)
                }
                Err(err) => {
                    drop(guard);
                    self.report_fault(
                        FaultKind::Read,
                        format!("balanceOf({owner}) read failed: {err}"),
                    );
                    return;
                }
            }
        };

        debug!(session, %owner, balance = ?view.balance_of, "balance: updated");
        if reset {
            self.publish_mint_state(MintRequestState::Idle, view);
        } else {
            let _ = self.events.send(ControllerEvent::ViewChanged(view));
        }
    }

    async fn settle_mint(self: &Arc<Self>, session: u64, outcome: anyhow::Result<TxReceipt>) {
        let settled = match outcome {
            Ok(receipt) if receipt.success => {
                info!(session, tx_hash = %receipt.tx_hash, "mint: confirmed");
                MintRequestState::Success
            }
            Ok(receipt) => MintRequestState::Failed(format!(
                "transaction {} reverted",
                receipt.tx_hash
            )),
            Err(err) => MintRequestState::Failed(err.to_string()),
        };

        let view = {
            let mut guard = self.inner.lock().await;
            if !guard.is_live(session) || !guard.mint.is_pending() {
                debug!(session, "mint: dropping settlement for inactive request");
                return;
            }
            guard.mint = settled.clone();
            if settled.is_success() {
                guard
                    .post_mint_refresh
                    .replace(self.spawn_post_mint_refresh(session));
            }
            self.render(&guard)
        };
        self.publish_mint_state(settled.clone(), view);

        match settled {
            MintRequestState::Success => {
                self.notifier.mint_succeeded(&self.config.acknowledgement);
                let _ = self.events.send(ControllerEvent::MintAcknowledged(
                    self.config.acknowledgement.clone(),
                ));
            }
            MintRequestState::Failed(reason) => {
                self.report_fault(FaultKind::Write, reason);
            }
            MintRequestState::Idle | MintRequestState::Pending => {}
        }
    }

    /// Reads can lag the write that just landed, so balance and supply are
    /// read right away and again after each configured delay.
    fn spawn_post_mint_refresh(self: &Arc<Self>, session: u64) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        let delays = self.config.timings.post_mint_refresh();
        tokio::spawn(async move {
            let settled_at = Instant::now();
            controller.refresh_after_mint(session).await;
            for delay in delays {
                tokio::time::sleep_until(settled_at + delay).await;
                controller.refresh_after_mint(session).await;
            }
        })
    }

    async fn refresh_after_mint(self: &Arc<Self>, session: u64) {
        let owner = {
            let guard = self.inner.lock().await;
            if !guard.is_live(session) {
                return;
            }
            guard.address()
        };
        if let Some(owner) = owner {
            self.fetch_balance(session, owner).await;
        }
        self.refresh_supply(session).await;
    }

    fn render(&self, state: &ControllerState) -> MintView {
        let is_connected = state.is_connected();
        MintView {
            title: self.config.title.clone(),
            is_connected,
            address: state.address(),
            total_supply: state.total_supply,
            balance_of: state.balance_of,
            mint_state: state.mint.clone(),
            mint_options: if is_connected {
                self.config.variant.offered_quantities()
            } else {
                Vec::new()
            },
            mint_enabled: check_mint_allowed(
                &self.config.variant,
                is_connected,
                state.balance_of,
                &state.mint,
            )
            .is_ok(),
        }
    }

    fn publish_mint_state(&self, state: MintRequestState, view: MintView) {
        let _ = self.events.send(ControllerEvent::MintStateChanged(state));
        let _ = self.events.send(ControllerEvent::ViewChanged(view));
    }

    fn report_fault(&self, fault: FaultKind, message: impl Into<String>) {
        let message = message.into();
        warn!(?fault, "mint: degraded: {message}");
        let _ = self
            .events
            .send(ControllerEvent::Degraded { fault, message });
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
