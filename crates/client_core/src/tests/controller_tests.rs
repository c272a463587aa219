use super::*;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex as StdMutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use shared::{
    config::MintVariant,
    domain::{ChainId, ConnectorId},
    protocol::{WriteRequest, MINT_PAYABLE, MINT_QUANTITY},
};
use tokio::sync::{watch, Notify};

use crate::CONNECT_PROMPT;

const TARGET_CHAIN: ChainId = ChainId(8453);

fn owner(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

struct TestWallet {
    state: watch::Sender<ConnectionState>,
    auto_connect: Option<Address>,
    fail_switch: bool,
    switch_delay: Option<Duration>,
    connect_calls: StdMutex<Vec<ConnectorId>>,
    switch_calls: StdMutex<Vec<ChainId>>,
}

impl TestWallet {
    /// Wallet that approves the connect prompt for `address` on another chain.
    fn approving(address: Address) -> Self {
        Self::new(Some(address))
    }

    /// Wallet whose connect prompt never resolves into a connection.
    fn idle() -> Self {
        Self::new(None)
    }

    fn new(auto_connect: Option<Address>) -> Self {
        let (state, _) = watch::channel(ConnectionState::disconnected());
        Self {
            state,
            auto_connect,
            fail_switch: false,
            switch_delay: None,
            connect_calls: StdMutex::new(Vec::new()),
            switch_calls: StdMutex::new(Vec::new()),
        }
    }

    fn rejecting_switch(mut self) -> Self {
        self.fail_switch = true;
        self
    }

    /// Keeps the chain-switch prompt open for `ms` before approving.
    fn slow_switch(mut self, ms: u64) -> Self {
        self.switch_delay = Some(Duration::from_millis(ms));
        self
    }

    fn set(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn connect_count(&self) -> usize {
        self.connect_calls.lock().expect("lock").len()
    }

    fn switch_calls(&self) -> Vec<ChainId> {
        self.switch_calls.lock().expect("lock").clone()
    }
}

#[async_trait]
impl WalletSession for TestWallet {
    fn connection(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn connectors(&self) -> Vec<ConnectorId> {
        vec![ConnectorId::new("farcaster-frame"), ConnectorId::new("injected")]
    }

    async fn connect(&self, connector: &ConnectorId) -> anyhow::Result<()> {
        self.connect_calls
            .lock()
            .expect("lock")
            .push(connector.clone());
        if let Some(address) = self.auto_connect {
            self.set(ConnectionState::connected(address, ChainId(1)));
        }
        Ok(())
    }

    async fn switch_chain(&self, chain_id: ChainId) -> anyhow::Result<()> {
        self.switch_calls.lock().expect("lock").push(chain_id);
        if let Some(delay) = self.switch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_switch {
            return Err(anyhow!("user rejected chain switch"));
        }
        self.state.send_modify(|state| state.chain_id = Some(chain_id));
        Ok(())
    }
}

#[derive(Default)]
struct TestReader {
    supply: StdMutex<Option<u64>>,
    /// Adds one to the supply after every read, so each poll sees a new value.
    supply_grows: bool,
    balances: StdMutex<HashMap<Address, u64>>,
    balance_delays: HashMap<Address, Duration>,
    fail_balance: bool,
    calls: StdMutex<Vec<ViewCall>>,
}

impl TestReader {
    fn with_supply(supply: u64) -> Self {
        Self {
            supply: StdMutex::new(Some(supply)),
            ..Self::default()
        }
    }

    fn balance(self, address: Address, balance: u64) -> Self {
        self.balances
            .lock()
            .expect("lock")
            .insert(address, balance);
        self
    }

    fn next_supply(&self) -> anyhow::Result<u64> {
        let mut supply = self.supply.lock().expect("lock");
        let current = supply.ok_or_else(|| anyhow!("execution reverted"))?;
        if self.supply_grows {
            *supply = Some(current + 1);
        }
        Ok(current)
    }

    fn supply_calls(&self) -> usize {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter(|call| matches!(call, ViewCall::TotalSupply))
            .count()
    }

    fn balance_calls(&self) -> usize {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter(|call| matches!(call, ViewCall::BalanceOf(_)))
            .count()
    }
}

#[async_trait]
impl ChainReader for TestReader {
    async fn call(&self, _contract: Address, call: ViewCall) -> anyhow::Result<U256> {
        self.calls.lock().expect("lock").push(call);
        match call {
            ViewCall::TotalSupply => self.next_supply().map(U256::from),
            ViewCall::BalanceOf(address) => {
                if let Some(delay) = self.balance_delays.get(&address) {
                    tokio::time::sleep(*delay).await;
                }
                if self.fail_balance {
                    return Err(anyhow!("rpc timeout"));
                }
                let balance = self
                    .balances
                    .lock()
                    .expect("lock")
                    .get(&address)
                    .copied()
                    .unwrap_or_default();
                Ok(U256::from(balance))
            }
        }
    }
}

struct TestWriter {
    succeed: bool,
    gate: Option<Arc<Notify>>,
    requests: StdMutex<Vec<WriteRequest>>,
}

impl TestWriter {
    fn succeeding() -> Self {
        Self {
            succeed: true,
            gate: None,
            requests: StdMutex::new(Vec::new()),
        }
    }

    fn reverting() -> Self {
        Self {
            succeed: false,
            ..Self::succeeding()
        }
    }

    /// Holds every submission until the returned handle is notified.
    fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    fn requests(&self) -> Vec<WriteRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ChainWriter for TestWriter {
    async fn submit(&self, request: WriteRequest) -> anyhow::Result<TxReceipt> {
        self.requests.lock().expect("lock").push(request);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        Ok(TxReceipt {
            tx_hash: alloy_primitives::B256::repeat_byte(0xab),
            success: self.succeed,
        })
    }
}

#[derive(Default)]
struct RecordingHost {
    ready: AtomicUsize,
    acknowledgements: StdMutex<Vec<String>>,
}

impl RecordingHost {
    fn ready_count(&self) -> usize {
        self.ready.load(Ordering::SeqCst)
    }

    fn acknowledgements(&self) -> Vec<String> {
        self.acknowledgements.lock().expect("lock").clone()
    }
}

#[async_trait]
impl HostBridge for RecordingHost {
    async fn signal_ready(&self) -> anyhow::Result<()> {
        self.ready.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl MintNotifier for RecordingHost {
    fn mint_succeeded(&self, message: &str) {
        self.acknowledgements
            .lock()
            .expect("lock")
            .push(message.to_string());
    }
}

struct Harness {
    controller: Arc<MintViewController>,
    wallet: Arc<TestWallet>,
    reader: Arc<TestReader>,
    writer: Arc<TestWriter>,
    host: Arc<RecordingHost>,
}

fn harness_with(
    config: MintAppConfig,
    wallet: TestWallet,
    reader: TestReader,
    writer: TestWriter,
) -> Harness {
    let wallet = Arc::new(wallet);
    let reader = Arc::new(reader);
    let writer = Arc::new(writer);
    let host = Arc::new(RecordingHost::default());
    let controller = MintViewController::new(
        Arc::new(config),
        Collaborators {
            wallet: wallet.clone(),
            reader: reader.clone(),
            writer: writer.clone(),
            host: host.clone(),
            notifier: host.clone(),
        },
    );
    Harness {
        controller,
        wallet,
        reader,
        writer,
        host,
    }
}

fn harness(wallet: TestWallet, reader: TestReader, writer: TestWriter) -> Harness {
    harness_with(MintAppConfig::default(), wallet, reader, writer)
}

fn free_mint_config() -> MintAppConfig {
    let mut config = MintAppConfig::default();
    config.variant = MintVariant::FreeMint {
        wallet_cap: 10,
        price_wei: U256::from(1_000u64),
    };
    config
}

/// Lets every ready task run; the paused clock only moves once all are idle.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

async fn advance(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn mount_signals_ready_once_and_connects_then_switches_chain() {
    let h = harness(
        TestWallet::approving(owner(1)),
        TestReader::with_supply(5),
        TestWriter::succeeding(),
    );

    h.controller.mount().await;
    h.controller.mount().await;
    settle().await;

    assert_eq!(h.host.ready_count(), 1);
    assert_eq!(
        h.wallet.connect_calls.lock().expect("lock").clone(),
        vec![ConnectorId::new("farcaster-frame")]
    );
    assert_eq!(h.wallet.switch_calls(), vec![TARGET_CHAIN]);

    let view = h.controller.view().await;
    assert!(view.is_connected);
    assert_eq!(view.address, Some(owner(1)));
    assert_eq!(view.mint_options, vec![1, 10, 100, 1000, 3000]);
    assert_eq!(view.connect_prompt(), None);
}

#[tokio::test(start_paused = true)]
async fn remount_does_not_signal_ready_again() {
    let h = harness(
        TestWallet::idle(),
        TestReader::with_supply(5),
        TestWriter::succeeding(),
    );

    h.controller.mount().await;
    h.controller.unmount().await;
    h.controller.mount().await;
    settle().await;

    assert_eq!(h.host.ready_count(), 1);
    assert!(h.controller.is_mounted().await);
}

#[tokio::test(start_paused = true)]
async fn remount_restarts_supply_polling_for_unchanged_supply() {
    let h = harness(
        TestWallet::approving(owner(1)),
        TestReader::with_supply(1_000),
        TestWriter::succeeding(),
    );

    h.controller.mount().await;
    settle().await;
    h.controller.unmount().await;
    h.controller.mount().await;
    settle().await;
    let after_remount = h.reader.supply_calls();

    advance(7_100).await;
    assert_eq!(h.reader.supply_calls(), after_remount + 1);
    advance(7_000).await;
    assert_eq!(h.reader.supply_calls(), after_remount + 2);
    assert_eq!(
        h.controller.view().await.total_supply,
        Some(U256::from(1_000u64))
    );
}

#[tokio::test(start_paused = true)]
async fn remount_after_abandoned_mint_reenables_control() {
    let (writer, gate) = TestWriter::succeeding().gated();
    let h = harness(
        TestWallet::approving(owner(2)),
        TestReader::with_supply(1_000),
        writer,
    );

    h.controller.mount().await;
    settle().await;
    h.controller.mint(10).await.expect("mint accepted");
    settle().await;
    h.controller.unmount().await;
    gate.notify_one();

    h.controller.mount().await;
    advance(10_000).await;

    let view = h.controller.view().await;
    assert_eq!(view.mint_state, MintRequestState::Idle);
    assert!(view.mint_enabled);
    assert!(h.host.acknowledgements().is_empty());

    h.controller.mint(1).await.expect("fresh session accepts a mint");
    settle().await;
    assert_eq!(h.writer.requests().len(), 2);
    assert_eq!(h.controller.mint_state().await, MintRequestState::Pending);
}

#[tokio::test(start_paused = true)]
async fn unmount_during_chain_switch_never_submits() {
    let h = harness(
        TestWallet::approving(owner(3)).slow_switch(500),
        TestReader::with_supply(1_000),
        TestWriter::succeeding(),
    );

    h.controller.mount().await;
    advance(600).await;
    assert!(h.controller.view().await.mint_enabled);

    let controller = Arc::clone(&h.controller);
    let minting = tokio::spawn(async move { controller.mint(10).await });
    advance(100).await;
    h.controller.unmount().await;
    advance(1_000).await;

    assert_eq!(minting.await.expect("join"), Ok(()));
    assert!(h.writer.requests().is_empty());
    assert_eq!(h.controller.mint_state().await, MintRequestState::Pending);
    assert!(h.host.acknowledgements().is_empty());
}

#[tokio::test(start_paused = true)]
async fn ensure_connection_is_inert_while_unmounted() {
    let h = harness(
        TestWallet::idle(),
        TestReader::with_supply(1_000),
        TestWriter::succeeding(),
    );

    h.controller.ensure_connection().await;
    assert_eq!(h.wallet.connect_count(), 0);

    h.controller.mount().await;
    settle().await;
    let connects = h.wallet.connect_count();
    assert!(connects >= 1);

    h.controller.unmount().await;
    h.controller.ensure_connection().await;
    advance(5_000).await;
    assert_eq!(h.wallet.connect_count(), connects);
}

#[tokio::test(start_paused = true)]
async fn balance_shows_placeholder_until_address_is_known() {
    let h = harness(
        TestWallet::idle(),
        TestReader::with_supply(5).balance(owner(7), 3),
        TestWriter::succeeding(),
    );

    h.controller.mount().await;
    settle().await;

    let view = h.controller.view().await;
    assert_eq!(view.balance_label(), "You minted: x?");
    assert_eq!(view.connect_prompt(), Some(CONNECT_PROMPT));
    assert!(view.mint_options.is_empty());
    assert_eq!(h.reader.balance_calls(), 0);

    h.wallet
        .set(ConnectionState::connected(owner(7), TARGET_CHAIN));
    settle().await;

    assert_eq!(
        h.reader.calls.lock().expect("lock").last().copied(),
        Some(ViewCall::BalanceOf(owner(7)))
    );
    assert_eq!(h.controller.view().await.balance_label(), "You minted: x3");
}

#[tokio::test(start_paused = true)]
async fn anonymous_session_never_reads_balance() {
    let h = harness(
        TestWallet::idle(),
        TestReader::with_supply(5),
        TestWriter::succeeding(),
    );

    h.controller.mount().await;
    advance(30_000).await;

    assert_eq!(h.reader.balance_calls(), 0);
    assert!(h.reader.supply_calls() >= 1);
}

#[tokio::test(start_paused = true)]
async fn disconnecting_clears_balance() {
    let h = harness(
        TestWallet::idle(),
        TestReader::with_supply(5).balance(owner(2), 4),
        TestWriter::succeeding(),
    );

    h.controller.mount().await;
    h.wallet
        .set(ConnectionState::connected(owner(2), TARGET_CHAIN));
    settle().await;
    assert_eq!(h.controller.view().await.balance_of, Some(U256::from(4u64)));

    h.wallet.set(ConnectionState::disconnected());
    settle().await;

    let view = h.controller.view().await;
    assert_eq!(view.balance_of, None);
    assert!(!view.mint_enabled);
}

#[tokio::test(start_paused = true)]
async fn balance_read_for_previous_address_is_discarded() {
    let mut reader = TestReader::with_supply(5)
        .balance(owner(1), 11)
        .balance(owner(2), 22);
    reader
        .balance_delays
        .insert(owner(1), Duration::from_millis(1_000));
    reader
        .balance_delays
        .insert(owner(2), Duration::from_millis(1_000));
    let h = harness(TestWallet::idle(), reader, TestWriter::succeeding());

    h.controller.mount().await;
    settle().await;
    h.wallet
        .set(ConnectionState::connected(owner(1), TARGET_CHAIN));
    advance(500).await;
    h.wallet
        .set(ConnectionState::connected(owner(2), TARGET_CHAIN));

    advance(700).await;
    assert_eq!(h.controller.view().await.balance_of, None);

    advance(600).await;
    assert_eq!(h.controller.view().await.balance_of, Some(U256::from(22u64)));
}

#[tokio::test(start_paused = true)]
async fn supply_label_and_single_refetch_after_poll_interval() {
    let h = harness(
        TestWallet::idle(),
        TestReader::with_supply(1_000),
        TestWriter::succeeding(),
    );

    h.controller.mount().await;
    settle().await;
    assert_eq!(h.controller.view().await.supply_label(), "1,000 minted");
    assert_eq!(h.reader.supply_calls(), 1);

    advance(6_900).await;
    assert_eq!(h.reader.supply_calls(), 1);

    advance(200).await;
    assert_eq!(h.reader.supply_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn changing_supply_keeps_exactly_one_poll_timer() {
    let mut reader = TestReader::with_supply(1_000);
    reader.supply_grows = true;
    let h = harness(TestWallet::idle(), reader, TestWriter::succeeding());

    h.controller.mount().await;
    settle().await;
    advance(21_100).await;

    // Reads at 0, 7s, 14s and 21s; a duplicated timer would add more.
    assert_eq!(h.reader.supply_calls(), 4);
    assert_eq!(
        h.controller.view().await.total_supply,
        Some(U256::from(1_003u64))
    );
}

#[tokio::test(start_paused = true)]
async fn new_supply_value_restarts_poll_interval() {
    let mut reader = TestReader::with_supply(1_000);
    reader.supply_grows = true;
    let h = harness(TestWallet::idle(), reader, TestWriter::succeeding());

    h.controller.mount().await;
    settle().await;
    advance(3_000).await;
    h.controller.refresh_total_supply().await;
    assert_eq!(h.reader.supply_calls(), 2);

    // The timer armed at mount would have fired at 7s; it was replaced at ~3s.
    advance(6_900).await;
    assert_eq!(h.reader.supply_calls(), 2);

    advance(200).await;
    assert_eq!(h.reader.supply_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn unset_supply_never_starts_polling() {
    let reader = TestReader::default();
    let h = harness(TestWallet::idle(), reader, TestWriter::succeeding());
    let mut events = h.controller.subscribe_events();

    h.controller.mount().await;
    advance(30_000).await;

    assert_eq!(h.reader.supply_calls(), 1);
    assert_eq!(h.controller.view().await.supply_label(), "0 minted");

    let mut read_faults = 0;
    while let Ok(event) = events.try_recv() {
        if let ControllerEvent::Degraded {
            fault: FaultKind::Read,
            ..
        } = event
        {
            read_faults += 1;
        }
    }
    assert_eq!(read_faults, 1);
}

#[tokio::test(start_paused = true)]
async fn zero_supply_still_polls() {
    let h = harness(
        TestWallet::idle(),
        TestReader::with_supply(0),
        TestWriter::succeeding(),
    );

    h.controller.mount().await;
    settle().await;
    advance(7_100).await;

    assert_eq!(h.reader.supply_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn unmount_cancels_timers_and_freezes_state() {
    let h = harness(
        TestWallet::approving(owner(3)),
        TestReader::with_supply(1_000).balance(owner(3), 1),
        TestWriter::succeeding(),
    );

    h.controller.mount().await;
    settle().await;
    let before = h.controller.view().await;
    let supply_calls = h.reader.supply_calls();

    h.controller.unmount().await;
    h.reader
        .balances
        .lock()
        .expect("lock")
        .insert(owner(3), 99);
    h.wallet.set(ConnectionState::disconnected());
    advance(30_000).await;

    assert_eq!(h.reader.supply_calls(), supply_calls);
    assert_eq!(h.controller.view().await, before);
    assert!(!h.controller.is_mounted().await);
}

#[tokio::test(start_paused = true)]
async fn write_completing_after_unmount_is_discarded() {
    let (writer, gate) = TestWriter::succeeding().gated();
    let h = harness(
        TestWallet::approving(owner(4)),
        TestReader::with_supply(1_000),
        writer,
    );

    h.controller.mount().await;
    settle().await;
    h.controller.mint(10).await.expect("mint accepted");
    settle().await;

    h.controller.unmount().await;
    gate.notify_one();
    advance(10_000).await;

    assert_eq!(h.controller.mint_state().await, MintRequestState::Pending);
    assert!(h.host.acknowledgements().is_empty());
}

#[tokio::test(start_paused = true)]
async fn rejects_quantities_outside_the_offered_set() {
    let h = harness(
        TestWallet::approving(owner(5)),
        TestReader::with_supply(1_000),
        TestWriter::succeeding(),
    );

    h.controller.mount().await;
    settle().await;

    for quantity in [0, 2, 5, 999, 3001] {
        assert_eq!(
            h.controller.mint(quantity).await,
            Err(MintRejected::InvalidQuantity { quantity })
        );
    }
    settle().await;

    assert!(h.writer.requests().is_empty());
    assert_eq!(h.controller.mint_state().await, MintRequestState::Idle);
}

#[tokio::test(start_paused = true)]
async fn mint_requires_mount_and_connection() {
    let h = harness(
        TestWallet::idle(),
        TestReader::with_supply(1_000),
        TestWriter::succeeding(),
    );

    assert_eq!(h.controller.mint(1).await, Err(MintRejected::NotMounted));

    h.controller.mount().await;
    settle().await;
    assert_eq!(h.controller.mint(1).await, Err(MintRejected::NotConnected));
    assert!(h.writer.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn second_mint_while_pending_is_rejected() {
    let (writer, gate) = TestWriter::succeeding().gated();
    let h = harness(
        TestWallet::approving(owner(6)),
        TestReader::with_supply(1_000),
        writer,
    );

    h.controller.mount().await;
    settle().await;
    h.controller.mint(1).await.expect("first mint");
    assert_eq!(
        h.controller.mint(100).await,
        Err(MintRejected::AlreadyPending)
    );
    assert!(!h.controller.view().await.mint_enabled);

    gate.notify_one();
    settle().await;
    assert_eq!(h.writer.requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn successful_mint_acknowledges_once_and_refreshes_three_times() {
    let (writer, gate) = TestWriter::succeeding().gated();
    let h = harness(
        TestWallet::approving(owner(8)),
        TestReader::with_supply(1_000).balance(owner(8), 0),
        writer,
    );
    let mut events = h.controller.subscribe_events();

    h.controller.mount().await;
    settle().await;
    assert_eq!(h.reader.balance_calls(), 1);
    assert_eq!(h.reader.supply_calls(), 1);
    let switches_before_mint = h.wallet.switch_calls().len();

    h.controller.mint(10).await.expect("mint accepted");
    assert_eq!(h.controller.mint_state().await, MintRequestState::Pending);
    assert_eq!(h.wallet.switch_calls().len(), switches_before_mint + 1);
    settle().await;

    let requests = h.writer.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].function, &MINT_QUANTITY);
    assert_eq!(requests[0].contract, h.controller.config().contract);
    assert_eq!(requests[0].quantity(), U256::from(10u64));
    assert_eq!(requests[0].value, U256::ZERO);

    h.reader
        .balances
        .lock()
        .expect("lock")
        .insert(owner(8), 10);
    gate.notify_one();
    settle().await;

    assert_eq!(h.controller.mint_state().await, MintRequestState::Success);
    assert_eq!(h.host.acknowledgements(), vec!["You minted your NFT!"]);
    assert_eq!(h.reader.balance_calls(), 2);
    assert_eq!(h.reader.supply_calls(), 2);

    advance(3_000).await;
    assert_eq!(h.reader.balance_calls(), 3);
    assert_eq!(h.reader.supply_calls(), 3);

    advance(2_000).await;
    assert_eq!(h.reader.balance_calls(), 4);
    assert_eq!(h.reader.supply_calls(), 4);

    let view = h.controller.view().await;
    assert_eq!(view.balance_label(), "You minted: x10");
    // The fixed-supply page keeps showing success until the next attempt.
    assert_eq!(view.mint_state, MintRequestState::Success);
    assert!(view.mint_enabled);

    let mut transitions = Vec::new();
    let mut acknowledgements = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            ControllerEvent::MintStateChanged(state) => transitions.push(state),
            ControllerEvent::MintAcknowledged(_) => acknowledgements += 1,
            _ => {}
        }
    }
    assert_eq!(
        transitions,
        vec![MintRequestState::Pending, MintRequestState::Success]
    );
    assert_eq!(acknowledgements, 1);
    assert_eq!(h.host.acknowledgements().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_mint_reenables_control_without_acknowledgement() {
    let h = harness(
        TestWallet::approving(owner(9)),
        TestReader::with_supply(1_000),
        TestWriter::reverting(),
    );
    let mut events = h.controller.subscribe_events();

    h.controller.mount().await;
    settle().await;
    h.controller.mint(1).await.expect("mint accepted");
    settle().await;

    let view = h.controller.view().await;
    assert!(matches!(view.mint_state, MintRequestState::Failed(_)));
    assert!(view.mint_enabled);
    assert!(h.host.acknowledgements().is_empty());

    let write_faults = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|event| {
            matches!(
                event,
                ControllerEvent::Degraded {
                    fault: FaultKind::Write,
                    ..
                }
            )
        })
        .count();
    assert_eq!(write_faults, 1);

    h.controller.mint(1).await.expect("retry accepted");
    assert_eq!(h.controller.mint_state().await, MintRequestState::Pending);
    settle().await;
    assert_eq!(h.writer.requests().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn rejected_chain_switch_fails_mint_before_submission() {
    let h = harness(
        TestWallet::approving(owner(10)).rejecting_switch(),
        TestReader::with_supply(1_000),
        TestWriter::succeeding(),
    );

    h.controller.mount().await;
    settle().await;
    h.controller.mint(1).await.expect("mint accepted");
    settle().await;

    assert!(h.writer.requests().is_empty());
    assert!(matches!(
        h.controller.mint_state().await,
        MintRequestState::Failed(reason) if reason.contains("chain switch")
    ));
    assert!(h.host.acknowledgements().is_empty());
}

#[tokio::test(start_paused = true)]
async fn free_mint_blocks_at_wallet_cap() {
    let h = harness_with(
        free_mint_config(),
        TestWallet::approving(owner(11)),
        TestReader::with_supply(50).balance(owner(11), 10),
        TestWriter::succeeding(),
    );

    h.controller.mount().await;
    settle().await;

    assert!(!h.controller.view().await.mint_enabled);
    assert_eq!(
        h.controller.mint(1).await,
        Err(MintRejected::WalletCapReached {
            balance: U256::from(10u64),
            cap: 10
        })
    );
    settle().await;
    assert!(h.writer.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn free_mint_needs_a_known_balance() {
    let mut reader = TestReader::with_supply(50);
    reader.fail_balance = true;
    let h = harness_with(
        free_mint_config(),
        TestWallet::approving(owner(12)),
        reader,
        TestWriter::succeeding(),
    );

    h.controller.mount().await;
    settle().await;

    assert_eq!(h.controller.mint(1).await, Err(MintRejected::BalanceUnknown));
    assert_eq!(
        h.controller.mint(10).await,
        Err(MintRejected::InvalidQuantity { quantity: 10 })
    );
    assert!(h.writer.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn free_mint_pays_price_and_returns_to_idle_after_balance_read() {
    let (writer, gate) = TestWriter::succeeding().gated();
    let h = harness_with(
        free_mint_config(),
        TestWallet::approving(owner(13)),
        TestReader::with_supply(50).balance(owner(13), 2),
        writer,
    );
    let mut events = h.controller.subscribe_events();

    h.controller.mount().await;
    settle().await;
    h.controller.mint(1).await.expect("mint accepted");
    settle().await;

    let requests = h.writer.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].function, &MINT_PAYABLE);
    assert_eq!(requests[0].value, U256::from(1_000u64));

    h.reader
        .balances
        .lock()
        .expect("lock")
        .insert(owner(13), 3);
    gate.notify_one();
    settle().await;

    let view = h.controller.view().await;
    assert_eq!(view.mint_state, MintRequestState::Idle);
    assert_eq!(view.balance_of, Some(U256::from(3u64)));
    assert!(view.mint_enabled);
    assert_eq!(h.host.acknowledgements().len(), 1);

    let transitions = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|event| match event {
            ControllerEvent::MintStateChanged(state) => Some(state),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(
        transitions,
        vec![
            MintRequestState::Pending,
            MintRequestState::Success,
            MintRequestState::Idle
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn embedded_frame_retries_connect_until_connected() {
    let h = harness(
        TestWallet::idle(),
        TestReader::with_supply(5),
        TestWriter::succeeding(),
    );

    h.controller.mount().await;
    advance(9_100).await;

    // Initial attempt plus one retry every 1.5s.
    assert_eq!(h.wallet.connect_count(), 7);

    h.wallet
        .set(ConnectionState::connected(owner(14), TARGET_CHAIN));
    settle().await;
    advance(6_000).await;

    assert_eq!(h.wallet.connect_count(), 7);
    assert_eq!(h.wallet.switch_calls(), vec![TARGET_CHAIN]);
}

#[tokio::test(start_paused = true)]
async fn standalone_page_connects_only_once() {
    let mut config = MintAppConfig::default();
    config.embedded_in_frame = false;
    let h = harness_with(
        config,
        TestWallet::idle(),
        TestReader::with_supply(5),
        TestWriter::succeeding(),
    );

    h.controller.mount().await;
    advance(10_000).await;

    assert_eq!(h.wallet.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_collaborators_degrade_without_panicking() {
    let controller = MintViewController::new(
        Arc::new(MintAppConfig::default()),
        Collaborators::missing(),
    );
    let mut events = controller.subscribe_events();

    controller.mount().await;
    settle().await;

    let view = controller.view().await;
    assert!(!view.is_connected);
    assert_eq!(view.total_supply, None);

    let faults = std::iter::from_fn(|| events.try_recv().ok())
        .filter_map(|event| match event {
            ControllerEvent::Degraded { fault, .. } => Some(fault),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert!(faults.contains(&FaultKind::Connection));
    assert!(faults.contains(&FaultKind::Read));

    controller.unmount().await;
}
