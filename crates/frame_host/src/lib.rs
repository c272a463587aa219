use async_trait::async_trait;
use tokio::sync::broadcast;

/// Notices the embedding frame host can observe from the mini-app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostNotice {
    Ready,
    Acknowledgement(String),
}

/// Handshake with the social client that embeds the app.
#[async_trait]
pub trait HostBridge: Send + Sync {
    /// Tells the host the first render is done so it can reveal the frame.
    async fn signal_ready(&self) -> anyhow::Result<()>;
}

/// Surface for the one user-facing message the app shows: a confirmed mint.
pub trait MintNotifier: Send + Sync {
    fn mint_succeeded(&self, message: &str);
}

pub struct MissingHostBridge;

#[async_trait]
impl HostBridge for MissingHostBridge {
    async fn signal_ready(&self) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("frame host bridge is unavailable"))
    }
}

pub struct SilentNotifier;

impl MintNotifier for SilentNotifier {
    fn mint_succeeded(&self, _message: &str) {}
}

/// Host stand-in for running outside a real frame: every notice is broadcast
/// to whoever subscribed (a console printer, a test).
pub struct BroadcastHost {
    notices: broadcast::Sender<HostNotice>,
}

impl BroadcastHost {
    pub fn new() -> Self {
        let (notices, _) = broadcast::channel(64);
        Self { notices }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HostNotice> {
        self.notices.subscribe()
    }
}

impl Default for BroadcastHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostBridge for BroadcastHost {
    async fn signal_ready(&self) -> anyhow::Result<()> {
        let _ = self.notices.send(HostNotice::Ready);
        Ok(())
    }
}

impl MintNotifier for BroadcastHost {
    fn mint_succeeded(&self, message: &str) {
        let _ = self
            .notices
            .send(HostNotice::Acknowledgement(message.to_string()));
    }
}
