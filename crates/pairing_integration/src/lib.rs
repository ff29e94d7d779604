//! Contracts for the external pairing engine and the platform deep-link opener.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use futures::future::BoxFuture;
use shared::{
    domain::{Session, SessionTopic},
    protocol::{ConnectParams, ProviderConfig, SessionRequest},
};
use tokio::sync::broadcast;

pub mod loopback;

pub use loopback::{LoopbackBehavior, LoopbackOpener, LoopbackWallet, LoopbackWalletFactory};

/// An in-flight session proposal.
///
/// `uri` is what the wallet needs to pick up the proposal out of band. The
/// `approval` future resolves once the wallet answers; dropping it stops the
/// local wait only, the proposal stays live on the relay.
pub struct PendingConnection {
    pub uri: Option<String>,
    pub approval: BoxFuture<'static, anyhow::Result<Session>>,
}

impl fmt::Debug for PendingConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingConnection")
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    SessionDeleted {
        topic: SessionTopic,
    },
    SessionExpired {
        topic: SessionTopic,
    },
    AccountsChanged {
        topic: SessionTopic,
        accounts: Vec<String>,
    },
    ChainChanged {
        topic: SessionTopic,
        chain_id: String,
    },
}

#[async_trait]
pub trait PairingProvider: Send + Sync {
    /// Sessions the engine already holds, e.g. restored after a restart.
    async fn sessions(&self) -> Vec<Session>;
    async fn connect(&self, params: ConnectParams) -> anyhow::Result<PendingConnection>;
    async fn request(&self, request: SessionRequest) -> anyhow::Result<serde_json::Value>;
    async fn disconnect(&self) -> anyhow::Result<()>;
    fn subscribe_events(&self) -> broadcast::Receiver<ProviderEvent>;
}

#[async_trait]
pub trait PairingProviderFactory: Send + Sync {
    async fn init(&self, config: ProviderConfig) -> anyhow::Result<Arc<dyn PairingProvider>>;
}

#[async_trait]
pub trait DeepLinkOpener: Send + Sync {
    async fn open_url(&self, url: &str) -> anyhow::Result<()>;
}
