//! In-process stand-in for a wallet reached over the relay.
//!
//! Proposals are answered locally after a configurable delay, so flows can be
//! exercised without a relay or a phone.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::json;
use shared::{
    domain::{Session, SessionTopic, SettledNamespace},
    protocol::{ConnectParams, ProviderConfig, SessionRequest},
};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::{
    DeepLinkOpener, PairingProvider, PairingProviderFactory, PendingConnection, ProviderEvent,
};

#[derive(Debug, Clone)]
pub struct LoopbackBehavior {
    pub approve: bool,
    pub emit_uri: bool,
    pub accounts: Vec<String>,
    pub approval_delay: Duration,
    /// Lifetime of an approved session; `None` keeps it until disconnect.
    pub session_ttl: Option<Duration>,
}

impl Default for LoopbackBehavior {
    fn default() -> Self {
        Self {
            approve: true,
            emit_uri: true,
            accounts: vec![
                "starknet:SNSEPOLIA:0x0127fd5f1fe78a71f8bcd1fec63e3fe2f0486b6ecd5c86a0466c3a21fa5cfcec"
                    .to_string(),
            ],
            approval_delay: Duration::from_millis(250),
            session_ttl: None,
        }
    }
}

pub struct LoopbackWalletFactory {
    behavior: LoopbackBehavior,
}

impl LoopbackWalletFactory {
    pub fn new(behavior: LoopbackBehavior) -> Self {
        Self { behavior }
    }
}

#[async_trait]
impl PairingProviderFactory for LoopbackWalletFactory {
    async fn init(&self, config: ProviderConfig) -> anyhow::Result<Arc<dyn PairingProvider>> {
        if !(config.relay_url.starts_with("wss://") || config.relay_url.starts_with("ws://")) {
            bail!("relay url '{}' is not a websocket url", config.relay_url);
        }
        if config.metadata.name.trim().is_empty() {
            bail!("app metadata must carry a name");
        }
        if config.project_id.is_empty() {
            warn!("no project id configured; a real relay would refuse this client");
        }

        info!(relay_url = %config.relay_url, app = %config.metadata.name, "loopback wallet ready");
        Ok(Arc::new(LoopbackWallet::new(self.behavior.clone())))
    }
}

pub struct LoopbackWallet {
    behavior: LoopbackBehavior,
    sessions: Arc<Mutex<BTreeMap<SessionTopic, Session>>>,
    submitted: AtomicU64,
    next_id: AtomicU64,
    events: broadcast::Sender<ProviderEvent>,
}

impl LoopbackWallet {
    pub fn new(behavior: LoopbackBehavior) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            behavior,
            sessions: Arc::new(Mutex::new(BTreeMap::new())),
            submitted: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
            events,
        }
    }
}

/// Drops the session on the wallet side once `ttl` has passed.
async fn expire_after(
    ttl: Duration,
    topic: SessionTopic,
    sessions: Arc<Mutex<BTreeMap<SessionTopic, Session>>>,
    events: broadcast::Sender<ProviderEvent>,
) {
    tokio::time::sleep(ttl).await;
    if sessions.lock().await.remove(&topic).is_some() {
        info!(topic = %topic, "loopback session expired");
        let _ = events.send(ProviderEvent::SessionExpired { topic });
    }
}

#[async_trait]
impl PairingProvider for LoopbackWallet {
    async fn sessions(&self) -> Vec<Session> {
        self.sessions.lock().await.values().cloned().collect()
    }

    async fn connect(&self, params: ConnectParams) -> anyhow::Result<PendingConnection> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let topic = SessionTopic(format!("{id:064x}"));

        let uri = self.behavior.emit_uri.then(|| {
            format!(
                "wc:{}@2?relay-protocol=irn&symKey={:064x}",
                topic,
                id.wrapping_mul(0x9e37_79b9_7f4a_7c15)
            )
        });

        let behavior = self.behavior.clone();
        let sessions = Arc::clone(&self.sessions);
        let events = self.events.clone();
        let approval = async move {
            tokio::time::sleep(behavior.approval_delay).await;
            if !behavior.approve {
                return Err(anyhow!("user rejected the session proposal"));
            }

            let namespaces = params
                .required_namespaces
                .iter()
                .map(|(name, proposed)| {
                    let prefix = format!("{name}:");
                    let settled = SettledNamespace {
                        accounts: behavior
                            .accounts
                            .iter()
                            .filter(|account| account.starts_with(&prefix))
                            .cloned()
                            .collect(),
                        methods: proposed.methods.clone(),
                        events: proposed.events.clone(),
                    };
                    (name.clone(), settled)
                })
                .collect();

            let session = Session { topic, namespaces };
            sessions
                .lock()
                .await
                .insert(session.topic.clone(), session.clone());
            if let Some(ttl) = behavior.session_ttl {
                tokio::spawn(expire_after(ttl, session.topic.clone(), sessions, events));
            }
            Ok(session)
        }
        .boxed();

        Ok(PendingConnection { uri, approval })
    }

    async fn request(&self, request: SessionRequest) -> anyhow::Result<serde_json::Value> {
        if !self.sessions.lock().await.contains_key(&request.topic) {
            bail!("no session matches topic {}", request.topic);
        }

        let count = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        info!(topic = %request.topic, method = %request.request.method, "wallet accepted request");
        Ok(json!({ "transaction_hash": format!("0x{count:063x}") }))
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        let removed = std::mem::take(&mut *self.sessions.lock().await);
        if removed.is_empty() {
            bail!("no active session to disconnect");
        }
        for topic in removed.into_keys() {
            let _ = self.events.send(ProviderEvent::SessionDeleted { topic });
        }
        Ok(())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}

/// Deep-link opener that records URLs instead of handing them to a platform.
#[derive(Default)]
pub struct LoopbackOpener {
    fail: bool,
    opened: Mutex<Vec<String>>,
}

impl LoopbackOpener {
    pub fn failing() -> Self {
        Self {
            fail: true,
            opened: Mutex::new(Vec::new()),
        }
    }

    pub async fn opened(&self) -> Vec<String> {
        self.opened.lock().await.clone()
    }
}

#[async_trait]
impl DeepLinkOpener for LoopbackOpener {
    async fn open_url(&self, url: &str) -> anyhow::Result<()> {
        self.opened.lock().await.push(url.to_string());
        if self.fail {
            bail!("no application registered for {url}");
        }
        info!(url, "opened wallet link");
        Ok(())
    }
}
