use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use anyhow::anyhow;
use futures::future::BoxFuture;
use pairing_integration::{
    DeepLinkOpener, PairingProvider, PairingProviderFactory, PendingConnection, ProviderEvent,
};
use shared::{
    domain::{ChainId, Session, SessionTopic, STARKNET_NAMESPACE},
    protocol::{
        ConnectParams, ProposeNamespace, SessionProperties, EVENT_ACCOUNTS_CHANGED,
        EVENT_CHAIN_CHANGED, METHOD_ACCOUNT, METHOD_ADD_INVOKE_TRANSACTION,
    },
};
use tokio::{
    sync::{broadcast, oneshot, Mutex, MutexGuard},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

pub mod config;
pub mod deep_link;
mod dispatcher;
pub mod error;
pub mod transactions;

pub use config::{load_settings, Settings};
pub use error::{TransactionKind, WalletError};

pub const STARKNET_SEPOLIA: &str = "starknet:SNSEPOLIA";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionPhase {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Connecting,
    Connected,
    Disconnecting,
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectorSnapshot {
    pub phase: ConnectionPhase,
    pub session: Option<Session>,
    pub account: Option<String>,
    pub pairing_uri: Option<String>,
    pub transaction_hash: Option<String>,
    pub last_error: Option<WalletError>,
    pub transfer_in_progress: bool,
}

impl ConnectorSnapshot {
    pub fn is_connecting(&self) -> bool {
        self.phase == ConnectionPhase::Connecting
    }
}

#[derive(Debug, Clone)]
pub enum ConnectorEvent {
    StateChanged(ConnectorSnapshot),
    Warning(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected { account: Option<String> },
    Cancelled,
}

enum ApprovalOutcome {
    Approved(Session),
    Failed(String),
    Cancelled,
}

#[derive(Default)]
struct ConnectorState {
    phase: ConnectionPhase,
    provider: Option<Arc<dyn PairingProvider>>,
    session: Option<Session>,
    account: Option<String>,
    pairing_uri: Option<String>,
    transaction_hash: Option<String>,
    last_error: Option<WalletError>,
    pending_cancel: Option<oneshot::Sender<()>>,
    connect_attempt: u64,
    /// Set when the transport drops the session while a disconnect is in flight.
    ended_remotely: bool,
}

impl ConnectorState {
    fn clear_session(&mut self) {
        self.session = None;
        self.account = None;
        self.pairing_uri = None;
        self.transaction_hash = None;
        self.ended_remotely = false;
    }

    fn reset_connect(&mut self) {
        self.phase = ConnectionPhase::Ready;
        self.pairing_uri = None;
        self.pending_cancel = None;
    }

    fn active_topic(&self) -> Option<&SessionTopic> {
        self.session.as_ref().map(|session| &session.topic)
    }

    fn is_current_attempt(&self, attempt: u64) -> bool {
        self.phase == ConnectionPhase::Connecting && self.connect_attempt == attempt
    }
}

/// Drives the pairing lifecycle against one provider handle:
/// initialize, connect, cancel, disconnect, and transaction dispatch.
pub struct WalletConnector {
    settings: Settings,
    factory: Arc<dyn PairingProviderFactory>,
    opener: Arc<dyn DeepLinkOpener>,
    inner: Mutex<ConnectorState>,
    transfer_in_progress: AtomicBool,
    events: broadcast::Sender<ConnectorEvent>,
}

impl WalletConnector {
    pub fn new(
        settings: Settings,
        factory: Arc<dyn PairingProviderFactory>,
        opener: Arc<dyn DeepLinkOpener>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            settings,
            factory,
            opener,
            inner: Mutex::new(ConnectorState::default()),
            transfer_in_progress: AtomicBool::new(false),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> ConnectorSnapshot {
        let guard = self.inner.lock().await;
        self.snapshot_of(&guard)
    }

    pub fn is_transfer_in_progress(&self) -> bool {
        self.transfer_in_progress.load(Ordering::SeqCst)
    }

    fn snapshot_of(&self, state: &ConnectorState) -> ConnectorSnapshot {
        ConnectorSnapshot {
            phase: state.phase,
            session: state.session.clone(),
            account: state.account.clone(),
            pairing_uri: state.pairing_uri.clone(),
            transaction_hash: state.transaction_hash.clone(),
            last_error: state.last_error.clone(),
            transfer_in_progress: self.is_transfer_in_progress(),
        }
    }

    fn publish(&self, state: &ConnectorState) {
        let _ = self
            .events
            .send(ConnectorEvent::StateChanged(self.snapshot_of(state)));
    }

    fn record_error(&self, state: &mut ConnectorState, err: WalletError) -> WalletError {
        state.last_error = Some(err.clone());
        self.publish(state);
        err
    }

    async fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.inner.lock().await
    }

    /// Brings up the provider handle and adopts a session it already holds.
    pub async fn initialize(&self) -> Result<(), WalletError> {
        {
            let mut guard = self.lock().await;
            if guard.phase != ConnectionPhase::Uninitialized {
                return Err(WalletError::invalid_state(
                    "initialize",
                    guard.phase,
                    "Provider is already initialized",
                ));
            }
            guard.phase = ConnectionPhase::Initializing;
            self.publish(&guard);
        }

        info!(relay_url = %self.settings.relay_url, "initializing provider");
        let provider = match self.factory.init(self.settings.provider_config()).await {
            Ok(provider) => provider,
            Err(err) => {
                error!(error = %format!("{err:#}"), "provider initialization failed");
                let mut guard = self.lock().await;
                guard.phase = ConnectionPhase::Uninitialized;
                return Err(
                    self.record_error(&mut guard, WalletError::Initialization(error::describe(&err)))
                );
            }
        };

        let existing = provider.sessions().await;
        let adopted = existing.into_iter().next().map(|session| {
            info!(topic = %session.topic, "found active session");
            let account = self.session_account(&session);
            (session, account)
        });

        let mut guard = self.lock().await;
        guard.provider = Some(provider);
        match adopted {
            Some((session, account)) => {
                guard.session = Some(session);
                guard.account = account;
                guard.phase = ConnectionPhase::Connected;
            }
            None => guard.phase = ConnectionPhase::Ready,
        }
        info!(phase = ?guard.phase, "provider initialized");
        self.publish(&guard);
        Ok(())
    }

    fn proposal(&self) -> ConnectParams {
        let mut required_namespaces = BTreeMap::new();
        required_namespaces.insert(
            STARKNET_NAMESPACE.to_string(),
            ProposeNamespace {
                chains: vec![ChainId::new(STARKNET_SEPOLIA)],
                methods: vec![
                    METHOD_ACCOUNT.to_string(),
                    METHOD_ADD_INVOKE_TRANSACTION.to_string(),
                ],
                events: vec![
                    EVENT_ACCOUNTS_CHANGED.to_string(),
                    EVENT_CHAIN_CHANGED.to_string(),
                ],
            },
        );

        let metadata = &self.settings.metadata;
        ConnectParams {
            required_namespaces,
            session_properties: Some(SessionProperties {
                url: self.settings.app_link.clone(),
                name: metadata.name.clone(),
                description: metadata.description.clone(),
                icons: metadata.icons.first().cloned().unwrap_or_default(),
            }),
        }
    }

    /// Address of the first `starknet` account, warning when there is none.
    fn session_account(&self, session: &Session) -> Option<String> {
        match session.first_account(STARKNET_NAMESPACE) {
            Some(Ok(account)) => {
                let chain_id = account.chain_id();
                if chain_id.as_str() != STARKNET_SEPOLIA {
                    warn!(topic = %session.topic, chain_id = %chain_id, "session account is on another chain");
                    let _ = self.events.send(ConnectorEvent::Warning(format!(
                        "Wallet account is on {chain_id}; requests target {STARKNET_SEPOLIA}"
                    )));
                }
                Some(account.address)
            }
            Some(Err(err)) => {
                warn!(topic = %session.topic, error = %err, "session account is unusable");
                let _ = self.events.send(ConnectorEvent::Warning(err.to_string()));
                None
            }
            None => {
                let namespaces: Vec<&String> = session.namespaces.keys().collect();
                warn!(
                    topic = %session.topic,
                    namespaces = ?namespaces,
                    "session established but no accounts found"
                );
                let _ = self.events.send(ConnectorEvent::Warning(
                    "Session established but no accounts found".to_string(),
                ));
                None
            }
        }
    }

    /// Proposes a session, hands the pairing URI to the wallet and waits for
    /// its answer. Only valid from [`ConnectionPhase::Ready`].
    pub async fn connect(&self) -> Result<ConnectOutcome, WalletError> {
        let (provider, attempt, cancel_rx) = {
            let mut guard = self.lock().await;
            let provider = match (guard.phase, guard.provider.clone()) {
                (ConnectionPhase::Ready, Some(provider)) => provider,
                (phase, None) => {
                    error!("provider is not initialized");
                    let err = WalletError::invalid_state(
                        "connect",
                        phase,
                        "Provider is not initialized",
                    );
                    return Err(self.record_error(&mut guard, err));
                }
                (phase, Some(_)) => {
                    let err = WalletError::invalid_state(
                        "connect",
                        phase,
                        "A session is already active or being negotiated",
                    );
                    return Err(self.record_error(&mut guard, err));
                }
            };

            let (cancel_tx, cancel_rx) = oneshot::channel();
            guard.connect_attempt += 1;
            guard.pending_cancel = Some(cancel_tx);
            guard.phase = ConnectionPhase::Connecting;
            guard.last_error = None;
            guard.pairing_uri = None;
            self.publish(&guard);
            (provider, guard.connect_attempt, cancel_rx)
        };

        info!(chain_id = STARKNET_SEPOLIA, "attempting to connect");
        let PendingConnection { uri, approval } = match provider.connect(self.proposal()).await {
            Ok(pending) => pending,
            Err(err) => {
                error!(error = %format!("{err:#}"), "session proposal failed");
                return self
                    .fail_connect(attempt, WalletError::Approval(error::describe(&err)))
                    .await;
            }
        };

        let Some(uri) = uri else {
            warn!("no URI available for wallet connection");
            let mut guard = self.lock().await;
            if !guard.is_current_attempt(attempt) {
                return Ok(ConnectOutcome::Cancelled);
            }
            guard.reset_connect();
            self.publish(&guard);
            return Err(WalletError::NoUri);
        };

        {
            let mut guard = self.lock().await;
            if !guard.is_current_attempt(attempt) {
                return Ok(ConnectOutcome::Cancelled);
            }
            debug!(uri = %uri, "pairing uri ready");
            guard.pairing_uri = Some(uri.clone());
            self.publish(&guard);
        }

        let ((), outcome) = tokio::join!(
            self.launch_wallet_for_pairing(&uri, attempt),
            self.wait_for_approval(approval, cancel_rx)
        );

        match outcome {
            ApprovalOutcome::Cancelled => Ok(ConnectOutcome::Cancelled),
            ApprovalOutcome::Failed(message) => {
                error!(error = %message, "connection error");
                self.fail_connect(attempt, WalletError::Approval(message)).await
            }
            ApprovalOutcome::Approved(session) => {
                let account = self.session_account(&session);
                let mut guard = self.lock().await;
                if !guard.is_current_attempt(attempt) {
                    warn!(topic = %session.topic, "approval arrived after the attempt was abandoned");
                    return Ok(ConnectOutcome::Cancelled);
                }
                info!(topic = %session.topic, account = ?account, "session approved");
                guard.session = Some(session);
                guard.account = account.clone();
                guard.pending_cancel = None;
                guard.phase = ConnectionPhase::Connected;
                self.publish(&guard);
                Ok(ConnectOutcome::Connected { account })
            }
        }
    }

    /// Ends a failed attempt. An attempt that was already cancelled reports
    /// `Cancelled` instead of the failure.
    async fn fail_connect(
        &self,
        attempt: u64,
        err: WalletError,
    ) -> Result<ConnectOutcome, WalletError> {
        let mut guard = self.lock().await;
        if !guard.is_current_attempt(attempt) {
            return Ok(ConnectOutcome::Cancelled);
        }
        guard.reset_connect();
        Err(self.record_error(&mut guard, err))
    }

    async fn launch_wallet_for_pairing(&self, uri: &str, attempt: u64) {
        let link = deep_link::pairing_link(&self.settings.wallet_scheme, uri);
        info!(link = %link, wallet = %self.settings.wallet_name, "opening wallet");

        if let Err(err) = self.opener.open_url(&link).await {
            error!(error = %format!("{err:#}"), "failed to open wallet");
            let mut guard = self.lock().await;
            if guard.is_current_attempt(attempt) {
                let launch_err = WalletError::WalletLaunch {
                    wallet: self.settings.wallet_name.clone(),
                };
                self.record_error(&mut guard, launch_err);
            }
        }
    }

    async fn wait_for_approval(
        &self,
        approval: BoxFuture<'static, anyhow::Result<Session>>,
        cancel_rx: oneshot::Receiver<()>,
    ) -> ApprovalOutcome {
        info!("waiting for wallet approval");
        let limit = self.settings.approval_timeout;
        let approval = async move {
            match limit {
                Some(limit) => tokio::time::timeout(limit, approval)
                    .await
                    .unwrap_or_else(|_| {
                        Err(anyhow!(
                            "wallet did not answer within {} seconds",
                            limit.as_secs()
                        ))
                    }),
                None => approval.await,
            }
        };

        tokio::select! {
            result = approval => match result {
                Ok(session) => ApprovalOutcome::Approved(session),
                Err(err) => ApprovalOutcome::Failed(error::describe(&err)),
            },
            _ = cancel_rx => ApprovalOutcome::Cancelled,
        }
    }

    /// Abandons the local approval wait. The proposal itself stays on the
    /// relay. Returns `false` and changes nothing unless a connect is pending.
    pub async fn cancel(&self) -> bool {
        let mut guard = self.lock().await;
        if guard.phase != ConnectionPhase::Connecting {
            return false;
        }

        if let Some(cancel_tx) = guard.pending_cancel.take() {
            let _ = cancel_tx.send(());
        }
        guard.phase = ConnectionPhase::Ready;
        guard.pairing_uri = None;
        info!("connection attempt cancelled");
        self.publish(&guard);
        true
    }

    /// Ends the active session. Local state is only cleared once the
    /// provider confirms; on failure the session stays as it was.
    pub async fn disconnect(&self) -> Result<(), WalletError> {
        let provider = {
            let mut guard = self.lock().await;
            let provider = match (guard.phase, guard.provider.clone()) {
                (ConnectionPhase::Connected, Some(provider)) if guard.session.is_some() => provider,
                (phase, _) => {
                    error!(phase = ?phase, "cannot disconnect: provider or session is not initialized");
                    return Err(WalletError::invalid_state(
                        "disconnect",
                        phase,
                        "Provider or session is not initialized",
                    ));
                }
            };
            guard.phase = ConnectionPhase::Disconnecting;
            guard.ended_remotely = false;
            self.publish(&guard);
            provider
        };

        info!("disconnecting session");
        match provider.disconnect().await {
            Ok(()) => {
                let mut guard = self.lock().await;
                guard.clear_session();
                guard.phase = ConnectionPhase::Ready;
                info!("successfully disconnected");
                self.publish(&guard);
                Ok(())
            }
            Err(err) => {
                error!(error = %format!("{err:#}"), "disconnect error");
                let mut guard = self.lock().await;
                if guard.phase == ConnectionPhase::Disconnecting {
                    if guard.ended_remotely {
                        info!("session already ended by the transport");
                        guard.clear_session();
                        guard.phase = ConnectionPhase::Ready;
                    } else {
                        guard.phase = ConnectionPhase::Connected;
                    }
                }
                Err(self.record_error(&mut guard, WalletError::Disconnect(error::describe(&err))))
            }
        }
    }

    /// Applies a session lifecycle notification coming from the provider.
    pub async fn apply_provider_event(&self, event: ProviderEvent) {
        let mut guard = self.lock().await;
        match event {
            ProviderEvent::SessionDeleted { topic } | ProviderEvent::SessionExpired { topic } => {
                if guard.active_topic() != Some(&topic) {
                    return;
                }
                match guard.phase {
                    ConnectionPhase::Connected => {}
                    ConnectionPhase::Disconnecting => {
                        debug!(topic = %topic, "session ended while disconnecting");
                        guard.ended_remotely = true;
                        return;
                    }
                    _ => return,
                }
                info!(topic = %topic, "session ended by the wallet or relay");
                guard.clear_session();
                guard.phase = ConnectionPhase::Ready;
                self.publish(&guard);
            }
            ProviderEvent::AccountsChanged { topic, accounts } => {
                if guard.active_topic() != Some(&topic) {
                    return;
                }
                let Some(session) = guard.session.as_mut() else {
                    return;
                };
                session
                    .namespaces
                    .entry(STARKNET_NAMESPACE.to_string())
                    .or_default()
                    .accounts = accounts;
                let account = session
                    .first_account(STARKNET_NAMESPACE)
                    .and_then(Result::ok)
                    .map(|account| account.address);
                info!(topic = %topic, account = ?account, "accounts changed");
                guard.account = account;
                self.publish(&guard);
            }
            ProviderEvent::ChainChanged { topic, chain_id } => {
                debug!(topic = %topic, chain_id = %chain_id, "wallet reported a chain change");
            }
        }
    }

    /// Forwards provider notifications into [`Self::apply_provider_event`]
    /// until the provider's event stream closes.
    pub async fn spawn_event_listener(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let provider = self.lock().await.provider.clone()?;
        let mut events = provider.subscribe_events();
        let connector = Arc::clone(self);

        Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => connector.apply_provider_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "provider event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
