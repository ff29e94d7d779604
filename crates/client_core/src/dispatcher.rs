//! Invoke-transaction requests sent over the active session.

use std::sync::atomic::{AtomicBool, Ordering};

use shared::{
    domain::ChainId,
    protocol::{
        InvokeTransactionParams, InvokeTransactionResponse, RpcRequest, SessionRequest,
        METHOD_ADD_INVOKE_TRANSACTION,
    },
};
use tracing::{debug, error, info, warn};

use crate::{
    deep_link, transactions, ConnectionPhase, TransactionKind, WalletConnector,
    WalletError, STARKNET_SEPOLIA,
};

/// Clears the flag it was built over when dropped.
struct InProgressFlag<'a>(&'a AtomicBool);

impl<'a> InProgressFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for InProgressFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl WalletConnector {
    /// Requests the fixed two-call payload. Returns the transaction hash when
    /// the wallet reports one.
    pub async fn send_fixed_multi_call(&self) -> Result<Option<String>, WalletError> {
        self.dispatch(TransactionKind::FixedMultiCall, transactions::fixed_multi_call)
            .await
    }

    /// Requests a 1 wei ETH transfer from the connected account to itself.
    ///
    /// The in-progress flag is informational: it is never checked before a
    /// dispatch starts, so overlapping calls are all submitted.
    pub async fn send_self_transfer(&self) -> Result<Option<String>, WalletError> {
        let _in_progress = InProgressFlag::raise(&self.transfer_in_progress);
        self.dispatch(TransactionKind::SelfTransfer, transactions::eth_self_transfer)
            .await
    }

    async fn dispatch(
        &self,
        kind: TransactionKind,
        build: fn(&str) -> InvokeTransactionParams,
    ) -> Result<Option<String>, WalletError> {
        let (provider, topic, account) = {
            let mut guard = self.lock().await;
            let ready = match (&guard.phase, &guard.provider, &guard.session, &guard.account) {
                (ConnectionPhase::Connected, Some(provider), Some(session), Some(account)) => {
                    Some((provider.clone(), session.topic.clone(), account.clone()))
                }
                _ => None,
            };
            let Some(ready) = ready else {
                let err = WalletError::invalid_state(
                    "send a transaction",
                    guard.phase,
                    "Provider or account not initialized",
                );
                return Err(self.record_error(&mut guard, err));
            };
            guard.last_error = None;
            self.publish(&guard);
            ready
        };

        let params = build(&account);
        info!(
            kind = %kind,
            calls = params.execution_request.calls.len(),
            "requesting invoke transaction"
        );
        debug!(params = ?params, "invoke transaction params");

        let link = deep_link::foreground_link(&self.settings.wallet_scheme);
        match self.opener.open_url(&link).await {
            Ok(()) => debug!("opened wallet before transaction"),
            Err(err) => warn!(error = %format!("{err:#}"), "could not open wallet app"),
        }

        tokio::time::sleep(self.settings.settle_delay).await;

        let outcome = match serde_json::to_value(&params) {
            Ok(params) => {
                let request = SessionRequest {
                    topic: topic.clone(),
                    chain_id: ChainId::new(STARKNET_SEPOLIA),
                    request: RpcRequest {
                        method: METHOD_ADD_INVOKE_TRANSACTION.to_string(),
                        params,
                    },
                };
                match provider.request(request).await {
                    Ok(value) => {
                        InvokeTransactionResponse::from_value(value).map_err(|err| err.to_string())
                    }
                    Err(err) => Err(crate::error::describe(&err)),
                }
            }
            Err(err) => Err(err.to_string()),
        };

        let mut guard = self.lock().await;
        match outcome {
            Ok(InvokeTransactionResponse {
                transaction_hash: Some(hash),
            }) => {
                info!(kind = %kind, transaction_hash = %hash, "transaction submitted");
                if guard.active_topic() == Some(&topic) {
                    guard.transaction_hash = Some(hash.clone());
                    self.publish(&guard);
                }
                Ok(Some(hash))
            }
            Ok(InvokeTransactionResponse {
                transaction_hash: None,
            }) => {
                warn!(kind = %kind, "wallet response carried no transaction hash");
                Ok(None)
            }
            Err(message) => {
                error!(kind = %kind, error = %message, "transaction request failed");
                Err(self.record_error(&mut guard, WalletError::Transaction { kind, message }))
            }
        }
    }
}
