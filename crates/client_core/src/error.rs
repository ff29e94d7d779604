use std::fmt;

use thiserror::Error;

use crate::ConnectionPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    FixedMultiCall,
    SelfTransfer,
}

impl TransactionKind {
    pub fn label(self) -> &'static str {
        match self {
            TransactionKind::FixedMultiCall => "Custom calldata transaction",
            TransactionKind::SelfTransfer => "ETH transfer",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Failures surfaced by the connector. Only the most recent one is kept in
/// [`crate::ConnectorSnapshot::last_error`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    #[error("Setup failed: {0}")]
    Initialization(String),
    #[error("No URI available for wallet connection")]
    NoUri,
    #[error("Connection failed: {0}")]
    Approval(String),
    #[error("Disconnect failed: {0}")]
    Disconnect(String),
    #[error("{kind} failed: {message}")]
    Transaction {
        kind: TransactionKind,
        message: String,
    },
    #[error("Failed to open {wallet} wallet. Please make sure it is installed.")]
    WalletLaunch { wallet: String },
    #[error("{message} (cannot {operation} while {phase:?})")]
    InvalidState {
        operation: &'static str,
        phase: ConnectionPhase,
        message: &'static str,
    },
}

impl WalletError {
    pub(crate) fn invalid_state(
        operation: &'static str,
        phase: ConnectionPhase,
        message: &'static str,
    ) -> Self {
        Self::InvalidState {
            operation,
            phase,
            message,
        }
    }

    /// Non-fatal errors leave the flow that raised them running.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, WalletError::NoUri | WalletError::WalletLaunch { .. })
    }
}

/// Renders an error chain the way it is shown to the user.
pub(crate) fn describe(err: &anyhow::Error) -> String {
    let message = format!("{err:#}");
    if message.trim().is_empty() {
        "Unknown error".to_string()
    } else {
        message
    }
}
