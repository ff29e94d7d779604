use std::{sync::Arc, time::Duration};

use anyhow::Result;
use clap::{Parser, ValueEnum};
use client_core::{
    load_settings, ConnectOutcome, ConnectionPhase, ConnectorEvent, WalletConnector,
};
use pairing_integration::{LoopbackBehavior, LoopbackOpener, LoopbackWalletFactory};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Action {
    None,
    Transfer,
    MultiCall,
}

/// Runs one pairing flow against an in-process wallet.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, value_enum, default_value_t = Action::Transfer)]
    action: Action,
    /// Have the wallet reject the session proposal.
    #[arg(long)]
    reject: bool,
    /// Have the engine produce no pairing URI.
    #[arg(long)]
    no_uri: bool,
    /// Wallet answers with no starknet accounts.
    #[arg(long)]
    no_accounts: bool,
    #[arg(long, default_value_t = 250)]
    approval_delay_ms: u64,
    /// Overrides the configured settle delay.
    #[arg(long)]
    settle_delay_ms: Option<u64>,
    #[arg(long)]
    keep_session: bool,
    /// Wallet expires the session this long after approving it.
    #[arg(long)]
    session_ttl_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    let mut settings = load_settings();
    if let Some(ms) = args.settle_delay_ms {
        settings.settle_delay = Duration::from_millis(ms);
    }

    let mut behavior = LoopbackBehavior {
        approve: !args.reject,
        emit_uri: !args.no_uri,
        approval_delay: Duration::from_millis(args.approval_delay_ms),
        session_ttl: args.session_ttl_ms.map(Duration::from_millis),
        ..LoopbackBehavior::default()
    };
    if args.no_accounts {
        behavior.accounts.clear();
    }

    let connector = WalletConnector::new(
        settings,
        Arc::new(LoopbackWalletFactory::new(behavior)),
        Arc::new(LoopbackOpener::default()),
    );

    let mut events = connector.subscribe_events();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ConnectorEvent::StateChanged(snapshot) => println!(
                    "[{:?}] account={} uri={} tx={} error={}",
                    snapshot.phase,
                    snapshot.account.as_deref().unwrap_or("-"),
                    snapshot.pairing_uri.as_deref().unwrap_or("-"),
                    snapshot.transaction_hash.as_deref().unwrap_or("-"),
                    snapshot
                        .last_error
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "-".to_string()),
                ),
                ConnectorEvent::Warning(message) => println!("warning: {message}"),
            }
        }
    });

    connector.initialize().await?;
    let listener = connector.spawn_event_listener().await;

    if connector.snapshot().await.session.is_none() {
        match connector.connect().await {
            Ok(ConnectOutcome::Connected { account }) => {
                info!(account = ?account, "connected");
            }
            Ok(ConnectOutcome::Cancelled) => info!("connection cancelled"),
            Err(err) => warn!(error = %err, "connect did not complete"),
        }
    }

    let snapshot = connector.snapshot().await;
    if snapshot.session.is_some() {
        let sent = match args.action {
            Action::None => None,
            Action::Transfer => Some(connector.send_self_transfer().await),
            Action::MultiCall => Some(connector.send_fixed_multi_call().await),
        };
        match sent {
            Some(Ok(Some(hash))) => println!("transaction hash: {hash}"),
            Some(Ok(None)) => println!("wallet returned no transaction hash"),
            Some(Err(err)) => warn!(error = %err, "transaction did not complete"),
            None => {}
        }

        if let Some(ttl) = args.session_ttl_ms {
            let expired = tokio::time::timeout(Duration::from_millis(ttl + 1000), async {
                while connector.snapshot().await.phase == ConnectionPhase::Connected {
                    tokio::time::sleep(Duration::from_millis(25)).await;
                }
            })
            .await;
            match expired {
                Ok(()) => info!("wallet ended the session"),
                Err(_) => warn!(ttl_ms = ttl, "session outlived its expected lifetime"),
            }
        }

        if !args.keep_session && connector.snapshot().await.session.is_some() {
            if let Err(err) = connector.disconnect().await {
                warn!(error = %err, "disconnect did not complete");
            }
        }
    }

    let final_state = connector.snapshot().await;
    println!(
        "{}",
        serde_json::json!({
            "phase": format!("{:?}", final_state.phase),
            "account": final_state.account,
            "transaction_hash": final_state.transaction_hash,
            "last_error": final_state.last_error.map(|err| err.to_string()),
        })
    );

    if let Some(listener) = listener {
        listener.abort();
        let _ = listener.await;
    }
    drop(connector);
    let _ = printer.await;
    Ok(())
}
