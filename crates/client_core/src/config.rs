use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use shared::protocol::{AppMetadata, ProviderConfig};
use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "wallet.toml";
pub const DEFAULT_RELAY_URL: &str = "wss://relay.walletconnect.com";
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub project_id: String,
    pub relay_url: String,
    pub metadata: AppMetadata,
    /// Link the wallet uses to return to this app once a session settles.
    pub app_link: String,
    pub wallet_name: String,
    pub wallet_scheme: String,
    /// Pause between foregrounding the wallet and sending it a request.
    pub settle_delay: Duration,
    /// `None` leaves the approval wait unbounded.
    pub approval_timeout: Option<Duration>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            relay_url: DEFAULT_RELAY_URL.into(),
            metadata: AppMetadata {
                name: "Wallet connect Test".into(),
                description: "Test app for connecting to Argent Mobile".into(),
                url: "https://walletconnect.com/".into(),
                icons: vec!["https://avatars.githubusercontent.com/u/37784886".into()],
            },
            app_link: "starknetrntest://wc".into(),
            wallet_name: "Argent".into(),
            wallet_scheme: "argent-dev".into(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            approval_timeout: None,
        }
    }
}

impl Settings {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            project_id: self.project_id.clone(),
            relay_url: self.relay_url.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    project_id: Option<String>,
    relay_url: Option<String>,
    app_name: Option<String>,
    app_description: Option<String>,
    app_url: Option<String>,
    app_icons: Option<Vec<String>>,
    app_link: Option<String>,
    wallet_name: Option<String>,
    wallet_scheme: Option<String>,
    settle_delay_ms: Option<u64>,
    approval_timeout_secs: Option<u64>,
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then `path` if it exists and parses, then the environment.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
            Err(err) => warn!(path = %path.display(), error = %err, "ignoring unreadable settings file"),
        }
    }

    apply_env_overrides(&mut settings, env);
    settings
}

fn apply_file_settings(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.project_id {
        settings.project_id = v;
    }
    if let Some(v) = file_cfg.relay_url {
        settings.relay_url = v;
    }
    if let Some(v) = file_cfg.app_name {
        settings.metadata.name = v;
    }
    if let Some(v) = file_cfg.app_description {
        settings.metadata.description = v;
    }
    if let Some(v) = file_cfg.app_url {
        settings.metadata.url = v;
    }
    if let Some(v) = file_cfg.app_icons {
        settings.metadata.icons = v;
    }
    if let Some(v) = file_cfg.app_link {
        settings.app_link = v;
    }
    if let Some(v) = file_cfg.wallet_name {
        settings.wallet_name = v;
    }
    if let Some(v) = file_cfg.wallet_scheme {
        settings.wallet_scheme = v;
    }
    if let Some(v) = file_cfg.settle_delay_ms {
        settings.settle_delay = Duration::from_millis(v);
    }
    if let Some(v) = file_cfg.approval_timeout_secs {
        settings.approval_timeout = Some(Duration::from_secs(v));
    }
}

fn apply_env_overrides(settings: &mut Settings, env: impl Fn(&str) -> Option<String>) {
    if let Some(v) = env("WALLETCONNECT_PROJECT_ID") {
        settings.project_id = v;
    }
    if let Some(v) = env("APP__PROJECT_ID") {
        settings.project_id = v;
    }

    if let Some(v) = env("APP__RELAY_URL") {
        settings.relay_url = v;
    }

    if let Some(v) = env("APP__WALLET_SCHEME") {
        settings.wallet_scheme = v;
    }

    if let Some(v) = env("APP__SETTLE_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.settle_delay = Duration::from_millis(parsed);
        }
    }

    if let Some(v) = env("APP__APPROVAL_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.approval_timeout = (parsed > 0).then(|| Duration::from_secs(parsed));
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
