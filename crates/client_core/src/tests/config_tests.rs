use super::*;

use std::{
    collections::HashMap,
    env,
    time::{SystemTime, UNIX_EPOCH},
};

fn no_env(_: &str) -> Option<String> {
    None
}

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

fn temp_settings_file(contents: &str) -> std::path::PathBuf {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();
    let path = env::temp_dir().join(format!("starknet_wallet_settings_{suffix}.toml"));
    fs::write(&path, contents).expect("write settings");
    path
}

#[test]
fn defaults_match_demo_app() {
    let settings = Settings::default();
    assert_eq!(settings.relay_url, "wss://relay.walletconnect.com");
    assert_eq!(settings.project_id, "");
    assert_eq!(settings.wallet_scheme, "argent-dev");
    assert_eq!(settings.settle_delay, Duration::from_millis(1000));
    assert_eq!(settings.approval_timeout, None);
    assert_eq!(settings.metadata.icons.len(), 1);
}

#[test]
fn missing_file_and_env_yield_defaults() {
    let path = env::temp_dir().join("starknet_wallet_settings_does_not_exist.toml");
    assert_eq!(load_settings_from(&path, no_env), Settings::default());
}

#[test]
fn file_values_override_defaults() {
    let path = temp_settings_file(
        r#"
project_id = "file-project"
wallet_scheme = "argent"
settle_delay_ms = 250
approval_timeout_secs = 90
app_icons = ["https://example.com/icon.png"]
"#,
    );

    let settings = load_settings_from(&path, no_env);
    assert_eq!(settings.project_id, "file-project");
    assert_eq!(settings.wallet_scheme, "argent");
    assert_eq!(settings.settle_delay, Duration::from_millis(250));
    assert_eq!(settings.approval_timeout, Some(Duration::from_secs(90)));
    assert_eq!(settings.metadata.icons, vec!["https://example.com/icon.png"]);
    assert_eq!(settings.relay_url, DEFAULT_RELAY_URL);

    fs::remove_file(path).expect("cleanup");
}

#[test]
fn env_overrides_file() {
    let path = temp_settings_file("project_id = \"file-project\"\n");

    let settings = load_settings_from(
        &path,
        env_from(&[
            ("WALLETCONNECT_PROJECT_ID", "generic"),
            ("APP__PROJECT_ID", "specific"),
            ("APP__SETTLE_DELAY_MS", "5"),
        ]),
    );
    assert_eq!(settings.project_id, "specific");
    assert_eq!(settings.settle_delay, Duration::from_millis(5));

    fs::remove_file(path).expect("cleanup");
}

#[test]
fn malformed_numbers_in_env_are_ignored() {
    let path = env::temp_dir().join("starknet_wallet_settings_absent.toml");
    let settings = load_settings_from(
        &path,
        env_from(&[
            ("APP__SETTLE_DELAY_MS", "soon"),
            ("APP__APPROVAL_TIMEOUT_SECS", "-1"),
        ]),
    );
    assert_eq!(settings.settle_delay, DEFAULT_SETTLE_DELAY);
    assert_eq!(settings.approval_timeout, None);
}

#[test]
fn zero_approval_timeout_means_unbounded() {
    let path = env::temp_dir().join("starknet_wallet_settings_absent.toml");
    let settings = load_settings_from(&path, env_from(&[("APP__APPROVAL_TIMEOUT_SECS", "0")]));
    assert_eq!(settings.approval_timeout, None);
}

#[test]
fn unparsable_file_is_ignored() {
    let path = temp_settings_file("settle_delay_ms = \"not a number\"\n");
    assert_eq!(load_settings_from(&path, no_env), Settings::default());
    fs::remove_file(path).expect("cleanup");
}

#[test]
fn provider_config_carries_relay_and_metadata() {
    let settings = Settings {
        project_id: "abc".into(),
        ..Settings::default()
    };
    let config = settings.provider_config();
    assert_eq!(config.project_id, "abc");
    assert_eq!(config.relay_url, settings.relay_url);
    assert_eq!(config.metadata, settings.metadata);
}
