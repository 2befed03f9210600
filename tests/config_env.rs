// tests/config_env.rs
//
// DriverConfig layering: defaults -> HD_* env (injected lookup) -> TOML file.

mod common;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use common::unique_root;
use histdriver::{DeliveryPolicy, DriverConfig, FileConfig, RunMode};

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let m: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |k| m.get(k).cloned()
}

#[test]
fn defaults_are_standalone_with_local_store() -> Result<()> {
    let cfg = DriverConfig::from_lookup(lookup(&[]));
    assert_eq!(cfg.mode(), RunMode::Standalone);
    assert_eq!(cfg.effective_store_endpoint()?, "tcp://127.0.0.1:5555");
    assert_eq!(cfg.listen, "0.0.0.0:8080");
    assert!(!cfg.plaintext);
    assert!(cfg.tls_paths().is_err());
    assert_eq!(cfg.static_dir, PathBuf::from("./static"));
    assert_eq!(cfg.max_items, 10);
    assert_eq!(cfg.fetch_program, "youtube-dl");

    let opts = cfg.loop_options();
    assert_eq!(opts.interval, Duration::from_secs(30));
    assert_eq!(opts.policy, DeliveryPolicy::Retry);
    assert_eq!(opts.max_pending, 1000);

    let ds = cfg.datasource();
    assert_eq!(ds.datasource_id, "YoutubeHistory");
    assert_eq!(ds.datasource_type, "videoData");
    assert_eq!(ds.content_type, "application/json");
    assert_eq!(ds.vendor, "histdriver");
    Ok(())
}

#[test]
fn production_requires_explicit_store() -> Result<()> {
    let cfg = DriverConfig::from_lookup(lookup(&[("HD_PLATFORM_VERSION", "0.5.2")]));
    assert_eq!(cfg.mode(), RunMode::Production);
    assert!(cfg.effective_store_endpoint().is_err());

    let cfg = DriverConfig::from_lookup(lookup(&[
        ("HD_PLATFORM_VERSION", "0.5.2"),
        ("HD_STORE_ENDPOINT", "tcp://store:5555"),
    ]));
    assert_eq!(cfg.effective_store_endpoint()?, "tcp://store:5555");

    // blank version counts as unset
    let cfg = DriverConfig::from_lookup(lookup(&[("HD_PLATFORM_VERSION", "  ")]));
    assert_eq!(cfg.mode(), RunMode::Standalone);
    Ok(())
}

#[test]
fn env_overrides_and_bad_values_are_ignored() -> Result<()> {
    let cfg = DriverConfig::from_lookup(lookup(&[
        ("HD_LISTEN", "127.0.0.1:9443"),
        ("HD_HTTP_PLAINTEXT", "true"),
        ("HD_HTTPS_CREDENTIALS", "/etc/hd/combined.pem"),
        ("HD_TLS_KEY", "/etc/hd/key.pem"),
        ("HD_POLL_INTERVAL_SECS", "5"),
        ("HD_MAX_ITEMS", "not-a-number"),
        ("HD_DELIVERY", "best-effort"),
        ("HD_MAX_PENDING", "7"),
        ("HD_DATASOURCE_ID", "History2"),
    ]));
    assert_eq!(cfg.listen, "127.0.0.1:9443");
    assert!(cfg.plaintext);
    let (cert, key) = cfg.tls_paths()?;
    assert_eq!(cert, PathBuf::from("/etc/hd/combined.pem"));
    assert_eq!(key, PathBuf::from("/etc/hd/key.pem"));
    assert_eq!(cfg.poll_interval_secs, 5);
    assert_eq!(cfg.max_items, 10);
    assert_eq!(cfg.delivery, DeliveryPolicy::BestEffort);
    assert_eq!(cfg.max_pending, 7);
    assert_eq!(cfg.datasource().datasource_id, "History2");
    Ok(())
}

#[test]
fn unknown_delivery_policy_keeps_retry() -> Result<()> {
    let cfg = DriverConfig::from_lookup(lookup(&[
        ("HD_DELIVERY", "sometimes"),
        ("HD_MAX_PENDING", " 12 "),
        ("HD_FETCH_PROGRAM", "/opt/dl/youtube-dl"),
    ]));
    assert_eq!(cfg.delivery, DeliveryPolicy::Retry);
    assert_eq!(cfg.max_pending, 12);
    assert_eq!(cfg.command_provider().program(), "/opt/dl/youtube-dl");
    assert_eq!(cfg.loop_options().policy, DeliveryPolicy::Retry);
    Ok(())
}

#[test]
fn toml_file_overrides_env() -> Result<()> {
    let root = unique_root("cfg");
    std::fs::create_dir_all(&root)?;
    let path = root.join("histdriver.toml");
    std::fs::write(
        &path,
        r#"
listen = "127.0.0.1:8443"
store_endpoint = "file:///var/lib/hd/store.jsonl"
poll_interval_secs = 60
delivery = "retry"
"#,
    )?;

    let env = DriverConfig::from_lookup(lookup(&[
        ("HD_LISTEN", "0.0.0.0:1"),
        ("HD_DELIVERY", "best-effort"),
        ("HD_MAX_ITEMS", "25"),
    ]));
    let cfg = env.apply_file(FileConfig::load(&path)?)?;
    assert_eq!(cfg.listen, "127.0.0.1:8443");
    assert_eq!(cfg.effective_store_endpoint()?, "file:///var/lib/hd/store.jsonl");
    assert_eq!(cfg.poll_interval_secs, 60);
    assert_eq!(cfg.delivery, DeliveryPolicy::Retry);
    assert_eq!(cfg.max_items, 25);

    // unknown keys and bad enum values are rejected
    std::fs::write(&path, "listne = \"x\"\n")?;
    assert!(FileConfig::load(&path).is_err());
    std::fs::write(&path, "delivery = \"sometimes\"\n")?;
    let f = FileConfig::load(&path)?;
    assert!(DriverConfig::default().apply_file(f).is_err());
    Ok(())
}

#[test]
fn builder_setters_win() {
    let cfg = DriverConfig::from_lookup(lookup(&[("HD_LISTEN", "0.0.0.0:1")]))
        .with_listen("127.0.0.1:2")
        .with_plaintext(true)
        .with_max_items(3)
        .with_delivery(DeliveryPolicy::BestEffort);
    assert_eq!(cfg.listen, "127.0.0.1:2");
    assert!(cfg.plaintext);
    assert_eq!(cfg.command_provider().args(&histdriver::Credentials::new("u", "p"))[7], "1-3");
    assert!(cfg.to_string().contains("delivery: best-effort"));
}
