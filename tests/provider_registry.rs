//! Integration tests: config file → registry → per-provider clients.

use std::sync::atomic::{AtomicU32, Ordering};

use hcso::{CacheBackendKind, HcsoConfig, HcsoError, ProviderRegistry};
use hcso_query::{CacheStatus, ClientResult, ProviderError, QueryDescriptor, QueryOutcome};
use serde_json::{Value, json};

fn write_config(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(&path, body).expect("write config");
    path
}

#[tokio::test]
async fn file_config_drives_file_cache() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cache_dir = dir.path().join("cache");
    let path = write_config(
        dir.path(),
        &format!(
            r#"
[cache]
backend = "file"
dir = "{}"

[defaults]
base_interval_ms = 0
jitter_ms = [0, 0]
"#,
            cache_dir.display()
        ),
    );

    let config = HcsoConfig::from_file(&path).expect("load");
    assert_eq!(config.cache.backend, CacheBackendKind::File);
    let registry = ProviderRegistry::from_config(&config).expect("registry");
    let client = registry.client("whois").expect("client");
    let descriptor = QueryDescriptor::new("whois.domain").param("domain", "example.com");
    let calls = AtomicU32::new(0);

    for expected in [CacheStatus::Miss, CacheStatus::Hit] {
        let outcome: QueryOutcome<Value> = client
            .query(&descriptor, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(json!({"registrar": "Example Registrar"})) }
            })
            .await;
        assert_eq!(outcome.cache, expected);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let files = std::fs::read_dir(&cache_dir).expect("cache dir").count();
    assert_eq!(files, 1);
}

#[tokio::test(start_paused = true)]
async fn provider_attempt_limit_comes_from_override() {
    let config: HcsoConfig = toml::from_str(
        r#"
[cache]
backend = "memory"

[defaults]
base_interval_ms = 0
jitter_ms = [0, 0]

[providers.shodan]
max_attempts = 2
"#,
    )
    .expect("parse");
    let registry = ProviderRegistry::from_config(&config).expect("registry");
    let shodan = registry.client("shodan").expect("client");
    let calls = AtomicU32::new(0);

    let outcome: QueryOutcome<Value> = shodan
        .query(&QueryDescriptor::new("shodan.host").param("ip", "192.0.2.1"), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::from_status(503, "Service Unavailable")) }
        })
        .await;

    assert!(matches!(
        outcome.result,
        ClientResult::Exhausted { attempts: 2, .. }
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(shodan.limiter().consecutive_failures().await, 2);

    let other = registry.client("nominatim").expect("client");
    assert_eq!(other.limiter().consecutive_failures().await, 0);
}

#[test]
fn strict_config_from_file_rejects_unlisted_provider() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_config(
        dir.path(),
        r#"
strict_providers = true

[cache]
backend = "memory"

[providers.nominatim]
calls_per_second = 1.0
"#,
    );
    let config = HcsoConfig::from_file(&path).expect("load");
    let registry = ProviderRegistry::from_config(&config).expect("registry");
    assert!(registry.client("nominatim").is_ok());
    assert!(matches!(
        registry.client("shodan"),
        Err(HcsoError::UnknownProvider(_))
    ));
}

#[test]
fn invalid_override_fails_registry_construction() {
    let config: HcsoConfig = toml::from_str(
        r#"
[providers.broken]
base_delay_ms = 5000
max_delay_ms = 10
"#,
    )
    .expect("parse");
    let err = ProviderRegistry::from_config(&config).unwrap_err();
    assert!(err.to_string().contains("[providers.broken]"));
}
