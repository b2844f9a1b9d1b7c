use notifier::config::{ConfigError, ConfigLoader, EventSourceKind};
use notifier::models::ChannelType;
use std::{
    env, fs,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    let keys: Vec<String> = env::vars()
        .map(|(key, _)| key)
        .filter(|key| key.starts_with("NOTIFIER_"))
        .collect();
    for key in keys {
        unsafe {
            env::remove_var(key);
        }
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

fn loader(dir: &TempDir) -> ConfigLoader {
    ConfigLoader::with_base_dir(dir.path().to_path_buf())
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();
    let dir = TempDir::new().unwrap();

    let cfg = loader(&dir).load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "local");
    assert_eq!(cfg.api_bind_addr, "0.0.0.0:8080");
    assert_eq!(cfg.log_level, "info");
    assert!(cfg.api_tokens.is_empty());
    assert!(!cfg.multitenancy_enabled);
    assert_eq!(cfg.event_source, EventSourceKind::Static);
    assert!(cfg.events.contains_key("user.registered"));
    assert_eq!(cfg.rate_limiting.max_per_minute, 60);
    assert_eq!(cfg.analytics.retention_days, 90);
    assert_eq!(cfg.preferences.default_channels, vec![ChannelType::Email]);
    cfg.bind_addr().expect("default bind addr parses");
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();
    let dir = TempDir::new().unwrap();

    write_env_file(&dir, ".env", "NOTIFIER_API_BIND_ADDR=127.0.0.1:3000\nNOTIFIER_APP_NAME=Base\n");
    // Profile is selected by .env.local before profile-specific files load
    write_env_file(
        &dir,
        ".env.local",
        "NOTIFIER_PROFILE=test\nNOTIFIER_API_BIND_ADDR=127.0.0.1:4000\n",
    );
    write_env_file(&dir, ".env.test", "NOTIFIER_API_BIND_ADDR=192.168.0.10:5000\n");
    write_env_file(
        &dir,
        ".env.test.local",
        "NOTIFIER_API_BIND_ADDR=10.0.0.5:6000\nNOTIFIER_RATE_LIMIT_MAX_PER_MINUTE=5\n",
    );

    let cfg = loader(&dir).load().expect("layered config loads");
    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.api_bind_addr, "10.0.0.5:6000");
    assert_eq!(cfg.app_name, "Base");
    assert_eq!(cfg.rate_limiting.max_per_minute, 5);

    // Process environment wins over every file
    unsafe {
        env::set_var("NOTIFIER_API_BIND_ADDR", "127.0.0.1:7000");
    }
    let cfg = loader(&dir).load().expect("env override loads");
    assert_eq!(cfg.api_bind_addr, "127.0.0.1:7000");
    clear_env();
}

#[test]
fn api_tokens_accept_single_and_list_forms() {
    let _guard = env_guard();
    clear_env();
    let dir = TempDir::new().unwrap();

    unsafe {
        env::set_var("NOTIFIER_API_TOKEN", "single");
    }
    assert_eq!(loader(&dir).load().unwrap().api_tokens, vec!["single"]);

    unsafe {
        env::set_var("NOTIFIER_API_TOKENS", "a, b,,c ");
    }
    assert_eq!(loader(&dir).load().unwrap().api_tokens, vec!["a", "b", "c"]);
    clear_env();
}

#[test]
fn non_local_profiles_require_api_tokens() {
    let _guard = env_guard();
    clear_env();
    let dir = TempDir::new().unwrap();
    write_env_file(&dir, ".env", "NOTIFIER_PROFILE=production\n");

    let err = loader(&dir).load().unwrap_err();
    assert!(matches!(err, ConfigError::MissingApiTokens));

    write_env_file(
        &dir,
        ".env.production",
        "NOTIFIER_API_TOKENS=prod-token\nNOTIFIER_APP_URL=https://notify.example.com\n",
    );
    let cfg = loader(&dir).load().expect("tokens satisfy validation");
    assert_eq!(cfg.profile, "production");
    assert_eq!(cfg.app_url, "https://notify.example.com");
    clear_env();
}

#[test]
fn channel_lists_and_event_maps_are_parsed() {
    let _guard = env_guard();
    clear_env();
    let dir = TempDir::new().unwrap();
    write_env_file(
        &dir,
        ".env",
        concat!(
            "NOTIFIER_ENABLED_CHANNELS=email,slack,email\n",
            "NOTIFIER_PREFERENCES_DEFAULT_CHANNELS=slack\n",
            "NOTIFIER_MULTITENANCY_ENABLED=yes\n",
            "NOTIFIER_EVENT_SOURCE=database\n",
            "NOTIFIER_EVENTS='{\"order.shipped\": {\"name\": \"Order Shipped\", \"group\": \"Orders\"}}'\n",
        ),
    );

    let cfg = loader(&dir).load().expect("config loads");
    assert_eq!(cfg.enabled_channels, vec![ChannelType::Email, ChannelType::Slack]);
    assert_eq!(cfg.preferences.default_channels, vec![ChannelType::Slack]);
    assert!(cfg.multitenancy_enabled);
    assert_eq!(cfg.event_source, EventSourceKind::Database);
    assert_eq!(cfg.events.len(), 1);
    assert_eq!(cfg.events["order.shipped"].group, "Orders");
}

#[test]
fn invalid_values_are_rejected() {
    let _guard = env_guard();
    clear_env();

    let cases: [(&str, fn(&ConfigError) -> bool); 6] = [
        ("NOTIFIER_API_BIND_ADDR=not-an-addr", |err| {
            matches!(err, ConfigError::InvalidBindAddr { .. })
        }),
        ("NOTIFIER_QUEUE_CONCURRENCY=many", |err| {
            matches!(err, ConfigError::InvalidValue { key, .. } if key == "NOTIFIER_QUEUE_CONCURRENCY")
        }),
        ("NOTIFIER_RATE_LIMIT_ENABLED=maybe", |err| {
            matches!(err, ConfigError::InvalidValue { .. })
        }),
        ("NOTIFIER_ENABLED_CHANNELS=email,fax", |err| {
            matches!(err, ConfigError::InvalidChannelType { value } if value == "fax")
        }),
        ("NOTIFIER_ANALYTICS_RETENTION_DAYS=0", |err| {
            matches!(err, ConfigError::InvalidRetentionDays { value: 0 })
        }),
        ("NOTIFIER_QUEUE_BACKOFF_JITTER_FACTOR=1.5", |err| {
            matches!(err, ConfigError::InvalidBackoffJitter { .. })
        }),
    ];

    for (line, expected) in cases {
        let dir = TempDir::new().unwrap();
        write_env_file(&dir, ".env", &format!("{line}\n"));
        let err = loader(&dir).load().unwrap_err();
        assert!(expected(&err), "{line}: unexpected error {err}");
    }
}

#[test]
fn redacted_json_hides_secrets() {
    let _guard = env_guard();
    clear_env();
    let dir = TempDir::new().unwrap();
    write_env_file(
        &dir,
        ".env",
        "NOTIFIER_API_TOKENS=super-secret\nNOTIFIER_DATABASE_URL=postgresql://svc:hunter2@db:5432/notifier\n",
    );

    let json = loader(&dir).load().unwrap().redacted_json().unwrap();
    assert!(!json.contains("super-secret"));
    assert!(!json.contains("hunter2"));
    assert!(json.contains("[REDACTED]"));
}
