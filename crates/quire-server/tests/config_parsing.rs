use std::{env, fs};

use quire_cache::BackendKind;
use quire_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    // Create a temporary TOML configuration file
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("quire.toml");

    let toml_content = r#"
[cache]
backend = "level"
sweep_interval_secs = 30

[level]
path = "/var/lib/quire/cache"
map_size_mb = 128

[redis]
url = "redis://cache.internal:6380"
key_prefix = "quire:"
fallback_to_memory = false

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.cache.backend_kind().unwrap(), BackendKind::Level);
    assert_eq!(cfg.cache.sweep_interval_secs, 30);
    assert_eq!(cfg.level.map_size_mb, 128);
    assert_eq!(cfg.level.path.to_str(), Some("/var/lib/quire/cache"));
    assert_eq!(cfg.redis.key_prefix, "quire:");
    assert!(!cfg.redis.fallback_to_memory);
    assert_eq!(cfg.redis.pool_size, 10);
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");

    // 2) Env override should win over file
    unsafe {
        env::set_var("QUIRE__CACHE__BACKEND", "redis");
        env::set_var("QUIRE__REDIS__PASSWORD", "s3cret");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.cache.backend_kind().unwrap(), BackendKind::Redis);
    assert_eq!(
        cfg_env.redis.connection_url().unwrap(),
        "redis://:s3cret@cache.internal:6380"
    );
    // cleanup env vars
    unsafe {
        env::remove_var("QUIRE__CACHE__BACKEND");
        env::remove_var("QUIRE__REDIS__PASSWORD");
    }

    // 3) Unknown backend fails validation instead of falling back
    let bad = r#"
[cache]
backend = "memcached"
"#;
    fs::write(&path, bad).expect("write bad toml");
    let err = load_config(path.to_str()).expect_err("unknown backend should fail");
    assert!(err.contains("cache.backend"), "{err}");

    // 4) Zero sweep interval fails validation
    let bad = r#"
[cache]
sweep_interval_secs = 0
"#;
    fs::write(&path, bad).expect("write bad toml");
    assert!(load_config(path.to_str()).is_err());

    // 5) Missing file means defaults
    let missing = dir.path().join("absent.toml");
    let defaults = load_config(missing.to_str()).expect("defaults should be valid");
    assert_eq!(defaults.cache.backend_kind().unwrap(), BackendKind::Memory);
    assert_eq!(defaults.cache.sweep_interval_secs, 60);
}
