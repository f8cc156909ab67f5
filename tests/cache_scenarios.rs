//! End-to-end cache scenarios driven through the registry.
//!
//! Network engines are covered by their own live tests; everything here runs
//! offline against the Memory, File and Null engines.

use cachekv::{CacheConfig, CacheError, CacheRegistry, EngineKind, Value, DEFAULT_CACHE};
use std::collections::HashMap;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn registry_with(configs: Vec<(&str, CacheConfig)>) -> CacheRegistry {
    init_tracing();
    let configs: HashMap<String, CacheConfig> = configs
        .into_iter()
        .map(|(name, config)| (name.to_string(), config))
        .collect();
    CacheRegistry::with_configs(configs)
}

#[test]
fn memory_counter_lifecycle() {
    let registry = registry_with(vec![(DEFAULT_CACHE, CacheConfig::memory())]);
    let cache = registry.resolve(DEFAULT_CACHE).unwrap();

    assert!(cache.write("counter", 100));
    assert_eq!(cache.increment("counter", 1).unwrap(), 101);
    assert_eq!(cache.increment("counter", 9).unwrap(), 110);
    assert!(cache.clear());
    assert!(!cache.exists("counter"));
}

#[test]
fn file_entries_expire_lazily() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_with(vec![(
        "short",
        CacheConfig::file(dir.path()).with_duration("1 second"),
    )]);
    let cache = registry.resolve("short").unwrap();

    assert!(cache.write("k", "v"));
    assert_eq!(cache.read("k"), Some(Value::from("v")));
    assert!(cache.exists("k"));

    thread::sleep(Duration::from_millis(1500));

    assert!(!cache.exists("k"));
    assert_eq!(cache.read("k"), None);
    // Expired entries stay on disk until overwritten or cleared
    assert!(dir.path().join("cache_k").exists());

    assert!(cache.write("k", "fresh"));
    assert_eq!(cache.read("k"), Some(Value::from("fresh")));
}

#[test]
fn round_trip_on_every_offline_engine() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_with(vec![
        ("memory", CacheConfig::memory()),
        ("file", CacheConfig::file(dir.path())),
    ]);

    let values = vec![
        Value::Bool(false),
        Value::Null,
        Value::Int(-7),
        Value::Float(2.5),
        Value::from("text"),
        Value::from(vec![Value::Int(1), Value::from("two")]),
    ];

    for name in ["memory", "file"] {
        let cache = registry.resolve(name).unwrap();
        for (i, value) in values.iter().enumerate() {
            let key = format!("value-{}", i);
            assert!(!cache.exists(&key), "{} {}", name, key);
            assert!(cache.write(&key, value.clone()), "{} {}", name, key);
            assert_eq!(cache.read(&key).as_ref(), Some(value), "{} {}", name, key);
            assert!(cache.delete(&key));
            assert!(!cache.delete(&key));
            assert!(!cache.exists(&key));
        }
    }
}

#[test]
fn file_rejects_empty_string_and_keeps_prior_entry() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_with(vec![(DEFAULT_CACHE, CacheConfig::file(dir.path()))]);
    let cache = registry.resolve(DEFAULT_CACHE).unwrap();

    assert!(cache.write("k", "kept"));
    assert!(!cache.write("k", ""));
    assert_eq!(cache.read("k"), Some(Value::from("kept")));
}

#[test]
fn counters_start_from_zero() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_with(vec![
        ("memory", CacheConfig::memory()),
        ("file", CacheConfig::file(dir.path())),
    ]);

    for name in ["memory", "file"] {
        assert_eq!(registry.increment(name, "up", 1).unwrap(), 1);
        assert_eq!(registry.increment(name, "up", 9).unwrap(), 10);
        assert_eq!(registry.decrement(name, "down", 1).unwrap(), -1);
        assert_eq!(registry.decrement(name, "down", 9).unwrap(), -10);
    }
}

#[test]
fn counter_on_text_value_fails() {
    let registry = registry_with(vec![(DEFAULT_CACHE, CacheConfig::memory())]);
    registry.write(DEFAULT_CACHE, "name", "alice").unwrap();

    assert!(matches!(
        registry.increment(DEFAULT_CACHE, "name", 1),
        Err(CacheError::NotAnInteger(_))
    ));
}

#[test]
fn clear_respects_prefixes_in_a_shared_directory() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_with(vec![
        ("users", CacheConfig::file(dir.path()).with_prefix("users_")),
        ("posts", CacheConfig::file(dir.path()).with_prefix("posts_")),
    ]);

    registry.write("users", "1", "alice").unwrap();
    registry.write("posts", "1", "hello").unwrap();

    assert!(registry.clear("users").unwrap());
    assert!(!registry.exists("users", "1").unwrap());
    assert_eq!(
        registry.read("posts", "1").unwrap(),
        Some(Value::from("hello"))
    );
}

#[test]
fn clear_respects_prefixes_in_memory() {
    let registry = registry_with(vec![
        ("a", CacheConfig::memory().with_prefix("a_")),
        ("b", CacheConfig::memory().with_prefix("b_")),
    ]);

    registry.write("a", "k", 1).unwrap();
    registry.write("b", "k", 2).unwrap();
    assert!(registry.clear("a").unwrap());
    assert_eq!(registry.read("b", "k").unwrap(), Some(Value::Int(2)));
}

#[test]
fn null_engine_never_stores() {
    let registry = registry_with(vec![(DEFAULT_CACHE, CacheConfig::null())]);
    let cache = registry.resolve(DEFAULT_CACHE).unwrap();

    assert!(cache.write("k", "v"));
    assert_eq!(cache.read("k"), None);
    assert!(!cache.exists("k"));
    assert!(cache.delete("k"));
    assert!(!cache.clear());
    assert_eq!(cache.increment("k", 1).unwrap(), 1);
    assert_eq!(cache.decrement("k", 1).unwrap(), -1);
}

#[test]
fn disable_hides_data_until_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_with(vec![
        (DEFAULT_CACHE, CacheConfig::memory()),
        ("file", CacheConfig::file(dir.path())),
    ]);
    registry.write(DEFAULT_CACHE, "k", "v").unwrap();
    registry.write("file", "k", "v").unwrap();

    registry.disable();
    assert_eq!(registry.read(DEFAULT_CACHE, "k").unwrap(), None);
    assert_eq!(registry.read("file", "k").unwrap(), None);
    assert_eq!(
        registry.resolve("never-configured").unwrap().kind(),
        EngineKind::Null
    );

    registry.enable();
    assert_eq!(
        registry.read(DEFAULT_CACHE, "k").unwrap(),
        Some(Value::from("v"))
    );
    assert_eq!(registry.read("file", "k").unwrap(), Some(Value::from("v")));
}

#[test]
fn shared_registry_across_threads() {
    let registry = registry_with(vec![(DEFAULT_CACHE, CacheConfig::memory())]);

    thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                for _ in 0..100 {
                    registry.increment(DEFAULT_CACHE, "hits", 1).unwrap();
                }
            });
        }
    });

    assert_eq!(
        registry.read(DEFAULT_CACHE, "hits").unwrap(),
        Some(Value::Int(800))
    );
    assert_eq!(registry.loaded_names(), vec![DEFAULT_CACHE.to_string()]);
}
