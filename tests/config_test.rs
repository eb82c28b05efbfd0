use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use admitq::config::Config;

// Tests in this file mutate the process environment.
static ENV_LOCK: Mutex<()> = Mutex::new(());

const VARS: &[&str] = &[
    "OTEL_ENDPOINT",
    "LOG_LEVEL",
    "ADMITQ_HTTP_ADDR",
    "ADMITQ_STALE_CLAIM_SECS",
    "ADMITQ_REAP_INTERVAL_SECS",
    "ADMITQ_STATS_PUSH_SECS",
    "ADMITQ_ADMISSION_WINDOW_SECS",
];

fn clear_env() {
    for var in VARS {
        unsafe { std::env::remove_var(var) };
    }
}

#[test]
fn config_defaults_without_env() {
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let config = Config::from_env().unwrap();
    assert_eq!(config.log_level, "info");
    assert!(config.otel_endpoint.is_none());
    assert_eq!(
        config.dashboard.bind_addr,
        "0.0.0.0:4001".parse::<SocketAddr>().unwrap()
    );
    assert_eq!(config.queue.stale_claim_timeout, Duration::from_secs(60));
    assert_eq!(config.queue.reap_interval, Duration::from_secs(30));
    assert_eq!(config.dashboard.stats_push_interval, Duration::from_secs(5));
    assert_eq!(config.queue.admission_window, Duration::from_secs(300));
}

#[test]
fn config_reads_overrides() {
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();
    unsafe {
        std::env::set_var("OTEL_ENDPOINT", "http://localhost:4317");
        std::env::set_var("LOG_LEVEL", "admitq=debug");
        std::env::set_var("ADMITQ_HTTP_ADDR", "127.0.0.1:9000");
        std::env::set_var("ADMITQ_STALE_CLAIM_SECS", "120");
        std::env::set_var("ADMITQ_REAP_INTERVAL_SECS", " 10 ");
        std::env::set_var("ADMITQ_ADMISSION_WINDOW_SECS", "45");
    }

    let config = Config::from_env().unwrap();
    assert_eq!(config.otel_endpoint.as_deref(), Some("http://localhost:4317"));
    assert_eq!(config.log_level, "admitq=debug");
    assert_eq!(config.dashboard.bind_addr.port(), 9000);
    assert_eq!(config.queue.stale_claim_timeout, Duration::from_secs(120));
    assert_eq!(config.queue.reap_interval, Duration::from_secs(10));
    assert_eq!(config.queue.admission_window, Duration::from_secs(45));

    clear_env();
}

#[test]
fn config_rejects_bad_values() {
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    unsafe { std::env::set_var("ADMITQ_STALE_CLAIM_SECS", "soon") };
    assert!(Config::from_env().is_err());

    unsafe { std::env::set_var("ADMITQ_STALE_CLAIM_SECS", "0") };
    assert!(Config::from_env().is_err());

    clear_env();
    unsafe { std::env::set_var("ADMITQ_HTTP_ADDR", "not-an-addr") };
    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("ADMITQ_HTTP_ADDR"));

    clear_env();
}
