#[path = "common/mod.rs"]
mod common;

use common::EnvGuard;
use once_cell::sync::Lazy;
use std::sync::Mutex;

use hookd::build_state_from_env;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[test]
fn builds_state_with_overrides() {
    let _lock = ENV_MUTEX.lock().unwrap();
    let mut env = EnvGuard::new();
    env.remove("HOOKD_DEFAULTS");
    env.remove("HOOKD_KUBE_TOKEN_FILE");
    env.set("HOOKD_WEBHOOK_SECRET", "s3cret");
    env.set("HOOKD_TRIGGER_PHRASE", "@agent");
    env.set("HOOKD_NAMESPACE", "agents");
    env.set("HOOKD_KUBE_API_URL", "https://kube.test:6443");
    env.set("HOOKD_KUBE_TOKEN", "tok");

    let state = build_state_from_env().unwrap();
    assert_eq!(state.config.webhook_secret.as_deref(), Some("s3cret"));
    assert_eq!(state.config.trigger_phrase, "@agent");
    assert_eq!(state.config.namespace, "agents");
    assert_eq!(state.sanitizer.len(), 6);
}

#[test]
fn builds_state_without_secret() {
    let _lock = ENV_MUTEX.lock().unwrap();
    let mut env = EnvGuard::new();
    env.remove("HOOKD_DEFAULTS");
    env.remove("HOOKD_WEBHOOK_SECRET");
    env.remove("HOOKD_KUBE_TOKEN");
    env.remove("HOOKD_KUBE_TOKEN_FILE");

    let state = build_state_from_env().unwrap();
    assert!(state.config.webhook_secret.is_none());
    assert_eq!(state.config.trigger_phrase, "@claude");
}
