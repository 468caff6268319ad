use std::env;
use std::fs;

use anyhow::{anyhow, Context, Result};

use crate::jobspec::SecretReference;

/// Operator defaults loaded from the optional JSON file named by
/// `HOOKD_DEFAULTS`. Everything here also has an environment override.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct DispatchDefaults {
    #[serde(default, alias = "allowedTools")]
    pub allowed_tools: Vec<String>,
    #[serde(default, alias = "disallowedTools")]
    pub disallowed_tools: Vec<String>,
    #[serde(default = "default_max_turns", alias = "maxTurns")]
    pub max_turns: u32,
    #[serde(default = "default_timeout_minutes", alias = "timeoutMinutes")]
    pub timeout_minutes: u64,
    #[serde(default, alias = "systemPrompt")]
    pub system_prompt: Option<String>,
    #[serde(default, alias = "appendSystemPrompt")]
    pub append_system_prompt: Option<String>,
    #[serde(default, alias = "fallbackModel")]
    pub fallback_model: Option<String>,
}

fn default_max_turns() -> u32 {
    30
}

fn default_timeout_minutes() -> u64 {
    30
}

impl Default for DispatchDefaults {
    fn default() -> Self {
        Self {
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
            max_turns: default_max_turns(),
            timeout_minutes: default_timeout_minutes(),
            system_prompt: None,
            append_system_prompt: None,
            fallback_model: None,
        }
    }
}

/// Process-wide configuration, constructed once at startup and passed
/// through every component entry point. No component reads the environment
/// after this.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Shared webhook secret. Unset means signature verification is skipped.
    pub webhook_secret: Option<String>,
    pub trigger_phrase: String,
    pub namespace: String,
    pub runner_image: String,
    pub runner_command: Vec<String>,
    pub clone_image: String,
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
    pub allowed_tools: Vec<String>,
    pub disallowed_tools: Vec<String>,
    pub max_turns: u32,
    pub timeout_minutes: u64,
    pub system_prompt: Option<String>,
    pub append_system_prompt: Option<String>,
    pub fallback_model: Option<String>,
    pub api_key_secret: SecretReference,
    pub github_token_secret: SecretReference,
    pub kube_api_url: String,
    pub kube_token: Option<String>,
    pub kube_insecure_tls: bool,
    pub job_ttl_seconds: u64,
    pub control_server_port: u16,
    /// Maximum accepted raw request body size in bytes (None => unlimited).
    pub max_request_bytes: Option<usize>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let defaults = DispatchDefaults::default();
        Self {
            webhook_secret: None,
            trigger_phrase: "@claude".to_string(),
            namespace: "default".to_string(),
            runner_image: "ghcr.io/acme/agent-runner:latest".to_string(),
            runner_command: vec!["/usr/local/bin/agent-runner".to_string()],
            clone_image: "alpine/git:latest".to_string(),
            cpu_request: "500m".to_string(),
            cpu_limit: "2".to_string(),
            memory_request: "512Mi".to_string(),
            memory_limit: "4Gi".to_string(),
            allowed_tools: defaults.allowed_tools,
            disallowed_tools: defaults.disallowed_tools,
            max_turns: defaults.max_turns,
            timeout_minutes: defaults.timeout_minutes,
            system_prompt: defaults.system_prompt,
            append_system_prompt: defaults.append_system_prompt,
            fallback_model: defaults.fallback_model,
            api_key_secret: SecretReference {
                name: "agent-secrets".to_string(),
                key: "api-key".to_string(),
            },
            github_token_secret: SecretReference {
                name: "agent-secrets".to_string(),
                key: "github-token".to_string(),
            },
            kube_api_url: "https://kubernetes.default.svc".to_string(),
            kube_token: None,
            kube_insecure_tls: false,
            job_ttl_seconds: 3600,
            control_server_port: 8765,
            max_request_bytes: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = if let Ok(path) = env::var("HOOKD_DEFAULTS") {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read HOOKD_DEFAULTS '{}': file unreadable", path))?;
            serde_json::from_str::<DispatchDefaults>(&content).with_context(|| {
                format!("Failed to parse HOOKD_DEFAULTS '{}': invalid JSON configuration", path)
            })?
        } else {
            DispatchDefaults::default()
        };

        let base = AppConfig::default();

        let kube_token = match env::var("HOOKD_KUBE_TOKEN") {
            Ok(token) if !token.trim().is_empty() => Some(token),
            _ => match env::var("HOOKD_KUBE_TOKEN_FILE") {
                Ok(path) => Some(fs::read_to_string(&path).map(|t| t.trim().to_string()).with_context(
                    || format!("Failed to read HOOKD_KUBE_TOKEN_FILE '{}'", path),
                )?),
                Err(_) => None,
            },
        };

        let api_key_secret = parse_secret_ref("HOOKD_API_KEY_SECRET")?.unwrap_or(base.api_key_secret);
        let github_token_secret =
            parse_secret_ref("HOOKD_GITHUB_TOKEN_SECRET")?.unwrap_or(base.github_token_secret);

        Ok(Self {
            webhook_secret: env::var("HOOKD_WEBHOOK_SECRET").ok().filter(|s| !s.is_empty()),
            trigger_phrase: env::var("HOOKD_TRIGGER_PHRASE").unwrap_or(base.trigger_phrase),
            namespace: env::var("HOOKD_NAMESPACE").unwrap_or(base.namespace),
            runner_image: env::var("HOOKD_RUNNER_IMAGE").unwrap_or(base.runner_image),
            runner_command: parse_list_env("HOOKD_RUNNER_COMMAND").unwrap_or(base.runner_command),
            clone_image: env::var("HOOKD_CLONE_IMAGE").unwrap_or(base.clone_image),
            cpu_request: env::var("HOOKD_CPU_REQUEST").unwrap_or(base.cpu_request),
            cpu_limit: env::var("HOOKD_CPU_LIMIT").unwrap_or(base.cpu_limit),
            memory_request: env::var("HOOKD_MEMORY_REQUEST").unwrap_or(base.memory_request),
            memory_limit: env::var("HOOKD_MEMORY_LIMIT").unwrap_or(base.memory_limit),
            allowed_tools: parse_list_env("HOOKD_ALLOWED_TOOLS").unwrap_or(defaults.allowed_tools),
            disallowed_tools: parse_list_env("HOOKD_DISALLOWED_TOOLS")
                .unwrap_or(defaults.disallowed_tools),
            max_turns: match parse_optional_u64("HOOKD_MAX_TURNS")? {
                Some(v) => u32::try_from(v)
                    .map_err(|_| anyhow!("HOOKD_MAX_TURNS must fit in a 32-bit integer"))?,
                None => defaults.max_turns,
            },
            timeout_minutes: parse_optional_u64("HOOKD_TIMEOUT_MINUTES")?
                .unwrap_or(defaults.timeout_minutes),
            system_prompt: env::var("HOOKD_SYSTEM_PROMPT").ok().or(defaults.system_prompt),
            append_system_prompt: env::var("HOOKD_APPEND_SYSTEM_PROMPT")
                .ok()
                .or(defaults.append_system_prompt),
            fallback_model: env::var("HOOKD_FALLBACK_MODEL").ok().or(defaults.fallback_model),
            api_key_secret,
            github_token_secret,
            kube_api_url: env::var("HOOKD_KUBE_API_URL").unwrap_or(base.kube_api_url),
            kube_token,
            kube_insecure_tls: parse_bool_env("HOOKD_KUBE_INSECURE_TLS")?.unwrap_or(false),
            job_ttl_seconds: parse_optional_u64("HOOKD_JOB_TTL_SECONDS")?
                .unwrap_or(base.job_ttl_seconds),
            control_server_port: match parse_optional_u64("HOOKD_CONTROL_SERVER_PORT")? {
                Some(v) => u16::try_from(v)
                    .map_err(|_| anyhow!("HOOKD_CONTROL_SERVER_PORT must be a TCP port (1-65535)"))?,
                None => base.control_server_port,
            },
            max_request_bytes: parse_optional_u64("HOOKD_MAX_REQUEST_BYTES")?.map(|v| v as usize),
        })
    }
}

fn parse_secret_ref(var: &str) -> Result<Option<SecretReference>> {
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => SecretReference::parse(raw.trim())
            .map(Some)
            .ok_or_else(|| anyhow!("{} must have the form <secret-name>/<key>", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_list_env(var: &str) -> Option<Vec<String>> {
    env::var(var)
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|list| !list.is_empty())
}

fn parse_optional_u64(var: &str) -> Result<Option<u64>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a positive integer", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool_env(var: &str) -> Result<Option<bool>> {
    match env::var(var) {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value)
            .map(Some)
            .ok_or_else(|| anyhow!("{} must be a boolean (true/false/1/0)", var)),
        Ok(_) => Ok(None),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use once_cell::sync::Lazy;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ALL_VARS: &[&str] = &[
        "HOOKD_DEFAULTS",
        "HOOKD_WEBHOOK_SECRET",
        "HOOKD_TRIGGER_PHRASE",
        "HOOKD_NAMESPACE",
        "HOOKD_RUNNER_IMAGE",
        "HOOKD_RUNNER_COMMAND",
        "HOOKD_CLONE_IMAGE",
        "HOOKD_CPU_REQUEST",
        "HOOKD_CPU_LIMIT",
        "HOOKD_MEMORY_REQUEST",
        "HOOKD_MEMORY_LIMIT",
        "HOOKD_ALLOWED_TOOLS",
        "HOOKD_DISALLOWED_TOOLS",
        "HOOKD_MAX_TURNS",
        "HOOKD_TIMEOUT_MINUTES",
        "HOOKD_SYSTEM_PROMPT",
        "HOOKD_APPEND_SYSTEM_PROMPT",
        "HOOKD_FALLBACK_MODEL",
        "HOOKD_API_KEY_SECRET",
        "HOOKD_GITHUB_TOKEN_SECRET",
        "HOOKD_KUBE_API_URL",
        "HOOKD_KUBE_TOKEN",
        "HOOKD_KUBE_TOKEN_FILE",
        "HOOKD_KUBE_INSECURE_TLS",
        "HOOKD_JOB_TTL_SECONDS",
        "HOOKD_CONTROL_SERVER_PORT",
        "HOOKD_MAX_REQUEST_BYTES",
    ];

    fn clear_env() {
        for var in ALL_VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn parses_environment_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let cfg = AppConfig::from_env().unwrap();
        assert!(cfg.webhook_secret.is_none());
        assert_eq!(cfg.trigger_phrase, "@claude");
        assert_eq!(cfg.namespace, "default");
        assert_eq!(cfg.max_turns, 30);
        assert_eq!(cfg.timeout_minutes, 30);
        assert_eq!(cfg.api_key_secret.name, "agent-secrets");
        assert!(!cfg.kube_insecure_tls);
    }

    #[test]
    fn parses_full_configuration() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let mut temp = NamedTempFile::new().unwrap();
        let defaults = serde_json::json!({
            "allowedTools": ["Edit", "Bash(git:*)"],
            "disallowedTools": ["WebSearch"],
            "maxTurns": 50,
            "timeoutMinutes": 20,
            "systemPrompt": "be careful",
            "fallbackModel": "small"
        });
        use std::io::Write;
        write!(temp, "{}", defaults).unwrap();

        std::env::set_var("HOOKD_DEFAULTS", temp.path());
        std::env::set_var("HOOKD_WEBHOOK_SECRET", "s3cret");
        std::env::set_var("HOOKD_TRIGGER_PHRASE", "@bot");
        std::env::set_var("HOOKD_NAMESPACE", "agents");
        std::env::set_var("HOOKD_API_KEY_SECRET", "creds/anthropic");
        std::env::set_var("HOOKD_GITHUB_TOKEN_SECRET", "creds/gh");
        std::env::set_var("HOOKD_KUBE_API_URL", "https://kube.test:6443/");
        std::env::set_var("HOOKD_KUBE_TOKEN", "tok");
        std::env::set_var("HOOKD_KUBE_INSECURE_TLS", "true");
        std::env::set_var("HOOKD_JOB_TTL_SECONDS", "600");
        std::env::set_var("HOOKD_CONTROL_SERVER_PORT", "9999");
        std::env::set_var("HOOKD_MAX_REQUEST_BYTES", "65536");
        std::env::set_var("HOOKD_MAX_TURNS", "75");

        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.webhook_secret.as_deref(), Some("s3cret"));
        assert_eq!(cfg.trigger_phrase, "@bot");
        assert_eq!(cfg.namespace, "agents");
        assert_eq!(cfg.allowed_tools, vec!["Edit", "Bash(git:*)"]);
        assert_eq!(cfg.disallowed_tools, vec!["WebSearch"]);
        // env override wins over the defaults file
        assert_eq!(cfg.max_turns, 75);
        assert_eq!(cfg.timeout_minutes, 20);
        assert_eq!(cfg.system_prompt.as_deref(), Some("be careful"));
        assert_eq!(cfg.fallback_model.as_deref(), Some("small"));
        assert_eq!(cfg.api_key_secret.name, "creds");
        assert_eq!(cfg.api_key_secret.key, "anthropic");
        assert_eq!(cfg.github_token_secret.key, "gh");
        assert_eq!(cfg.kube_api_url, "https://kube.test:6443/");
        assert_eq!(cfg.kube_token.as_deref(), Some("tok"));
        assert!(cfg.kube_insecure_tls);
        assert_eq!(cfg.job_ttl_seconds, 600);
        assert_eq!(cfg.control_server_port, 9999);
        assert_eq!(cfg.max_request_bytes, Some(65536));

        clear_env();
    }

    #[test]
    fn rejects_out_of_range_control_server_port() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        std::env::set_var("HOOKD_CONTROL_SERVER_PORT", "70000");
        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("HOOKD_CONTROL_SERVER_PORT"));
        clear_env();
    }

    #[test]
    fn rejects_oversized_max_turns() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        std::env::set_var("HOOKD_MAX_TURNS", "4294967296");
        assert!(AppConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    fn rejects_malformed_secret_ref() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        std::env::set_var("HOOKD_API_KEY_SECRET", "no-slash");
        assert!(AppConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    fn reads_token_from_file() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let mut temp = NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(temp, "file-token").unwrap();
        std::env::set_var("HOOKD_KUBE_TOKEN_FILE", temp.path());
        let cfg = AppConfig::from_env().unwrap();
        assert_eq!(cfg.kube_token.as_deref(), Some("file-token"));
        clear_env();
    }
}
