//! Per-run configuration bundle assembly.
//!
//! The bundle flattens operator defaults and event-derived fields into plain
//! string entries, plus one nested serialized descriptor for the control
//! server the job's main stage starts. No entry ever holds a secret value;
//! secrets travel as [`crate::jobspec::SecretReference`] names resolved by
//! the cluster at container start.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::errors::DispatchError;
use crate::event::DispatchContext;
use crate::identity::JobIdentity;
use crate::jobspec::{ConfigMap, ObjectMeta};

/// Bundle entry mounted into the job as the prompt file.
pub const PROMPT_KEY: &str = "prompt.txt";
/// Bundle entry mounted into the job as the control-server descriptor.
pub const CONTROL_SERVER_KEY: &str = "control-server.json";

/// Startup parameters for the auxiliary control-protocol server, scoped to
/// one repository, branch, and job identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControlServerSpec {
    pub repository: String,
    pub branch: String,
    pub job_name: String,
    pub config_name: String,
    pub listen_port: u16,
}

/// Flattened string-to-string configuration for one dispatch attempt.
#[derive(Debug, Clone)]
pub struct ConfigurationBundle {
    pub name: String,
    pub data: BTreeMap<String, String>,
}

impl ConfigurationBundle {
    /// Render the bundle as a ConfigMap manifest.
    pub fn to_config_map(&self, namespace: &str, labels: BTreeMap<String, String>) -> ConfigMap {
        ConfigMap {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
            metadata: ObjectMeta {
                name: self.name.clone(),
                namespace: Some(namespace.to_string()),
                labels,
            },
            data: self.data.clone(),
        }
    }
}

/// Build the bundle from operator defaults, the dispatch context, the
/// sanitized prompt and the raw serialized payload.
pub fn assemble_bundle(
    config: &AppConfig,
    ctx: &DispatchContext,
    identity: &JobIdentity,
    prompt: &str,
    raw_payload: &str,
) -> Result<ConfigurationBundle, DispatchError> {
    let control_server = ControlServerSpec {
        repository: ctx.repo_full_name.clone(),
        branch: ctx.branch.clone(),
        job_name: identity.job_name.clone(),
        config_name: identity.config_name.clone(),
        listen_port: config.control_server_port,
    };

    let mut data = BTreeMap::new();
    data.insert("REPO_FULL_NAME".to_string(), ctx.repo_full_name.clone());
    data.insert("REPO_OWNER".to_string(), ctx.repo_owner.clone());
    data.insert("REPO_NAME".to_string(), ctx.repo_name.clone());
    data.insert("BRANCH".to_string(), ctx.branch.clone());
    data.insert("EVENT_TYPE".to_string(), ctx.event_type.clone());
    data.insert(
        "ISSUE_NUMBER".to_string(),
        ctx.issue_number.map(|n| n.to_string()).unwrap_or_default(),
    );
    data.insert("COMMENT_ID".to_string(), ctx.comment_id.to_string());
    data.insert("SENDER_LOGIN".to_string(), ctx.sender_login.clone());
    data.insert("EVENT_PAYLOAD".to_string(), raw_payload.to_string());
    data.insert(
        "ALLOWED_TOOLS".to_string(),
        config.allowed_tools.join(","),
    );
    data.insert(
        "DISALLOWED_TOOLS".to_string(),
        config.disallowed_tools.join(","),
    );
    data.insert("MAX_TURNS".to_string(), config.max_turns.to_string());
    data.insert(
        "TIMEOUT_MINUTES".to_string(),
        config.timeout_minutes.to_string(),
    );
    data.insert(
        "SYSTEM_PROMPT".to_string(),
        config.system_prompt.clone().unwrap_or_default(),
    );
    data.insert(
        "APPEND_SYSTEM_PROMPT".to_string(),
        config.append_system_prompt.clone().unwrap_or_default(),
    );
    data.insert(
        "FALLBACK_MODEL".to_string(),
        config.fallback_model.clone().unwrap_or_default(),
    );
    data.insert(PROMPT_KEY.to_string(), prompt.to_string());
    data.insert(
        CONTROL_SERVER_KEY.to_string(),
        serde_json::to_string(&control_server)?,
    );

    Ok(ConfigurationBundle {
        name: identity.config_name.clone(),
        data,
    })
}
