//! Thin create-only client for the cluster resource API.
//!
//! Semantics are create, not apply: a second submission under the same
//! identity conflicts, and the conflict is surfaced as an error instead of
//! being merged or swallowed. The dispatcher never polls or awaits job
//! completion; the cluster's own controllers own execution and cleanup.

use thiserror::Error;

use crate::jobspec::{ConfigMap, Job};

#[derive(Debug, Error)]
pub enum ClusterError {
    /// Create-only semantics: the resource identity was already submitted.
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    /// Resource API rejected the request.
    #[error("cluster API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Transport-level failure reaching the cluster API.
    #[error("cluster API unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Create-only operations against the cluster's resource API.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    async fn create_config_map(&self, namespace: &str, cm: &ConfigMap) -> Result<(), ClusterError>;
    async fn create_job(&self, namespace: &str, job: &Job) -> Result<(), ClusterError>;
    /// Compensation hook: removes an orphaned bundle when job creation fails
    /// after bundle creation succeeded.
    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
}

/// Kubernetes REST client. Talks to the API server with a bearer token
/// supplied through configuration (in-cluster service-account token or an
/// operator-provided one).
pub struct KubeClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl KubeClient {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        insecure_tls: bool,
    ) -> Result<Self, ClusterError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(insecure_tls)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client,
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn create<T: serde::Serialize + Sync>(
        &self,
        url: String,
        kind: &'static str,
        name: &str,
        body: &T,
    ) -> Result<(), ClusterError> {
        let resp = self.authorize(self.client.post(&url).json(body)).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        if status.as_u16() == 409 {
            return Err(ClusterError::AlreadyExists {
                kind,
                name: name.to_string(),
            });
        }
        let message = resp.text().await.unwrap_or_default();
        Err(ClusterError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait::async_trait]
impl ClusterClient for KubeClient {
    async fn create_config_map(&self, namespace: &str, cm: &ConfigMap) -> Result<(), ClusterError> {
        let url = format!("{}/api/v1/namespaces/{}/configmaps", self.base_url, namespace);
        self.create(url, "ConfigMap", &cm.metadata.name, cm).await
    }

    async fn create_job(&self, namespace: &str, job: &Job) -> Result<(), ClusterError> {
        let url = format!(
            "{}/apis/batch/v1/namespaces/{}/jobs",
            self.base_url, namespace
        );
        self.create(url, "Job", &job.metadata.name, job).await
    }

    async fn delete_config_map(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let url = format!(
            "{}/api/v1/namespaces/{}/configmaps/{}",
            self.base_url, namespace, name
        );
        let resp = self.authorize(self.client.delete(&url)).send().await?;
        let status = resp.status();
        if status.is_success() || status.as_u16() == 404 {
            return Ok(());
        }
        let message = resp.text().await.unwrap_or_default();
        Err(ClusterError::Api {
            status: status.as_u16(),
            message,
        })
    }
}
