//! Core library for hookd. This module wires together the webhook intake
//! handler, the dispatch pipeline (signature verification, trigger
//! classification, sanitization, identity derivation, bundle assembly, job
//! building, cluster submission) and the health/metrics endpoints.

mod config;
pub mod bundle;
pub mod cluster;
pub mod errors;
pub mod event;
pub mod identity;
pub mod jobspec;
pub mod sanitize;
pub mod signature;

pub use config::{AppConfig, DispatchDefaults};

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{routing::get, routing::post, Router};
use chrono::Utc;

use crate::bundle::assemble_bundle;
use crate::cluster::{ClusterClient, KubeClient};
use crate::errors::DispatchError;
use crate::event::{classify, DispatchContext, WebhookEvent};
use crate::identity::JobIdentity;
use crate::jobspec::JobBuilder;
use crate::sanitize::SanitizePipeline;
use crate::signature::{verify_signature, SIGNATURE_HEADER};

/// Shared application state. Read-only after startup apart from the metric
/// counters; requests are otherwise fully independent.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sanitizer: SanitizePipeline,
    pub cluster: Arc<dyn ClusterClient>,
    pub metric_requests_total: Arc<AtomicU64>,
    pub metric_dispatched_total: Arc<AtomicU64>,
    pub metric_noop_total: Arc<AtomicU64>,
    pub metric_auth_failures_total: Arc<AtomicU64>,
    pub metric_cluster_errors_total: Arc<AtomicU64>,
    pub process_start_epoch: f64,
    pub process_start_instant: Instant,
}

impl AppState {
    pub fn new(config: AppConfig, cluster: Arc<dyn ClusterClient>) -> Self {
        let start_time = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            config: Arc::new(config),
            sanitizer: SanitizePipeline::standard(),
            cluster,
            metric_requests_total: Arc::new(AtomicU64::new(0)),
            metric_dispatched_total: Arc::new(AtomicU64::new(0)),
            metric_noop_total: Arc::new(AtomicU64::new(0)),
            metric_auth_failures_total: Arc::new(AtomicU64::new(0)),
            metric_cluster_errors_total: Arc::new(AtomicU64::new(0)),
            process_start_epoch: start_time.as_secs_f64(),
            process_start_instant: Instant::now(),
        }
    }
}

/// Build state from environment variables: load [`AppConfig`] and connect
/// the Kubernetes resource client.
pub fn build_state_from_env() -> Result<AppState, Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    if config.webhook_secret.is_none() {
        tracing::warn!("HOOKD_WEBHOOK_SECRET not set; webhook signature verification is disabled");
    }
    let cluster = KubeClient::new(
        &config.kube_api_url,
        config.kube_token.clone(),
        config.kube_insecure_tls,
    )?;
    Ok(AppState::new(config, Arc::new(cluster)))
}

/// Build the Axum router and attach handlers.
pub fn app(state: AppState) -> Router {
    let max_request_bytes = state.config.max_request_bytes;

    let router = Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler));

    let router = if let Some(limit) = max_request_bytes {
        router.layer(tower_http::limit::RequestBodyLimitLayer::new(limit))
    } else {
        router
    };

    router.with_state(state)
}

/// Outcome of one webhook delivery that was not rejected.
enum DispatchOutcome {
    /// Event did not match the trigger criteria; zero side effects.
    NoOp(String),
    /// A bundle and job were submitted to the cluster.
    Dispatched { job_name: String },
}

/// Handler for `POST /webhook`. Runs the full pipeline synchronously and
/// blocks the response until the cluster submission completes or fails.
async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    state.metric_requests_total.fetch_add(1, Ordering::Relaxed);

    match run_dispatch(&state, &headers, &body).await {
        Ok(DispatchOutcome::NoOp(reason)) => {
            state.metric_noop_total.fetch_add(1, Ordering::Relaxed);
            tracing::info!(reason = %reason, "event ignored");
            (StatusCode::OK, format!("ignored: {}\n", reason)).into_response()
        }
        Ok(DispatchOutcome::Dispatched { job_name }) => {
            state.metric_dispatched_total.fetch_add(1, Ordering::Relaxed);
            (StatusCode::OK, format!("dispatched job {}\n", job_name)).into_response()
        }
        Err(err) => {
            match &err {
                DispatchError::Authentication(_) => {
                    state
                        .metric_auth_failures_total
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %err, "webhook rejected");
                }
                DispatchError::Cluster(_) => {
                    state
                        .metric_cluster_errors_total
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::error!(error = %err, "dispatch failed");
                }
                _ => tracing::warn!(error = %err, "dispatch failed"),
            }
            let status =
                StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, format!("{}\n", err)).into_response()
        }
    }
}

/// The dispatch pipeline. All authentication and classification failures
/// occur strictly before any cluster mutation.
async fn run_dispatch(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<DispatchOutcome, DispatchError> {
    let config = &state.config;

    match config.webhook_secret.as_deref() {
        Some(secret) => {
            let header = headers
                .get(SIGNATURE_HEADER)
                .and_then(|v| v.to_str().ok());
            verify_signature(secret, body, header)?;
        }
        None => {
            tracing::debug!("no webhook secret configured, skipping signature verification");
        }
    }

    let event: WebhookEvent = serde_json::from_slice(body)
        .map_err(|e| DispatchError::Validation(format!("malformed JSON payload: {}", e)))?;

    let decision = classify(&event, &config.trigger_phrase);
    if !decision.should_dispatch {
        return Ok(DispatchOutcome::NoOp(decision.reason));
    }

    let event_type = headers
        .get("x-github-event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("issue_comment");
    let ctx = DispatchContext::from_event(&event, event_type)?;

    let prompt = state.sanitizer.apply(&ctx.comment_body);
    let raw_payload = String::from_utf8_lossy(body);

    let identity = JobIdentity::derive(ctx.comment_id, Utc::now());
    tracing::info!(
        repo = %ctx.repo_full_name,
        comment_id = ctx.comment_id,
        sender = %ctx.sender_login,
        job = %identity.job_name,
        "dispatching job"
    );

    let bundle = assemble_bundle(config, &ctx, &identity, &prompt, &raw_payload)?;
    let job = JobBuilder::new(config, &identity, &bundle).build()?;

    let config_map = bundle.to_config_map(&config.namespace, job.metadata.labels.clone());
    state
        .cluster
        .create_config_map(&config.namespace, &config_map)
        .await?;

    if let Err(err) = state.cluster.create_job(&config.namespace, &job).await {
        // Compensate: the bundle would otherwise be orphaned.
        if let Err(cleanup_err) = state
            .cluster
            .delete_config_map(&config.namespace, &bundle.name)
            .await
        {
            tracing::warn!(
                bundle = %bundle.name,
                error = %cleanup_err,
                "failed to delete bundle after job creation failure"
            );
        }
        return Err(err.into());
    }

    Ok(DispatchOutcome::Dispatched {
        job_name: identity.job_name,
    })
}

/// Simple health endpoint for container readiness / liveness checks.
async fn health_handler() -> axum::response::Response {
    (StatusCode::OK, "ok\n").into_response()
}

/// Prometheus-style metrics exposition. Text format with simple counters.
async fn metrics_handler(State(state): State<AppState>) -> axum::response::Response {
    use std::fmt::Write as _;
    let mut buf = String::new();
    let requests = state.metric_requests_total.load(Ordering::Relaxed);
    let dispatched = state.metric_dispatched_total.load(Ordering::Relaxed);
    let noop = state.metric_noop_total.load(Ordering::Relaxed);
    let auth_failures = state.metric_auth_failures_total.load(Ordering::Relaxed);
    let cluster_errors = state.metric_cluster_errors_total.load(Ordering::Relaxed);
    let uptime_secs = state.process_start_instant.elapsed().as_secs_f64();

    writeln!(
        &mut buf,
        "# HELP hookd_requests_total Total webhook requests received"
    )
    .ok();
    writeln!(&mut buf, "# TYPE hookd_requests_total counter").ok();
    writeln!(&mut buf, "hookd_requests_total {}", requests).ok();
    writeln!(
        &mut buf,
        "# HELP hookd_dispatched_total Jobs submitted to the cluster"
    )
    .ok();
    writeln!(&mut buf, "# TYPE hookd_dispatched_total counter").ok();
    writeln!(&mut buf, "hookd_dispatched_total {}", dispatched).ok();
    writeln!(
        &mut buf,
        "# HELP hookd_noop_total Deliveries answered as no-op"
    )
    .ok();
    writeln!(&mut buf, "# TYPE hookd_noop_total counter").ok();
    writeln!(&mut buf, "hookd_noop_total {}", noop).ok();
    writeln!(
        &mut buf,
        "# HELP hookd_auth_failures_total Deliveries rejected for bad signatures"
    )
    .ok();
    writeln!(&mut buf, "# TYPE hookd_auth_failures_total counter").ok();
    writeln!(&mut buf, "hookd_auth_failures_total {}", auth_failures).ok();
    writeln!(
        &mut buf,
        "# HELP hookd_cluster_errors_total Failed cluster submissions"
    )
    .ok();
    writeln!(&mut buf, "# TYPE hookd_cluster_errors_total counter").ok();
    writeln!(&mut buf, "hookd_cluster_errors_total {}", cluster_errors).ok();
    writeln!(
        &mut buf,
        "# HELP hookd_build_info Build information\n# TYPE hookd_build_info gauge"
    )
    .ok();
    writeln!(
        &mut buf,
        "hookd_build_info{{version=\"{}\"}} 1",
        env!("CARGO_PKG_VERSION")
    )
    .ok();
    writeln!(
        &mut buf,
        "# HELP hookd_process_start_time_seconds Process start time (Unix epoch seconds)\n# TYPE hookd_process_start_time_seconds gauge"
    )
    .ok();
    writeln!(
        &mut buf,
        "hookd_process_start_time_seconds {}",
        state.process_start_epoch
    )
    .ok();
    writeln!(
        &mut buf,
        "# HELP hookd_process_uptime_seconds Process uptime seconds\n# TYPE hookd_process_uptime_seconds gauge"
    )
    .ok();
    writeln!(&mut buf, "hookd_process_uptime_seconds {}", uptime_secs).ok();

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        buf,
    )
        .into_response()
}
