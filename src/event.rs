//! Webhook payload types and trigger classification.
//!
//! Only the fields needed for classification and dispatch are captured;
//! unknown fields are ignored. The classifier is a pure function of the
//! parsed event and the configured trigger phrase.

use serde::Deserialize;

use crate::errors::DispatchError;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Comment {
    pub id: u64,
    pub body: Option<String>,
    pub user: Option<Account>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Account {
    pub login: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Issue {
    pub number: u64,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct PullRequest {
    pub number: u64,
    pub head: Option<GitRef>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Repository {
    pub full_name: Option<String>,
    pub name: Option<String>,
    pub owner: Option<Account>,
    pub default_branch: Option<String>,
}

/// Raw inbound webhook payload. Transient; never persisted.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct WebhookEvent {
    pub action: Option<String>,
    pub comment: Option<Comment>,
    pub issue: Option<Issue>,
    pub pull_request: Option<PullRequest>,
    pub repository: Option<Repository>,
    pub sender: Option<Account>,
}

/// Outcome of trigger classification. A negative decision is not an error;
/// the sender still receives a success response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerDecision {
    pub should_dispatch: bool,
    pub reason: String,
}

impl TriggerDecision {
    fn no(reason: impl Into<String>) -> Self {
        Self {
            should_dispatch: false,
            reason: reason.into(),
        }
    }

    fn yes(reason: impl Into<String>) -> Self {
        Self {
            should_dispatch: true,
            reason: reason.into(),
        }
    }
}

/// Decide whether `event` warrants a dispatch.
///
/// Only "comment created" events attached to an issue or pull request
/// qualify, and the comment body must contain `trigger_phrase` as a
/// case-insensitive substring.
pub fn classify(event: &WebhookEvent, trigger_phrase: &str) -> TriggerDecision {
    match event.action.as_deref() {
        Some("created") => {}
        Some(other) => return TriggerDecision::no(format!("action '{}' is not a comment creation", other)),
        None => return TriggerDecision::no("payload has no action field"),
    }

    let comment = match &event.comment {
        Some(c) => c,
        None => return TriggerDecision::no("payload carries no comment"),
    };

    if event.issue.is_none() && event.pull_request.is_none() {
        return TriggerDecision::no("comment is not attached to an issue or pull request");
    }

    let body = comment.body.as_deref().unwrap_or("");
    let phrase = trigger_phrase.to_lowercase();
    if phrase.is_empty() || !body.to_lowercase().contains(&phrase) {
        return TriggerDecision::no(format!("comment does not contain trigger phrase '{}'", trigger_phrase));
    }

    TriggerDecision::yes(format!("comment {} contains trigger phrase", comment.id))
}

/// Event-derived fields needed downstream of a positive trigger decision.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub repo_full_name: String,
    pub repo_owner: String,
    pub repo_name: String,
    /// Resolved ref: PR head branch when present, otherwise the repository
    /// default branch.
    pub branch: String,
    pub event_type: String,
    pub issue_number: Option<u64>,
    pub comment_id: u64,
    pub comment_body: String,
    pub sender_login: String,
}

impl DispatchContext {
    /// Extract the dispatch context from a positively classified event.
    /// Missing repository coordinates are a validation failure, not a no-op.
    pub fn from_event(event: &WebhookEvent, event_type: &str) -> Result<Self, DispatchError> {
        let comment = event
            .comment
            .as_ref()
            .ok_or_else(|| DispatchError::Validation("missing comment".into()))?;
        let repo = event
            .repository
            .as_ref()
            .ok_or_else(|| DispatchError::Validation("missing repository".into()))?;
        let repo_full_name = repo
            .full_name
            .clone()
            .ok_or_else(|| DispatchError::Validation("missing repository.full_name".into()))?;
        let repo_name = repo
            .name
            .clone()
            .ok_or_else(|| DispatchError::Validation("missing repository.name".into()))?;
        let repo_owner = repo
            .owner
            .as_ref()
            .and_then(|o| o.login.clone())
            .ok_or_else(|| DispatchError::Validation("missing repository.owner.login".into()))?;

        let branch = event
            .pull_request
            .as_ref()
            .and_then(|pr| pr.head.as_ref())
            .and_then(|h| h.git_ref.clone())
            .or_else(|| repo.default_branch.clone())
            .unwrap_or_else(|| "main".to_string());

        let issue_number = event
            .issue
            .as_ref()
            .map(|i| i.number)
            .or_else(|| event.pull_request.as_ref().map(|pr| pr.number));

        Ok(Self {
            repo_full_name,
            repo_owner,
            repo_name,
            branch,
            event_type: event_type.to_string(),
            issue_number,
            comment_id: comment.id,
            comment_body: comment.body.clone().unwrap_or_default(),
            sender_login: event
                .sender
                .as_ref()
                .and_then(|s| s.login.clone())
                .unwrap_or_default(),
        })
    }
}
