// crates/opsrunbook-actions/src/providers.rs
// ============================================================================
// Module: Action Provider Clients
// Description: Capability traits and clients for ticket, chat, and PR actions.
// Purpose: Keep external side effects behind narrow, fakeable surfaces.
// Dependencies: base64, opsrunbook-core, opsrunbook-resolver, reqwest
// ============================================================================

//! ## Overview
//! Each provider is a narrow capability: the tracker creates one issue, the
//! chat notifier posts one card, the source-control client performs the
//! branch/commit/PR dance and the bounded `file_exists` probe. Every
//! capability has a production client over bounded blocking HTTP and a
//! dry-run fake that returns deterministic keys from a counter. Executors
//! select by feature flag at construction; tests do the same.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use opsrunbook_core::Priority;
use opsrunbook_resolver::FileChecker;
use reqwest::blocking::Client;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Provider call errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The client could not be constructed.
    #[error("provider client build failed: {0}")]
    Build(String),
    /// The provider rejected the request.
    #[error("provider error {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// First bytes of the error body.
        body: String,
    },
    /// The call failed before a response arrived.
    #[error("provider request failed: {0}")]
    Request(String),
    /// The response could not be decoded.
    #[error("provider response invalid: {0}")]
    Decode(String),
}

// ============================================================================
// SECTION: Ticket Capability
// ============================================================================

/// Tracker summary length cap.
const MAX_TICKET_SUMMARY: usize = 255;
/// Tracker description length cap.
const MAX_TICKET_DESCRIPTION: usize = 30_000;
/// Labels attached to every created issue.
const TICKET_LABELS: [&str; 2] = ["opsrunbook-copilot", "auto-generated"];
/// Tracker request timeout.
const TICKET_TIMEOUT: Duration = Duration::from_secs(15);

/// Provider keys returned by a successful issue creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRefs {
    /// Issue key (e.g. `OPS-17`).
    pub issue_key: String,
    /// Browse URL for the issue.
    pub url: String,
}

/// Tracker ticket capability.
pub trait TicketClient: Send + Sync {
    /// Creates one issue and returns its provider keys.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when the create call fails.
    fn create_issue(
        &self,
        summary: &str,
        description: &str,
        priority: Priority,
    ) -> Result<TicketRefs, ProviderError>;
}

/// Maps plan priorities to tracker priority names.
#[must_use]
pub const fn tracker_priority(priority: Priority) -> &'static str {
    match priority {
        Priority::P0 => "Highest",
        Priority::P1 => "High",
        Priority::P2 => "Medium",
    }
}

/// Production tracker client over the REST issue API.
pub struct HttpTicketClient {
    /// Bounded blocking HTTP client.
    client: Client,
    /// Tracker base URL without a trailing slash.
    base_url: String,
    /// Basic-auth header value.
    auth: String,
    /// Project key issues are created under.
    project_key: String,
    /// Issue type name.
    issue_type: String,
}

impl HttpTicketClient {
    /// Builds a tracker client from credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Build`] when the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        email: &str,
        api_token: &str,
        project_key: &str,
        issue_type: &str,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(TICKET_TIMEOUT)
            .build()
            .map_err(|err| ProviderError::Build(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth: format!("Basic {}", BASE64.encode(format!("{email}:{api_token}"))),
            project_key: project_key.to_string(),
            issue_type: issue_type.to_string(),
        })
    }
}

impl TicketClient for HttpTicketClient {
    fn create_issue(
        &self,
        summary: &str,
        description: &str,
        priority: Priority,
    ) -> Result<TicketRefs, ProviderError> {
        let summary: String = summary.chars().take(MAX_TICKET_SUMMARY).collect();
        let description: String = description.chars().take(MAX_TICKET_DESCRIPTION).collect();
        let payload = json!({
            "fields": {
                "project": {"key": self.project_key},
                "issuetype": {"name": self.issue_type},
                "summary": summary,
                "description": description,
                "priority": {"name": tracker_priority(priority)},
                "labels": TICKET_LABELS,
            }
        });
        let url = format!("{}/rest/api/2/issue", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", &self.auth)
            .json(&payload)
            .send()
            .map_err(|err| ProviderError::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default().chars().take(500).collect();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body: Value =
            response.json().map_err(|err| ProviderError::Decode(err.to_string()))?;
        let issue_key = body
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Decode("issue key missing".to_string()))?
            .to_string();
        let url = format!("{}/browse/{issue_key}", self.base_url);
        Ok(TicketRefs {
            issue_key,
            url,
        })
    }
}

/// Dry-run tracker returning deterministic `DRYRUN-<n>` keys.
#[derive(Debug, Default)]
pub struct DryRunTicketClient {
    /// Issue counter.
    counter: AtomicU64,
}

impl DryRunTicketClient {
    /// Creates a fresh dry-run tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TicketClient for DryRunTicketClient {
    fn create_issue(
        &self,
        _summary: &str,
        _description: &str,
        _priority: Priority,
    ) -> Result<TicketRefs, ProviderError> {
        let count = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let issue_key = format!("DRYRUN-{count}");
        Ok(TicketRefs {
            url: format!("https://dryrun.example.com/browse/{issue_key}"),
            issue_key,
        })
    }
}

// ============================================================================
// SECTION: Notify Capability
// ============================================================================

/// Card title length cap.
const MAX_CARD_TITLE: usize = 200;
/// Card body length cap.
const MAX_CARD_BODY: usize = 4000;
/// Maximum action links per card.
const MAX_CARD_LINKS: usize = 5;
/// Notifier request timeout.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// One action link on a notification card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardLink {
    /// Link display name.
    pub name: String,
    /// Link target.
    pub url: String,
}

/// Provider keys returned by a delivered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyRefs {
    /// HTTP status the webhook answered with.
    pub status_code: u16,
    /// Provider message identifier, when any.
    pub message_id: String,
}

/// Chat notification capability.
pub trait ChatNotifier: Send + Sync {
    /// Posts one card with a title, markdown body, and action links.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when delivery fails.
    fn send_card(
        &self,
        title: &str,
        body_md: &str,
        links: &[CardLink],
    ) -> Result<NotifyRefs, ProviderError>;
}

/// Production notifier over an incoming-webhook URL.
pub struct WebhookNotifier {
    /// Bounded blocking HTTP client.
    client: Client,
    /// Incoming webhook URL.
    webhook_url: String,
}

impl WebhookNotifier {
    /// Builds a notifier from the webhook URL.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Build`] when the HTTP client cannot be built.
    pub fn new(webhook_url: &str) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .map_err(|err| ProviderError::Build(err.to_string()))?;
        Ok(Self {
            client,
            webhook_url: webhook_url.to_string(),
        })
    }
}

impl ChatNotifier for WebhookNotifier {
    fn send_card(
        &self,
        title: &str,
        body_md: &str,
        links: &[CardLink],
    ) -> Result<NotifyRefs, ProviderError> {
        let title: String = title.chars().take(MAX_CARD_TITLE).collect();
        let body: String = body_md.chars().take(MAX_CARD_BODY).collect();
        let actions: Vec<Value> = links
            .iter()
            .take(MAX_CARD_LINKS)
            .map(|link| {
                json!({
                    "@type": "OpenUri",
                    "name": link.name,
                    "targets": [{"os": "default", "uri": link.url}],
                })
            })
            .collect();
        let card = json!({
            "@type": "MessageCard",
            "@context": "http://schema.org/extensions",
            "themeColor": "d63384",
            "summary": title,
            "sections": [{"activityTitle": title, "text": body, "markdown": true}],
            "potentialAction": actions,
        });
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&card)
            .send()
            .map_err(|err| ProviderError::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default().chars().take(200).collect(),
            });
        }
        Ok(NotifyRefs {
            status_code: status.as_u16(),
            message_id: String::new(),
        })
    }
}

/// Dry-run notifier returning deterministic message ids.
#[derive(Debug, Default)]
pub struct DryRunNotifier {
    /// Message counter.
    counter: AtomicU64,
}

impl DryRunNotifier {
    /// Creates a fresh dry-run notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChatNotifier for DryRunNotifier {
    fn send_card(
        &self,
        _title: &str,
        _body_md: &str,
        _links: &[CardLink],
    ) -> Result<NotifyRefs, ProviderError> {
        let count = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(NotifyRefs {
            status_code: 200,
            message_id: format!("dryrun-notify-{count}"),
        })
    }
}

// ============================================================================
// SECTION: Source-Control Capability
// ============================================================================

/// Source-control request timeout.
const GITHUB_TIMEOUT: Duration = Duration::from_secs(15);
/// Source-control API root.
const GITHUB_API: &str = "https://api.github.com";

/// One branch/commit/PR request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrNotesRequest {
    /// Repository name without the owner.
    pub repo: String,
    /// Branch to create or update.
    pub branch_name: String,
    /// Pull request title.
    pub pr_title: String,
    /// Pull request body.
    pub pr_body: String,
    /// Path of the notes file.
    pub file_path: String,
    /// Notes file content.
    pub file_content: String,
    /// Commit message.
    pub commit_message: String,
}

/// Provider keys returned by the PR dance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrRefs {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Branch the notes landed on.
    pub branch: String,
    /// Default branch the PR targets.
    pub default_branch: String,
    /// Pull request URL.
    pub pr_url: String,
    /// Pull request number.
    pub pr_number: u64,
    /// Commit sha of the notes file.
    pub commit_sha: String,
    /// True when an existing open PR was updated instead of created.
    pub reused_pr: bool,
}

/// Source-control capability for the PR action.
pub trait SourceControlClient: Send + Sync + FileChecker {
    /// Returns the repository default branch.
    fn default_branch(&self, repo: &str) -> String;

    /// Creates the branch, commits the notes file, and opens (or reuses) a
    /// pull request.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] when any step fails. A branch that already
    /// exists is not a failure; it switches the dance to the update path.
    fn create_pr_with_notes(&self, request: &PrNotesRequest) -> Result<PrRefs, ProviderError>;
}

/// Production source-control client over the REST API.
pub struct GithubClient {
    /// Bounded blocking HTTP client.
    client: Client,
    /// Repository owner.
    owner: String,
    /// Bearer token.
    token: String,
    /// Fallback default branch.
    default_branch_fallback: String,
}

impl GithubClient {
    /// Builds a client for one owner.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Build`] when the HTTP client cannot be built.
    pub fn new(owner: &str, token: &str, default_branch: &str) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(GITHUB_TIMEOUT)
            .user_agent("opsrunbook-copilot/0.1")
            .build()
            .map_err(|err| ProviderError::Build(err.to_string()))?;
        Ok(Self {
            client,
            owner: owner.to_string(),
            token: token.to_string(),
            default_branch_fallback: default_branch.to_string(),
        })
    }

    /// Issues one API call and decodes the JSON response.
    fn call(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Value, ProviderError> {
        let url = format!("{GITHUB_API}{path}");
        let mut request = match method {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PUT" => self.client.put(&url),
            other => return Err(ProviderError::Request(format!("unsupported method {other}"))),
        };
        request = request
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json");
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().map_err(|err| ProviderError::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default().chars().take(800).collect(),
            });
        }
        response.json().map_err(|err| ProviderError::Decode(err.to_string()))
    }

    /// Returns the head sha of a branch.
    fn ref_sha(&self, repo: &str, branch: &str) -> Result<String, ProviderError> {
        let data =
            self.call("GET", &format!("/repos/{}/{repo}/git/ref/heads/{branch}", self.owner), None)?;
        data.pointer("/object/sha")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Decode("ref sha missing".to_string()))
    }

    /// Creates a branch at the given sha; a 422 means it already exists.
    fn create_branch(&self, repo: &str, branch: &str, sha: &str) -> Result<bool, ProviderError> {
        let body = json!({"ref": format!("refs/heads/{branch}"), "sha": sha});
        match self.call("POST", &format!("/repos/{}/{repo}/git/refs", self.owner), Some(&body)) {
            Ok(_) => Ok(false),
            Err(ProviderError::Status {
                status: 422, ..
            }) => Ok(true),
            Err(err) => Err(err),
        }
    }

    /// Creates or updates one file on a branch, returning the commit sha.
    fn put_file(
        &self,
        repo: &str,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<String, ProviderError> {
        let existing_sha = self
            .call(
                "GET",
                &format!("/repos/{}/{repo}/contents/{path}?ref={branch}", self.owner),
                None,
            )
            .ok()
            .and_then(|data| data.get("sha").and_then(Value::as_str).map(str::to_string));
        let mut body = json!({
            "message": message,
            "content": BASE64.encode(content),
            "branch": branch,
        });
        if let (Some(sha), Some(map)) = (existing_sha, body.as_object_mut()) {
            map.insert("sha".to_string(), Value::String(sha));
        }
        let data = self.call(
            "PUT",
            &format!("/repos/{}/{repo}/contents/{path}", self.owner),
            Some(&body),
        )?;
        Ok(data
            .pointer("/commit/sha")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Finds an open PR for a head branch, when one exists.
    fn find_open_pr(&self, repo: &str, head_branch: &str) -> Option<Value> {
        let path = format!(
            "/repos/{}/{repo}/pulls?head={}:{head_branch}&state=open",
            self.owner, self.owner
        );
        self.call("GET", &path, None)
            .ok()
            .and_then(|data| data.as_array().and_then(|items| items.first().cloned()))
    }
}

impl FileChecker for GithubClient {
    fn file_exists(&self, repo_full_name: &str, path: &str) -> bool {
        let (owner, repo) = repo_full_name
            .split_once('/')
            .map_or((self.owner.as_str(), repo_full_name), |parts| parts);
        let branch = self.default_branch(repo);
        self.call("GET", &format!("/repos/{owner}/{repo}/contents/{path}?ref={branch}"), None)
            .is_ok()
    }
}

impl SourceControlClient for GithubClient {
    fn default_branch(&self, repo: &str) -> String {
        self.call("GET", &format!("/repos/{}/{repo}", self.owner), None)
            .ok()
            .and_then(|data| {
                data.get("default_branch").and_then(Value::as_str).map(str::to_string)
            })
            .unwrap_or_else(|| self.default_branch_fallback.clone())
    }

    fn create_pr_with_notes(&self, request: &PrNotesRequest) -> Result<PrRefs, ProviderError> {
        let default_branch = self.default_branch(&request.repo);
        let base_sha = self.ref_sha(&request.repo, &default_branch)?;
        let branch_existed =
            self.create_branch(&request.repo, &request.branch_name, &base_sha)?;
        let commit_sha = self.put_file(
            &request.repo,
            &request.branch_name,
            &request.file_path,
            &request.file_content,
            &request.commit_message,
        )?;

        if branch_existed
            && let Some(existing) = self.find_open_pr(&request.repo, &request.branch_name)
        {
            return Ok(PrRefs {
                owner: self.owner.clone(),
                repo: request.repo.clone(),
                branch: request.branch_name.clone(),
                default_branch,
                pr_url: existing
                    .get("html_url")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                pr_number: existing.get("number").and_then(Value::as_u64).unwrap_or_default(),
                commit_sha,
                reused_pr: true,
            });
        }

        let body = json!({
            "title": request.pr_title,
            "body": request.pr_body,
            "head": request.branch_name,
            "base": default_branch,
        });
        let created =
            self.call("POST", &format!("/repos/{}/{}/pulls", self.owner, request.repo), Some(&body))?;
        Ok(PrRefs {
            owner: self.owner.clone(),
            repo: request.repo.clone(),
            branch: request.branch_name.clone(),
            default_branch,
            pr_url: created
                .get("html_url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            pr_number: created.get("number").and_then(Value::as_u64).unwrap_or_default(),
            commit_sha,
            reused_pr: false,
        })
    }
}

/// Dry-run source-control client with deterministic PR numbers.
#[derive(Debug)]
pub struct DryRunSourceControl {
    /// Repository owner used in fake URLs.
    owner: String,
    /// PR counter.
    counter: AtomicU64,
    /// Recorded requests for assertions.
    requests: Mutex<Vec<PrNotesRequest>>,
}

impl DryRunSourceControl {
    /// Creates a dry-run client for one owner.
    #[must_use]
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            counter: AtomicU64::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns a copy of every recorded request.
    #[must_use]
    pub fn recorded(&self) -> Vec<PrNotesRequest> {
        self.requests.lock().map_or_else(|_| Vec::new(), |guard| guard.clone())
    }
}

impl FileChecker for DryRunSourceControl {
    fn file_exists(&self, _repo_full_name: &str, _path: &str) -> bool {
        true
    }
}

impl SourceControlClient for DryRunSourceControl {
    fn default_branch(&self, _repo: &str) -> String {
        "main".to_string()
    }

    fn create_pr_with_notes(&self, request: &PrNotesRequest) -> Result<PrRefs, ProviderError> {
        if let Ok(mut guard) = self.requests.lock() {
            guard.push(request.clone());
        }
        let count = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PrRefs {
            owner: self.owner.clone(),
            repo: request.repo.clone(),
            branch: request.branch_name.clone(),
            default_branch: "main".to_string(),
            pr_url: format!("https://github.com/{}/{}/pull/{count}", self.owner, request.repo),
            pr_number: count,
            commit_sha: format!("dryrun-sha-{count}"),
            reused_pr: false,
        })
    }
}
