// crates/opsrunbook-review/src/host.rs
// ============================================================================
// Module: Review Repo Host
// Description: Source-control capability for the PR review cycle.
// Purpose: Read PR context and commit bounded fixes behind one narrow trait.
// Dependencies: base64, reqwest, serde_json
// ============================================================================

//! ## Overview
//! The review cycle needs five host operations: fetch PR metadata, list its
//! files, fetch one file at a ref, put one file on a branch, and post one
//! comment. The production client speaks the REST API over bounded blocking
//! HTTP; the in-memory host backs tests and dry-run wiring with a canned
//! repository and a deterministic commit counter.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::blocking::Client;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Repo host call errors.
#[derive(Debug, Error)]
pub enum HostError {
    /// The client could not be constructed.
    #[error("repo host build failed: {0}")]
    Build(String),
    /// The host rejected the request.
    #[error("repo host error {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// First bytes of the error body.
        body: String,
    },
    /// The call failed before a response arrived.
    #[error("repo host request failed: {0}")]
    Request(String),
    /// The response could not be decoded.
    #[error("repo host response invalid: {0}")]
    Decode(String),
}

// ============================================================================
// SECTION: Host Types
// ============================================================================

/// Pull request metadata used by the guardrails and context steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrInfo {
    /// PR title.
    pub title: String,
    /// PR body.
    pub body: String,
    /// PR state (`open`, `closed`).
    pub state: String,
    /// Head branch name.
    pub head_ref: String,
    /// Head commit sha.
    pub head_sha: String,
    /// Base branch name.
    pub base_ref: String,
    /// Label names.
    pub labels: Vec<String>,
    /// PR author login.
    pub user_login: String,
}

/// One changed file on a pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrFile {
    /// File path.
    pub filename: String,
    /// Change status (`modified`, `added`, ...).
    pub status: String,
    /// Unified-diff patch excerpt.
    pub patch: String,
}

/// One file fetched at a specific ref.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAtRef {
    /// Decoded file text.
    pub text: String,
    /// File content sha.
    pub sha: String,
}

/// Posted-comment keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommentRefs {
    /// Comment URL.
    pub url: String,
    /// Comment identifier.
    pub id: u64,
}

// ============================================================================
// SECTION: Host Trait
// ============================================================================

/// Narrow source-control capability for the review cycle.
pub trait RepoHost: Send + Sync {
    /// Fetches PR metadata.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the fetch fails.
    fn get_pr(&self, owner: &str, repo: &str, pr_number: u64) -> Result<PrInfo, HostError>;

    /// Lists changed files on a PR.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the listing fails.
    fn get_pr_files(&self, owner: &str, repo: &str, pr_number: u64)
    -> Result<Vec<PrFile>, HostError>;

    /// Fetches one file at a ref.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the file is missing or the fetch fails.
    fn get_file_at_ref(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        ref_name: &str,
    ) -> Result<FileAtRef, HostError>;

    /// Creates or updates one file on a branch, returning the commit sha.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when the commit fails.
    fn put_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
        branch: &str,
        file_sha: Option<&str>,
    ) -> Result<String, HostError>;

    /// Posts one PR comment.
    ///
    /// # Errors
    ///
    /// Returns [`HostError`] when posting fails.
    fn post_comment(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
        body: &str,
    ) -> Result<CommentRefs, HostError>;
}

// ============================================================================
// SECTION: Production Host
// ============================================================================

/// Host request timeout.
const HOST_TIMEOUT: Duration = Duration::from_secs(15);
/// Host API root.
const HOST_API: &str = "https://api.github.com";
/// PR file listing cap passed to the host.
const PR_FILES_PER_PAGE: usize = 50;

/// Production repo host over the REST API.
pub struct GithubRepoHost {
    /// Bounded blocking HTTP client.
    client: Client,
    /// Bearer token.
    token: String,
}

impl GithubRepoHost {
    /// Builds a host client from a token.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Build`] when the HTTP client cannot be built.
    pub fn new(token: &str) -> Result<Self, HostError> {
        let client = Client::builder()
            .timeout(HOST_TIMEOUT)
            .user_agent("opsrunbook-copilot/0.1")
            .build()
            .map_err(|err| HostError::Build(err.to_string()))?;
        Ok(Self {
            client,
            token: token.to_string(),
        })
    }

    /// Issues one API call and decodes the JSON response.
    fn call(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Value, HostError> {
        let url = format!("{HOST_API}{path}");
        let mut request = match method {
            "GET" => self.client.get(&url),
            "POST" => self.client.post(&url),
            "PUT" => self.client.put(&url),
            other => return Err(HostError::Request(format!("unsupported method {other}"))),
        };
        request = request
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json");
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().map_err(|err| HostError::Request(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(HostError::Status {
                status: status.as_u16(),
                body: response.text().unwrap_or_default().chars().take(800).collect(),
            });
        }
        response.json().map_err(|err| HostError::Decode(err.to_string()))
    }
}

impl RepoHost for GithubRepoHost {
    fn get_pr(&self, owner: &str, repo: &str, pr_number: u64) -> Result<PrInfo, HostError> {
        let data = self.call("GET", &format!("/repos/{owner}/{repo}/pulls/{pr_number}"), None)?;
        let field =
            |path: &str| data.pointer(path).and_then(Value::as_str).unwrap_or_default().to_string();
        Ok(PrInfo {
            title: field("/title"),
            body: field("/body"),
            state: field("/state"),
            head_ref: field("/head/ref"),
            head_sha: field("/head/sha"),
            base_ref: field("/base/ref"),
            labels: data
                .get("labels")
                .and_then(Value::as_array)
                .map(|labels| {
                    labels
                        .iter()
                        .filter_map(|label| label.get("name").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            user_login: field("/user/login"),
        })
    }

    fn get_pr_files(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
    ) -> Result<Vec<PrFile>, HostError> {
        let data = self.call(
            "GET",
            &format!("/repos/{owner}/{repo}/pulls/{pr_number}/files?per_page={PR_FILES_PER_PAGE}"),
            None,
        )?;
        let Some(items) = data.as_array() else {
            return Err(HostError::Decode("file listing is not an array".to_string()));
        };
        Ok(items
            .iter()
            .map(|item| PrFile {
                filename: item
                    .get("filename")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                status: item
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                patch: item
                    .get("patch")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect())
    }

    fn get_file_at_ref(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        ref_name: &str,
    ) -> Result<FileAtRef, HostError> {
        let data = self.call(
            "GET",
            &format!("/repos/{owner}/{repo}/contents/{path}?ref={ref_name}"),
            None,
        )?;
        let encoded = data
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .replace(['\n', '\r'], "");
        let bytes = BASE64
            .decode(encoded)
            .map_err(|err| HostError::Decode(err.to_string()))?;
        let text =
            String::from_utf8(bytes).map_err(|err| HostError::Decode(err.to_string()))?;
        Ok(FileAtRef {
            text,
            sha: data.get("sha").and_then(Value::as_str).unwrap_or_default().to_string(),
        })
    }

    fn put_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        content: &str,
        message: &str,
        branch: &str,
        file_sha: Option<&str>,
    ) -> Result<String, HostError> {
        let mut body = json!({
            "message": message,
            "content": BASE64.encode(content),
            "branch": branch,
        });
        if let (Some(sha), Some(map)) = (file_sha, body.as_object_mut()) {
            map.insert("sha".to_string(), Value::String(sha.to_string()));
        }
        let data =
            self.call("PUT", &format!("/repos/{owner}/{repo}/contents/{path}"), Some(&body))?;
        Ok(data
            .pointer("/commit/sha")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    fn post_comment(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
        body: &str,
    ) -> Result<CommentRefs, HostError> {
        let data = self.call(
            "POST",
            &format!("/repos/{owner}/{repo}/issues/{pr_number}/comments"),
            Some(&json!({"body": body})),
        )?;
        Ok(CommentRefs {
            url: data
                .get("html_url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            id: data.get("id").and_then(Value::as_u64).unwrap_or_default(),
        })
    }
}

// ============================================================================
// SECTION: In-Memory Host
// ============================================================================

/// In-memory repo host for tests and dry-run wiring.
///
/// # Invariants
/// - Commit shas are deterministic (`commit-<n>`).
#[derive(Debug, Default)]
pub struct InMemoryRepoHost {
    /// PR metadata keyed by `(owner/repo, number)`.
    prs: Mutex<BTreeMap<(String, u64), PrInfo>>,
    /// Changed files keyed by `(owner/repo, number)`.
    pr_files: Mutex<BTreeMap<(String, u64), Vec<PrFile>>>,
    /// File contents keyed by `(owner/repo, path)`.
    files: Mutex<BTreeMap<(String, String), FileAtRef>>,
    /// Posted comments keyed by `(owner/repo, number)`.
    comments: Mutex<BTreeMap<(String, u64), Vec<String>>>,
    /// Commit counter.
    commit_counter: Mutex<u64>,
}

impl InMemoryRepoHost {
    /// Creates an empty host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cans one PR with its changed files.
    pub fn set_pr(&self, owner: &str, repo: &str, pr_number: u64, info: PrInfo, files: Vec<PrFile>) {
        let key = (format!("{owner}/{repo}"), pr_number);
        if let Ok(mut guard) = self.prs.lock() {
            guard.insert(key.clone(), info);
        }
        if let Ok(mut guard) = self.pr_files.lock() {
            guard.insert(key, files);
        }
    }

    /// Cans one file's content.
    pub fn set_file(&self, owner: &str, repo: &str, path: &str, text: &str) {
        if let Ok(mut guard) = self.files.lock() {
            let sha = format!("sha-{}", guard.len() + 1);
            guard.insert(
                (format!("{owner}/{repo}"), path.to_string()),
                FileAtRef {
                    text: text.to_string(),
                    sha,
                },
            );
        }
    }

    /// Returns the current text of one file.
    #[must_use]
    pub fn file_text(&self, owner: &str, repo: &str, path: &str) -> Option<String> {
        self.files
            .lock()
            .ok()
            .and_then(|guard| {
                guard.get(&(format!("{owner}/{repo}"), path.to_string())).map(|file| file.text.clone())
            })
    }

    /// Returns every comment posted to one PR.
    #[must_use]
    pub fn comments(&self, owner: &str, repo: &str, pr_number: u64) -> Vec<String> {
        self.comments
            .lock()
            .ok()
            .and_then(|guard| guard.get(&(format!("{owner}/{repo}"), pr_number)).cloned())
            .unwrap_or_default()
    }
}

impl RepoHost for InMemoryRepoHost {
    fn get_pr(&self, owner: &str, repo: &str, pr_number: u64) -> Result<PrInfo, HostError> {
        self.prs
            .lock()
            .map_err(|_| HostError::Request("host mutex poisoned".to_string()))?
            .get(&(format!("{owner}/{repo}"), pr_number))
            .cloned()
            .ok_or_else(|| HostError::Status {
                status: 404,
                body: format!("pr {pr_number} not found"),
            })
    }

    fn get_pr_files(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
    ) -> Result<Vec<PrFile>, HostError> {
        Ok(self
            .pr_files
            .lock()
            .map_err(|_| HostError::Request("host mutex poisoned".to_string()))?
            .get(&(format!("{owner}/{repo}"), pr_number))
            .cloned()
            .unwrap_or_default())
    }

    fn get_file_at_ref(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        _ref_name: &str,
    ) -> Result<FileAtRef, HostError> {
        self.files
            .lock()
            .map_err(|_| HostError::Request("host mutex poisoned".to_string()))?
            .get(&(format!("{owner}/{repo}"), path.to_string()))
            .cloned()
            .ok_or_else(|| HostError::Status {
                status: 404,
                body: format!("{path} not found"),
            })
    }

    fn put_file(
        &self,
        owner: &str,
        repo: &str,
        path: &str,
        content: &str,
        _message: &str,
        _branch: &str,
        _file_sha: Option<&str>,
    ) -> Result<String, HostError> {
        let mut counter = self
            .commit_counter
            .lock()
            .map_err(|_| HostError::Request("host mutex poisoned".to_string()))?;
        *counter += 1;
        let sha = format!("commit-{}", *counter);
        self.files
            .lock()
            .map_err(|_| HostError::Request("host mutex poisoned".to_string()))?
            .insert(
                (format!("{owner}/{repo}"), path.to_string()),
                FileAtRef {
                    text: content.to_string(),
                    sha: sha.clone(),
                },
            );
        Ok(sha)
    }

    fn post_comment(
        &self,
        owner: &str,
        repo: &str,
        pr_number: u64,
        body: &str,
    ) -> Result<CommentRefs, HostError> {
        let mut guard = self
            .comments
            .lock()
            .map_err(|_| HostError::Request("host mutex poisoned".to_string()))?;
        let entry = guard.entry((format!("{owner}/{repo}"), pr_number)).or_default();
        entry.push(body.to_string());
        Ok(CommentRefs {
            url: format!(
                "https://github.com/{owner}/{repo}/pull/{pr_number}#issuecomment-{}",
                entry.len()
            ),
            id: u64::try_from(entry.len()).unwrap_or(u64::MAX),
        })
    }
}
