//! Story sync between devices
//!
//! Request handling only: the host decodes a [`SyncRequest`], passes it to
//! [`SyncHandler::handle`] with the caller's address, and sends the [`SyncResponse`] back.
//! Stories travel as export JSON, so a pull is an export and a push is an import.
//!
//! Requests authenticate with either the full token or its six-digit connect code. A
//! client that fails [`MAX_AUTH_FAILURES`] times is refused until [`AUTH_BLOCK`] has passed
//! since its last failure.

use crate::branch::BranchManager;
use crate::error::{BranchError, ImportError, StorageError};
use crate::import::{export_story, Importer};
use crate::store::{BranchScope, StoryStore};
use crate::story::{new_id, Story, StoryEntry};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const MAX_AUTH_FAILURES: u32 = 5;
pub const AUTH_BLOCK: Duration = Duration::from_secs(60);

/// Summary of a story offered for sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStoryPreview {
    pub id: String,
    pub title: String,
    pub genre: Option<String>,
    pub updated_at: i64,
    pub entry_count: usize,
}

impl SyncStoryPreview {
    fn from_story(story: &Story, entry_count: usize) -> Self {
        Self {
            id: story.id.clone(),
            title: story.title.clone(),
            genre: story.genre.clone(),
            updated_at: story.updated_at,
            entry_count,
        }
    }

    /// Preview of an export file without importing it. Only `story` is required; missing
    /// story fields fall back to empty values.
    pub fn from_export_json(json: &str) -> Result<Self, ImportError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ImportError::MalformedJson(e.to_string()))?;
        let story = value
            .get("story")
            .ok_or(ImportError::MissingField("story"))?;
        let text = |key: &str| {
            story
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        Ok(Self {
            id: text("id").unwrap_or_default(),
            title: text("title").unwrap_or_else(|| "Untitled".to_string()),
            genre: text("genre"),
            updated_at: story
                .get("updatedAt")
                .and_then(|v| v.as_i64())
                .unwrap_or(0),
            entry_count: value
                .get("entries")
                .and_then(|v| v.as_array())
                .map_or(0, Vec::len),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub token: String,
    pub action: SyncAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncAction {
    ListStories,
    PullStory { story_id: String },
    /// `story_data` is export JSON.
    PushStory { story_data: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncResponse {
    StoriesList { stories: Vec<SyncStoryPreview> },
    StoryData { data: String },
    Success { message: String },
    Error { message: String },
}

impl SyncResponse {
    fn error(message: impl Into<String>) -> Self {
        SyncResponse::Error {
            message: message.into(),
        }
    }
}

/// Six-digit code derived from the first eight hex digits of `token`.
pub fn connect_code(token: &str) -> String {
    let digits: String = token.chars().filter(|c| *c != '-').take(8).collect();
    let value = u32::from_str_radix(&digits, 16).unwrap_or(0);
    format!("{:06}", value % 1_000_000)
}

/// Accepts the full token or its connect code.
pub fn validate_token(presented: &str, token: &str) -> bool {
    presented == token || presented == connect_code(token)
}

#[derive(Debug, Clone, Copy)]
struct Failures {
    count: u32,
    last: Instant,
}

pub struct SyncHandler<S: StoryStore> {
    token: String,
    branches: BranchManager<S>,
    failures: Mutex<HashMap<String, Failures>>,
}

impl<S: StoryStore> SyncHandler<S> {
    /// Handler with a freshly generated token.
    pub fn new(branches: BranchManager<S>) -> Self {
        Self::with_token(branches, new_id())
    }

    pub fn with_token(branches: BranchManager<S>, token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            branches,
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn connect_code(&self) -> String {
        connect_code(&self.token)
    }

    pub fn handle(&self, client: &str, request: &SyncRequest) -> SyncResponse {
        self.handle_at(client, request, Instant::now())
    }

    fn handle_at(&self, client: &str, request: &SyncRequest, now: Instant) -> SyncResponse {
        if let Some(wait) = self.blocked_for(client, now) {
            return SyncResponse::error(format!(
                "Too many failed attempts. Try again in {} seconds.",
                wait.as_secs().max(1)
            ));
        }
        if !validate_token(&request.token, &self.token) {
            self.record_failure(client, now);
            warn!(client, "Sync request with invalid token");
            return SyncResponse::error("Invalid authentication token");
        }
        self.failures.lock().remove(client);

        match &request.action {
            SyncAction::ListStories => match self.list_previews() {
                Ok(stories) => {
                    info!(
                        client,
                        stories = stories.len(),
                        "Sync client listed stories"
                    );
                    SyncResponse::StoriesList { stories }
                }
                Err(err) => SyncResponse::error(err.to_string()),
            },
            SyncAction::PullStory { story_id } => self.pull(client, story_id),
            SyncAction::PushStory { story_data } => self.push(client, story_data),
        }
    }

    /// One preview per stored story, most recently updated first.
    pub fn list_previews(&self) -> Result<Vec<SyncStoryPreview>, StorageError> {
        let store = self.branches.store();
        let mut previews = store
            .list_stories()?
            .iter()
            .map(|story| -> Result<SyncStoryPreview, StorageError> {
                let entries: Vec<StoryEntry> = store.list_records(&story.id, BranchScope::All)?;
                Ok(SyncStoryPreview::from_story(story, entries.len()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        previews.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(previews)
    }

    fn pull(&self, client: &str, story_id: &str) -> SyncResponse {
        let export = match export_story(self.branches.store(), story_id) {
            Ok(export) => export,
            Err(BranchError::StoryNotFound(_)) => {
                return SyncResponse::error(format!("Story not found: {}", story_id))
            }
            Err(err) => return SyncResponse::error(err.to_string()),
        };
        match export.to_json_pretty() {
            Ok(data) => {
                info!(client, story_id, title = %export.story.title, "Sent story to sync client");
                SyncResponse::StoryData { data }
            }
            Err(err) => SyncResponse::error(err.to_string()),
        }
    }

    fn push(&self, client: &str, story_data: &str) -> SyncResponse {
        match Importer::new(self.branches.clone()).import_json(story_data) {
            Ok(report) => {
                info!(client, story_id = %report.story_id, "Received story from sync client");
                SyncResponse::Success {
                    message: format!(
                        "Imported story {} ({} entries)",
                        report.story_id, report.entries
                    ),
                }
            }
            Err(err) => {
                warn!(client, error = %err, "Rejected pushed story");
                SyncResponse::error(err.to_string())
            }
        }
    }

    fn blocked_for(&self, client: &str, now: Instant) -> Option<Duration> {
        let failures = self.failures.lock();
        let record = failures.get(client)?;
        let elapsed = now.saturating_duration_since(record.last);
        (record.count >= MAX_AUTH_FAILURES && elapsed < AUTH_BLOCK).then(|| AUTH_BLOCK - elapsed)
    }

    fn record_failure(&self, client: &str, now: Instant) {
        let mut failures = self.failures.lock();
        let record = failures.entry(client.to_string()).or_insert(Failures {
            count: 0,
            last: now,
        });
        if now.saturating_duration_since(record.last) >= AUTH_BLOCK {
            record.count = 0;
        }
        record.count += 1;
        record.last = now;
    }
}
