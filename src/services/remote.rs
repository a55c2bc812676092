//! Decoded remote records and the record source seam.
//!
//! The engine never talks to the network. A [`RecordSource`] hands it
//! already-paginated, already-decoded records; everything here is plain
//! data plus the parsing helpers the reconciler needs.

use crate::error::AppError;
use crate::models::{ItemKind, ItemState, Repo, Server};

use serde::{Deserialize, Serialize};

/// Remote user reference as it appears inside item and comment records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Option<i64>,
    pub login: Option<String>,
}

/// Decoded label record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelRecord {
    pub name: Option<String>,
    pub color: Option<String>,
}

/// Decoded pull request or issue record.
///
/// `id` is optional because malformed records must be skippable, not fatal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Remote item id.
    pub id: Option<i64>,

    /// Repo-scoped number.
    pub number: Option<i64>,

    pub title: Option<String>,
    pub body: Option<String>,

    /// Remote state string: `open`, `closed`, `merged`.
    pub state: Option<String>,

    /// Set for pull requests the remote reports as merged while the state
    /// string still says `closed`.
    #[serde(default)]
    pub merged: bool,

    pub user: Option<UserRecord>,
    pub assignee: Option<UserRecord>,

    #[serde(default)]
    pub labels: Vec<LabelRecord>,

    /// ISO-8601 creation timestamp.
    pub created_at: Option<String>,

    /// ISO-8601 last-update timestamp.
    pub updated_at: Option<String>,

    /// Issue endpoints report pull requests as issues carrying this stub.
    /// Such shadows are synced on the pull request path only.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl ItemRecord {
    /// Whether this is an issue record that is really a pull request.
    pub fn is_pull_request_shadow(&self) -> bool {
        self.pull_request.is_some()
    }

    /// Effective state, folding the merged flag into the state string.
    pub fn effective_state(&self) -> ItemState {
        if self.merged {
            return ItemState::Merged;
        }
        self.state.as_deref().map(ItemState::from).unwrap_or(ItemState::Open)
    }
}

/// Decoded comment record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentRecord {
    /// Remote comment id.
    pub id: Option<i64>,

    /// Comment kind: `issue_comment`, `review_comment`, `review`.
    pub kind: Option<String>,

    pub user: Option<UserRecord>,
    pub body: Option<String>,

    /// ISO-8601 creation timestamp.
    pub created_at: Option<String>,
}

/// Upstream collaborator that yields decoded records per sync pass.
///
/// Implementations own pagination, retries, and transport; the engine only
/// sees complete per-repo batches. Fetch futures must be `Send` so the
/// background sync task can drive them.
pub trait RecordSource: Send + Sync {
    /// Fetch every current item of one kind in one repo.
    fn fetch_items(
        &self,
        server: &Server,
        repo: &Repo,
        kind: ItemKind,
    ) -> impl std::future::Future<Output = Result<Vec<ItemRecord>, AppError>> + Send;

    /// Fetch every current comment on one item.
    fn fetch_comments(
        &self,
        server: &Server,
        repo: &Repo,
        kind: ItemKind,
        item_number: i64,
    ) -> impl std::future::Future<Output = Result<Vec<CommentRecord>, AppError>> + Send;
}

/// Parse an ISO 8601 timestamp to a Unix timestamp, 0 on garbage.
pub fn parse_iso_timestamp(s: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp())
        .unwrap_or(0)
}

/// Parse an optional ISO 8601 timestamp, 0 when absent.
pub fn parse_opt_timestamp(s: Option<&str>) -> i64 {
    s.map(parse_iso_timestamp).unwrap_or(0)
}
