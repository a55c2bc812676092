//! Comment model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Where a comment came from on the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    IssueComment,
    ReviewComment,
    Review,
}

impl CommentKind {
    /// Column value for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IssueComment => "issue_comment",
            Self::ReviewComment => "review_comment",
            Self::Review => "review",
        }
    }
}

impl From<&str> for CommentKind {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "review_comment" => Self::ReviewComment,
            "review" => Self::Review,
            _ => Self::IssueComment,
        }
    }
}

/// A cached comment on an item.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Comment {
    /// Local comment ID.
    pub id: i64,

    /// Owning item ID.
    pub item_id: i64,

    /// Remote comment id, unique within the item.
    pub remote_id: i64,

    /// Comment kind: `issue_comment`, `review_comment`, `review`.
    pub kind: String,

    /// Author login.
    pub author_login: Option<String>,

    /// Author numeric id.
    pub author_id: Option<i64>,

    /// Comment body (Markdown).
    pub body: Option<String>,

    /// Remote creation timestamp (Unix).
    pub created_at: i64,

    /// When this row was last written by a sync pass (Unix).
    pub cached_at: i64,
}

impl Comment {
    /// Parse the kind string into an enum.
    pub fn kind_enum(&self) -> CommentKind {
        CommentKind::from(self.kind.as_str())
    }
}

/// All comments on an item, oldest first.
pub async fn get_comments_for_item(
    pool: &sqlx::SqlitePool,
    item_id: i64,
) -> Result<Vec<Comment>, sqlx::Error> {
    sqlx::query_as::<_, Comment>(
        "SELECT id, item_id, remote_id, kind, author_login, author_id, body, created_at, cached_at
         FROM comments WHERE item_id = ? ORDER BY created_at",
    )
    .bind(item_id)
    .fetch_all(pool)
    .await
}

/// Timestamp of the newest comment on an item, if any.
pub async fn latest_comment_time(
    pool: &sqlx::SqlitePool,
    item_id: i64,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT MAX(created_at) FROM comments WHERE item_id = ?")
        .bind(item_id)
        .fetch_one(pool)
        .await
}
