//! Item model: a pull request or issue, the primary trackable unit.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Kind of a trackable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    PullRequest,
    Issue,
}

impl ItemKind {
    /// Column value for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PullRequest => "pull_request",
            Self::Issue => "issue",
        }
    }
}

impl From<&str> for ItemKind {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pull_request" => Self::PullRequest,
            _ => Self::Issue,
        }
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Open,
    Closed,
    Merged,
}

impl From<&str> for ItemState {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "merged" => Self::Merged,
            "closed" => Self::Closed,
            _ => Self::Open,
        }
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Merged => write!(f, "merged"),
        }
    }
}

/// Display section an item is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Mine,
    Participated,
    Merged,
    Closed,
    All,
    Snoozed,
    /// Items of hidden repos; never listed, never badged.
    Hidden,
}

impl Section {
    /// Column value for this section.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mine => "mine",
            Self::Participated => "participated",
            Self::Merged => "merged",
            Self::Closed => "closed",
            Self::All => "all",
            Self::Snoozed => "snoozed",
            Self::Hidden => "hidden",
        }
    }

    /// Menu title for the section.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Mine => "Mine",
            Self::Participated => "Participated",
            Self::Merged => "Recently Merged",
            Self::Closed => "Recently Closed",
            Self::All => "All",
            Self::Snoozed => "Snoozed",
            Self::Hidden => "Hidden",
        }
    }
}

impl From<&str> for Section {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "mine" => Self::Mine,
            "participated" => Self::Participated,
            "merged" => Self::Merged,
            "closed" => Self::Closed,
            "snoozed" => Self::Snoozed,
            "hidden" => Self::Hidden,
            _ => Self::All,
        }
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A cached pull request or issue.
///
/// `section`, `unread_count`, `reopened`, and `new_assignment` are derived
/// columns maintained by the classifier and read-state tracker; they are
/// caches over the stored graph, never their own source of truth.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Item {
    /// Local item ID.
    pub id: i64,

    /// Owning repo ID.
    pub repo_id: i64,

    /// Remote item id, unique within (repo, kind).
    pub remote_id: i64,

    /// Item kind: `pull_request` or `issue`.
    pub kind: String,

    /// Repo-scoped number.
    pub number: Option<i64>,

    /// Title.
    pub title: Option<String>,

    /// Body (Markdown).
    pub body: Option<String>,

    /// Current state: `open`, `closed`, `merged`.
    pub state: String,

    /// Author login.
    pub author_login: Option<String>,

    /// Author numeric id.
    pub author_id: Option<i64>,

    /// Assignee login, if assigned.
    pub assignee_login: Option<String>,

    /// Assignee numeric id, if assigned.
    pub assignee_id: Option<i64>,

    /// Whether the item is assigned to the viewer.
    pub assigned_to_viewer: bool,

    /// Muted items keep syncing but never contribute to badges.
    pub muted: bool,

    /// Snoozed items sit in the Snoozed section until woken.
    pub snoozed: bool,

    /// Derived display section.
    pub section: String,

    /// Derived unread comment count.
    pub unread_count: i64,

    /// Set when the item went closed/merged -> open between passes.
    pub reopened: bool,

    /// Set when the item was newly assigned to the viewer this pass.
    pub new_assignment: bool,

    /// Remote creation timestamp (Unix).
    pub created_at: i64,

    /// Remote last-update timestamp (Unix).
    pub updated_at: i64,

    /// Read watermark: comments newer than this count as unread.
    pub last_read_at: i64,

    /// When this row was last written by a sync pass (Unix).
    pub cached_at: i64,
}

impl Item {
    /// Parse the kind string into an enum.
    pub fn kind_enum(&self) -> ItemKind {
        ItemKind::from(self.kind.as_str())
    }

    /// Parse the state string into an enum.
    pub fn state_enum(&self) -> ItemState {
        ItemState::from(self.state.as_str())
    }

    /// Parse the section string into an enum.
    pub fn section_enum(&self) -> Section {
        Section::from(self.section.as_str())
    }

    /// Check if the item is open.
    pub fn is_open(&self) -> bool {
        self.state_enum() == ItemState::Open
    }
}

const ITEM_COLUMNS: &str = "id, repo_id, remote_id, kind, number, title, body, state, \
     author_login, author_id, assignee_login, assignee_id, assigned_to_viewer, \
     muted, snoozed, section, unread_count, reopened, new_assignment, \
     created_at, updated_at, last_read_at, cached_at";

/// Look up an item by local id.
pub async fn get_item(pool: &sqlx::SqlitePool, item_id: i64) -> Result<Option<Item>, sqlx::Error> {
    sqlx::query_as::<_, Item>(&format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?"))
        .bind(item_id)
        .fetch_optional(pool)
        .await
}

/// Unique lookup by (repo, remote id, kind).
pub async fn get_item_by_remote(
    pool: &sqlx::SqlitePool,
    repo_id: i64,
    remote_id: i64,
    kind: ItemKind,
) -> Result<Option<Item>, sqlx::Error> {
    sqlx::query_as::<_, Item>(&format!(
        "SELECT {ITEM_COLUMNS} FROM items WHERE repo_id = ? AND remote_id = ? AND kind = ?"
    ))
    .bind(repo_id)
    .bind(remote_id)
    .bind(kind.as_str())
    .fetch_optional(pool)
    .await
}

/// All items of one kind in one repo.
pub async fn get_items_for_repo(
    pool: &sqlx::SqlitePool,
    repo_id: i64,
    kind: ItemKind,
) -> Result<Vec<Item>, sqlx::Error> {
    sqlx::query_as::<_, Item>(&format!(
        "SELECT {ITEM_COLUMNS} FROM items WHERE repo_id = ? AND kind = ? ORDER BY updated_at DESC"
    ))
    .bind(repo_id)
    .bind(kind.as_str())
    .fetch_all(pool)
    .await
}

/// All items currently classified into a section.
pub async fn get_items_in_section(
    pool: &sqlx::SqlitePool,
    section: Section,
) -> Result<Vec<Item>, sqlx::Error> {
    sqlx::query_as::<_, Item>(&format!(
        "SELECT {ITEM_COLUMNS} FROM items WHERE section = ? ORDER BY updated_at DESC"
    ))
    .bind(section.as_str())
    .fetch_all(pool)
    .await
}

/// Delete an item and its comments and labels.
///
/// Cascade is explicit and transactional so an observer never sees an item
/// with half its children gone.
pub async fn delete_cascading(pool: &sqlx::SqlitePool, item_id: i64) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM comments WHERE item_id = ?")
        .bind(item_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM labels WHERE item_id = ?")
        .bind(item_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM items WHERE id = ?")
        .bind(item_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await
}

/// Set or clear the mute flag.
pub async fn set_muted(
    pool: &sqlx::SqlitePool,
    item_id: i64,
    muted: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE items SET muted = ? WHERE id = ?")
        .bind(muted)
        .bind(item_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Set or clear the snooze flag.
pub async fn set_snoozed(
    pool: &sqlx::SqlitePool,
    item_id: i64,
    snoozed: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE items SET snoozed = ? WHERE id = ?")
        .bind(snoozed)
        .bind(item_id)
        .execute(pool)
        .await?;
    Ok(())
}
