//! Repository model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A tracked repository on one server.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Repo {
    /// Local repo ID.
    pub id: i64,

    /// Owning server ID.
    pub server_id: i64,

    /// Remote repository id.
    pub remote_id: i64,

    /// Full name (e.g., "owner/name").
    pub full_name: String,

    /// Whether pull requests are synced for this repo.
    pub track_prs: bool,

    /// Whether issues are synced for this repo.
    pub track_issues: bool,

    /// Hidden repos keep their items out of every section and badge.
    pub hidden: bool,
}

/// Insert a repo row, returning its id.
pub async fn insert_repo(
    pool: &sqlx::SqlitePool,
    server_id: i64,
    remote_id: i64,
    full_name: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO repos (server_id, remote_id, full_name) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(server_id)
    .bind(remote_id)
    .bind(full_name)
    .fetch_one(pool)
    .await
}

/// Look up a repo by (server, remote id).
pub async fn get_repo_by_remote(
    pool: &sqlx::SqlitePool,
    server_id: i64,
    remote_id: i64,
) -> Result<Option<Repo>, sqlx::Error> {
    sqlx::query_as::<_, Repo>(
        "SELECT id, server_id, remote_id, full_name, track_prs, track_issues, hidden
         FROM repos WHERE server_id = ? AND remote_id = ?",
    )
    .bind(server_id)
    .bind(remote_id)
    .fetch_optional(pool)
    .await
}

/// Look up a repo by local id.
pub async fn get_repo(pool: &sqlx::SqlitePool, repo_id: i64) -> Result<Option<Repo>, sqlx::Error> {
    sqlx::query_as::<_, Repo>(
        "SELECT id, server_id, remote_id, full_name, track_prs, track_issues, hidden
         FROM repos WHERE id = ?",
    )
    .bind(repo_id)
    .fetch_optional(pool)
    .await
}

/// List all repos for a server.
pub async fn get_repos_for_server(
    pool: &sqlx::SqlitePool,
    server_id: i64,
) -> Result<Vec<Repo>, sqlx::Error> {
    sqlx::query_as::<_, Repo>(
        "SELECT id, server_id, remote_id, full_name, track_prs, track_issues, hidden
         FROM repos WHERE server_id = ? ORDER BY full_name",
    )
    .bind(server_id)
    .fetch_all(pool)
    .await
}

/// Update the interest flags on a repo.
pub async fn set_tracking(
    pool: &sqlx::SqlitePool,
    repo_id: i64,
    track_prs: bool,
    track_issues: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE repos SET track_prs = ?, track_issues = ? WHERE id = ?")
        .bind(track_prs)
        .bind(track_issues)
        .bind(repo_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Hide or unhide a repo.
pub async fn set_hidden(
    pool: &sqlx::SqlitePool,
    repo_id: i64,
    hidden: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE repos SET hidden = ? WHERE id = ?")
        .bind(hidden)
        .bind(repo_id)
        .execute(pool)
        .await?;
    Ok(())
}
