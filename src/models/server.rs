//! Server model: one remote tracker account/endpoint.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A configured remote tracker account.
///
/// Servers own repos and are created/removed by configuration, never by a
/// sync pass.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Server {
    /// Local server ID.
    pub id: i64,

    /// Human-readable label for the account.
    pub label: String,

    /// Login of the authenticated viewer on this server.
    pub viewer_login: Option<String>,

    /// Numeric user id of the viewer.
    pub viewer_id: Option<i64>,

    /// Whether the stored credentials are still valid.
    pub auth_valid: bool,

    /// Row creation timestamp (Unix).
    pub created_at: i64,
}

/// The viewer identity used for classification and read-state.
///
/// Immutable for the duration of a pass; comparisons prefer the numeric id
/// and fall back to login when the remote record omits ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub login: String,
    pub id: i64,
}

impl Viewer {
    /// Whether a (login, id) pair from a record refers to the viewer.
    pub fn matches(&self, login: Option<&str>, id: Option<i64>) -> bool {
        match id {
            Some(id) => id == self.id,
            None => login.is_some_and(|l| l == self.login),
        }
    }
}

impl Server {
    /// Viewer identity for this server, if it has completed authentication.
    pub fn viewer(&self) -> Option<Viewer> {
        match (&self.viewer_login, self.viewer_id) {
            (Some(login), Some(id)) => Some(Viewer {
                login: login.clone(),
                id,
            }),
            _ => None,
        }
    }
}

/// Insert a server row, returning its id.
pub async fn insert_server(
    pool: &sqlx::SqlitePool,
    label: &str,
    viewer_login: &str,
    viewer_id: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO servers (label, viewer_login, viewer_id) VALUES (?, ?, ?) RETURNING id",
    )
    .bind(label)
    .bind(viewer_login)
    .bind(viewer_id)
    .fetch_one(pool)
    .await
}

/// List all servers.
pub async fn get_servers(pool: &sqlx::SqlitePool) -> Result<Vec<Server>, sqlx::Error> {
    sqlx::query_as::<_, Server>(
        "SELECT id, label, viewer_login, viewer_id, auth_valid, created_at FROM servers ORDER BY id",
    )
    .fetch_all(pool)
    .await
}

/// Look up a server by id.
pub async fn get_server(
    pool: &sqlx::SqlitePool,
    server_id: i64,
) -> Result<Option<Server>, sqlx::Error> {
    sqlx::query_as::<_, Server>(
        "SELECT id, label, viewer_login, viewer_id, auth_valid, created_at FROM servers WHERE id = ?",
    )
    .bind(server_id)
    .fetch_optional(pool)
    .await
}

/// Flag a server's credentials as valid or invalid.
pub async fn set_auth_valid(
    pool: &sqlx::SqlitePool,
    server_id: i64,
    valid: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE servers SET auth_valid = ? WHERE id = ?")
        .bind(valid)
        .bind(server_id)
        .execute(pool)
        .await?;
    Ok(())
}
