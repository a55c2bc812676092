//! Label model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A label attached to an item.
///
/// Labels are owned by their item and replaced wholesale by the per-item
/// mark-and-sweep during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Label {
    /// Local label ID.
    pub id: i64,

    /// Owning item ID.
    pub item_id: i64,

    /// Label name, unique within the item.
    pub name: String,

    /// Hex color, if the remote supplies one.
    pub color: Option<String>,
}

/// All labels on an item, sorted by name.
pub async fn get_labels_for_item(
    pool: &sqlx::SqlitePool,
    item_id: i64,
) -> Result<Vec<Label>, sqlx::Error> {
    sqlx::query_as::<_, Label>(
        "SELECT id, item_id, name, color FROM labels WHERE item_id = ? ORDER BY name",
    )
    .bind(item_id)
    .fetch_all(pool)
    .await
}
