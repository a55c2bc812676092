//! Data models for the cached object graph.
//!
//! These models represent the entities stored in the local SQLite database.
//! All models derive Serialize for structured consumers and FromRow for
//! SQLx queries; query helpers live next to their model as free async
//! functions over the pool.

pub mod comment;
pub mod item;
pub mod label;
pub mod repo;
pub mod server;

// Re-exports for convenient access
pub use comment::{Comment, CommentKind};
pub use item::{Item, ItemKind, ItemState, Section};
pub use label::Label;
pub use repo::Repo;
pub use server::{Server, Viewer};
