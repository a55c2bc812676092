//! Ultra Tracker - Local-first issue and pull request tracker.
//!
//! Mirrors the open items of tracked repositories into a local SQLite
//! store, classifies each item into a review section, and keeps per-item
//! unread counts so the UI layer can render sections and badges without
//! touching the network.

pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use db::pool::DbPool;
pub use error::AppError;
