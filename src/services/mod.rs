pub mod bulk;
pub mod classifier;
pub mod read_state;
pub mod reconciler;
pub mod remote;
pub mod sync_engine;

/// Current unix timestamp in seconds.
pub(crate) fn now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
