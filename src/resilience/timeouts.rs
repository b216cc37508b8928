//! Timeout enforcement.
//!
//! Every probe and forward attempt goes through [`with_timeout`], so a hung
//! machine can only cost one request its configured deadline.

use std::future::Future;
use std::time::Duration;

/// The deadline passed before the operation completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed(pub Duration);

impl std::fmt::Display for Elapsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timed out after {}ms", self.0.as_millis())
    }
}

impl std::error::Error for Elapsed {}

/// Run `fut` with a deadline of `limit`.
pub async fn with_timeout<F, T>(limit: Duration, fut: F) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, fut).await.map_err(|_| Elapsed(limit))
}
