//! Timeout enforcement.
//!
//! Every external call made by the relay has a deadline. Timed-out futures
//! are dropped, which cancels them; late results are never observed.

use std::future::Future;
use std::time::Duration;

/// Outcome of a deadline-bounded call.
#[derive(Debug, PartialEq, Eq)]
pub enum Deadline<T> {
    Completed(T),
    Elapsed,
}

/// Run `fut` under `limit`.
pub async fn with_deadline<F, T>(limit: Duration, fut: F) -> Deadline<T>
where
    F: Future<Output = T>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(value) => Deadline::Completed(value),
        Err(_) => Deadline::Elapsed,
    }
}
