//! Cancellation-aware wrapper for in-flight transport calls.

use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::error::{GangwayError, Result};

/// Race a transport call against the governing cancellation signal.
///
/// Cancellation wins ties, so an already-cancelled token aborts before the
/// call is even polled.
pub(crate) async fn racing_cancel<T>(
    cancel: &CancellationToken,
    call: Pin<Box<dyn Future<Output = Result<T>> + Send + '_>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GangwayError::Cancelled),
        result = call => result,
    }
}
