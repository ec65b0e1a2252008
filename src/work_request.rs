//! Issues a write-API call, awaits the returned work request to a
//! terminal state, and on success applies a local patch to the
//! in-memory live-LB view so later diff steps in the same reconcile see
//! it without an extra fetch. Grounded on the commented-out
//! `AwaitLoadbalancerWorkRequest` sketch in
//! `original_source/pkg/oci/client/client.go` and
//! `original_source/src/manager/manager.go`'s `awaitRequest`.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::lb_client::{LbClient, WorkRequestState};

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A reconcile-scoped cancellation signal. Cloning shares the same
/// underlying flag; firing it (via the paired sender) cancels every
/// in-flight `drive` call that holds a receiver.
pub type CancellationToken = watch::Receiver<bool>;

/// Issues `work_request_id` polling at `POLL_INTERVAL` until it reaches
/// `Succeeded` (then runs `on_success`) or `Failed` (surfaced as an
/// error). Returns `Error::Canceled` without running `on_success` if
/// `cancel` fires mid-poll.
pub async fn drive<F, Fut>(
    client: &dyn LbClient,
    work_request_id: &str,
    cancel: &mut CancellationToken,
    on_success: F,
) -> Result<()>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        if *cancel.borrow() {
            return Err(Error::Canceled);
        }
        let wr = client.get_work_request(work_request_id).await?;
        match wr.state {
            WorkRequestState::Succeeded => {
                on_success().await;
                return Ok(());
            }
            WorkRequestState::Failed => {
                return Err(Error::Retryable(format!(
                    "work request {work_request_id} failed: {}",
                    wr.message.unwrap_or_default()
                )));
            }
            WorkRequestState::InProgress => {
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    _ = cancel.changed() => {
                        if *cancel.borrow() {
                            return Err(Error::Canceled);
                        }
                    }
                }
            }
        }
    }
}
