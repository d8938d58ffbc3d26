use futures::future::{self, Either};
use tracing::{debug, warn};

use crate::{
    cancel::CancelSignal,
    demux::BatchResponse,
    family::{Family, Fetch},
    outcome::LoadError,
};

/// Call the upstream once per batch, all batches concurrently, and pair each
/// batch with its result.
///
/// Batches fail independently: one failed call never affects another
/// batch's result. Nothing is retried. If `cancel` fires, every call still
/// in flight is abandoned and its batch fails with
/// [`LoadError::Cancelled`].
pub async fn dispatch<F, X>(
    fetcher: &X,
    batches: Vec<F::Batch>,
    cancel: &CancelSignal,
) -> Vec<BatchResponse<F>>
where
    F: Family,
    X: Fetch<F> + ?Sized,
{
    let results = future::join_all(
        batches
            .iter()
            .map(|batch| call_batch::<F, X>(fetcher, batch, cancel)),
    )
    .await;

    batches.into_iter().zip(results).collect()
}

async fn call_batch<F, X>(
    fetcher: &X,
    batch: &F::Batch,
    cancel: &CancelSignal,
) -> Result<F::Payload, LoadError>
where
    F: Family,
    X: Fetch<F> + ?Sized,
{
    match future::select(fetcher.fetch(batch, cancel), cancel.cancelled()).await {
        Either::Left((Ok(payload), _)) => Ok(payload),
        Either::Left((Err(err), _)) => {
            warn!(?batch, error = %err, "batch call failed");
            Err(err.into())
        }
        Either::Right(((), _)) => {
            debug!(?batch, "batch call cancelled");
            Err(LoadError::Cancelled)
        }
    }
}
