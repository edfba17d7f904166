//! Concurrent phase merge.
//!
//! Both phases are polled on the calling task, so their events reach the emitter interleaved
//! in the order they are produced. The merge resolves once both finish. The first failure
//! resolves the merge immediately and drops the other phase at its current await point.

use crate::error::PipelineError;
use futures::future::try_join;
use std::future::Future;

pub async fn merge_phases<A, B, FA, FB>(left: FA, right: FB) -> Result<(A, B), PipelineError>
where
    FA: Future<Output = Result<A, PipelineError>>,
    FB: Future<Output = Result<B, PipelineError>>,
{
    try_join(left, right).await
}
