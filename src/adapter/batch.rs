use std::time::Instant;

use futures_util::future::join_all;
use tracing::info;

use super::{millis, ToolExecutionAdapter};
use crate::model::{BatchExecutionResult, BatchItemResult, BatchMode, BatchRequest, ExecutionContext};

impl ToolExecutionAdapter {
    /// Run several calls. Sequential mode runs them in order and, with
    /// `stop_on_error`, stops after the first failure. Parallel mode
    /// launches every call and waits for all of them.
    pub async fn execute_batch(&self, request: &BatchRequest, ctx: &ExecutionContext) -> BatchExecutionResult {
        let started = Instant::now();
        let results = match request.mode {
            BatchMode::Sequential => {
                let mut results = Vec::with_capacity(request.calls.len());
                for call in &request.calls {
                    let result = self.execute(&call.tool, call.args.clone(), ctx).await;
                    let failed = !result.success;
                    results.push(BatchItemResult {
                        tool: call.tool.clone(),
                        result,
                    });
                    if failed && request.stop_on_error {
                        info!(tool = %call.tool, "batch stopped after failure");
                        break;
                    }
                }
                results
            }
            BatchMode::Parallel => {
                join_all(request.calls.iter().map(|call| async move {
                    BatchItemResult {
                        tool: call.tool.clone(),
                        result: self.execute(&call.tool, call.args.clone(), ctx).await,
                    }
                }))
                .await
            }
        };

        let batch = BatchExecutionResult::from_results(results, millis(started.elapsed()));
        info!(
            mode = ?request.mode,
            succeeded = batch.success_count,
            failed = batch.failure_count,
            "batch finished"
        );
        batch
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::adapter::tests::counting_adapter;
    use crate::model::ToolCall;
    use serde_json::json;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("demo_project", "session_1").with_sequence("seq_main")
    }

    fn failing_then_ok(mode: BatchMode, stop_on_error: bool) -> BatchRequest {
        BatchRequest {
            calls: vec![
                ToolCall::new("no_such_tool", json!({})),
                ToolCall::new("get_timeline_info", json!({})),
            ],
            mode,
            stop_on_error,
        }
    }

    #[tokio::test]
    async fn sequential_stops_on_first_failure() {
        let (adapter, calls, _) = counting_adapter();
        let batch = adapter
            .execute_batch(&failing_then_ok(BatchMode::Sequential, true), &ctx())
            .await;
        assert_eq!(batch.results.len(), 1);
        assert!(!batch.success);
        assert_eq!(batch.failure_count, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sequential_without_stop_runs_everything() {
        let (adapter, calls, _) = counting_adapter();
        let batch = adapter
            .execute_batch(&failing_then_ok(BatchMode::Sequential, false), &ctx())
            .await;
        assert_eq!(batch.results.len(), 2);
        assert_eq!(batch.success_count, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn parallel_settles_every_call_in_order() {
        let (adapter, calls, _) = counting_adapter();
        let batch = adapter
            .execute_batch(&failing_then_ok(BatchMode::Parallel, true), &ctx())
            .await;
        assert_eq!(batch.results.len(), 2);
        assert_eq!(batch.results[0].tool, "no_such_tool");
        assert!(batch.results[1].result.success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
