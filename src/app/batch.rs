use tracing::{info, warn};

use crate::app::error::AppError;
use crate::app::models::{BatchItemResult, BatchProgress, BatchSummary};

/// Applies `op` to every item in order. A failing item is recorded and the
/// batch moves on; `on_progress` fires once per item after it finishes.
pub fn run_batch<T, L, F, P>(items: &[T], label: L, mut op: F, mut on_progress: P, trace_id: &str) -> BatchSummary
where
    L: Fn(&T) -> String,
    F: FnMut(&T) -> Result<String, AppError>,
    P: FnMut(BatchProgress),
{
    let total = items.len();
    let mut results = Vec::with_capacity(total);
    let mut success_count = 0;

    for (index, item) in items.iter().enumerate() {
        let identifier = label(item);
        let result = match op(item) {
            Ok(message) => {
                success_count += 1;
                BatchItemResult {
                    identifier: identifier.clone(),
                    success: true,
                    message,
                }
            }
            Err(err) => {
                warn!(trace_id = %trace_id, item = %identifier, error = %err, "batch item failed");
                BatchItemResult {
                    identifier: identifier.clone(),
                    success: false,
                    message: err.error,
                }
            }
        };
        results.push(result);
        on_progress(BatchProgress {
            completed: index + 1,
            total,
            current: identifier,
        });
    }

    let summary = BatchSummary {
        results,
        success_count,
        total,
    };
    info!(trace_id = %trace_id, "{}", summary.summary_line());
    summary
}
