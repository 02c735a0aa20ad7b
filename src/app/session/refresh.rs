use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use crate::app::error::AppError;
use crate::app::models::RosterUpdate;
use crate::app::session::SessionManager;

pub const ROSTER_REFRESH_EVENT: &str = "roster-refresh";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefreshEvent {
    Updated { trace_id: String, update: RosterUpdate },
    Failed { trace_id: String, error: AppError },
}

pub struct RefreshLoopHandle {
    stop_flag: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl RefreshLoopHandle {
    pub fn stop(self) {
        self.stop_flag.store(true, Ordering::Relaxed);
        let _ = self.join.join();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Refreshes the roster every `interval` until stopped. A failed refresh is
/// reported and retried on the next tick; it never touches batches or the
/// mirror session.
pub fn start_refresh_loop<E>(
    manager: Arc<SessionManager>,
    interval: Duration,
    trace_id: String,
    emit: E,
) -> RefreshLoopHandle
where
    E: Fn(RefreshEvent) + Send + 'static,
{
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_thread = Arc::clone(&stop_flag);

    let join = thread::spawn(move || {
        while !stop_thread.load(Ordering::Relaxed) {
            let event = match manager.refresh_roster(&trace_id) {
                Ok(update) => {
                    debug!(trace_id = %trace_id, devices = update.devices.len(), "roster refreshed");
                    RefreshEvent::Updated {
                        trace_id: trace_id.clone(),
                        update,
                    }
                }
                Err(error) => {
                    warn!(trace_id = %trace_id, error = %error, "roster refresh failed");
                    RefreshEvent::Failed {
                        trace_id: trace_id.clone(),
                        error,
                    }
                }
            };
            if stop_thread.load(Ordering::Relaxed) {
                break;
            }
            emit(event);
            sleep_with_stop(interval, &stop_thread);
        }
    });

    RefreshLoopHandle { stop_flag, join }
}

fn sleep_with_stop(duration: Duration, stop_flag: &AtomicBool) {
    let mut remaining = duration;
    let chunk = Duration::from_millis(50);
    while remaining > Duration::ZERO {
        if stop_flag.load(Ordering::Relaxed) {
            break;
        }
        let step = remaining.min(chunk);
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
}
