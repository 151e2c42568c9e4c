#![allow(dead_code)]

pub use wavedag_test_utils::builders;
pub use wavedag_test_utils::fake_isolation::FakeWorktreeManager;
pub use wavedag_test_utils::fake_runner::ScriptedRunner;
pub use wavedag_test_utils::{init_tracing, with_timeout};

use std::sync::{Arc, Mutex};

use wavedag::dag::NodeStatus;
use wavedag::exec::ExecutorOptions;

/// A progress event as seen by the callback: `(wave, task, status)`.
pub type ProgressEvent = (usize, String, NodeStatus);

/// Attach a recording progress callback to `options`.
pub fn record_progress(
    options: ExecutorOptions,
) -> (ExecutorOptions, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let options = options.with_progress(move |wave, task, status, _line| {
        sink.lock().unwrap().push((wave, task.to_string(), status));
    });
    (options, events)
}
