use std::fmt::Display;
use std::future::Future;

use tokio::task::JoinHandle;
use tracing::Instrument;

const LOG_TARGET: &str = "tokio_tools";

/// Spawns `future` inside a span carrying `name`, so its logs stay attributable.
pub fn spawn_named_task<F, S>(name: S, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
    S: Into<String>,
{
    let name = name.into();
    let span = tracing::info_span!("task", task_name = %name);
    tokio::spawn(future.instrument(span))
}

/// Runs a fallible background job nobody awaits; an error is logged under `name`.
pub fn spawn_detached<F, E>(name: &'static str, future: F)
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    spawn_named_task(name, async move {
        if let Err(err) = future.await {
            tracing::warn!(target = LOG_TARGET, task = name, error = %err, "background task failed");
        }
    });
}
