use std::future::Future;
use tokio::time::{timeout_at, Instant};

/// Runs `fut` bounded by the cycle deadline. Past the deadline nothing new
/// is started.
pub(crate) async fn within<T, E, F>(
    deadline: Instant,
    on_timeout: impl FnOnce() -> E,
    fut: F,
) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    if Instant::now() >= deadline {
        return Err(on_timeout());
    }
    match timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}
