//! Tools for limiting the number of concurrent CPU-bound tasks.

use std::sync::LazyLock;

use tokio::sync::Semaphore;

use crate::prelude::*;

/// Semaphore used to limit the number of concurrent `tesseract` processes.
static CPU_SEMAPHORE: LazyLock<Semaphore> =
    LazyLock::new(|| Semaphore::new(num_cpus::get()));

/// Call an async function while holding a permit from the CPU semaphore.
///
/// Every request in a batch runs OCR, and each OCR process will happily use a
/// whole core. Without this, `--jobs 64` would fork 64 of them at once.
///
/// In-process image work doesn't need this, as long as it runs via
/// [`crate::async_utils::spawn_blocking_propagating_panics`].
#[instrument(level = "trace", skip_all)]
pub async fn with_cpu_semaphore<Func, Fut, R>(f: Func) -> Result<R>
where
    Func: FnOnce() -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let permit = CPU_SEMAPHORE
        .acquire()
        .await
        .context("Could not acquire CPU permit")?;
    let result = f().await;
    drop(permit);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_are_released() -> Result<()> {
        // More calls than permits must not deadlock.
        for i in 0..(num_cpus::get() * 2) {
            let value = with_cpu_semaphore(|| async move { Ok(i) }).await?;
            assert_eq!(value, i);
        }
        Ok(())
    }
}
