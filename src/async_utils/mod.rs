//! Asynchronous utilities for use with Tokio.
//!
//! Requests run as async tasks, but most of the real work happens either in
//! external processes or in CPU-bound image code. The helpers here keep that
//! work from stalling the executor.

use std::{panic, pin::Pin};

use futures::Stream;

use crate::prelude::*;

pub mod io;

/// A type alias for a boxed stream. This is used to make it easier to work
/// streams that return complex types.
pub type BoxedStream<Item> = Pin<Box<dyn Stream<Item = Item> + Send>>;

/// Report any command failures, and include any error output.
///
/// Standard output and standard error are logged. OCR tools chatter on
/// standard error even when they succeed, so we only escalate it when the
/// command fails.
pub fn check_for_command_failure(
    command_name: &str,
    output: &std::process::Output,
) -> Result<()> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    trace!(
        command_name = command_name,
        output = %stdout,
        "Standard output from command"
    );

    if output.status.success() {
        debug!(
            command_name = command_name,
            output = %stderr,
            "Standard error from command",
        );
        return Ok(());
    }

    warn!(
        command_name = command_name,
        output = %stderr,
        "Standard error from failed command",
    );
    match output.status.code() {
        Some(exit_code) => Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        )),
        None => Err(anyhow!(
            "{} was killed, with error output:\n{}",
            command_name,
            stderr,
        )),
    }
}

/// Wrapper around [`tokio::task::spawn_blocking`] that propagates panics from
/// the background task.
///
/// Use this for in-process CPU-bound work like image filtering.
pub async fn spawn_blocking_propagating_panics<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(value) => Ok(value),
        Err(err) if err.is_panic() => panic::resume_unwind(err.into_panic()),
        Err(err) => Err(anyhow!("blocking task was cancelled: {}", err)),
    }
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use super::*;

    #[tokio::test]
    async fn spawn_blocking_returns_value() -> Result<()> {
        let value = spawn_blocking_propagating_panics(|| 6 * 7).await?;
        assert_eq!(value, 42);
        Ok(())
    }

    #[test]
    fn command_failure_is_reported() -> Result<()> {
        let output = Command::new("sh")
            .arg("-c")
            .arg("echo oops >&2; exit 3")
            .output()?;
        let err = check_for_command_failure("sh", &output).unwrap_err();
        assert!(err.to_string().contains("exit code 3"));
        assert!(err.to_string().contains("oops"));
        Ok(())
    }
}
