//! Timeout utilities for external commands

use srcforge_errors::{Error, ProcessError};
use std::future::Future;
use std::time::Duration;

/// Execute a future with a timeout
///
/// # Errors
///
/// Returns `ProcessError::Timeout` naming `command` when the deadline passes,
/// otherwise whatever the future itself returns.
pub async fn with_timeout<T, F>(future: F, timeout_seconds: u64, command: &str) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    tokio::time::timeout(Duration::from_secs(timeout_seconds), future)
        .await
        .map_err(|_| -> Error {
            ProcessError::Timeout {
                command: command.to_string(),
                seconds: timeout_seconds,
            }
            .into()
        })?
}

/// Execute a future with an optional timeout
///
/// # Errors
///
/// See [`with_timeout`].
pub async fn with_optional_timeout<T, F>(
    future: F,
    timeout_seconds: Option<u64>,
    command: &str,
) -> Result<T, Error>
where
    F: Future<Output = Result<T, Error>>,
{
    if let Some(timeout) = timeout_seconds {
        with_timeout(future, timeout, command).await
    } else {
        future.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_process_error() {
        let result: Result<(), Error> = with_timeout(
            async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            },
            1,
            "git init",
        )
        .await;
        assert!(matches!(
            result,
            Err(Error::Process(ProcessError::Timeout { seconds: 1, .. }))
        ));
    }

    #[tokio::test]
    async fn test_no_timeout_passes_through() {
        let value = with_optional_timeout(async { Ok::<_, Error>(7) }, None, "true")
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
