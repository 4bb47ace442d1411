use std::time::Duration;

use tokio::{process::Command, time::timeout};
use tracing::trace;

use super::{error::CollectorError, types::CollectorResult};

/// Default bound on one command run, used by the command-driven collectors.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Validates a `timeout_secs` collector option.
pub(crate) fn command_timeout(collector: &str, secs: u64) -> CollectorResult<Duration> {
    if secs == 0 {
        return Err(CollectorError::InvalidOptions {
            collector: collector.to_string(),
            reason: "timeout_secs must be at least 1".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

/// Runs `argv` and returns its standard output.
///
/// A non-zero exit status is an error carrying the command's stderr.
/// A command still running after `limit` is killed and reported as
/// [`CollectorError::Timeout`].
pub async fn run_command(argv: &[String], limit: Duration) -> CollectorResult<String> {
    let Some((program, args)) = argv.split_first() else {
        return Err(CollectorError::InvalidFormat {
            location: "command".to_string(),
            reason: "empty command line".to_string(),
        });
    };

    trace!("Running command: {}", argv.join(" "));
    let running = Command::new(program).args(args).kill_on_drop(true).output();
    let output = timeout(limit, running)
        .await
        .map_err(|_| CollectorError::Timeout {
            command: program.clone(),
            after: limit,
        })?
        .map_err(|source| CollectorError::CommandExecution {
            command: program.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(CollectorError::CommandFailed {
            command: program.clone(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    const LIMIT: Duration = Duration::from_secs(10);

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|part| part.to_string()).collect()
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let output = run_command(&argv(&["sh", "-c", "echo '{\"ok\": 1}'"]), LIMIT).await.unwrap();
        assert_eq!(output.trim(), "{\"ok\": 1}");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_an_error() {
        let err = run_command(&argv(&["sh", "-c", "echo boom >&2; exit 3"]), LIMIT)
            .await
            .unwrap_err();
        match err {
            CollectorError::CommandFailed { command, stderr, .. } => {
                assert_eq!(command, "sh");
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = run_command(&argv(&["nectar-definitely-not-installed"]), LIMIT)
            .await
            .unwrap_err();
        assert!(matches!(err, CollectorError::CommandExecution { .. }));
    }

    #[tokio::test]
    async fn test_empty_command_line() {
        assert!(matches!(
            run_command(&[], LIMIT).await,
            Err(CollectorError::InvalidFormat { .. })
        ));
    }

    #[tokio::test]
    async fn test_slow_command_is_killed() {
        let started = std::time::Instant::now();
        let err = run_command(&argv(&["sleep", "30"]), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(10));
        match err {
            CollectorError::Timeout { command, after } => {
                assert_eq!(command, "sleep");
                assert_eq!(after, Duration::from_secs(1));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_zero_timeout_option_is_rejected() {
        assert!(matches!(
            command_timeout("mongodb", 0),
            Err(CollectorError::InvalidOptions { .. })
        ));
        assert_eq!(command_timeout("mongodb", 7).unwrap(), Duration::from_secs(7));
    }
}
