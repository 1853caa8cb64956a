//! Supervised runner for the monitoring loop.
//!
//! Paces cycle iterations at a fixed interval and tracks consecutive
//! failures with jittered exponential backoff. A run of failures past the
//! configured cutoff panics the process rather than letting the monitor
//! degrade silently: an agent that quietly stops watching positions is
//! worse than one that dies loudly.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, warn};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Pause between successful iterations.
    pub interval: Duration,
    /// Consecutive failures tolerated before the supervisor panics.
    pub max_consecutive_failures: u32,
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            interval: Duration::from_secs(60),
            max_consecutive_failures: 10,
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(120),
        }
    }
}

/// Run `iteration` forever under supervision.
///
/// On success the next iteration starts after `interval`; on failure the
/// retry delay doubles (plus up to 25% jitter so restarts across agents do
/// not synchronize) up to `max_retry_delay`.
///
/// # Panics
/// After `max_consecutive_failures` consecutive failures.
pub async fn run_supervised<F, Fut>(task_name: &str, config: SupervisorConfig, mut iteration: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<(), String>>,
{
    let mut consecutive_failures = 0u32;
    let mut retry_delay = config.initial_retry_delay;

    loop {
        match iteration().await {
            Ok(()) => {
                if consecutive_failures > 0 {
                    warn!(
                        "Task '{}' recovered after {} failures",
                        task_name, consecutive_failures
                    );
                }
                consecutive_failures = 0;
                retry_delay = config.initial_retry_delay;
                sleep(config.interval).await;
            }
            Err(e) => {
                consecutive_failures += 1;
                error!(
                    "Task '{}' failed ({}/{}): {}",
                    task_name, consecutive_failures, config.max_consecutive_failures, e
                );

                if consecutive_failures >= config.max_consecutive_failures {
                    panic!(
                        "FATAL: task '{}' exceeded {} consecutive failures. Last error: {}",
                        task_name, config.max_consecutive_failures, e
                    );
                }

                let jitter_ms =
                    rand::thread_rng().gen_range(0..=retry_delay.as_millis() as u64 / 4);
                let delay = retry_delay + Duration::from_millis(jitter_ms);
                warn!("Task '{}' will retry in {:?}", task_name, delay);
                sleep(delay).await;
                retry_delay = (retry_delay * 2).min(config.max_retry_delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_config() -> SupervisorConfig {
        SupervisorConfig {
            interval: Duration::from_millis(5),
            max_consecutive_failures: 3,
            initial_retry_delay: Duration::from_millis(5),
            max_retry_delay: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_recovers_and_keeps_iterating() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let handle = tokio::spawn(async move {
            run_supervised("test_task", fast_config(), || {
                let n = attempts_clone.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient".to_string())
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();

        assert!(attempts.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    #[should_panic(expected = "exceeded 3 consecutive failures")]
    async fn test_panics_after_failure_cutoff() {
        run_supervised("failing_task", fast_config(), || async {
            Err("always fails".to_string())
        })
        .await;
    }
}
