use super::{Progress, ProvisionError, ProvisionResult};
use crate::store::{Connector, SchemaStore};
use log::{error, info, warn};
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Bounded, fixed-delay retry budget for establishing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Attempts actually made; a zero budget still tries once.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Connects to `database` and pings until success or the budget runs out.
///
/// Only connection failures are retried. A half-open store from a failed
/// attempt is closed before the next one.
///
/// # Errors
/// - `ConnectionExhausted` once every attempt failed to reach the server.
/// - `Connect` for the first non-connection failure.
pub fn connect_with_retry<C: Connector>(
    connector: &C,
    database: &str,
    policy: &RetryPolicy,
    observer: &mut dyn FnMut(&Progress<'_>),
) -> ProvisionResult<C::Store> {
    let max_attempts = policy.attempts();
    let started_at = Instant::now();

    for attempt in 1..=max_attempts {
        let result = connector
            .connect(database)
            .and_then(|store| match store.ping() {
                Ok(()) => Ok(store),
                Err(err) => {
                    store.close();
                    Err(err)
                }
            });

        let err = match result {
            Ok(store) => {
                info!(
                    "event=db_connect module=provision status=ok target={} attempt={} duration_ms={}",
                    connector.target(),
                    attempt,
                    started_at.elapsed().as_millis()
                );
                observer(&Progress::Connected { attempt });
                return Ok(store);
            }
            Err(err) => err,
        };

        if !err.is_connection_failure() {
            error!(
                "event=db_connect module=provision status=error target={} attempt={} error_code=connect_failed error={}",
                connector.target(),
                attempt,
                err
            );
            return Err(ProvisionError::Connect(err));
        }

        let retry_in = (attempt < max_attempts).then_some(policy.delay);
        warn!(
            "event=db_connect module=provision status=retry target={} attempt={} max_attempts={} delay_ms={} error={}",
            connector.target(),
            attempt,
            max_attempts,
            retry_in.map_or(0, |delay| delay.as_millis()),
            err
        );
        observer(&Progress::ConnectAttemptFailed {
            attempt,
            max_attempts,
            error: &err,
            retry_in,
        });
        if let Some(delay) = retry_in {
            std::thread::sleep(delay);
        }
    }

    error!(
        "event=db_connect module=provision status=error target={} attempts={} duration_ms={} error_code=connect_exhausted",
        connector.target(),
        max_attempts,
        started_at.elapsed().as_millis()
    );
    observer(&Progress::ConnectionExhausted {
        attempts: max_attempts,
    });
    Err(ProvisionError::ConnectionExhausted {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::{connect_with_retry, RetryPolicy};
    use crate::provision::ProvisionError;
    use crate::store::{MemoryConnector, Reachability, SchemaStore};
    use std::time::Duration;

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[test]
    fn default_policy_is_five_attempts_ten_seconds_apart() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay, Duration::from_secs(10));
    }

    #[test]
    fn succeeds_on_later_attempt_and_closes_failed_ones() {
        let connector = MemoryConnector::with_reachability(Reachability::UnreachableFor(2));
        let mut lines = Vec::new();

        let store = connect_with_retry(&connector, "db", &fast(5), &mut |p| {
            lines.push(p.to_string())
        })
        .unwrap();

        assert_eq!(connector.connect_attempts(), 3);
        assert_eq!(connector.closes(), 2);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "MongoDB connection successful.");
        store.close();
        assert_eq!(connector.closes(), 3);
    }

    #[test]
    fn exhaustion_reports_attempt_count() {
        let connector = MemoryConnector::with_reachability(Reachability::Unreachable);
        let mut lines = Vec::new();

        let err = connect_with_retry(&connector, "db", &fast(3), &mut |p| {
            lines.push(p.to_string())
        })
        .unwrap_err();

        assert!(matches!(err, ProvisionError::ConnectionExhausted { attempts: 3 }));
        assert_eq!(connector.connect_attempts(), 3);
        assert!(lines[2].ends_with('.'));
        assert!(!lines[2].contains("Retrying"));
        assert!(lines[3].starts_with("Could not connect"));
    }

    #[test]
    fn zero_budget_still_tries_once() {
        let connector = MemoryConnector::with_reachability(Reachability::Unreachable);
        let err = connect_with_retry(&connector, "db", &fast(0), &mut |_| {}).unwrap_err();
        assert!(matches!(err, ProvisionError::ConnectionExhausted { attempts: 1 }));
    }
}
