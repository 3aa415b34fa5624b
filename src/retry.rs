//! Retrying page requests with exponential backoff
//!
//! A page request that fails with a transient error (timeout, refused
//! connection, 5xx, 429, 408) is sent again after a pause that doubles each
//! time, capped at `max_delay`. The caller supplies a stop check that is
//! consulted before every attempt and throughout every pause, so an operator
//! skip or an interrupt ends the wait instead of sitting it out.
//!
//! # Example
//!
//! ```no_run
//! use cms_dl::config::RetryConfig;
//! use cms_dl::error::Error;
//! use cms_dl::retry::{RetryError, fetch_with_retry};
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! # async fn example() {
//! let skip = AtomicBool::new(false);
//! let outcome = fetch_with_retry(
//!     &RetryConfig::default(),
//!     || skip.load(Ordering::SeqCst),
//!     || async { Ok::<_, Error>(Vec::<String>::new()) },
//! )
//! .await;
//! match outcome {
//!     Ok(rows) => println!("{} rows", rows.len()),
//!     Err(RetryError::Stopped) => println!("abandoned"),
//!     Err(RetryError::Failed(e)) => println!("gave up: {e}"),
//! }
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::time::Instant;

/// Longest stretch a backoff pause runs without consulting the stop check
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Classifies errors as worth another attempt or not
pub trait IsRetryable {
    /// `true` when the same request may succeed if sent again
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            // the API answers 429 when throttling and 5xx under load
            Error::HttpStatus { status, .. } => matches!(*status, 408 | 429 | 500..=599),
            Error::Io(e) => matches!(
                e.kind(),
                ErrorKind::TimedOut
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
                    | ErrorKind::BrokenPipe
                    | ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

/// Why a retried request produced no value
#[derive(Debug)]
pub enum RetryError<E> {
    /// The last attempt failed and no further attempt is allowed
    Failed(E),
    /// The stop check fired before an attempt or during a pause
    Stopped,
}

/// Run `request` until it succeeds, fails permanently, runs out of retries,
/// or `should_stop` returns `true`
///
/// `config.max_attempts` counts retries after the first try, so a request
/// is sent at most `max_attempts + 1` times.
pub async fn fetch_with_retry<T, E, Fut>(
    config: &RetryConfig,
    should_stop: impl Fn() -> bool,
    mut request: impl FnMut() -> Fut,
) -> Result<T, RetryError<E>>
where
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut backoff = Backoff::new(config);
    let mut retries = 0u32;

    loop {
        if should_stop() {
            return Err(RetryError::Stopped);
        }

        let error = match request().await {
            Ok(value) => {
                if retries > 0 {
                    tracing::info!(retries, "Page request recovered");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !error.is_retryable() {
            tracing::warn!(error = %error, "Page request failed permanently");
            return Err(RetryError::Failed(error));
        }
        if retries >= config.max_attempts {
            tracing::warn!(error = %error, attempts = retries + 1, "Giving up on page request");
            return Err(RetryError::Failed(error));
        }

        retries += 1;
        let delay = backoff.next_delay();
        tracing::warn!(
            error = %error,
            retry = retries,
            of = config.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Page request failed, retrying"
        );

        if pause(delay, &should_stop).await {
            return Err(RetryError::Stopped);
        }
    }
}

/// Sleep for `delay`, waking regularly to consult `should_stop`
///
/// Returns `true` if the pause was cut short.
async fn pause(delay: Duration, should_stop: &impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if should_stop() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep((deadline - now).min(STOP_POLL_INTERVAL)).await;
    }
}

/// Pause schedule for one request: `initial_delay`, then multiplied by
/// `backoff_multiplier` per retry, never above `max_delay`
struct Backoff {
    next: Duration,
    multiplier: f64,
    cap: Duration,
    jitter: bool,
}

impl Backoff {
    fn new(config: &RetryConfig) -> Self {
        Self {
            next: config.initial_delay.min(config.max_delay),
            multiplier: config.backoff_multiplier,
            cap: config.max_delay,
            jitter: config.jitter,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let base = self.next;
        self.next = Duration::try_from_secs_f64(base.as_secs_f64() * self.multiplier)
            .unwrap_or(self.cap)
            .min(self.cap);
        if self.jitter { jittered(base) } else { base }
    }
}

/// Stretch `delay` by a random factor in `[1, 2]`
fn jittered(delay: Duration) -> Duration {
    delay.mul_f64(rand::thread_rng().gen_range(1.0..=2.0))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    const PAGE_URL: &str = "https://data.cms.gov/data-api/v1/dataset/abc/data?offset=0&size=5000";

    /// Answers page requests with a fixed sequence of HTTP statuses, then 200
    struct StatusScript {
        answers: Mutex<VecDeque<u16>>,
        calls: AtomicU32,
    }

    impl StatusScript {
        fn new(answers: &[u16]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().copied().collect()),
                calls: AtomicU32::new(0),
            }
        }

        fn forever(status: u16) -> Self {
            Self::new(&[status; 64])
        }

        async fn request(&self) -> Result<usize, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answers.lock().unwrap().pop_front() {
                None | Some(200) => Ok(5000),
                Some(status) => Err(Error::HttpStatus {
                    status,
                    url: PAGE_URL.to_string(),
                }),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn quick(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            jitter: false,
        }
    }

    fn status_of(outcome: Result<usize, RetryError<Error>>) -> Option<u16> {
        match outcome {
            Err(RetryError::Failed(Error::HttpStatus { status, .. })) => Some(status),
            _ => None,
        }
    }

    #[tokio::test]
    async fn busy_server_recovers_on_third_try() {
        let script = StatusScript::new(&[503, 502, 200]);

        let rows = fetch_with_retry(&quick(3), || false, || script.request())
            .await
            .unwrap();

        assert_eq!(rows, 5000);
        assert_eq!(script.calls(), 3);
    }

    #[tokio::test]
    async fn throttled_requests_back_off_exponentially() {
        let script = StatusScript::new(&[429, 429, 429]);
        let started = std::time::Instant::now();

        fetch_with_retry(&quick(3), || false, || script.request())
            .await
            .unwrap();

        // 10ms + 20ms + 40ms
        assert!(started.elapsed() >= Duration::from_millis(70));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(script.calls(), 4);
    }

    #[tokio::test]
    async fn missing_dataset_is_not_retried() {
        let script = StatusScript::forever(404);

        let outcome = fetch_with_retry(&quick(3), || false, || script.request()).await;

        assert_eq!(status_of(outcome), Some(404));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn last_error_is_reported_after_final_retry() {
        let script = StatusScript::new(&[500, 503, 504, 200]);

        let outcome = fetch_with_retry(&quick(2), || false, || script.request()).await;

        assert_eq!(status_of(outcome), Some(504));
        assert_eq!(script.calls(), 3);
    }

    #[tokio::test]
    async fn no_retries_when_max_attempts_is_zero() {
        let script = StatusScript::forever(503);

        let outcome = fetch_with_retry(&quick(0), || false, || script.request()).await;

        assert_eq!(status_of(outcome), Some(503));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn raised_stop_prevents_any_request() {
        let script = StatusScript::new(&[]);

        let outcome = fetch_with_retry(&quick(3), || true, || script.request()).await;

        assert!(matches!(outcome, Err(RetryError::Stopped)));
        assert_eq!(script.calls(), 0);
    }

    #[tokio::test]
    async fn stop_during_backoff_ends_the_wait() {
        let script = StatusScript::forever(503);
        let stop = std::sync::Arc::new(AtomicBool::new(false));
        let mut config = quick(5);
        config.initial_delay = Duration::from_secs(30);
        config.max_delay = Duration::from_secs(30);

        let flag = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });

        let started = std::time::Instant::now();
        let outcome =
            fetch_with_retry(&config, || stop.load(Ordering::SeqCst), || script.request()).await;

        assert!(matches!(outcome, Err(RetryError::Stopped)));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test]
    async fn stop_raised_by_a_failing_attempt_skips_the_retry() {
        let script = StatusScript::forever(503);
        let stop = AtomicBool::new(false);

        let outcome = fetch_with_retry(
            &quick(3),
            || stop.load(Ordering::SeqCst),
            || {
                stop.store(true, Ordering::SeqCst);
                script.request()
            },
        )
        .await;

        assert!(matches!(outcome, Err(RetryError::Stopped)));
        assert_eq!(script.calls(), 1);
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let mut backoff = Backoff::new(&RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            jitter: false,
        });
        let schedule: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(schedule, vec![2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn jitter_stays_between_one_and_two_times_the_delay() {
        let delay = Duration::from_millis(50);
        for _ in 0..200 {
            let stretched = jittered(delay);
            assert!(stretched >= delay && stretched <= delay * 2, "{stretched:?}");
        }
        assert_eq!(jittered(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn transient_statuses_are_retryable() {
        for status in [408u16, 429, 500, 502, 503, 504] {
            let err = Error::HttpStatus {
                status,
                url: PAGE_URL.into(),
            };
            assert!(err.is_retryable(), "{status} should be retried");
        }
    }

    #[test]
    fn client_errors_and_bad_pages_are_permanent() {
        for status in [400u16, 401, 403, 404, 410] {
            let err = Error::HttpStatus {
                status,
                url: PAGE_URL.into(),
            };
            assert!(!err.is_retryable(), "{status} should not be retried");
        }
        let malformed = Error::MalformedPage {
            offset: 5000,
            reason: "expected a JSON array".into(),
        };
        assert!(!malformed.is_retryable());
        let bad_url = Error::InvalidUrl {
            url: "data-api/v1".into(),
            reason: "relative URL without a base".into(),
        };
        assert!(!bad_url.is_retryable());
    }

    #[test]
    fn dropped_connections_are_retryable_but_disk_errors_are_not() {
        let io = |kind| Error::Io(std::io::Error::new(kind, "page body"));
        assert!(io(ErrorKind::ConnectionReset).is_retryable());
        assert!(io(ErrorKind::TimedOut).is_retryable());
        assert!(!io(ErrorKind::PermissionDenied).is_retryable());
        assert!(!io(ErrorKind::NotFound).is_retryable());
    }
}
