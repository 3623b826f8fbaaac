//! Poll-until-quiet waiting for debounced UIs
//!
//! A debounced front end may show a partial render the moment output first
//! appears. Waiting only for "non-empty" therefore reads intermediate text.
//! The wait here is two-phase: poll until the probe qualifies, hold for one
//! quiescence window, then probe again and accept only if it still
//! qualifies.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::error::E2eResult;

/// State of a settle wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settle<T> {
    /// Keep polling
    Pending,

    /// Probe qualified and still qualified after the quiescence window
    Settled(T),

    /// Nothing qualified within the hard timeout
    TimedOut { waited: Duration },
}

/// Timing of a settle wait
#[derive(Debug, Clone, Copy)]
pub struct SettleOptions {
    /// Sleep between probes while nothing qualifies
    pub poll_interval: Duration,

    /// Hold time after the first qualifying probe
    pub quiescence: Duration,

    /// Limit for the first qualifying probe to appear
    pub timeout: Duration,
}

/// Pure state machine behind [`await_settled`]
#[derive(Debug)]
pub struct Settler {
    options: SettleOptions,
    started: Instant,
    held_since: Option<Instant>,
}

impl Settler {
    pub fn new(options: SettleOptions, started: Instant) -> Self {
        Self {
            options,
            started,
            held_since: None,
        }
    }

    /// Feed one probe result observed at `now`
    pub fn observe<T>(&mut self, now: Instant, observation: Option<T>) -> Settle<T> {
        match (observation, self.held_since) {
            (Some(value), Some(since)) if now.duration_since(since) >= self.options.quiescence => {
                Settle::Settled(value)
            }
            (Some(_), Some(_)) => Settle::Pending,
            (Some(value), None) => {
                if self.options.quiescence.is_zero() {
                    return Settle::Settled(value);
                }
                self.held_since = Some(now);
                Settle::Pending
            }
            (None, _) => {
                self.held_since = None;
                let waited = now.duration_since(self.started);
                if waited >= self.options.timeout {
                    Settle::TimedOut { waited }
                } else {
                    Settle::Pending
                }
            }
        }
    }

    /// How long to sleep before the next probe
    pub fn next_delay(&self, now: Instant) -> Duration {
        match self.held_since {
            Some(since) => self
                .options
                .quiescence
                .saturating_sub(now.duration_since(since)),
            None => {
                let remaining = self
                    .options
                    .timeout
                    .saturating_sub(now.duration_since(self.started));
                self.options.poll_interval.min(remaining)
            }
        }
    }
}

/// Something that can be asked "has it happened yet?"
#[async_trait]
pub trait Probe<T>: Send {
    /// `Some` when the awaited condition holds right now
    async fn probe(&mut self) -> E2eResult<Option<T>>;
}

#[async_trait]
impl<T, F, Fut> Probe<T> for F
where
    T: Send + 'static,
    F: FnMut() -> Fut + Send,
    Fut: Future<Output = E2eResult<Option<T>>> + Send,
{
    async fn probe(&mut self) -> E2eResult<Option<T>> {
        (self)().await
    }
}

/// Drive `probe` until it settles or times out. Probe errors abort the wait.
pub async fn await_settled<T, P>(options: SettleOptions, probe: &mut P) -> E2eResult<Settle<T>>
where
    P: Probe<T> + ?Sized,
{
    let mut settler = Settler::new(options, Instant::now());

    loop {
        let observation = probe.probe().await?;
        let now = Instant::now();

        match settler.observe(now, observation) {
            Settle::Pending => {
                let delay = settler.next_delay(now);
                trace!(?delay, "condition not settled yet");
                sleep(delay).await;
            }
            done => return Ok(done),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn options() -> SettleOptions {
        SettleOptions {
            poll_interval: Duration::from_millis(100),
            quiescence: Duration::from_millis(1000),
            timeout: Duration::from_millis(5000),
        }
    }

    #[test]
    fn test_settles_only_after_quiescence() {
        let t0 = Instant::now();
        let mut settler = Settler::new(options(), t0);

        assert_eq!(settler.observe(t0, None::<&str>), Settle::Pending);
        let t1 = t0 + Duration::from_millis(300);
        assert_eq!(settler.observe(t1, Some("part")), Settle::Pending);
        assert_eq!(settler.next_delay(t1), Duration::from_millis(1000));

        let t2 = t1 + Duration::from_millis(500);
        assert_eq!(settler.observe(t2, Some("partial")), Settle::Pending);

        let t3 = t1 + Duration::from_millis(1000);
        assert_eq!(settler.observe(t3, Some("full")), Settle::Settled("full"));
    }

    #[test]
    fn test_vanishing_output_restarts_window() {
        let t0 = Instant::now();
        let mut settler = Settler::new(options(), t0);

        assert_eq!(settler.observe(t0, Some(1)), Settle::Pending);
        let t1 = t0 + Duration::from_millis(1000);
        assert_eq!(settler.observe(t1, None::<i32>), Settle::Pending);

        let t2 = t1 + Duration::from_millis(100);
        assert_eq!(settler.observe(t2, Some(2)), Settle::Pending);
        let t3 = t2 + Duration::from_millis(1000);
        assert_eq!(settler.observe(t3, Some(3)), Settle::Settled(3));
    }

    #[test]
    fn test_times_out_without_output() {
        let t0 = Instant::now();
        let mut settler = Settler::new(options(), t0);

        let t1 = t0 + Duration::from_millis(4900);
        assert_eq!(settler.observe(t1, None::<()>), Settle::Pending);
        assert_eq!(settler.next_delay(t1), Duration::from_millis(100));

        let t2 = t0 + Duration::from_millis(5000);
        assert_eq!(
            settler.observe(t2, None::<()>),
            Settle::TimedOut {
                waited: Duration::from_millis(5000)
            }
        );
    }

    #[test]
    fn test_zero_quiescence_settles_immediately() {
        let t0 = Instant::now();
        let mut settler = Settler::new(
            SettleOptions {
                quiescence: Duration::ZERO,
                ..options()
            },
            t0,
        );
        assert_eq!(settler.observe(t0, Some('x')), Settle::Settled('x'));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_settled_rechecks_after_window() {
        let calls = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();

        let probe_calls = calls.clone();
        let mut probe = move || {
            let n = probe_calls.fetch_add(1, Ordering::SeqCst);
            async move {
                Ok(match n {
                    0..=2 => None,
                    _ => Some(format!("probe-{}", n)),
                })
            }
        };
        let result = await_settled(options(), &mut probe).await.unwrap();

        // Three empty probes 100 ms apart, one qualifying probe, then the
        // re-check after the quiescence window.
        assert_eq!(result, Settle::Settled("probe-4".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1300) && elapsed < Duration::from_millis(1400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_settled_times_out() {
        let mut probe = || async { Ok(None::<String>) };
        let result = await_settled(options(), &mut probe).await.unwrap();
        assert!(matches!(result, Settle::TimedOut { waited } if waited >= Duration::from_millis(5000)));
    }
}
