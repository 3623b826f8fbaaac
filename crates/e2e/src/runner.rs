//! Fixture runner: one isolated session per case, exact-match assertions

use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use swiftcheck_common::{Fixture, FixtureSet};

use crate::config::HarnessConfig;
use crate::driver::{ObservedResult, PageDriver};
use crate::error::{E2eError, E2eResult, FailureKind};
use crate::page::SessionFactory;
use crate::probe;
use crate::report::{FailureRecord, FixtureOutcome, RunReport};

type Queue = Arc<Mutex<VecDeque<(usize, Fixture)>>>;
type Slots = Arc<Mutex<Vec<Option<FixtureOutcome>>>>;

/// Runs fixture tables against sessions from a [`SessionFactory`]
pub struct FixtureRunner<F> {
    factory: Arc<F>,
    config: Arc<HarnessConfig>,
}

impl<F> Clone for FixtureRunner<F> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            config: self.config.clone(),
        }
    }
}

impl<F: SessionFactory + 'static> FixtureRunner<F> {
    pub fn new(factory: F, config: HarnessConfig) -> Self {
        Self {
            factory: Arc::new(factory),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Run every fixture and report in table order.
    ///
    /// A failing fixture never stops the run. Only an unreachable target
    /// during preflight aborts it, before any case executes.
    pub async fn run(&self, fixtures: &FixtureSet) -> RunReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let url = self.config.target_url.as_str();

        if self.config.run.preflight {
            let probed = probe::wait_for_reachable(
                url,
                self.config.run.preflight_attempts,
                self.config.timeouts.navigation(),
            )
            .await;
            if let Err(e) = probed {
                error!("Aborting run: {}", e);
                return RunReport::aborted(started_at, url, fixtures, e.to_string());
            }
        }

        info!(
            "Running {} fixture(s) against {} with {} worker(s)...",
            fixtures.len(),
            url,
            self.config.run.workers
        );

        let outcomes = self.run_workers(fixtures).await;
        let report = RunReport::new(started_at, url, start.elapsed().as_millis() as u64, outcomes);

        info!("");
        info!(
            "Results: {} passed, {} failed, {} flaky ({} ms)",
            report.passed, report.failed, report.flaky, report.duration_ms
        );
        report
    }

    async fn run_workers(&self, fixtures: &FixtureSet) -> Vec<FixtureOutcome> {
        let queue: Queue = Arc::new(Mutex::new(
            fixtures.iter().cloned().enumerate().collect(),
        ));
        let slots: Slots = Arc::new(Mutex::new(vec![None; fixtures.len()]));
        let workers = self.config.run.workers.clamp(1, fixtures.len().max(1));

        let mut tasks = JoinSet::new();
        for worker in 0..workers {
            let runner = self.clone();
            let queue = queue.clone();
            let slots = slots.clone();
            tasks.spawn(async move { runner.worker_loop(worker, queue, slots).await });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("Worker task failed: {}", e);
            }
        }

        let recorded = std::mem::take(&mut *slots.lock().await);
        recorded
            .into_iter()
            .zip(fixtures.iter())
            .map(|(slot, fixture)| {
                slot.unwrap_or_else(|| {
                    infrastructure_outcome(fixture, "worker stopped before recording this fixture")
                })
            })
            .collect()
    }

    /// Pull fixtures until the queue is empty. Each fixture runs in its own
    /// task so a panic fails that fixture only.
    async fn worker_loop(&self, worker: usize, queue: Queue, slots: Slots) {
        let mut first = true;

        loop {
            let next = queue.lock().await.pop_front();
            let Some((index, fixture)) = next else {
                break;
            };

            if !first {
                sleep(self.config.timeouts.between_cases()).await;
            }
            first = false;

            debug!(worker, "Running {}", fixture.id);
            let runner = self.clone();
            let case = fixture.clone();
            let outcome = match tokio::spawn(async move { runner.run_fixture(&case).await }).await {
                Ok(outcome) => outcome,
                Err(e) => infrastructure_outcome(&fixture, &format!("fixture task failed: {}", e)),
            };

            log_outcome(&outcome);
            slots.lock().await[index] = Some(outcome);
        }
    }

    /// Execute one fixture `repeat` times, each in a fresh session
    pub async fn run_fixture(&self, fixture: &Fixture) -> FixtureOutcome {
        let start = Instant::now();
        let repeat = self.config.run.repeat.max(1);

        let mut observations = Vec::new();
        let mut first_failure: Option<E2eError> = None;
        let mut passes = 0u32;
        let mut translation_ms = None;

        for attempt in 1..=repeat {
            if attempt > 1 {
                sleep(self.config.timeouts.between_cases()).await;
            }

            match self.execute(fixture).await {
                Ok(observed) => {
                    translation_ms = Some(observed.elapsed_ms);
                    if observed.text == fixture.expected_output {
                        passes += 1;
                    } else if first_failure.is_none() {
                        first_failure = Some(E2eError::AssertionMismatch {
                            expected: fixture.expected_output.clone(),
                            actual: observed.text.clone(),
                        });
                    }
                    observations.push(observed.text);
                }
                Err(e) => {
                    debug!("{} execution {}/{} failed: {}", fixture.id, attempt, repeat, e);
                    first_failure.get_or_insert(e);
                }
            }
        }

        let diverged = observations.windows(2).any(|pair| pair[0] != pair[1]);
        let flaky = diverged || (passes > 0 && passes < repeat);
        if flaky {
            warn!("{} is flaky: observations {:?}", fixture.id, observations);
        }

        FixtureOutcome {
            fixture_id: fixture.id.clone(),
            name: fixture.name.clone(),
            passed: first_failure.is_none(),
            expected: fixture.expected_output.clone(),
            actual: observations.last().cloned(),
            duration_ms: start.elapsed().as_millis() as u64,
            translation_ms,
            failure: first_failure.as_ref().map(FailureRecord::from),
            flaky,
            observations,
        }
    }

    /// One case in its own session. The session is closed even when the
    /// case budget runs out.
    async fn execute(&self, fixture: &Fixture) -> E2eResult<ObservedResult> {
        let budget = self.config.timeouts.case_timeout();
        let page = self.factory.open_session().await?;
        let mut driver = PageDriver::new(
            page,
            self.config.selectors.clone(),
            self.config.timeouts.clone(),
        );

        let result = match timeout(budget, self.drive(&mut driver, fixture)).await {
            Ok(result) => result,
            Err(_) => Err(E2eError::CaseTimeout(budget.as_millis() as u64)),
        };

        if let Err(e) = driver.close().await {
            warn!("Closing session for {} failed: {}", fixture.id, e);
        }
        result
    }

    async fn drive(
        &self,
        driver: &mut PageDriver<F::Page>,
        fixture: &Fixture,
    ) -> E2eResult<ObservedResult> {
        let timeouts = &self.config.timeouts;

        driver.open(&self.config.target_url).await?;
        driver.clear_input().await?;
        self.enter(driver, fixture).await?;
        driver.await_output_settled(timeouts.output_wait()).await?;
        let observed = driver.read_output().await?;

        if self.config.run.check_idempotence {
            driver.clear_input().await?;
            self.enter(driver, fixture).await?;
            driver.await_output_settled(timeouts.output_wait()).await?;
            let again = driver.read_output().await?;
            if again.text != observed.text {
                return Err(E2eError::NotIdempotent {
                    first: observed.text,
                    second: again.text,
                });
            }
        }

        Ok(observed)
    }

    /// Inject the fixture input. Incremental fixtures type the partial prefix,
    /// require a partial translation, then type the rest.
    async fn enter(&self, driver: &mut PageDriver<F::Page>, fixture: &Fixture) -> E2eResult<()> {
        match fixture.incremental_split() {
            None => driver.set_input_bulk(&fixture.input).await,
            Some((partial, rest)) => {
                driver.type_input_incremental(partial).await?;
                sleep(self.config.timeouts.partial_settle()).await;

                let seen = driver.read_output().await?;
                if seen.text.is_empty() {
                    return Err(E2eError::PartialOutputMissing {
                        partial: partial.to_string(),
                    });
                }
                debug!("{} partial output {:?}", fixture.id, seen.text);

                driver.type_input_incremental(rest).await
            }
        }
    }
}

fn infrastructure_outcome(fixture: &Fixture, message: &str) -> FixtureOutcome {
    FixtureOutcome {
        fixture_id: fixture.id.clone(),
        name: fixture.name.clone(),
        passed: false,
        expected: fixture.expected_output.clone(),
        actual: None,
        duration_ms: 0,
        translation_ms: None,
        failure: Some(FailureRecord {
            kind: FailureKind::Infrastructure,
            message: message.to_string(),
        }),
        flaky: false,
        observations: Vec::new(),
    }
}

fn log_outcome(outcome: &FixtureOutcome) {
    if outcome.passed {
        info!("✓ {} - {} ({} ms)", outcome.fixture_id, outcome.name, outcome.duration_ms);
    } else {
        let reason = outcome
            .failure
            .as_ref()
            .map(|f| f.message.as_str())
            .unwrap_or("unknown error");
        error!("✗ {} - {}: {}", outcome.fixture_id, outcome.name, reason);
    }
}
