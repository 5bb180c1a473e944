//! Temporal Synchronizer - map/reduce across the two time scales
//!
//! A cycle is: one concurrent burst from the fast producer (map), a local
//! reduction to the thoughts worth refining, then sequential slow calls on
//! those (reduce). Every producer call is individually bounded; a call that
//! times out, fails or is cancelled is recovered in place and logged as a
//! [`Condition`], never surfaced as an error.

use crate::cancel::CancelSignal;
use crate::reduce::reduce;
use futures_util::future::join_all;
use mindgym_core::{
    Condition, FastProducer, SlowContext, SlowProducer, Stimulus, SyncConfig, Thought,
};
use mindgym_limbic::{ParameterBundle, ReductionStrategy};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Where the synchronizer is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Idle,
    MappingFast,
    Reducing,
    MappingSlow,
    Done,
}

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Completed,
    /// Every attempt produced an empty fast burst
    EmptyBurst,
    Cancelled,
}

/// Result of the concurrent fast phase
#[derive(Debug, Clone, Default)]
pub struct MapResult {
    pub thoughts: Vec<Thought>,
    pub timeouts: usize,
    pub cancelled: bool,
}

/// Result of the sequential slow phase; `refined[i]` belongs to `selected[i]`
#[derive(Debug, Clone, Default)]
pub struct ReduceResult {
    pub refined: Vec<Thought>,
    pub timeouts: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub status: CycleStatus,
    pub burst: Vec<Thought>,
    pub selected: Vec<Thought>,
    pub refined: Vec<Thought>,
    pub attempts: u32,
    pub fast_timeouts: usize,
    pub slow_timeouts: usize,
}

impl CycleOutcome {
    fn empty(status: CycleStatus, attempts: u32) -> Self {
        Self {
            status,
            burst: Vec::new(),
            selected: Vec::new(),
            refined: Vec::new(),
            attempts,
            fast_timeouts: 0,
            slow_timeouts: 0,
        }
    }

    /// Refined thoughts that actually completed.
    pub fn completed_refinements(&self) -> impl Iterator<Item = &Thought> {
        self.refined.iter().filter(|t| !t.is_placeholder())
    }
}

pub struct TemporalSynchronizer {
    fast: Arc<dyn FastProducer>,
    slow: Arc<dyn SlowProducer>,
    config: SyncConfig,
    phase: SyncPhase,
}

impl TemporalSynchronizer {
    pub fn new(fast: Arc<dyn FastProducer>, slow: Arc<dyn SlowProducer>, config: SyncConfig) -> Self {
        Self {
            fast,
            slow,
            config,
            phase: SyncPhase::Idle,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Fire `burst_size` concurrent fast calls and keep whatever completes in time.
    pub async fn run_map_phase(
        &mut self,
        stimulus: &Stimulus,
        burst_size: usize,
        cancel: &CancelSignal,
    ) -> MapResult {
        self.phase = SyncPhase::MappingFast;
        if cancel.is_cancelled() {
            return MapResult {
                cancelled: true,
                ..Default::default()
            };
        }

        let permits = self.config.max_concurrency.unwrap_or(burst_size).max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let bound = self.config.fast_timeout();

        let calls = (0..burst_size).map(|index| {
            let producer = Arc::clone(&self.fast);
            let semaphore = Arc::clone(&semaphore);
            let stimulus = Stimulus {
                index,
                ..stimulus.clone()
            };
            async move {
                tokio::select! {
                    _ = cancel.cancelled() => CallResult::Cancelled,
                    result = async {
                        let _permit = semaphore.acquire().await;
                        tokio::time::timeout(bound, producer.generate(&stimulus)).await
                    } => match result {
                        Ok(Ok(thought)) => CallResult::Done(thought),
                        Ok(Err(e)) => {
                            tracing::warn!(
                                condition = %Condition::Timeout,
                                producer = "fast",
                                index,
                                error = %e,
                                "Fast call failed, treated as timeout"
                            );
                            CallResult::TimedOut
                        }
                        Err(_) => {
                            tracing::warn!(
                                condition = %Condition::Timeout,
                                producer = "fast",
                                index,
                                bound_ms = bound.as_millis() as u64,
                                "Fast call exceeded its bound"
                            );
                            CallResult::TimedOut
                        }
                    },
                }
            }
        });

        let mut result = MapResult::default();
        for call in join_all(calls).await {
            match call {
                CallResult::Done(thought) => result.thoughts.push(thought),
                CallResult::TimedOut => result.timeouts += 1,
                CallResult::Cancelled => result.cancelled = true,
            }
        }
        tracing::debug!(
            requested = burst_size,
            produced = result.thoughts.len(),
            timeouts = result.timeouts,
            "Fast burst complete"
        );
        result
    }

    pub fn reduce(&mut self, burst: &[Thought], strategy: ReductionStrategy) -> Vec<Thought> {
        self.phase = SyncPhase::Reducing;
        let selected = reduce(burst, strategy);
        tracing::debug!(
            burst = burst.len(),
            selected = selected.len(),
            ?strategy,
            "Burst reduced"
        );
        selected
    }

    /// Refine each selected thought in turn. Output is 1:1 with `selected`;
    /// calls that time out, fail or are cancelled leave a placeholder.
    pub async fn run_reduce_phase(
        &mut self,
        stimulus: &Stimulus,
        selected: &[Thought],
        dialogue_rounds: u32,
        cancel: &CancelSignal,
    ) -> ReduceResult {
        self.phase = SyncPhase::MappingSlow;
        let bound = self.config.slow_timeout();
        let mut result = ReduceResult::default();

        for source in selected {
            if result.cancelled || cancel.is_cancelled() {
                result.cancelled = true;
                result.refined.push(Thought::placeholder(source));
                continue;
            }
            let context = SlowContext {
                selected: source.clone(),
                dialogue_rounds,
            };
            let call = tokio::select! {
                _ = cancel.cancelled() => CallResult::Cancelled,
                r = tokio::time::timeout(bound, self.slow.generate(stimulus, &context)) => match r {
                    Ok(Ok(thought)) => CallResult::Done(thought),
                    Ok(Err(e)) => {
                        slow_timeout_event(source, bound, Some(&e));
                        CallResult::TimedOut
                    }
                    Err(_) => {
                        slow_timeout_event(source, bound, None);
                        CallResult::TimedOut
                    }
                },
            };
            let refined = match call {
                CallResult::Done(thought) => associate(source, thought),
                CallResult::TimedOut => {
                    result.timeouts += 1;
                    Thought::placeholder(source)
                }
                CallResult::Cancelled => {
                    result.cancelled = true;
                    Thought::placeholder(source)
                }
            };
            result.refined.push(refined);
        }
        result
    }

    /// One full map/reduce cycle under the recommended parameters.
    ///
    /// An empty burst, or a slow phase that produced nothing but placeholders,
    /// is retried with a fresh burst until `max_attempts` is reached.
    pub async fn run_cycle(
        &mut self,
        stimulus: &Stimulus,
        params: &ParameterBundle,
        cancel: &CancelSignal,
    ) -> CycleOutcome {
        self.phase = SyncPhase::Idle;
        let stimulus = Stimulus {
            temperature: params.temperature,
            ..stimulus.clone()
        };
        let max_attempts = self.config.max_attempts.max(1);
        let mut fast_timeouts = 0;
        let mut slow_timeouts = 0;
        let mut last: Option<CycleOutcome> = None;

        for attempt in 1..=max_attempts {
            let map = self.run_map_phase(&stimulus, params.burst_size, cancel).await;
            fast_timeouts += map.timeouts;
            if map.cancelled {
                return self.cancelled(attempt, map.thoughts, fast_timeouts, slow_timeouts);
            }
            if map.thoughts.is_empty() {
                tracing::warn!(
                    condition = %Condition::EmptyBurst,
                    attempt,
                    max_attempts,
                    timeouts = map.timeouts,
                    "Fast burst produced nothing"
                );
                continue;
            }

            let selected = self.reduce(&map.thoughts, params.reduction_strategy);
            let slow = self
                .run_reduce_phase(&stimulus, &selected, params.dialogue_rounds, cancel)
                .await;
            slow_timeouts += slow.timeouts;
            if slow.cancelled {
                let mut outcome = self.cancelled(attempt, map.thoughts, fast_timeouts, slow_timeouts);
                outcome.selected = selected;
                outcome.refined = slow.refined;
                return outcome;
            }

            let all_placeholders = slow.refined.iter().all(Thought::is_placeholder);
            let outcome = CycleOutcome {
                status: CycleStatus::Completed,
                burst: map.thoughts,
                selected,
                refined: slow.refined,
                attempts: attempt,
                fast_timeouts,
                slow_timeouts,
            };
            if all_placeholders && attempt < max_attempts {
                tracing::info!(attempt, "Slow phase produced only placeholders, requesting a new burst");
                last = Some(outcome);
                continue;
            }
            self.phase = SyncPhase::Done;
            return outcome;
        }

        self.phase = SyncPhase::Done;
        match last {
            Some(mut outcome) => {
                outcome.attempts = max_attempts;
                outcome.fast_timeouts = fast_timeouts;
                outcome.slow_timeouts = slow_timeouts;
                outcome
            }
            None => {
                let mut outcome = CycleOutcome::empty(CycleStatus::EmptyBurst, max_attempts);
                outcome.fast_timeouts = fast_timeouts;
                outcome
            }
        }
    }

    fn cancelled(
        &mut self,
        attempt: u32,
        burst: Vec<Thought>,
        fast_timeouts: usize,
        slow_timeouts: usize,
    ) -> CycleOutcome {
        self.phase = SyncPhase::Done;
        tracing::info!(condition = %Condition::Cancelled, attempt, "Cycle cancelled");
        CycleOutcome {
            burst,
            fast_timeouts,
            slow_timeouts,
            ..CycleOutcome::empty(CycleStatus::Cancelled, attempt)
        }
    }
}

enum CallResult {
    Done(Thought),
    TimedOut,
    Cancelled,
}

fn slow_timeout_event(source: &Thought, bound: Duration, error: Option<&anyhow::Error>) {
    match error {
        Some(e) => tracing::warn!(
            condition = %Condition::Timeout,
            producer = "slow",
            source = %source.id(),
            error = %e,
            "Slow call failed, substituting placeholder"
        ),
        None => tracing::warn!(
            condition = %Condition::Timeout,
            producer = "slow",
            source = %source.id(),
            bound_ms = bound.as_millis() as u64,
            "Slow call exceeded its bound, substituting placeholder"
        ),
    }
}

/// Tie a slow result to the fast thought it refines, whatever the producer returned.
fn associate(source: &Thought, thought: Thought) -> Thought {
    if thought.source() == Some(source.id()) {
        return thought;
    }
    let linked = Thought::derived(source, thought.content(), thought.confidence());
    match thought.sentiment() {
        Some(s) => linked.with_sentiment(s),
        None => linked,
    }
}
