//! Mock producers - deterministic thoughts for running a workout without a model.

use async_trait::async_trait;
use mindgym_core::{FastProducer, Origin, SlowContext, SlowProducer, Stimulus, Thought};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const ASSOCIATIONS: [&str; 6] = [
    "reminds me of flowing water",
    "feels like a spiral staircase",
    "echoes a half-remembered song",
    "looks like branches splitting",
    "sounds like a door left open",
    "is shaped like a closed loop",
];

/// Signed valence of cue words in `text`, or `None` when no cue is present.
pub fn lexical_sentiment(text: &str) -> Option<f32> {
    let lower = text.to_lowercase();
    let positive = ["clear", "understand", "insight", "resolved"]
        .iter()
        .filter(|w| lower.contains(*w))
        .count() as f32;
    let negative = ["confused", "uncertain", "stuck", "contradict"]
        .iter()
        .filter(|w| lower.contains(*w))
        .count() as f32;
    if positive == 0.0 && negative == 0.0 {
        return None;
    }
    Some(((positive - negative) * 0.3).clamp(-1.0, 1.0))
}

#[derive(Debug)]
pub struct MockFastProducer {
    latency: Duration,
    calls: AtomicUsize,
}

impl MockFastProducer {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for MockFastProducer {
    fn default() -> Self {
        Self::new(Duration::from_millis(20))
    }
}

#[async_trait]
impl FastProducer for MockFastProducer {
    async fn generate(&self, stimulus: &Stimulus) -> anyhow::Result<Thought> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;

        let seed = n + stimulus.index;
        let association = ASSOCIATIONS[seed % ASSOCIATIONS.len()];
        // Hotter bursts spread wider around the middle
        let spread = stimulus.temperature.clamp(0.0, 1.0);
        let step = ((seed * 7) % 10) as f32 / 9.0;
        let confidence = 0.5 + (step - 0.5) * spread;

        Ok(Thought::new(
            Origin::Fast,
            format!("{} {}", stimulus.query, association),
            confidence,
        ))
    }
}

#[derive(Debug)]
pub struct MockSlowProducer {
    latency: Duration,
}

impl MockSlowProducer {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for MockSlowProducer {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

#[async_trait]
impl SlowProducer for MockSlowProducer {
    async fn generate(&self, stimulus: &Stimulus, context: &SlowContext) -> anyhow::Result<Thought> {
        tokio::time::sleep(self.latency * context.dialogue_rounds.max(1)).await;

        let selected = &context.selected;
        let verdict = if selected.confidence() >= 0.5 {
            "the picture is clear"
        } else {
            "I am still confused by it"
        };
        let content = format!(
            "Analyzing '{}' over {} round(s): \"{}\", {}",
            stimulus.query,
            context.dialogue_rounds,
            selected.content(),
            verdict
        );
        let confidence =
            (0.4 + selected.confidence() * 0.5 + 0.05 * context.dialogue_rounds as f32).min(1.0);

        let thought = Thought::derived(selected, content, confidence);
        Ok(match lexical_sentiment(verdict) {
            Some(s) => thought.with_sentiment(s),
            None => thought,
        })
    }
}
