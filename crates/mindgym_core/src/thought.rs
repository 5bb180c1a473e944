//! Thoughts - the unit of work exchanged between the two producers
//!
//! A thought is immutable once created. Its id is the identity used to
//! associate slow-producer results back to the fast-burst item they refine.

use crate::state::sanitize_f32;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Instant;
use uuid::Uuid;

/// Which producer generated a thought
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Low-latency, high-throughput associative producer
    Fast,
    /// High-latency, low-throughput analytical producer
    Slow,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Fast => "fast",
            Origin::Slow => "slow",
        }
    }
}

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Microseconds elapsed on the process-wide monotonic clock.
pub fn monotonic_micros() -> u64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_micros() as u64
}

/// A unit of cognitive work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    id: Uuid,
    origin: Origin,
    content: String,
    confidence: f32,
    /// Monotonic creation time (µs since process epoch)
    created_us: u64,
    /// The fast thought this one was derived from (slow thoughts only)
    source: Option<Uuid>,
    /// Optional sentiment cue attached by the producer (-1.0 to 1.0)
    sentiment: Option<f32>,
}

impl Thought {
    pub fn new(origin: Origin, content: impl Into<String>, confidence: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin,
            content: content.into(),
            confidence: sanitize_f32(confidence, 0.0).clamp(0.0, 1.0),
            created_us: monotonic_micros(),
            source: None,
            sentiment: None,
        }
    }

    /// A slow-producer thought refining the given fast thought.
    pub fn derived(source: &Thought, content: impl Into<String>, confidence: f32) -> Self {
        Self {
            source: Some(source.id),
            ..Self::new(Origin::Slow, content, confidence)
        }
    }

    /// Confidence-0 stand-in for a slow call that did not complete.
    pub fn placeholder(source: &Thought) -> Self {
        Self::derived(source, String::new(), 0.0)
    }

    pub fn with_sentiment(mut self, sentiment: f32) -> Self {
        self.sentiment = Some(sanitize_f32(sentiment, 0.0).clamp(-1.0, 1.0));
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn created_us(&self) -> u64 {
        self.created_us
    }

    pub fn source(&self) -> Option<Uuid> {
        self.source
    }

    pub fn sentiment(&self) -> Option<f32> {
        self.sentiment
    }

    pub fn is_placeholder(&self) -> bool {
        self.origin == Origin::Slow && self.confidence == 0.0 && self.content.is_empty()
    }
}
