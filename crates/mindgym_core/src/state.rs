//! Somatic state vector
//!
//! The body-side state of a workout session is four bounded dimensions:
//! - `arousal` (0.0 - 1.0): calm → activated
//! - `valence` (-1.0 - 1.0): negative → positive
//! - `coherence` (0.0 - 1.0): confused → clear
//! - `tension` (0.0 - 1.0): relaxed → strained
//!
//! Stress is derived from the vector on demand and never stored.

use serde::{Deserialize, Serialize};

/// Guard against NaN and Infinity in state values.
/// If the value is NaN or Inf, replace with the provided fallback (neutral default).
#[inline]
pub fn sanitize_f32(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        tracing::warn!("NaN/Inf detected in somatic state, resetting to fallback {}", fallback);
        fallback
    }
}

/// Four-dimensional somatic state: s = (arousal, valence, coherence, tension)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SomaticVector {
    /// Activation (0.0 - 1.0). Rises with large bursts, decays after slow work.
    pub arousal: f32,

    /// Emotional tone (-1.0 - 1.0). Driven by an external sentiment signal.
    pub valence: f32,

    /// Clarity (0.0 - 1.0). Blended from burst agreement and pattern stability.
    pub coherence: f32,

    /// Strain (0.0 - 1.0). Accumulates with processed work.
    pub tension: f32,
}

impl Default for SomaticVector {
    fn default() -> Self {
        Self {
            arousal: 0.5,
            valence: 0.0,
            coherence: 0.5,
            tension: 0.0,
        }
    }
}

impl SomaticVector {
    pub fn new(arousal: f32, valence: f32, coherence: f32, tension: f32) -> Self {
        let mut v = Self {
            arousal,
            valence,
            coherence,
            tension,
        };
        v.normalize();
        v
    }

    /// Combined stress metric: `arousal * (1 - valence) / 2 * (1 - coherence)`.
    ///
    /// Range is [0, 1] for any normalized vector.
    pub fn stress(&self) -> f32 {
        let stress = self.arousal * (1.0 - self.valence) / 2.0 * (1.0 - self.coherence);
        sanitize_f32(stress, 0.0).clamp(0.0, 1.0)
    }

    /// Clamp all values to valid ranges
    pub fn normalize(&mut self) {
        self.arousal = sanitize_f32(self.arousal, 0.5).clamp(0.0, 1.0);
        self.valence = sanitize_f32(self.valence, 0.0).clamp(-1.0, 1.0);
        self.coherence = sanitize_f32(self.coherence, 0.5).clamp(0.0, 1.0);
        self.tension = sanitize_f32(self.tension, 0.0).clamp(0.0, 1.0);
    }

    /// True when every field is finite and inside its declared range.
    pub fn is_bounded(&self) -> bool {
        (0.0..=1.0).contains(&self.arousal)
            && (-1.0..=1.0).contains(&self.valence)
            && (0.0..=1.0).contains(&self.coherence)
            && (0.0..=1.0).contains(&self.tension)
    }
}

/// Serializable view of the somatic state at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SomaticSnapshot {
    pub vector: SomaticVector,
    pub stress: f32,
}

impl From<SomaticVector> for SomaticSnapshot {
    fn from(vector: SomaticVector) -> Self {
        Self {
            stress: vector.stress(),
            vector,
        }
    }
}
