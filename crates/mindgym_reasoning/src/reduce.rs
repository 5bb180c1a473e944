//! Burst reduction
//!
//! Collapses a fast burst into the few thoughts worth a slow call. Every
//! strategy returns at least one thought for a non-empty burst.

use mindgym_core::Thought;
use mindgym_limbic::ReductionStrategy;
use std::collections::HashSet;

pub fn reduce(burst: &[Thought], strategy: ReductionStrategy) -> Vec<Thought> {
    if burst.is_empty() {
        return Vec::new();
    }
    match strategy {
        ReductionStrategy::Conservative => burst
            .iter()
            .max_by(|a, b| a.confidence().total_cmp(&b.confidence()))
            .cloned()
            .into_iter()
            .collect(),
        ReductionStrategy::Exploratory => burst
            .iter()
            .min_by(|a, b| a.confidence().total_cmp(&b.confidence()))
            .cloned()
            .into_iter()
            .collect(),
        ReductionStrategy::Clustered => {
            let k = (burst.len() as f64).sqrt().ceil() as usize;
            cluster(burst, k)
                .into_iter()
                .filter_map(|group| {
                    group
                        .into_iter()
                        .max_by(|a, b| a.confidence().total_cmp(&b.confidence()))
                        .cloned()
                })
                .collect()
        }
    }
}

/// Partition `burst` into at most `k` groups of mutually similar thoughts.
///
/// Seeds are chosen farthest-first starting from the most confident thought;
/// every thought then joins its nearest seed. Seeding stops early once all
/// remaining thoughts coincide with a seed, so groups are never empty.
pub fn cluster(burst: &[Thought], k: usize) -> Vec<Vec<&Thought>> {
    if burst.is_empty() {
        return Vec::new();
    }
    let k = k.clamp(1, burst.len());
    let words: Vec<HashSet<String>> = burst.iter().map(|t| word_set(t.content())).collect();
    let dist = |i: usize, j: usize| -> f32 {
        let conf = (burst[i].confidence() - burst[j].confidence()).abs();
        let text = 1.0 - jaccard(&words[i], &words[j]);
        0.5 * conf + 0.5 * text
    };

    let first = (0..burst.len())
        .max_by(|a, b| burst[*a].confidence().total_cmp(&burst[*b].confidence()))
        .unwrap_or(0);
    let mut seeds = vec![first];
    while seeds.len() < k {
        let candidate = (0..burst.len())
            .map(|i| {
                let nearest = seeds.iter().map(|s| dist(i, *s)).fold(f32::MAX, f32::min);
                (i, nearest)
            })
            .max_by(|a, b| a.1.total_cmp(&b.1));
        match candidate {
            Some((i, d)) if d > 0.0 => seeds.push(i),
            _ => break,
        }
    }

    let mut groups: Vec<Vec<&Thought>> = vec![Vec::new(); seeds.len()];
    for (i, thought) in burst.iter().enumerate() {
        let mut best = 0;
        let mut best_d = f32::MAX;
        for (g, s) in seeds.iter().enumerate() {
            let d = dist(i, *s);
            if d < best_d {
                best = g;
                best_d = d;
            }
        }
        groups[best].push(thought);
    }
    groups.retain(|g| !g.is_empty());
    groups
}

fn word_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect()
}

/// Jaccard similarity of two word sets (two empty sets are identical).
fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    intersection / union
}
