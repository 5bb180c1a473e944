//! Motifs - small fixed cell patterns stamped into the grid
//!
//! - Glider: the self-propagating motif, stamped for fast thoughts
//! - Block: the static 2x2 still life, stamped for slow thoughts
//! - Noise: a random 4x4 patch, stamped on conflict or loop recovery
//!
//! The same shapes are used in reverse to count gliders and oscillators.

use crate::grid::PatternGrid;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Motif {
    Glider,
    Block,
    Noise,
}

const GLIDER: [(i64, i64); 5] = [(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)];
const BLOCK: [(i64, i64); 4] = [(0, 0), (1, 0), (0, 1), (1, 1)];
const NOISE_SIZE: i64 = 4;

impl Motif {
    /// Side length of the square the motif occupies
    pub fn extent(&self) -> i64 {
        match self {
            Motif::Glider => 3,
            Motif::Block => 2,
            Motif::Noise => NOISE_SIZE,
        }
    }

    /// Overwrite the motif's square at (x, y). Coordinates wrap.
    pub fn stamp<R: Rng + ?Sized>(&self, grid: &mut PatternGrid, x: i64, y: i64, rng: &mut R) {
        let extent = self.extent();
        for dy in 0..extent {
            for dx in 0..extent {
                grid.set(x + dx, y + dy, false);
            }
        }
        match self {
            Motif::Glider => {
                for (dx, dy) in GLIDER {
                    grid.set(x + dx, y + dy, true);
                }
            }
            Motif::Block => {
                for (dx, dy) in BLOCK {
                    grid.set(x + dx, y + dy, true);
                }
            }
            Motif::Noise => {
                for dy in 0..extent {
                    for dx in 0..extent {
                        grid.set(x + dx, y + dy, rng.gen_bool(0.5));
                    }
                }
            }
        }
    }
}

// =============================================================================
// Detection masks (3x3 windows, bit = y * 3 + x)
// =============================================================================

fn mask_from_rows(rows: [&str; 3]) -> u16 {
    let mut mask = 0u16;
    for (y, row) in rows.iter().enumerate() {
        for (x, c) in row.chars().enumerate() {
            if c == '#' {
                mask |= 1 << (y * 3 + x);
            }
        }
    }
    mask
}

fn transform(mask: u16, f: impl Fn(usize, usize) -> (usize, usize)) -> u16 {
    let mut out = 0u16;
    for y in 0..3 {
        for x in 0..3 {
            if mask & (1 << (y * 3 + x)) != 0 {
                let (nx, ny) = f(x, y);
                out |= 1 << (ny * 3 + nx);
            }
        }
    }
    out
}

/// All eight rotations/reflections of a 3x3 mask.
fn symmetries(mask: u16) -> [u16; 8] {
    let rot = |m: u16| transform(m, |x, y| (2 - y, x));
    let flip = |m: u16| transform(m, |x, y| (2 - x, y));
    let r1 = rot(mask);
    let r2 = rot(r1);
    let r3 = rot(r2);
    [mask, r1, r2, r3, flip(mask), flip(r1), flip(r2), flip(r3)]
}

/// Every glider phase in every orientation.
pub(crate) fn glider_masks() -> &'static [u16] {
    static MASKS: OnceLock<Vec<u16>> = OnceLock::new();
    MASKS.get_or_init(|| {
        let phases = [
            [".#.", "..#", "###"],
            ["#.#", ".##", ".#."],
            ["..#", "#.#", ".##"],
            ["#..", ".##", "##."],
        ];
        let mut masks: Vec<u16> = phases
            .iter()
            .flat_map(|rows| symmetries(mask_from_rows(*rows)))
            .collect();
        masks.sort_unstable();
        masks.dedup();
        masks
    })
}

/// Both phases of the blinker (period-2 oscillator).
pub(crate) fn blinker_masks() -> [u16; 2] {
    [
        mask_from_rows(["...", "###", "..."]),
        mask_from_rows([".#.", ".#.", ".#."]),
    ]
}

/// Read the 3x3 window whose top-left corner is (x, y).
pub(crate) fn window_mask(grid: &PatternGrid, x: i64, y: i64) -> u16 {
    let mut mask = 0u16;
    for dy in 0..3 {
        for dx in 0..3 {
            if grid.get(x + dx, y + dy) {
                mask |= 1 << (dy * 3 + dx);
            }
        }
    }
    mask
}

/// True when the one-cell ring around the 3x3 window at (x, y) is dead.
pub(crate) fn ring_is_dead(grid: &PatternGrid, x: i64, y: i64) -> bool {
    for dy in -1..=3 {
        for dx in -1..=3 {
            let inner = (0..3).contains(&dx) && (0..3).contains(&dy);
            if !inner && grid.get(x + dx, y + dy) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_glider_stamp_has_five_cells() {
        let mut g = PatternGrid::new(8, 8, 4);
        let mut rng = StdRng::seed_from_u64(1);
        Motif::Glider.stamp(&mut g, 2, 2, &mut rng);
        assert_eq!(g.live_count(), 5);
        assert!(glider_masks().contains(&window_mask(&g, 2, 2)));
        assert!(ring_is_dead(&g, 2, 2));
    }

    #[test]
    fn test_block_stamp_wraps() {
        let mut g = PatternGrid::new(4, 4, 4);
        let mut rng = StdRng::seed_from_u64(1);
        Motif::Block.stamp(&mut g, 3, 3, &mut rng);
        assert_eq!(g.live_count(), 4);
        assert!(g.get(0, 0) && g.get(3, 0) && g.get(0, 3) && g.get(3, 3));
    }

    #[test]
    fn test_noise_stays_inside_its_patch() {
        let mut g = PatternGrid::new(10, 10, 4);
        let mut rng = StdRng::seed_from_u64(7);
        Motif::Noise.stamp(&mut g, 1, 1, &mut rng);
        for y in 0..10 {
            for x in 0..10 {
                if g.get(x, y) {
                    assert!((1..5).contains(&x) && (1..5).contains(&y));
                }
            }
        }
    }

    #[test]
    fn test_glider_masks_cover_all_orientations() {
        let masks = glider_masks();
        // 4 phases x 8 symmetries, with no duplicates left after dedup
        assert!(masks.len() >= 16);
        assert!(masks.iter().all(|m| m.count_ones() == 5));
        for b in blinker_masks() {
            assert!(!masks.contains(&b));
        }
    }
}
