//! Pattern grid - the toroidal field the automaton lives on
//!
//! Dimensions are fixed at construction and never change. Every coordinate
//! access wraps, so callers never see an out-of-bounds error.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Fixed-size boolean field with a generation counter and bounded history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternGrid {
    width: usize,
    height: usize,
    /// Row-major, `true` = alive
    cells: Vec<bool>,
    generation: u64,
    /// Prior generations, oldest first
    history: VecDeque<Vec<bool>>,
    history_len: usize,
}

impl PatternGrid {
    /// Create an all-dead grid. Zero dimensions are raised to 1.
    pub fn new(width: usize, height: usize, history_len: usize) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            width,
            height,
            cells: vec![false; width * height],
            generation: 0,
            history: VecDeque::with_capacity(history_len),
            history_len,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cells(&self) -> &[bool] {
        &self.cells
    }

    pub fn history(&self) -> &VecDeque<Vec<bool>> {
        &self.history
    }

    /// Wrap signed coordinates onto the torus.
    pub fn wrap(&self, x: i64, y: i64) -> (usize, usize) {
        (
            x.rem_euclid(self.width as i64) as usize,
            y.rem_euclid(self.height as i64) as usize,
        )
    }

    fn index(&self, x: i64, y: i64) -> usize {
        let (x, y) = self.wrap(x, y);
        y * self.width + x
    }

    pub fn get(&self, x: i64, y: i64) -> bool {
        self.cells[self.index(x, y)]
    }

    pub fn set(&mut self, x: i64, y: i64, alive: bool) {
        let i = self.index(x, y);
        self.cells[i] = alive;
    }

    pub fn live_count(&self) -> usize {
        self.cells.iter().filter(|c| **c).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.cells.iter().any(|c| *c)
    }

    /// Live cells in the 8-neighborhood, with toroidal wraparound.
    pub fn live_neighbors(&self, x: i64, y: i64) -> u8 {
        let mut n = 0;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if (dx, dy) != (0, 0) && self.get(x + dx, y + dy) {
                    n += 1;
                }
            }
        }
        n
    }

    /// Install the next generation, pushing the current one into history.
    pub(crate) fn advance(&mut self, next: Vec<bool>) {
        debug_assert_eq!(next.len(), self.cells.len());
        if self.history_len > 0 {
            if self.history.len() >= self.history_len {
                self.history.pop_front();
            }
            self.history.push_back(std::mem::replace(&mut self.cells, next));
        } else {
            self.cells = next;
        }
        self.generation += 1;
    }

    /// Smallest cycle length k in 1..=lookback such that the current generation
    /// equals the one k steps back.
    pub fn cycle_length(&self, lookback: usize) -> Option<usize> {
        self.history
            .iter()
            .rev()
            .take(lookback)
            .position(|past| *past == self.cells)
            .map(|i| i + 1)
    }

    /// Fraction of cells identical to the previous generation.
    pub fn similarity_to_previous(&self) -> Option<f32> {
        let prev = self.history.back()?;
        let same = prev
            .iter()
            .zip(&self.cells)
            .filter(|(a, b)| a == b)
            .count();
        Some(same as f32 / self.cells.len() as f32)
    }

    /// Bit-packed cell state, row-major, LSB first.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.cells
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u8, |acc, (i, alive)| if *alive { acc | (1 << i) } else { acc })
            })
            .collect()
    }
}
