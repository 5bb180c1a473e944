//! Pattern export
//!
//! A [`PatternFrame`] is a row-major 8-bit luminance raster of the grid
//! (live = 255, dead = 0). Encoding it further is the presenter's business;
//! PGM and plain text are provided for quick inspection.

use mindgym_limbic::PatternGrid;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatternFrame {
    pub width: usize,
    pub height: usize,
    pub generation: u64,
    pub pixels: Vec<u8>,
}

impl PatternFrame {
    pub fn from_grid(grid: &PatternGrid) -> Self {
        let (width, height) = grid.dimensions();
        Self {
            width,
            height,
            generation: grid.generation(),
            pixels: grid
                .cells()
                .iter()
                .map(|alive| if *alive { 255 } else { 0 })
                .collect(),
        }
    }

    pub fn live_pixels(&self) -> usize {
        self.pixels.iter().filter(|p| **p > 0).count()
    }

    /// Binary PGM (P5).
    pub fn to_pgm(&self) -> Vec<u8> {
        let mut out = format!("P5\n{} {}\n255\n", self.width, self.height).into_bytes();
        out.extend_from_slice(&self.pixels);
        out
    }

    pub fn to_ascii(&self) -> String {
        let mut out = String::with_capacity((self.width + 1) * self.height);
        for row in self.pixels.chunks(self.width.max(1)) {
            out.extend(row.iter().map(|p| if *p > 0 { '#' } else { '.' }));
            out.push('\n');
        }
        out
    }
}
