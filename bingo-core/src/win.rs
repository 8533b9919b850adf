use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::board::BoardSize;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WinCondition {
    /// Any full row, column or either diagonal.
    #[default]
    Traditional,
    /// Every cell covered.
    #[serde(rename = "all")]
    AllSquares,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WinEvaluator {
    size: BoardSize,
    condition: WinCondition,
    patterns: Vec<Vec<usize>>,
}

impl WinEvaluator {
    pub fn new(size: BoardSize, condition: WinCondition) -> Self {
        Self {
            size,
            condition,
            patterns: Self::patterns(size),
        }
    }

    /// Rows, then columns, then the two diagonals.
    pub fn patterns(size: BoardSize) -> Vec<Vec<usize>> {
        let n = size.dimension();
        let mut patterns = Vec::with_capacity(2 * n + 2);
        for row in 0..n {
            patterns.push((row * n..(row + 1) * n).collect());
        }
        for col in 0..n {
            patterns.push((col..n * n).step_by(n).collect());
        }
        patterns.push((0..n).map(|i| i * (n + 1)).collect());
        patterns.push((1..=n).map(|i| i * (n - 1)).collect());
        patterns
    }

    pub fn is_win(&self, covered: &BTreeSet<usize>) -> bool {
        match self.condition {
            WinCondition::AllSquares => covered.len() == self.size.cells(),
            WinCondition::Traditional => self
                .patterns
                .iter()
                .any(|pattern| pattern.iter().all(|pos| covered.contains(pos))),
        }
    }
}
