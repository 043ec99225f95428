use serde::{Deserialize, Serialize};
use umbra_canvas::SolverConfig;

/// Default item geometry, in canvas units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemDefaults {
    pub min_width: f64,
    pub min_height: f64,
    pub width: f64,
    pub height: f64,
    /// Initial length of a fork/join bar.
    pub fork_height: f64,
    /// The bar never gets shorter than this.
    pub fork_min_height: f64,
}

impl Default for ItemDefaults {
    fn default() -> Self {
        Self {
            min_width: 10.0,
            min_height: 10.0,
            width: 100.0,
            height: 50.0,
            fork_height: 45.0,
            fork_min_height: 30.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Undo entries kept before the oldest is dropped.
    pub max_undo_depth: usize,
    pub solver: SolverConfig,
    pub items: ItemDefaults,
    /// Translation applied to pasted items.
    pub paste_offset: (f64, f64),
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_undo_depth: 100,
            solver: SolverConfig::default(),
            items: ItemDefaults::default(),
            paste_offset: (10.0, 10.0),
        }
    }
}
