//! Options of one inference run

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferOptions {
    /// Record and log per-phase timings
    pub stats: bool,
    /// How deeply macro expansions may nest inside each other
    pub max_macro_depth: usize,
    /// Infer constants nothing read once the traversal is done
    pub infer_unread_constants: bool,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self {
            stats: false,
            max_macro_depth: 64,
            infer_unread_constants: true,
        }
    }
}

impl InferOptions {
    pub fn with_stats(mut self, stats: bool) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_max_macro_depth(mut self, depth: usize) -> Self {
        self.max_macro_depth = depth;
        self
    }
}
