//! AST optimizer: level-gated tree rewriting with an optional result cache.

pub mod passes;

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::ast::Ast;
use crate::config::OptimizerConfig;
use crate::metrics::{ratio, Counters};

pub use passes::optimize;

/// Rough per-node footprint used for the `memory_saved` estimate.
pub const ESTIMATED_NODE_BYTES: usize = 128;

/// How hard to optimize. Each level includes every pass of the levels below.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationLevel {
    /// Remove empty rules, empty blocks and empty declarations.
    Basic,
    /// Also collapse duplicate properties, keeping the last.
    #[default]
    Advanced,
    /// Also merge rules by selector list and by identical declaration set.
    Aggressive,
}

impl OptimizationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            OptimizationLevel::Basic => "basic",
            OptimizationLevel::Advanced => "advanced",
            OptimizationLevel::Aggressive => "aggressive",
        }
    }
}

impl fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What one optimization run did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OptimizationResult {
    pub original_nodes: usize,
    pub optimized_nodes: usize,
    pub removed_nodes: usize,
    /// Estimate in bytes; observability only.
    pub memory_saved: usize,
    pub level: OptimizationLevel,
}

impl OptimizationResult {
    pub fn unchanged(nodes: usize, level: OptimizationLevel) -> Self {
        Self {
            original_nodes: nodes,
            optimized_nodes: nodes,
            removed_nodes: 0,
            memory_saved: 0,
            level,
        }
    }
}

/// Optimizer with a result cache keyed by tree fingerprint and level.
#[derive(Debug, Default)]
pub struct Optimizer {
    config: OptimizerConfig,
    cache: FxHashMap<(u64, OptimizationLevel), (Ast, OptimizationResult)>,
    counters: Counters,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            config,
            cache: FxHashMap::default(),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: OptimizerConfig) {
        self.config = config;
        self.clear_cache();
    }

    /// Optimize at the configured level.
    pub fn optimize_default(&mut self, ast: &Ast) -> (Ast, OptimizationResult) {
        self.optimize(ast, self.config.level)
    }

    /// Optimize a copy of `ast` at `level`.
    pub fn optimize(&mut self, ast: &Ast, level: OptimizationLevel) -> (Ast, OptimizationResult) {
        let start = Instant::now();
        let key = (ast.fingerprint(), level);
        if self.config.cache_optimizations {
            if let Some(hit) = self.cache.get(&key) {
                self.counters.bump("cache_hits");
                return hit.clone();
            }
        }

        let (optimized, result) = passes::optimize(ast, level);
        self.counters.bump("optimizations");
        self.counters.add("nodes_removed", result.removed_nodes as f64);
        self.counters.add("memory_saved", result.memory_saved as f64);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.counters.add("total_optimize_ms", elapsed_ms);
        self.counters.max("peak_optimize_ms", elapsed_ms);
        tracing::debug!(
            level = %level,
            removed = result.removed_nodes,
            "optimized template tree"
        );

        if self.config.cache_optimizations {
            self.cache.insert(key, (optimized.clone(), result));
        }
        (optimized, result)
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn reset_metrics(&mut self) {
        self.counters.reset();
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn metrics(&self) -> BTreeMap<String, f64> {
        let mut out = self.counters.snapshot();
        out.insert(
            "average_optimize_ms".into(),
            ratio(
                self.counters.get("total_optimize_ms"),
                self.counters.get("optimizations"),
            ),
        );
        out.insert("cache_size".into(), self.cache.len() as f64);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::parse;

    #[test]
    fn level_names_and_order() {
        assert!(OptimizationLevel::Basic < OptimizationLevel::Advanced);
        assert!(OptimizationLevel::Advanced < OptimizationLevel::Aggressive);
        assert_eq!(OptimizationLevel::Aggressive.to_string(), "aggressive");
        let parsed: OptimizationLevel = serde_json::from_str("\"basic\"").unwrap();
        assert_eq!(parsed, OptimizationLevel::Basic);
    }

    #[test]
    fn cache_reuses_results() {
        let mut opt = Optimizer::new(OptimizerConfig::default());
        let ast = parse(".a { x: 1; x: 2 }");
        let first = opt.optimize(&ast, OptimizationLevel::Advanced);
        let second = opt.optimize(&ast, OptimizationLevel::Advanced);
        assert_eq!(first.1, second.1);
        assert_eq!(opt.metrics()["cache_hits"], 1.0);
        assert_eq!(opt.cache_len(), 1);
        opt.optimize(&ast, OptimizationLevel::Basic);
        assert_eq!(opt.cache_len(), 2);
        opt.clear_cache();
        assert_eq!(opt.cache_len(), 0);
    }

    #[test]
    fn cache_can_be_disabled() {
        let mut opt = Optimizer::new(OptimizerConfig {
            cache_optimizations: false,
            ..OptimizerConfig::default()
        });
        let ast = parse(".a { x: 1 }");
        opt.optimize_default(&ast);
        opt.optimize_default(&ast);
        assert_eq!(opt.cache_len(), 0);
        assert_eq!(opt.metrics()["optimizations"], 2.0);
    }
}
