//! # theme-forge
//!
//! A template-to-stylesheet compiler for theming.
//!
//! Design tokens (colors, spacing, nested maps) are merged per theme and
//! resolved to a fixed point. Stylesheet templates reference them with
//! `$name` and `${path.to.token}` and call value functions such as
//! `lighten($primary, 0.1)`. Templates compile through an arena-backed AST,
//! an optional optimizer and a serializer, and dynamic rules add
//! context-dependent blocks on top.
//!
//! ## Core Systems
//!
//! - **[`tokens`]**: token sets, variable stores, value functions, fixed-point resolver
//! - **[`template`]**: template stores and the loader (comments, imports, variables)
//! - **[`ast`]**: slotmap-backed arena of rules, declarations and conditions
//! - **[`compiler`]**: tokenizer, parser, substitution and serializer
//! - **[`optimizer`]**: level-gated tree rewriting
//! - **[`dynamic`]**: conditional style rules evaluated against a context
//! - **[`monitor`]**: operation timings, threshold alerts, background sampling
//! - **[`manager`]**: [`ThemeManager`], the public surface over all of the above
//! - **[`config`]**: serde/TOML settings for every component

// Foundation
pub mod config;
pub mod hash;
pub mod metrics;

// Tokens and templates
pub mod template;
pub mod tokens;

// Compilation
pub mod ast;
pub mod compiler;
pub mod optimizer;

// Runtime
pub mod dynamic;
pub mod manager;
pub mod monitor;

pub use compiler::Compiler;
pub use config::{
    CompilerConfig, ConfigError, DynamicConfig, MonitorConfig, OptimizerConfig, ResolverConfig,
    ThemeConfig,
};
pub use dynamic::{DynamicEngine, DynamicStyleRule, StyleCondition};
pub use manager::{ThemeError, ThemeManager};
pub use monitor::PerformanceMonitor;
pub use optimizer::{OptimizationLevel, Optimizer};
pub use template::{MemoryTemplateStore, TemplateLoader, TemplateStore};
pub use tokens::{MemoryVariableStore, TokenEngine, TokenSet, TokenValue, VariableStore};
