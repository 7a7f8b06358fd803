//! Template compiler: tokenizer, best-effort parser, serializer, caches.

pub mod compile;
pub mod parser;
pub mod serializer;
pub mod tokenizer;

pub use compile::Compiler;
pub use parser::{parse, parse_with_diagnostics, ParseError};
pub use serializer::{serialize, SerializeOptions};
