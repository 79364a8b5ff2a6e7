//! Language engine: lexing, parsing, resolution, evaluation and output builds.

pub mod ast;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod lexer;
pub mod parser;
pub mod resolver;
pub mod scope;
pub mod types;
pub mod value;
