//! Paccat: a lazily evaluated build-recipe language.
//!
//! Recipes describe values, lambdas and outputs. Outputs run shell scripts
//! whose results are cached by BLAKE3 structural hash.

pub mod cli;
pub mod core;
pub mod store;
pub mod transport;
