//! Output store: BLAKE3 hashing and the build event log in the cache root.

pub mod eventlog;
pub mod hasher;
