//! Schemaguard Migration Library
//!
//! Argument parsing and report building for the `schemaguard-migrate` binary,
//! kept out of `main.rs` so they can be tested without a database.

pub mod cli;
pub mod status;
