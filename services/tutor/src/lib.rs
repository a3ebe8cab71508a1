//! Tutor Service Library Crate
//!
//! Environment configuration and the line-oriented front end for the tutor.
//! The `tutor` binary is a thin wrapper around this library.

pub mod config;
pub mod repl;
