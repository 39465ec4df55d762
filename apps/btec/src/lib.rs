//! # btec (library half)
//!
//! The pieces of the btec binary that are useful to tests and to the CLI
//! alike: configuration loading and adaptation of JSON form payloads to
//! the core form model.

pub mod config;
pub mod form;
