//! Process wiring for the `ascaler` binary

pub mod api;
pub mod bootstrap;
pub mod config;
