//! Core moderation pipeline for the group moderation bot.
//!
//! This crate is intentionally framework-agnostic. Telegram and the
//! classification service live behind ports (traits) implemented in adapter
//! crates.

pub mod admin_cache;
pub mod classifier;
pub mod config;
pub mod context;
pub mod detect;
pub mod dispatcher;
pub mod domain;
pub mod enforcer;
pub mod errors;
pub mod logging;
pub mod patterns;
pub mod ports;
pub mod prompts;
pub mod settings;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
