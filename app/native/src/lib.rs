//! Backdrop - rotates the desktop background from pluggable image sources.
//!
//! Sources deliver images, the cache keeps raw and processed copies, the
//! post-processing pipeline fits them to the screen, and the orchestrator
//! ties it all together behind a message inbox. The `backdrop` binary drives
//! the orchestrator through the [`cli`] module.

pub mod cache;
pub mod cli;
pub mod config;
pub mod constants;
pub mod desktop;
pub mod error;
pub mod events;
pub mod metamodel;
pub mod orchestrator;
pub mod platform;
pub mod processing;
pub mod schema;
pub mod source;
