//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the playback-sync core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//! - Player preferences consumed by the sync path
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that `core-library` and
//! `core-sync` depend on. It establishes the logging conventions, the
//! capability wiring for host bridges, and the event broadcasting used to
//! observe position writes and sync passes.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod preferences;

pub use error::{Error, Result};
