//! # Local Position Store
//!
//! Owns the local media-state database: one row per media file with its
//! resume position, position timestamp, content identifier and the
//! per-file player selections.
//!
//! ## Overview
//!
//! This crate manages:
//! - SQLite schema and migrations ([`db`])
//! - The [`MediaRepository`] data-access trait and its SQLite implementation
//! - [`LocalPositionStore`], which applies the clamping and timestamp rules
//!   and runs player writes on an application-wide background scope

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod store;

pub use error::{LibraryError, Result};
pub use models::{final_position, MediaRecord, POSITION_UNSET};
pub use repositories::{MediaRepository, SqliteMediaRepository};
pub use store::{LocalPositionStore, PositionWrite};
