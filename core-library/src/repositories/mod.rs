//! # Repository Pattern Implementation
//!
//! Repository traits and their SQLite implementations.
//!
//! ## Architecture
//!
//! - Traits define the interface consumed by services and sync code
//! - SQLite implementations use sqlx for async database access
//! - All operations return `Result<T>` for error handling
//!
//! ## Available Repositories
//!
//! - `MediaRepository` - Per-file playback state (position, tracks, zoom, speed)

pub mod media;

pub use media::{MediaRepository, SqliteMediaRepository};
