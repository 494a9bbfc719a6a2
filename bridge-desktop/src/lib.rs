//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `FileSystemAccess` using `tokio::fs`, with seek-based ranged reads
//! - `SettingsStore` using a SQLite-backed key-value table
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{SqliteSettingsStore, TokioFileSystem};
//!
//! #[tokio::main]
//! async fn main() {
//!     let fs = TokioFileSystem::new();
//!     let settings = SqliteSettingsStore::new("settings.db".into()).await.unwrap();
//!     // Hand both to CoreConfig::builder()
//! }
//! ```

mod filesystem;
mod settings;

pub use filesystem::TokioFileSystem;
pub use settings::SqliteSettingsStore;
