//! Workspace facade crate.
//!
//! Re-exports the playback-position sync core so host applications can depend
//! on a single crate and enable the `desktop-shims` feature instead of wiring
//! `core-sync` and `core-runtime` individually.

#[cfg(feature = "desktop-shims")]
pub use core_runtime as runtime;
#[cfg(feature = "desktop-shims")]
pub use core_sync as sync;
