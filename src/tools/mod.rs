//! Type-safe tool argument modules.
//!
//! Each struct here implements `ToolArgs` for one external program and maps
//! Rust fields to the exact argv that program expects.

pub mod cryptdisks;
pub mod cryptsetup;
pub mod files;
