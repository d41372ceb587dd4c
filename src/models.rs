//! Internal data model for conversations and tools.
//!
//! Callers may hand the engine loose JSON shapes (plain strings, key-tagged
//! part objects); those are normalized into these structs immediately and the
//! wire encoding is derived from them in `providers::utils`.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
