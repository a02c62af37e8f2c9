//! CLI command implementations.

pub mod clear;
pub mod entry;
pub mod inspect;
pub mod list;
pub mod store;
