//! Records, value types and wire shapes shared by every Cosnap crate.

pub mod api;
pub mod events;
pub mod models;

pub use models::ParseError;
