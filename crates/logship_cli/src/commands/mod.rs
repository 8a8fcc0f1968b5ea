//! CLI command implementations.

pub mod inspect;
pub mod mark;
pub mod resume;
pub mod verify;
