//! Helpers shared by the backup modules.

pub mod command;
pub mod retention;
pub mod size;
