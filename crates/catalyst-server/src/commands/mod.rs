//! Command implementations

pub mod create;
pub mod restore;
pub mod serve;
