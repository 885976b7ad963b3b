//! Request handlers

pub mod admin;
pub mod logs;
pub mod public;
pub mod quota;
pub mod send;
pub mod usage;
