//! Utils module - Logging setup, token estimation and string helpers

pub mod logging;
pub mod string;
pub mod tokens;
