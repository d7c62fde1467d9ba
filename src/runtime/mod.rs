//! Shell process runtime for CodeCLI
//!
//! Commands run directly on the host (no container isolation); the
//! permission gate is the only guard in front of this module.

pub mod native;
pub mod types;

pub use native::{ctrl_c_interrupt, ProcessRunner};
pub use types::{
    ProcessOutput, ProcessRequest, DEFAULT_COMMAND_TIMEOUT, INTERRUPT_EXIT_CODE,
    SPAWN_FAILURE_EXIT_CODE, TIMEOUT_EXIT_CODE,
};
