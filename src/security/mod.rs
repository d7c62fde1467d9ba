//! Security module for CodeCLI
//!
//! Path resolution, shell command policy and the permission gate that every
//! file and shell tool consults before acting.

pub mod path;
pub mod permissions;
pub mod shell;

pub use path::{is_within, normalize, resolve_path};
pub use permissions::{
    DenyPrompter, PermissionAction, PermissionChoice, PermissionGate, PermissionPrompter,
    PermissionRequest,
};
pub use shell::{CommandPolicy, CommandVerdict};
