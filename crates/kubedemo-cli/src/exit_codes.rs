//! Standard exit codes for CLI operations
//!
//! These exit codes follow Unix conventions and sysexits.h where applicable.

/// Success - every required phase completed
pub const SUCCESS: i32 = 0;

/// General error - a required phase failed, the deadline elapsed or the run was interrupted
pub const ERROR: i32 = 1;

/// Workflow error - the workflow file is missing, unparseable or invalid
pub const WORKFLOW_ERROR: i32 = 2;

/// Precondition error - cluster unreachable or a manifest is missing
pub const PRECONDITION_ERROR: i32 = 3;

/// Usage error - invalid arguments or options (following sysexits.h convention)
pub const USAGE_ERROR: i32 = 64;
