//! Stable exit codes for taskloop CLI commands.

/// The loop terminated with completion, or the command succeeded.
pub const OK: i32 = 0;
/// Invalid configuration, arguments, corrupt session, or other errors.
pub const INVALID: i32 = 1;
/// The loop stopped at the iteration limit without completing.
pub const LIMIT_EXCEEDED: i32 = 2;
/// The loop was cancelled before completing.
pub const CANCELLED: i32 = 3;
