//! Best-effort recovery of truncated JSON emitted by streaming models.
//!
//! [`repair`] closes unterminated strings and structures and never fails;
//! callers inspect the returned [`RepairOutcome`]. [`extract_code_execution_params`]
//! recovers `code`/`command` arguments from tool calls cut off mid-value.

pub mod extract;
pub mod repair;

pub use extract::{
    extract_code_execution_params, extract_run_code_params, extract_run_script_params,
    repair_tool_arguments, TRUNCATION_MARKER,
};
pub use repair::{repair, RepairFailure, RepairOutcome};
