//! Command implementations

pub mod check;
pub mod check_batch;
pub mod completions;
pub mod kill_port;
pub mod relations;
pub mod validate;
