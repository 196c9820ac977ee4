pub mod capture;
pub mod common;
pub mod completions;
pub mod discard;
pub mod queue;
pub mod reset;
pub mod snapshots;
pub mod status;
pub mod sync;
