#![doc = "PM QOS latency guard for the cstate-disabler workspace."]

pub mod latency;
pub mod probe;
pub mod shared;

pub use latency::*;
pub use probe::*;
pub use shared::*;
