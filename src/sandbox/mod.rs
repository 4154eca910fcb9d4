//! Sandbox execution using Isolate
//!
//! Provides the isolation boundary for everything that runs user-supplied
//! code, including compilation. All mutation is confined to the box; the box
//! is torn down after every execution.

pub mod isolate_box;
pub mod meta;

pub use isolate_box::{ensure_cgroups_available, is_cgroups_available, IoSpec, IsolateBox, Limits};
pub use meta::IsolateStatus;
