//! Host-side control layer for debuggers speaking the GDB machine interface (MI).
//!
//! [`mi`] holds the wire format: output records and commands. [`control`] runs debug
//! sessions on top of it: backend process supervision, the context model, command caching,
//! run control and lifecycle events.
pub mod control;
pub mod mi;

pub use control::{Error, EventBus, LaunchConfig, SessionBuilder, SessionHandle};
