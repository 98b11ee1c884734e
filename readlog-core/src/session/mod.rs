//! Session lifecycle
//!
//! [`SessionController`] owns the per-book active-session state and talks to
//! the persistence collaborator through the [`SessionStore`] port.

mod controller;
mod store;

pub use controller::{Operation, SessionController, SessionEvent};
pub use store::{
    PauseRequest, QuickAddRequest, ResumeRequest, SessionRecords, SessionStore, StartRequest,
    StopRequest,
};
