//! Sessions and the approval state machine.

pub mod machine;
pub mod model;
pub mod store;

pub use machine::ApprovalStateMachine;
pub use model::{Decision, Session, SessionState};
pub use store::SessionStore;
