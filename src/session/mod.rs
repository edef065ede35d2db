pub mod lifecycle;
pub mod session_store;

pub use lifecycle::{transition, SessionEvent, SessionLifecycle, SessionState};
pub use session_store::SessionStore;
