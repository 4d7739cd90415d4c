//! Thread management for the session.
//!
//! - `SessionThread`: serializes every mode, task and map mutation
//!
//! Telemetry callback threads live in [`crate::telemetry`].

mod session_thread;

pub use session_thread::{SessionContext, SessionThread};

/// Name of the session worker thread.
pub const SESSION_THREAD_NAME: &str = "disha-session";

/// Whether the calling thread is the session worker.
pub fn is_session_thread() -> bool {
    std::thread::current().name() == Some(SESSION_THREAD_NAME)
}
