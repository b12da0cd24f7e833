//! Session and transcript management.
//!
//! Sessions live in memory only and are identified by UUID. Each one owns
//! the transcript of a single browser session.
//!
//! # Architecture
//!
//! - [`Transcript`]: append-only message history
//! - [`ChatSession`]: transcript plus per-session remote state
//! - [`SessionStore`]: thread-safe store for all active sessions
//!
//! # Example
//!
//! ```rust
//! use assistant_relay::session::{Message, SessionStore};
//!
//! let store = SessionStore::new();
//! let session = store.create("ultimate", "asst_123");
//! let mut session = session.try_lock().unwrap();
//! session.transcript.push(Message::user("Hello!"));
//!
//! assert_eq!(session.transcript.len(), 1);
//! ```

mod store;
mod transcript;

pub use store::{ChatSession, SessionStore, SharedSession};
pub use transcript::{Message, Role, Transcript};
