//! Per-agent session history: a bounded ring of recent envelopes per
//! session id, with idle-TTL eviction run by a periodic sweep task.

mod store;

pub use store::Session;
pub use store::SessionStore;
