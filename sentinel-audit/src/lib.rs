//! The append-only audit sink: durable, batched, JSON-lines storage of
//! every verdict the gateway ever renders, plus the paginated read
//! surface an operator dashboard queries.

mod backoff;
mod query;
mod sink;

pub use query::AuditQuery;
pub use query::QueryError;
pub use query::query;
pub use sink::AuditSink;
pub use sink::AuditSinkHandle;
