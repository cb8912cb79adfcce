//! Domain types shared by every stage of the interception pipeline:
//! the request envelope and its method classification, the L1/L2 finding
//! shapes, the verdict, and the two records the pipeline ultimately
//! produces (audit record, dashboard event).

mod audit;
mod envelope;
mod event;
mod finding;
mod verdict;

pub use audit::AuditRecord;
pub use audit::HumanActor;
pub use audit::sha256_hex;
pub use envelope::MethodClass;
pub use envelope::RequestEnvelope;
pub use envelope::TransportKind;
pub use event::DashboardEvent;
pub use finding::L1Finding;
pub use finding::L2Finding;
pub use finding::L2Outcome;
pub use finding::ThreatLevel;
pub use verdict::BlockReason;
pub use verdict::Verdict;
