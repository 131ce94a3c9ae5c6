//! Outreach pipeline engine.
//!
//! Pure domain logic ([`lifecycle`], [`compliance`], [`scheduler`],
//! [`classify`]) sits under a single-writer [`state::PipelineState`]. The
//! async [`pipeline::Outreach`] facade drives it against the external
//! collaborators declared in [`collaborators`].

pub mod classify;
pub mod clock;
pub mod collaborators;
pub mod compliance;
pub mod discovery;
pub mod dispatcher;
pub mod leads;
pub mod lifecycle;
pub mod pipeline;
pub mod reconciler;
pub mod scheduler;
pub mod state;
pub mod task;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collaborators::{
    Drafter, EmailEvent, EventLog, FollowUpRequest, LeadSource, LogReceipt, MailTransport,
    NoopEventLog, ReplyEvent,
};
pub use compliance::{Clearance, ComplianceGate};
pub use discovery::DiscoveryReport;
pub use dispatcher::{BatchSummary, Delivery};
pub use pipeline::{Outreach, PipelineSettings};
pub use reconciler::{MatchedBy, ReconcileReport, ReplyMatch};
pub use state::{Outbound, PipelineState, SendCheck};
