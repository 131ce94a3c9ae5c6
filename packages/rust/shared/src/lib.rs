//! Shared types, error model, and configuration for the outreach pipeline.
//!
//! This crate is the foundation depended on by all other outreach crates:
//! the [`OutreachError`] type, the persisted domain types ([`Lead`],
//! [`EmailDraft`], [`ScheduledSend`] and friends) and configuration loading.

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DispatchConfig, DispatchPolicy, FollowUpConfig, ReconcileConfig, SenderConfig,
    StorageConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    validate_sender,
};
pub use error::{OutreachError, Result};
pub use types::{
    ComplianceRecord, DeliveryStatus, EmailDraft, InboundMessage, Lead, LeadId, LeadStatus,
    Prospect, ScheduledSend, SendKind,
};
