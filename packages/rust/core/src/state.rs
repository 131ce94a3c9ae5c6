//! Single-writer pipeline state.
//!
//! [`PipelineState`] owns the leads, the compliance gate and the send
//! schedule, and rewrites the touched document after every mutation. Write
//! failures are logged and swallowed here; only explicit import/export
//! surfaces storage errors.
//!
//! Everything in this module is synchronous. Async operations in
//! [`crate::pipeline`] take the state lock only around these calls and
//! never across a collaborator await.

use chrono::{DateTime, Utc};
use outreach_shared::{
    EmailDraft, Lead, LeadId, LeadStatus, OutreachError, Result, ScheduledSend, SendKind,
};
use outreach_storage::DocumentStore;
use tracing::{debug, info, warn};

use crate::classify::{self, InboundKind};
use crate::compliance::{Clearance, ComplianceGate};
use crate::leads::LeadStore;
use crate::lifecycle;
use crate::scheduler::{self, SendSchedule};

/// A message cleared to go to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub lead_id: LeadId,
    pub kind: SendKind,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outcome of the pre-send checks for one lead.
#[derive(Debug, Clone, PartialEq)]
pub enum SendCheck {
    /// Clear to send.
    Ready(Outbound),
    /// The recipient is blocklisted; the lead has been moved to `DoNotContact`.
    Blocked { reason: String },
    /// The lead is scheduled for later.
    Deferred { until: DateTime<Utc> },
}

/// Leads, blocklist and schedule, plus the optional store they persist to.
#[derive(Debug, Default)]
pub struct PipelineState {
    leads: LeadStore,
    gate: ComplianceGate,
    schedule: SendSchedule,
    store: Option<DocumentStore>,
}

impl PipelineState {
    /// State that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load all three documents from `store`. Unreadable documents are an
    /// error here: starting from an empty state would overwrite them.
    pub fn open(store: DocumentStore) -> Result<Self> {
        let leads = store.load_leads()?;
        let record = store.load_compliance()?;
        let scheduled = store.load_scheduled()?;
        info!(
            leads = leads.len(),
            blocked_emails = record.emails.len(),
            scheduled = scheduled.len(),
            "loaded pipeline state"
        );
        Ok(Self {
            leads: LeadStore::new(leads),
            gate: ComplianceGate::from_record(&record),
            schedule: SendSchedule::new(scheduled),
            store: Some(store),
        })
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn leads(&self) -> &[Lead] {
        self.leads.all()
    }

    pub fn lead(&self, id: &LeadId) -> Option<&Lead> {
        self.leads.get(id)
    }

    pub fn gate(&self) -> &ComplianceGate {
        &self.gate
    }

    pub fn scheduled(&self) -> &[ScheduledSend] {
        self.schedule.entries()
    }

    pub fn due_scheduled(&self, now: DateTime<Utc>) -> Vec<&ScheduledSend> {
        self.schedule.due(now)
    }

    pub fn follow_ups_needed(&self, threshold_days: i64, now: DateTime<Utc>) -> Vec<Lead> {
        scheduler::follow_ups_needed(self.leads.all(), threshold_days, now)
            .into_iter()
            .cloned()
            .collect()
    }

    // -----------------------------------------------------------------------
    // Lead collection
    // -----------------------------------------------------------------------

    pub fn add_lead(&mut self, lead: Lead) -> Result<LeadId> {
        let id = self.leads.insert(lead)?;
        self.persist_leads();
        Ok(id)
    }

    /// Remove a lead and any schedule entries for it.
    pub fn remove_lead(&mut self, id: &LeadId) -> Result<Lead> {
        let lead = self.leads.remove(id)?;
        if self.schedule.discard_for(id) > 0 {
            self.persist_schedule();
        }
        self.persist_leads();
        Ok(lead)
    }

    /// Merge imported leads, skipping ids or addresses already tracked.
    /// Returns how many were added.
    pub fn merge_leads(&mut self, imported: Vec<Lead>) -> usize {
        let mut added = 0;
        for lead in imported {
            let email = lead.email.clone();
            match self.leads.insert(lead) {
                Ok(_) => added += 1,
                Err(e) => debug!(%email, error = %e, "skipping imported lead"),
            }
        }
        if added > 0 {
            self.persist_leads();
        }
        added
    }

    // -----------------------------------------------------------------------
    // Lifecycle operations
    // -----------------------------------------------------------------------

    /// Attach a draft produced by the drafting service. Preconditions are
    /// re-checked against the lead as it is now.
    pub fn attach_draft(&mut self, id: &LeadId, kind: SendKind, draft: EmailDraft) -> Result<()> {
        let lead = self.leads.require_mut(id)?;
        match kind {
            SendKind::Initial => lifecycle::attach_draft(lead, draft)?,
            SendKind::FollowUp => lifecycle::attach_follow_up(lead, draft)?,
        }
        self.persist_leads();
        Ok(())
    }

    pub fn approve(&mut self, id: &LeadId, kind: SendKind) -> Result<()> {
        lifecycle::approve(self.leads.require_mut(id)?, kind)?;
        self.persist_leads();
        Ok(())
    }

    pub fn delete_draft(&mut self, id: &LeadId, kind: SendKind) -> Result<()> {
        let lead = self.leads.require_mut(id)?;
        match kind {
            SendKind::Initial => lifecycle::delete_draft(lead)?,
            SendKind::FollowUp => lifecycle::delete_follow_up_draft(lead)?,
        }
        if self.schedule.discard_pending(id, kind) > 0 {
            self.persist_schedule();
        }
        self.persist_leads();
        Ok(())
    }

    pub fn set_status(&mut self, id: &LeadId, status: LeadStatus) -> Result<()> {
        let blocked = self.gate.is_blocked(&self.leads.require(id)?.email);
        lifecycle::set_status(self.leads.require_mut(id)?, status, blocked)?;
        self.persist_leads();
        Ok(())
    }

    /// Drop schedule entries that were already sent. Returns how many.
    pub fn prune_sent_schedule(&mut self) -> usize {
        let pruned = self.schedule.prune_sent();
        if pruned > 0 {
            self.persist_schedule();
        }
        pruned
    }

    /// Defer the `kind` send of a lead until `at`.
    pub fn defer_send(&mut self, id: &LeadId, kind: SendKind, at: DateTime<Utc>) -> Result<()> {
        let lead = self.leads.require_mut(id)?;
        if lead.status.is_terminal() {
            return Err(OutreachError::precondition(
                id,
                format!("lead is {}", lead.status),
            ));
        }
        if lead.draft(kind).is_none_or(|d| d.is_sent()) {
            return Err(OutreachError::precondition(
                id,
                format!("no unsent {kind} draft to schedule"),
            ));
        }
        self.schedule.defer(lead, kind, at);
        info!(lead = %id, %kind, %at, "send deferred");
        self.persist_leads();
        self.persist_schedule();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Compliance
    // -----------------------------------------------------------------------

    pub fn can_send(&self, email: &str) -> Clearance {
        self.gate.can_send(email)
    }

    /// Blocklist `email` and its domain, persisting immediately.
    pub fn block(&mut self, email: &str, reason: &str) -> bool {
        let changed = self.gate.add_to_blocklist(email, reason);
        if changed {
            self.persist_compliance();
        }
        changed
    }

    pub fn unblock(&mut self, email: &str) -> bool {
        let changed = self.gate.remove_from_blocklist(email);
        if changed {
            self.persist_compliance();
        }
        changed
    }

    pub fn unblock_domain(&mut self, domain: &str) -> bool {
        let changed = self.gate.remove_domain(domain);
        if changed {
            self.persist_compliance();
        }
        changed
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    /// Run every pre-send check for one lead: draft approved and unsent,
    /// recipient not blocklisted, not scheduled for later.
    ///
    /// A blocklisted recipient, or a recorded reply that reads as an opt-out,
    /// moves the lead to `DoNotContact` here.
    pub fn check_send(&mut self, id: &LeadId, kind: SendKind, now: DateTime<Utc>) -> Result<SendCheck> {
        let lead = self.leads.require_mut(id)?;
        let draft = lifecycle::ensure_sendable(lead, kind)?;
        let outbound = Outbound {
            lead_id: id.clone(),
            kind,
            to: lead.email.clone(),
            subject: draft.subject.clone(),
            body: draft.body.clone(),
        };

        // A reply already on record may itself be an opt-out.
        let mut gate_changed = false;
        if lead.has_reply()
            && classify::classify("", &lead.reply_received) == InboundKind::Unsubscribe
        {
            gate_changed = self.gate.add_to_blocklist(&lead.email, "recorded reply asks to unsubscribe");
        }

        let clearance = self.gate.can_send(&lead.email);
        if !clearance.allowed {
            lifecycle::block(lead);
            warn!(lead = %id, email = %lead.email, reason = %clearance.reason, "send blocked by compliance gate");
            if gate_changed {
                self.persist_compliance();
            }
            self.persist_leads();
            return Ok(SendCheck::Blocked {
                reason: clearance.reason,
            });
        }

        if !scheduler::is_due_now(lead, now) {
            let until = lead.scheduled_send_date.unwrap_or(now);
            debug!(lead = %id, %until, "send deferred by schedule");
            return Ok(SendCheck::Deferred { until });
        }

        Ok(SendCheck::Ready(outbound))
    }

    /// Record the transport's answer for a send prepared by
    /// [`PipelineState::check_send`]. The lead is re-resolved; if it was
    /// removed meanwhile, `NotFound` is returned and nothing is recorded.
    pub fn complete_send(
        &mut self,
        id: &LeadId,
        kind: SendKind,
        now: DateTime<Utc>,
        sent: bool,
    ) -> Result<Lead> {
        let lead = self.leads.require_mut(id)?;
        if sent {
            lifecycle::record_sent(lead, kind, now)?;
        } else {
            lifecycle::record_send_failure(lead);
        }
        let snapshot = lead.clone();
        if sent && self.schedule.mark_sent(id, kind) {
            self.persist_schedule();
        }
        self.persist_leads();
        Ok(snapshot)
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Mutable access for the reconciler, which applies its own lifecycle
    /// transitions and calls [`PipelineState::persist_leads`] once per batch.
    pub(crate) fn leads_mut(&mut self) -> &mut LeadStore {
        &mut self.leads
    }

    pub(crate) fn gate_mut(&mut self) -> &mut ComplianceGate {
        &mut self.gate
    }

    // -----------------------------------------------------------------------
    // Persistence (best-effort)
    // -----------------------------------------------------------------------

    pub(crate) fn persist_leads(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_leads(self.leads.all()) {
                warn!(error = %e, "failed to persist leads");
            }
        }
    }

    pub(crate) fn persist_compliance(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_compliance(&self.gate.to_record()) {
                warn!(error = %e, "failed to persist blocklist");
            }
        }
    }

    pub(crate) fn persist_schedule(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_scheduled(self.schedule.entries()) {
                warn!(error = %e, "failed to persist scheduled sends");
            }
        }
    }
}
