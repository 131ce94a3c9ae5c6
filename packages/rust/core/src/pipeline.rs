//! The outreach pipeline facade.
//!
//! [`Outreach`] wires the shared [`PipelineState`] to the injected
//! collaborators and exposes the operations that have to await one of them:
//! drafting, sending, reply reconciliation and discovery. Everything purely
//! local (approving, scheduling, blocklist edits) goes straight through
//! [`Outreach::state`].
//!
//! The state lock is taken only around synchronous sections. After every
//! collaborator await the lead is looked up again by id, so a lead removed
//! or changed in the meantime surfaces as `NotFound` or a precondition
//! error instead of being overwritten.

use std::sync::Arc;

use outreach_shared::{
    AppConfig, DispatchPolicy, EmailDraft, InboundMessage, Lead, LeadId, OutreachError, Result,
    SendKind, SenderConfig, validate_sender,
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::classify::DEFAULT_OVERLAP_THRESHOLD;
use crate::clock::{Clock, SystemClock};
use crate::collaborators::{
    Drafter, EventLog, FollowUpRequest, LeadSource, LogReceipt, MailTransport, NoopEventLog,
};
use crate::discovery::{self, DiscoveryReport};
use crate::dispatcher::{BatchSummary, Delivery, Dispatcher};
use crate::lifecycle;
use crate::reconciler::{self, ReconcileReport, Reconciled, Reconciler, ReplyMatch};
use crate::scheduler::DEFAULT_FOLLOW_UP_DAYS;
use crate::state::{PipelineState, SendCheck};
use crate::task::TaskSlot;

/// Tunables read from `[dispatch]`, `[follow_up]` and `[reconcile]`.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub follow_up_days: i64,
    pub overlap_threshold: f64,
    pub dispatch: DispatchPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            follow_up_days: DEFAULT_FOLLOW_UP_DAYS,
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            dispatch: DispatchPolicy::default(),
        }
    }
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            follow_up_days: config.follow_up.threshold_days,
            overlap_threshold: config.reconcile.overlap_threshold,
            dispatch: DispatchPolicy::from(config),
        }
    }
}

pub struct Outreach {
    state: Arc<Mutex<PipelineState>>,
    drafter: Arc<dyn Drafter>,
    transport: Arc<dyn MailTransport>,
    event_log: Arc<dyn EventLog>,
    clock: Arc<dyn Clock>,
    sender: SenderConfig,
    settings: PipelineSettings,
    discovery: TaskSlot,
    /// Held for the whole of a single send or a batch; sends never overlap.
    dispatch_turn: Mutex<()>,
}

impl Outreach {
    /// Build a pipeline over `state`. The event log defaults to
    /// [`NoopEventLog`] and the clock to [`SystemClock`].
    pub fn new(
        state: PipelineState,
        drafter: Arc<dyn Drafter>,
        transport: Arc<dyn MailTransport>,
        sender: SenderConfig,
    ) -> Result<Self> {
        validate_sender(&sender)?;
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            drafter,
            transport,
            event_log: Arc::new(NoopEventLog),
            clock: Arc::new(SystemClock),
            sender,
            settings: PipelineSettings::default(),
            discovery: TaskSlot::new(),
            dispatch_turn: Mutex::new(()),
        })
    }

    pub fn with_event_log(mut self, event_log: Arc<dyn EventLog>) -> Self {
        self.event_log = event_log;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Shared handle to the state, for the synchronous operations.
    pub fn state(&self) -> Arc<Mutex<PipelineState>> {
        Arc::clone(&self.state)
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// A copy of the lead as it is right now.
    pub async fn lead(&self, id: &LeadId) -> Option<Lead> {
        self.state.lock().await.lead(id).cloned()
    }

    /// Copy of the lead after `check` passed against it, taken under the lock.
    async fn snapshot(&self, id: &LeadId, check: fn(&Lead) -> Result<()>) -> Result<Lead> {
        let state = self.state.lock().await;
        let lead = state
            .lead(id)
            .ok_or_else(|| OutreachError::NotFound(id.clone()))?;
        check(lead)?;
        Ok(lead.clone())
    }

    // -----------------------------------------------------------------------
    // Drafting
    // -----------------------------------------------------------------------

    /// Ask the drafting service for an initial email and attach it as an
    /// unapproved draft.
    #[instrument(skip_all, fields(lead = %id))]
    pub async fn draft_email(&self, id: &LeadId) -> Result<EmailDraft> {
        let lead = self.snapshot(id, lifecycle::ensure_can_draft).await?;
        let research = lead.research_summary.as_deref().unwrap_or_default();
        let draft = self
            .drafter
            .draft_email(&lead, research, &self.sender.name)
            .await?;

        let subject = draft.subject.clone();
        let mut state = self.state.lock().await;
        state.attach_draft(id, SendKind::Initial, draft)?;
        info!(%subject, "draft attached");
        state
            .lead(id)
            .and_then(|l| l.drafted_email.clone())
            .ok_or_else(|| OutreachError::NotFound(id.clone()))
    }

    #[instrument(skip_all, fields(lead = %id))]
    pub async fn draft_follow_up(&self, id: &LeadId) -> Result<EmailDraft> {
        let lead = self
            .snapshot(id, lifecycle::ensure_can_draft_follow_up)
            .await?;
        let request = FollowUpRequest {
            original_body: lead
                .drafted_email
                .as_ref()
                .map(|d| d.body.clone())
                .unwrap_or_default(),
            prior_follow_up_body: lead.follow_up_email.as_ref().map(|d| d.body.clone()),
            reply_text: lead.has_reply().then(|| lead.reply_received.clone()),
            sender_name: self.sender.name.clone(),
            lead,
        };
        let draft = self.drafter.draft_follow_up(&request).await?;

        let mut state = self.state.lock().await;
        state.attach_draft(id, SendKind::FollowUp, draft)?;
        info!("follow-up draft attached");
        state
            .lead(id)
            .and_then(|l| l.follow_up_email.clone())
            .ok_or_else(|| OutreachError::NotFound(id.clone()))
    }

    /// Alternative subject lines for the lead's current draft, or for its
    /// company when nothing is drafted yet. Nothing is stored.
    pub async fn suggest_subjects(&self, id: &LeadId) -> Result<Vec<String>> {
        let lead = self.snapshot(id, |_| Ok(())).await?;
        let context = match &lead.drafted_email {
            Some(draft) => draft.subject.clone(),
            None => lead.company.clone(),
        };
        let variants = self.drafter.subject_variants(&context).await?;

        let mut seen = Vec::with_capacity(variants.len());
        for variant in variants {
            let variant = variant.trim().to_string();
            if !variant.is_empty() && !seen.contains(&variant) {
                seen.push(variant);
            }
        }
        Ok(seen)
    }

    // -----------------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------------

    fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher {
            state: &self.state,
            transport: self.transport.as_ref(),
            event_log: self.event_log.as_ref(),
            clock: self.clock.as_ref(),
            from: &self.sender.address,
        }
    }

    #[instrument(skip_all, fields(lead = %id))]
    pub async fn send_email(&self, id: &LeadId) -> Result<Delivery> {
        self.send(id, SendKind::Initial).await
    }

    #[instrument(skip_all, fields(lead = %id))]
    pub async fn send_follow_up(&self, id: &LeadId) -> Result<Delivery> {
        self.send(id, SendKind::FollowUp).await
    }

    async fn send(&self, id: &LeadId, kind: SendKind) -> Result<Delivery> {
        let _turn = self.dispatch_turn.lock().await;
        let dispatcher = self.dispatcher();
        match dispatcher.check(id, kind).await? {
            SendCheck::Ready(outbound) => dispatcher.deliver(outbound).await,
            SendCheck::Blocked { reason } => {
                let email = self
                    .state
                    .lock()
                    .await
                    .lead(id)
                    .map(|l| l.email.clone())
                    .unwrap_or_default();
                Err(OutreachError::Blocked { email, reason })
            }
            SendCheck::Deferred { until } => Err(OutreachError::precondition(
                id,
                format!("{kind} email is scheduled for {until}"),
            )),
        }
    }

    /// Batch send with the configured policy.
    pub async fn send_batch(&self, kind: SendKind, cancel: &CancellationToken) -> BatchSummary {
        self.send_batch_with(kind, &self.settings.dispatch, cancel)
            .await
    }

    pub async fn send_batch_with(
        &self,
        kind: SendKind,
        policy: &DispatchPolicy,
        cancel: &CancellationToken,
    ) -> BatchSummary {
        let _turn = self.dispatch_turn.lock().await;
        self.dispatcher().run_batch(kind, policy, cancel).await
    }

    // -----------------------------------------------------------------------
    // Replies
    // -----------------------------------------------------------------------

    pub async fn reconcile_replies(&self) -> Result<ReconcileReport> {
        Reconciler {
            state: &self.state,
            transport: self.transport.as_ref(),
            event_log: self.event_log.as_ref(),
            clock: self.clock.as_ref(),
            overlap_threshold: self.settings.overlap_threshold,
        }
        .run()
        .await
    }

    /// Reconcile a single message obtained outside the transport, e.g. a
    /// reply pasted in by hand. `None` when no lead claims it.
    #[instrument(skip_all, fields(from = %message.from))]
    pub async fn record_inbound(&self, message: InboundMessage) -> Option<ReplyMatch> {
        let reconciled = {
            let mut state = self.state.lock().await;
            let now = self.clock.now();
            let reconciled = reconciler::reconcile_message(
                &mut state,
                message,
                self.settings.overlap_threshold,
                now,
            );
            if let Reconciled::Matched(found, _) = &reconciled {
                if found.changed {
                    state.persist_leads();
                }
            }
            reconciled
        };

        match reconciled {
            Reconciled::Unmatched(message) => {
                debug!(subject = %message.subject, "no lead claims message");
                None
            }
            Reconciled::Matched(mut found, event) => {
                if let Some(event) = event {
                    found.log = Some(LogReceipt::from_result(
                        self.event_log.log_reply_received(&event).await,
                    ));
                }
                Some(found)
            }
        }
    }

    /// Leads whose initial email went unanswered for the configured number
    /// of days and that have no follow-up yet.
    pub async fn follow_ups_needed(&self) -> Vec<Lead> {
        let now = self.clock.now();
        self.state
            .lock()
            .await
            .follow_ups_needed(self.settings.follow_up_days, now)
    }

    // -----------------------------------------------------------------------
    // Discovery
    // -----------------------------------------------------------------------

    /// Search `regions` for new prospects. Starting a discovery cancels the
    /// one already running, which stops at its next region or prospect.
    pub async fn discover(
        &self,
        source: &dyn LeadSource,
        regions: &[String],
        query: &str,
    ) -> DiscoveryReport {
        let task = self.discovery.begin();
        discovery::run(&self.state, source, regions, query, task.token()).await
    }

    pub fn cancel_discovery(&self) {
        self.discovery.cancel();
    }

    pub fn is_discovering(&self) -> bool {
        self.discovery.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::Ordering;
    use std::time::Duration as StdDuration;

    use chrono::{Duration, Utc};
    use outreach_shared::{DeliveryStatus, LeadStatus};

    use crate::clock::ManualClock;
    use crate::test_support::{
        RecordingEventLog, ScriptedDrafter, ScriptedTransport, StaticLeadSource, prospect,
    };

    struct Harness {
        outreach: Arc<Outreach>,
        drafter: Arc<ScriptedDrafter>,
        transport: Arc<ScriptedTransport>,
        event_log: Arc<RecordingEventLog>,
        clock: Arc<ManualClock>,
    }

    fn sender() -> SenderConfig {
        SenderConfig {
            name: "Sam".into(),
            address: "sam@acme.io".into(),
        }
    }

    fn harness() -> Harness {
        let drafter = Arc::new(ScriptedDrafter::default());
        let transport = Arc::new(ScriptedTransport::default());
        let event_log = Arc::new(RecordingEventLog::default());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let outreach = Outreach::new(
            PipelineState::in_memory(),
            drafter.clone(),
            transport.clone(),
            sender(),
        )
        .unwrap()
        .with_event_log(event_log.clone())
        .with_clock(clock.clone())
        .with_settings(PipelineSettings {
            dispatch: DispatchPolicy::immediate(10),
            ..Default::default()
        });
        Harness {
            outreach: Arc::new(outreach),
            drafter,
            transport,
            event_log,
            clock,
        }
    }

    impl Harness {
        async fn add(&self, lead: Lead) -> LeadId {
            self.outreach.state().lock().await.add_lead(lead).unwrap()
        }

        async fn approve(&self, id: &LeadId, kind: SendKind) {
            self.outreach.state().lock().await.approve(id, kind).unwrap();
        }

        /// A manual lead with an approved initial draft.
        async fn approved(&self, name: &str, email: &str) -> LeadId {
            let id = self.add(Lead::manual(name, "Acme", email)).await;
            self.outreach.draft_email(&id).await.unwrap();
            self.approve(&id, SendKind::Initial).await;
            id
        }

        async fn lead(&self, id: &LeadId) -> Lead {
            self.outreach.lead(id).await.unwrap()
        }
    }

    fn reply(from: &str, subject: &str, body: &str) -> InboundMessage {
        InboundMessage {
            from: from.into(),
            subject: subject.into(),
            snippet: String::new(),
            body: body.into(),
        }
    }

    #[test]
    fn sender_address_is_required() {
        let result = Outreach::new(
            PipelineState::in_memory(),
            Arc::new(ScriptedDrafter::default()),
            Arc::new(ScriptedTransport::default()),
            SenderConfig::default(),
        );
        assert!(matches!(result, Err(OutreachError::Config { .. })));
    }

    #[test]
    fn settings_follow_the_config_file() {
        let mut config = AppConfig::default();
        config.follow_up.threshold_days = 7;
        config.reconcile.overlap_threshold = 0.75;
        let settings = PipelineSettings::from(&config);
        assert_eq!(settings.follow_up_days, 7);
        assert_eq!(settings.overlap_threshold, 0.75);
        assert_eq!(settings.dispatch, DispatchPolicy::from(&config));
    }

    #[tokio::test]
    async fn draft_send_and_reply() {
        let h = harness();
        let id = h.add(Lead::manual("Ada", "Analytical", "ada@example.com")).await;

        let draft = h.outreach.draft_email(&id).await.unwrap();
        assert_eq!(draft.subject, "Intro for Ada");
        assert!(!draft.is_approved);
        assert_eq!(h.lead(&id).await.status, LeadStatus::EmailDrafted);

        h.approve(&id, SendKind::Initial).await;
        let delivery = h.outreach.send_email(&id).await.unwrap();
        assert_eq!(delivery.lead.status, LeadStatus::EmailSent);
        assert_eq!(delivery.log, LogReceipt::Logged);
        assert_eq!(h.transport.sent_to(), vec!["ada@example.com".to_string()]);
        assert_eq!(h.event_log.email_events(), 1);

        h.transport
            .deliver_to_inbox(reply("Ada <ada@example.com>", "Re: Intro for Ada", "sounds interesting, let's talk"));
        let report = h.outreach.reconcile_replies().await.unwrap();
        assert_eq!(report.matches.len(), 1);

        let lead = h.lead(&id).await;
        assert_eq!(lead.status, LeadStatus::Replied);
        assert_eq!(lead.reply_received, "sounds interesting, let's talk");

        h.clock.advance(Duration::days(30));
        assert!(h.outreach.follow_ups_needed().await.is_empty());
    }

    #[tokio::test]
    async fn unverified_discovered_lead_cannot_be_drafted() {
        let h = harness();
        let id = h.add(Lead::new("Ada", "Analytical", "ada@example.com")).await;

        let err = h.outreach.draft_email(&id).await.unwrap_err();
        assert!(matches!(err, OutreachError::Precondition { .. }));
        assert!(h.lead(&id).await.drafted_email.is_none());
    }

    #[tokio::test]
    async fn drafting_failure_leaves_the_lead_untouched() {
        let h = harness();
        h.drafter.fail_all();
        let id = h.add(Lead::manual("Ada", "Analytical", "ada@example.com")).await;

        let err = h.outreach.draft_email(&id).await.unwrap_err();
        assert!(matches!(err, OutreachError::Drafting(_)));
        let lead = h.lead(&id).await;
        assert_eq!(lead.status, LeadStatus::Identified);
        assert!(lead.drafted_email.is_none());
    }

    #[tokio::test]
    async fn blocklisted_recipient_is_never_handed_to_the_transport() {
        let h = harness();
        let id = h.approved("Bad", "bad@x.com").await;
        h.outreach.state().lock().await.block("bad@x.com", "manual");

        let err = h.outreach.send_email(&id).await.unwrap_err();
        assert!(matches!(err, OutreachError::Blocked { ref email, .. } if email == "bad@x.com"));
        assert_eq!(h.transport.attempts(), 0);

        let lead = h.lead(&id).await;
        assert_eq!(lead.status, LeadStatus::DoNotContact);
        assert!(lead.opted_out);
        assert!(lead.date_email_sent.is_none());
    }

    #[tokio::test]
    async fn unapproved_draft_is_not_sent() {
        let h = harness();
        let id = h.add(Lead::manual("Ada", "Analytical", "ada@example.com")).await;
        h.outreach.draft_email(&id).await.unwrap();

        let err = h.outreach.send_email(&id).await.unwrap_err();
        assert!(matches!(err, OutreachError::Precondition { .. }));
        assert_eq!(h.transport.attempts(), 0);
    }

    #[tokio::test]
    async fn scheduled_send_waits_until_due() {
        let h = harness();
        let id = h.approved("Ada", "ada@example.com").await;
        let at = h.clock.now() + Duration::days(1);
        h.outreach
            .state()
            .lock()
            .await
            .defer_send(&id, SendKind::Initial, at)
            .unwrap();

        assert!(matches!(
            h.outreach.send_email(&id).await,
            Err(OutreachError::Precondition { .. })
        ));
        assert_eq!(h.transport.attempts(), 0);

        h.clock.advance(Duration::days(2));
        let delivery = h.outreach.send_email(&id).await.unwrap();
        assert!(delivery.lead.scheduled_send_date.is_none());
        assert!(h.outreach.state().lock().await.scheduled()[0].sent);
    }

    #[tokio::test]
    async fn transport_failure_marks_delivery_failed() {
        let h = harness();
        let id = h.approved("Ada", "ada@example.com").await;
        h.transport.fail_for("ada@example.com");

        let err = h.outreach.send_email(&id).await.unwrap_err();
        assert!(matches!(err, OutreachError::Transport(_)));
        let lead = h.lead(&id).await;
        assert_eq!(lead.delivery_status, DeliveryStatus::Failed);
        assert_eq!(lead.status, LeadStatus::EmailApproved);
        assert_eq!(h.event_log.email_events(), 0);
    }

    #[tokio::test]
    async fn lead_removed_during_send_is_not_resurrected() {
        let h = harness();
        let id = h.approved("Ada", "ada@example.com").await;
        h.transport.set_latency(StdDuration::from_millis(40));

        let sending = {
            let outreach = Arc::clone(&h.outreach);
            let id = id.clone();
            tokio::spawn(async move { outreach.send_email(&id).await })
        };
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        h.outreach.state().lock().await.remove_lead(&id).unwrap();

        let result = sending.await.unwrap();
        assert!(matches!(result, Err(OutreachError::NotFound(_))));
        assert_eq!(h.transport.attempts(), 1);
        assert!(h.outreach.lead(&id).await.is_none());
    }

    #[tokio::test]
    async fn concurrent_single_sends_are_serialized() {
        let h = harness();
        let a = h.approved("Ada", "ada@a.com").await;
        let b = h.approved("Bob", "bob@b.com").await;
        h.transport.set_latency(StdDuration::from_millis(15));

        let first = {
            let outreach = Arc::clone(&h.outreach);
            tokio::spawn(async move { outreach.send_email(&a).await })
        };
        let second = {
            let outreach = Arc::clone(&h.outreach);
            tokio::spawn(async move { outreach.send_email(&b).await })
        };
        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(h.transport.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(h.transport.sent_to().len(), 2);
    }

    #[tokio::test]
    async fn follow_up_is_due_after_whole_days() {
        let h = harness();
        let id = h.approved("Ada", "ada@example.com").await;
        h.outreach.send_email(&id).await.unwrap();

        h.clock.advance(Duration::days(13));
        assert!(h.outreach.follow_ups_needed().await.is_empty());

        h.clock.advance(Duration::days(2));
        let due = h.outreach.follow_ups_needed().await;
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, id);
    }

    #[tokio::test]
    async fn follow_up_draft_carries_the_conversation() {
        let h = harness();
        let id = h.approved("Ada", "ada@example.com").await;
        h.outreach.send_email(&id).await.unwrap();
        let matched = h
            .outreach
            .record_inbound(reply("ada@example.com", "Re: Intro for Ada", "Maybe next quarter"))
            .await
            .unwrap();
        assert!(matched.changed);

        let draft = h.outreach.draft_follow_up(&id).await.unwrap();
        assert_eq!(draft.subject, "Following up, Ada");

        let requests = h.drafter.follow_up_requests.lock().unwrap().clone();
        let lead = h.lead(&id).await;
        assert_eq!(requests.len(), 1);
        assert_eq!(
            requests[0].original_body,
            lead.drafted_email.as_ref().unwrap().body
        );
        assert_eq!(requests[0].prior_follow_up_body, None);
        assert_eq!(requests[0].reply_text.as_deref(), Some("Maybe next quarter"));
        assert_eq!(requests[0].sender_name, "Sam");

        h.approve(&id, SendKind::FollowUp).await;
        let delivery = h.outreach.send_follow_up(&id).await.unwrap();
        assert_eq!(delivery.lead.status, LeadStatus::FollowUpSent);
        assert!(delivery.lead.date_follow_up_sent.is_some());
    }

    #[tokio::test]
    async fn follow_up_needs_a_sent_initial_email() {
        let h = harness();
        let id = h.approved("Ada", "ada@example.com").await;
        let err = h.outreach.draft_follow_up(&id).await.unwrap_err();
        assert!(matches!(err, OutreachError::Precondition { .. }));
        assert!(h.drafter.follow_up_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unclaimed_inbound_message_changes_nothing() {
        let h = harness();
        let id = h.approved("Ada", "ada@example.com").await;
        h.outreach.send_email(&id).await.unwrap();

        let found = h
            .outreach
            .record_inbound(reply("news@vendor.io", "Weekly digest", "top stories"))
            .await;
        assert!(found.is_none());
        assert_eq!(h.lead(&id).await.status, LeadStatus::EmailSent);
        assert!(h.event_log.reply_events().is_empty());
    }

    #[tokio::test]
    async fn subject_suggestions_use_the_current_draft() {
        let h = harness();
        let id = h.add(Lead::manual("Ada", "Analytical", "ada@example.com")).await;
        assert_eq!(
            h.outreach.suggest_subjects(&id).await.unwrap(),
            vec!["Analytical?".to_string(), "Idea: Analytical".to_string()]
        );

        h.outreach.draft_email(&id).await.unwrap();
        let subjects = h.outreach.suggest_subjects(&id).await.unwrap();
        assert_eq!(subjects[1], "Idea: Intro for Ada");
    }

    #[tokio::test]
    async fn batch_uses_configured_cap() {
        let h = harness();
        for i in 0..3 {
            h.approved(&format!("L{i}"), &format!("l{i}@d{i}.com")).await;
        }
        let policy = DispatchPolicy::immediate(2);

        let summary = h
            .outreach
            .send_batch_with(SendKind::Initial, &policy, &CancellationToken::new())
            .await;
        assert_eq!(summary.sent, 2);
        assert_eq!(summary.remaining, 1);

        let summary = h
            .outreach
            .send_batch(SendKind::Initial, &CancellationToken::new())
            .await;
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.remaining, 0);
    }

    #[tokio::test]
    async fn discovery_adds_unknown_addresses_only() {
        let h = harness();
        h.add(Lead::new("Bob", "Acme", "bob@b.com")).await;
        let source = StaticLeadSource {
            by_region: HashMap::from([
                (
                    "north".to_string(),
                    vec![prospect("Ada", "ada@a.com"), prospect("Bob", "BOB@b.com")],
                ),
                ("south".to_string(), vec![prospect("Cy", "cy@c.com")]),
            ]),
            ..Default::default()
        };
        let regions = vec!["north".to_string(), "atlantis".to_string(), "south".to_string()];

        let report = h.outreach.discover(&source, &regions, "dentists").await;
        assert_eq!(report.regions_searched, 2);
        assert_eq!(report.added, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.failed_regions.len(), 1);
        assert_eq!(report.failed_regions[0].0, "atlantis");
        assert!(!report.cancelled);

        let state = h.outreach.state();
        let state = state.lock().await;
        assert_eq!(state.leads().len(), 3);
        let ada = state.leads().iter().find(|l| l.email == "ada@a.com").unwrap();
        assert!(ada.email_verified);
        assert_eq!(ada.status, LeadStatus::Identified);
    }

    #[tokio::test]
    async fn starting_discovery_cancels_the_running_one() {
        let h = harness();
        let source = Arc::new(StaticLeadSource {
            by_region: HashMap::from([
                ("north".to_string(), vec![prospect("Ada", "ada@a.com")]),
                ("south".to_string(), vec![prospect("Cy", "cy@c.com")]),
            ]),
            latency: StdDuration::from_millis(40),
            ..Default::default()
        });

        let first = {
            let outreach = Arc::clone(&h.outreach);
            let source = Arc::clone(&source);
            tokio::spawn(async move {
                let regions = vec!["north".to_string(), "south".to_string()];
                outreach.discover(source.as_ref(), &regions, "q").await
            })
        };
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        let second = h
            .outreach
            .discover(source.as_ref(), &["south".to_string()], "q")
            .await;

        let first = first.await.unwrap();
        assert!(first.cancelled);
        assert_eq!(first.added, 0);
        assert!(!second.cancelled);
        assert_eq!(second.added, 1);
        assert!(!h.outreach.is_discovering());
    }

    #[tokio::test]
    async fn discovery_is_reported_only_while_running() {
        let h = harness();
        let source = Arc::new(StaticLeadSource {
            by_region: HashMap::from([("north".to_string(), vec![prospect("Ada", "ada@a.com")])]),
            latency: StdDuration::from_millis(40),
            ..Default::default()
        });
        assert!(!h.outreach.is_discovering());

        let running = {
            let outreach = Arc::clone(&h.outreach);
            let source = Arc::clone(&source);
            tokio::spawn(async move {
                outreach.discover(source.as_ref(), &["north".to_string()], "q").await
            })
        };
        tokio::time::sleep(StdDuration::from_millis(10)).await;
        assert!(h.outreach.is_discovering());

        let report = running.await.unwrap();
        assert_eq!(report.added, 1);
        assert!(!report.cancelled);
        assert!(!h.outreach.is_discovering());
    }
}
