//! Send eligibility and user-deferred sends.

use chrono::{DateTime, Utc};
use outreach_shared::{Lead, LeadId, LeadStatus, ScheduledSend, SendKind};

/// Default whole-day gap between the initial email and a follow-up.
pub const DEFAULT_FOLLOW_UP_DAYS: i64 = 14;

/// Whether a send for `lead` may go out at `now`. A future
/// `scheduled_send_date` defers the send; it is not a failure.
pub fn is_due_now(lead: &Lead, now: DateTime<Utc>) -> bool {
    lead.scheduled_send_date.is_none_or(|at| at <= now)
}

/// Leads whose initial email went unanswered for at least `threshold_days`
/// calendar days and that have no follow-up yet. Store order is kept.
pub fn follow_ups_needed(leads: &[Lead], threshold_days: i64, now: DateTime<Utc>) -> Vec<&Lead> {
    leads
        .iter()
        .filter(|lead| {
            lead.status == LeadStatus::EmailSent
                && !lead.has_reply()
                && lead.follow_up_email.is_none()
                && !lead.opted_out
        })
        .filter(|lead| {
            lead.date_email_sent
                .is_some_and(|sent| days_between(sent, now) >= threshold_days)
        })
        .collect()
}

/// Difference in calendar days, ignoring time of day.
fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to.date_naive() - from.date_naive()).num_days()
}

// ---------------------------------------------------------------------------
// SendSchedule
// ---------------------------------------------------------------------------

/// Collection of user-deferred sends.
#[derive(Debug, Clone, Default)]
pub struct SendSchedule {
    entries: Vec<ScheduledSend>,
}

impl SendSchedule {
    pub fn new(entries: Vec<ScheduledSend>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[ScheduledSend] {
        &self.entries
    }

    /// Defer the `kind` send of `lead` until `at`, replacing any pending
    /// entry for the same lead and kind.
    pub fn defer(&mut self, lead: &mut Lead, kind: SendKind, at: DateTime<Utc>) -> &ScheduledSend {
        self.entries
            .retain(|e| e.sent || e.lead_id != lead.id || e.kind != kind);
        lead.scheduled_send_date = Some(at);
        self.entries
            .push(ScheduledSend::new(lead.id.clone(), kind, at));
        &self.entries[self.entries.len() - 1]
    }

    /// Pending sends whose date has passed.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<&ScheduledSend> {
        self.entries
            .iter()
            .filter(|e| !e.sent && e.scheduled_date <= now)
            .collect()
    }

    /// Mark the pending entry for `lead`/`kind` as sent. Returns whether one existed.
    pub fn mark_sent(&mut self, lead: &LeadId, kind: SendKind) -> bool {
        let mut found = false;
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| !e.sent && &e.lead_id == lead && e.kind == kind)
        {
            entry.sent = true;
            found = true;
        }
        found
    }

    /// Drop every entry for a lead that is being removed.
    pub fn discard_for(&mut self, lead: &LeadId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| &e.lead_id != lead);
        before - self.entries.len()
    }

    /// Drop the pending `kind` entry for `lead`, keeping sent history.
    pub fn discard_pending(&mut self, lead: &LeadId, kind: SendKind) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| e.sent || &e.lead_id != lead || e.kind != kind);
        before - self.entries.len()
    }

    /// Drop entries that were already sent.
    pub fn prune_sent(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !e.sent);
        before - self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn sent_lead(sent: DateTime<Utc>) -> Lead {
        Lead {
            status: LeadStatus::EmailSent,
            date_email_sent: Some(sent),
            ..Lead::new("Ada", "Analytical", "ada@example.com")
        }
    }

    #[test]
    fn future_schedule_defers_the_send() {
        let now = at(10, 12);
        let mut lead = Lead::new("Ada", "Analytical", "ada@example.com");
        assert!(is_due_now(&lead, now));
        lead.scheduled_send_date = Some(now + Duration::hours(1));
        assert!(!is_due_now(&lead, now));
        lead.scheduled_send_date = Some(now);
        assert!(is_due_now(&lead, now));
    }

    #[test]
    fn follow_up_threshold_in_whole_days() {
        let now = at(20, 9);
        let fifteen = sent_lead(now - Duration::days(15));
        let thirteen = sent_lead(now - Duration::days(13));
        let leads = vec![fifteen.clone(), thirteen];

        let due = follow_ups_needed(&leads, DEFAULT_FOLLOW_UP_DAYS, now);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, fifteen.id);
    }

    #[test]
    fn calendar_days_not_elapsed_hours() {
        // Sent late on the 1st, checked early on the 15th: under 14 × 24h
        // have elapsed but 14 calendar days have.
        let leads = vec![sent_lead(at(1, 23))];
        assert_eq!(follow_ups_needed(&leads, 14, at(15, 1)).len(), 1);
        assert_eq!(follow_ups_needed(&leads, 14, at(14, 23)).len(), 0);
    }

    #[test]
    fn replied_drafted_or_opted_out_leads_need_no_follow_up() {
        let now = at(28, 9);
        let sent = at(1, 9);

        let mut replied = sent_lead(sent);
        replied.reply_received = "sounds good".into();
        let mut drafted = sent_lead(sent);
        drafted.follow_up_email = Some(outreach_shared::EmailDraft::new("f", "b"));
        let mut opted_out = sent_lead(sent);
        opted_out.opted_out = true;
        let mut moved_on = sent_lead(sent);
        moved_on.status = LeadStatus::Replied;

        let leads = vec![replied, drafted, opted_out, moved_on];
        assert!(follow_ups_needed(&leads, 14, now).is_empty());
    }

    #[test]
    fn schedule_lifecycle() {
        let now = at(10, 12);
        let mut lead = Lead::new("Ada", "Analytical", "ada@example.com");
        let mut schedule = SendSchedule::default();

        schedule.defer(&mut lead, SendKind::Initial, now + Duration::days(1));
        schedule.defer(&mut lead, SendKind::Initial, now + Duration::days(2));
        assert_eq!(schedule.entries().len(), 1);
        assert_eq!(lead.scheduled_send_date, Some(now + Duration::days(2)));

        assert!(schedule.due(now).is_empty());
        assert_eq!(schedule.due(now + Duration::days(3)).len(), 1);

        assert!(schedule.mark_sent(&lead.id, SendKind::Initial));
        assert!(!schedule.mark_sent(&lead.id, SendKind::Initial));
        assert!(schedule.due(now + Duration::days(3)).is_empty());
        assert_eq!(schedule.prune_sent(), 1);

        schedule.defer(&mut lead, SendKind::FollowUp, now);
        assert_eq!(schedule.discard_for(&lead.id), 1);
        assert!(schedule.entries().is_empty());
    }
}
