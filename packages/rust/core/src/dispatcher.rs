//! Sequential, paced sender.
//!
//! One send at a time, in identification order, with a random pause
//! between transport calls to keep a human cadence. Each candidate is
//! re-checked against the compliance gate and the schedule right before its
//! own send, because reconciliation or user edits may have changed it while
//! earlier sends were in flight. Failures are counted, never retried.

use std::time::Duration;

use outreach_shared::{DispatchPolicy, Lead, LeadId, OutreachError, Result, SendKind};
use rand::Rng;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::collaborators::{EmailEvent, EventLog, LogReceipt, MailTransport};
use crate::state::{Outbound, PipelineState, SendCheck};

/// Counts from one batch run. Partial success is the normal case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub sent: usize,
    pub failed: usize,
    pub skipped_opt_out: usize,
    pub skipped_scheduled: usize,
    /// Eligible leads not attempted: beyond the batch cap, or left when the
    /// run was cancelled.
    pub remaining: usize,
    /// Candidates removed or changed by someone else before their turn.
    pub vanished: usize,
    /// Successful sends whose event-log write failed.
    pub log_failures: usize,
    pub cancelled: bool,
}

impl BatchSummary {
    /// Candidates that reached a decision in this run.
    pub fn processed(&self) -> usize {
        self.sent + self.failed + self.skipped_opt_out + self.skipped_scheduled + self.vanished
    }
}

/// A completed transport hand-off.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The lead as recorded right after the send.
    pub lead: Lead,
    pub message_id: String,
    pub log: LogReceipt,
}

/// Leads with an approved, unsent `kind` draft that have not opted out, in
/// store order. Scheduling and the blocklist are checked per send, not here.
pub fn eligible(leads: &[Lead], kind: SendKind) -> Vec<LeadId> {
    leads
        .iter()
        .filter(|lead| !lead.opted_out && !lead.status.is_terminal())
        .filter(|lead| lead.draft(kind).is_some_and(|d| d.is_ready()))
        .map(|lead| lead.id.clone())
        .collect()
}

/// Borrowed view of what a send needs.
pub(crate) struct Dispatcher<'a> {
    pub state: &'a Mutex<PipelineState>,
    pub transport: &'a dyn MailTransport,
    pub event_log: &'a dyn EventLog,
    pub clock: &'a dyn Clock,
    pub from: &'a str,
}

impl Dispatcher<'_> {
    /// Pre-send checks for one lead under the state lock.
    pub async fn check(&self, id: &LeadId, kind: SendKind) -> Result<SendCheck> {
        let now = self.clock.now();
        self.state.lock().await.check_send(id, kind, now)
    }

    /// Hand `outbound` to the transport and record the outcome. The state
    /// lock is not held while the transport runs.
    pub async fn deliver(&self, outbound: Outbound) -> Result<Delivery> {
        let Outbound {
            lead_id,
            kind,
            to,
            subject,
            body,
        } = outbound;

        let sent = self.transport.send(&to, self.from, &subject, &body).await;
        let now = self.clock.now();

        let message_id = match sent {
            Ok(message_id) => message_id,
            Err(e) => {
                warn!(lead = %lead_id, %to, error = %e, "send failed");
                let mut state = self.state.lock().await;
                if let Err(record_err) = state.complete_send(&lead_id, kind, now, false) {
                    debug!(lead = %lead_id, error = %record_err, "could not record send failure");
                }
                return Err(match e {
                    OutreachError::Transport(_) => e,
                    other => OutreachError::Transport(other.to_string()),
                });
            }
        };

        let lead = {
            let mut state = self.state.lock().await;
            state.complete_send(&lead_id, kind, now, true).inspect_err(|e| {
                warn!(lead = %lead_id, %message_id, error = %e, "message sent but lead changed meanwhile");
            })?
        };
        info!(lead = %lead_id, %to, %kind, %message_id, "email sent");

        let event = EmailEvent {
            lead: lead.clone(),
            kind,
            subject,
            message_id: message_id.clone(),
        };
        let log = LogReceipt::from_result(self.event_log.log_email_event(&event).await);

        Ok(Delivery {
            lead,
            message_id,
            log,
        })
    }

    /// Send up to `policy.batch_size` eligible leads, one after another.
    #[instrument(skip_all, fields(%kind, batch_size = policy.batch_size))]
    pub async fn run_batch(
        &self,
        kind: SendKind,
        policy: &DispatchPolicy,
        cancel: &CancellationToken,
    ) -> BatchSummary {
        let candidates = {
            let state = self.state.lock().await;
            eligible(state.leads(), kind)
        };
        let take = candidates.len().min(policy.batch_size);
        let mut summary = BatchSummary {
            remaining: candidates.len() - take,
            ..Default::default()
        };
        info!(
            eligible = candidates.len(),
            attempting = take,
            "starting batch"
        );

        let mut pause_before_next = false;
        for (index, id) in candidates.iter().take(take).enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                summary.remaining += take - index;
                break;
            }

            let mut check = self.check(id, kind).await;
            if pause_before_next && matches!(check, Ok(SendCheck::Ready(_))) {
                if !pause(&policy.delay_range, cancel).await {
                    summary.cancelled = true;
                    summary.remaining += take - index;
                    break;
                }
                // The lead may have changed during the pause.
                check = self.check(id, kind).await;
            }

            match check {
                Ok(SendCheck::Ready(outbound)) => {
                    pause_before_next = true;
                    match self.deliver(outbound).await {
                        Ok(delivery) => {
                            summary.sent += 1;
                            if delivery.log.is_failed() {
                                summary.log_failures += 1;
                            }
                        }
                        Err(OutreachError::Transport(_)) => summary.failed += 1,
                        Err(_) => summary.vanished += 1,
                    }
                }
                Ok(SendCheck::Blocked { .. }) => summary.skipped_opt_out += 1,
                Ok(SendCheck::Deferred { until }) => {
                    debug!(lead = %id, %until, "skipping scheduled lead");
                    summary.skipped_scheduled += 1;
                }
                Err(e) => {
                    debug!(lead = %id, error = %e, "candidate no longer eligible");
                    summary.vanished += 1;
                }
            }
        }

        info!(
            sent = summary.sent,
            failed = summary.failed,
            skipped_opt_out = summary.skipped_opt_out,
            skipped_scheduled = summary.skipped_scheduled,
            remaining = summary.remaining,
            "batch complete"
        );
        summary
    }
}

/// Sleep a uniformly random duration from `range`. Returns `false` if
/// cancelled first.
async fn pause(range: &std::ops::RangeInclusive<Duration>, cancel: &CancellationToken) -> bool {
    let low = range.start().as_millis() as u64;
    let high = (range.end().as_millis() as u64).max(low);
    let millis = if low == high {
        low
    } else {
        rand::rng().random_range(low..=high)
    };
    if millis == 0 {
        return !cancel.is_cancelled();
    }

    debug!(millis, "pausing before next send");
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(Duration::from_millis(millis)) => true,
    }
}
