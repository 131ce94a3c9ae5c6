//! Opt-out blocklist.
//!
//! The gate answers "may we contact this address?" and records new
//! opt-outs. Blocking an address also blocks its whole domain. It is
//! consulted right before every send attempt and when a reply asks to
//! unsubscribe; it is never swept across the lead collection.

use std::collections::BTreeSet;

use outreach_shared::ComplianceRecord;
use tracing::info;

/// Answer from [`ComplianceGate::can_send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clearance {
    pub allowed: bool,
    pub reason: String,
}

impl Clearance {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    fn denied(reason: String) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// In-memory opt-out registry of emails and domains, all lower-cased.
#[derive(Debug, Clone, Default)]
pub struct ComplianceGate {
    emails: BTreeSet<String>,
    domains: BTreeSet<String>,
}

impl ComplianceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the gate from its persisted form, normalizing entries.
    pub fn from_record(record: &ComplianceRecord) -> Self {
        Self {
            emails: record.emails.iter().map(|e| normalize(e)).collect(),
            domains: record.domains.iter().map(|d| normalize(d)).collect(),
        }
    }

    /// Persisted form; entries come out sorted.
    pub fn to_record(&self) -> ComplianceRecord {
        ComplianceRecord {
            emails: self.emails.iter().cloned().collect(),
            domains: self.domains.iter().cloned().collect(),
        }
    }

    pub fn can_send(&self, email: &str) -> Clearance {
        let email = normalize(email);
        if self.emails.contains(&email) {
            return Clearance::denied(format!("{email} has opted out"));
        }
        match domain_of(&email) {
            Some(domain) if self.domains.contains(domain) => {
                Clearance::denied(format!("domain {domain} is blocked"))
            }
            _ => Clearance::allowed(),
        }
    }

    pub fn is_blocked(&self, email: &str) -> bool {
        !self.can_send(email).allowed
    }

    /// Block `email` and its domain. Returns whether anything new was
    /// inserted; repeated calls leave the sets unchanged.
    pub fn add_to_blocklist(&mut self, email: &str, reason: &str) -> bool {
        let email = normalize(email);
        if email.is_empty() {
            return false;
        }
        let mut changed = false;
        if let Some(domain) = domain_of(&email) {
            changed |= self.domains.insert(domain.to_string());
        }
        changed |= self.emails.insert(email.clone());
        if changed {
            info!(%email, reason, "added to blocklist");
        }
        changed
    }

    /// Remove a single address. The domain entry stays; unblocking a whole
    /// domain is [`ComplianceGate::remove_domain`].
    pub fn remove_from_blocklist(&mut self, email: &str) -> bool {
        self.emails.remove(&normalize(email))
    }

    pub fn remove_domain(&mut self, domain: &str) -> bool {
        self.domains.remove(&normalize(domain))
    }

    pub fn blocked_emails(&self) -> impl Iterator<Item = &str> {
        self.emails.iter().map(String::as_str)
    }

    pub fn blocked_domains(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(String::as_str)
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Everything after the last `@`, if non-empty.
pub(crate) fn domain_of(email: &str) -> Option<&str> {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .filter(|domain| !domain.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocking_an_address_blocks_its_domain() {
        let mut gate = ComplianceGate::new();
        assert!(gate.add_to_blocklist("a@x.com", "asked to unsubscribe"));

        assert!(gate.is_blocked("a@x.com"));
        assert!(gate.is_blocked("b@x.com"));
        assert!(!gate.is_blocked("a@y.com"));

        let denied = gate.can_send("b@x.com");
        assert!(!denied.allowed);
        assert!(denied.reason.contains("x.com"));
    }

    #[test]
    fn blocklist_is_idempotent() {
        let mut gate = ComplianceGate::new();
        gate.add_to_blocklist("a@x.com", "first");
        let before = gate.to_record();
        assert!(!gate.add_to_blocklist("A@X.com ", "second"));
        assert_eq!(gate.to_record(), before);
        assert_eq!(before.emails.len(), 1);
        assert_eq!(before.domains.len(), 1);
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let mut gate = ComplianceGate::new();
        gate.add_to_blocklist("Ops@Example.COM", "bounce");
        assert!(gate.is_blocked("ops@example.com"));
        assert_eq!(gate.to_record().domains, vec!["example.com".to_string()]);
    }

    #[test]
    fn address_without_domain_blocks_only_itself() {
        let mut gate = ComplianceGate::new();
        gate.add_to_blocklist("postmaster", "manual");
        assert!(gate.is_blocked("postmaster"));
        assert!(gate.to_record().domains.is_empty());
        assert!(!gate.add_to_blocklist("  ", "empty"));
    }

    #[test]
    fn record_roundtrip_normalizes() {
        let record = ComplianceRecord {
            emails: vec!["A@X.com".into()],
            domains: vec!["X.com".into(), "x.com".into()],
        };
        let gate = ComplianceGate::from_record(&record);
        let out = gate.to_record();
        assert_eq!(out.emails, vec!["a@x.com".to_string()]);
        assert_eq!(out.domains, vec!["x.com".to_string()]);
    }

    #[test]
    fn removing_an_address_keeps_the_domain_block() {
        let mut gate = ComplianceGate::new();
        gate.add_to_blocklist("a@x.com", "unsubscribe");
        assert!(gate.remove_from_blocklist("a@x.com"));
        assert!(gate.is_blocked("a@x.com"));
        assert!(gate.remove_domain("x.com"));
        assert!(!gate.is_blocked("a@x.com"));
    }
}
