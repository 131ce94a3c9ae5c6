//! Canonical, ordered collection of leads.
//!
//! Order is identification order and is what the dispatcher and reconciler
//! walk; nothing here reorders leads. Lookups are by [`LeadId`], never by
//! position, so callers resuming after a suspension always find the lead
//! they meant (or learn that it is gone).

use outreach_shared::{Lead, LeadId, OutreachError, Result};

#[derive(Debug, Clone, Default)]
pub struct LeadStore {
    leads: Vec<Lead>,
}

impl LeadStore {
    pub fn new(leads: Vec<Lead>) -> Self {
        Self { leads }
    }

    pub fn all(&self) -> &[Lead] {
        &self.leads
    }

    pub fn len(&self) -> usize {
        self.leads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leads.is_empty()
    }

    pub fn get(&self, id: &LeadId) -> Option<&Lead> {
        self.leads.iter().find(|l| &l.id == id)
    }

    pub fn get_mut(&mut self, id: &LeadId) -> Option<&mut Lead> {
        self.leads.iter_mut().find(|l| &l.id == id)
    }

    /// Like [`LeadStore::get`] but a missing lead is an error.
    pub fn require(&self, id: &LeadId) -> Result<&Lead> {
        self.get(id).ok_or_else(|| OutreachError::NotFound(id.clone()))
    }

    pub fn require_mut(&mut self, id: &LeadId) -> Result<&mut Lead> {
        self.get_mut(id)
            .ok_or_else(|| OutreachError::NotFound(id.clone()))
    }

    pub fn find_by_email(&self, email: &str) -> Option<&Lead> {
        let email = email.trim();
        self.leads
            .iter()
            .find(|l| l.email.trim().eq_ignore_ascii_case(email))
    }

    /// Append a lead. Empty addresses and addresses already tracked are rejected.
    pub fn insert(&mut self, lead: Lead) -> Result<LeadId> {
        if lead.email.trim().is_empty() {
            return Err(OutreachError::validation(format!(
                "lead {} has no email address",
                lead.name
            )));
        }
        if self.get(&lead.id).is_some() {
            return Err(OutreachError::validation(format!(
                "lead {} already exists",
                lead.id
            )));
        }
        if let Some(existing) = self.find_by_email(&lead.email) {
            return Err(OutreachError::validation(format!(
                "{} is already tracked as lead {}",
                lead.email, existing.id
            )));
        }
        let id = lead.id.clone();
        self.leads.push(lead);
        Ok(id)
    }

    pub fn remove(&mut self, id: &LeadId) -> Result<Lead> {
        let index = self
            .leads
            .iter()
            .position(|l| &l.id == id)
            .ok_or_else(|| OutreachError::NotFound(id.clone()))?;
        Ok(self.leads.remove(index))
    }
}
