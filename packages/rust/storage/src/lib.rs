//! Whole-file JSON document store.
//!
//! The [`DocumentStore`] keeps three independent documents in one data
//! directory: `leads.json`, `compliance.json` and `scheduled_sends.json`.
//!
//! **Write rules:**
//! - Every save replaces the whole document; there are no partial writes.
//! - Writes go to a sibling temp file that is then renamed over the target,
//!   so readers never observe a half-written document.
//! - A missing document loads as empty.

use std::fs;
use std::path::{Path, PathBuf};

use outreach_shared::{ComplianceRecord, Lead, OutreachError, Result, ScheduledSend};
use serde::Serialize;
use serde::de::DeserializeOwned;

const LEADS_FILE: &str = "leads.json";
const COMPLIANCE_FILE: &str = "compliance.json";
const SCHEDULED_FILE: &str = "scheduled_sends.json";

/// Handle to the persisted outreach documents.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    root: PathBuf,
}

impl DocumentStore {
    /// Open (creating if needed) the data directory at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| OutreachError::io(&root, e))?;
        tracing::debug!(root = %root.display(), "opened document store");
        Ok(Self { root })
    }

    /// The data directory backing this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    // -----------------------------------------------------------------------
    // Leads
    // -----------------------------------------------------------------------

    pub fn load_leads(&self) -> Result<Vec<Lead>> {
        read_document(&self.root.join(LEADS_FILE))
    }

    pub fn save_leads(&self, leads: &[Lead]) -> Result<()> {
        write_document(&self.root.join(LEADS_FILE), &leads)
    }

    // -----------------------------------------------------------------------
    // Compliance record
    // -----------------------------------------------------------------------

    pub fn load_compliance(&self) -> Result<ComplianceRecord> {
        read_document(&self.root.join(COMPLIANCE_FILE))
    }

    pub fn save_compliance(&self, record: &ComplianceRecord) -> Result<()> {
        write_document(&self.root.join(COMPLIANCE_FILE), record)
    }

    // -----------------------------------------------------------------------
    // Scheduled sends
    // -----------------------------------------------------------------------

    pub fn load_scheduled(&self) -> Result<Vec<ScheduledSend>> {
        read_document(&self.root.join(SCHEDULED_FILE))
    }

    pub fn save_scheduled(&self, sends: &[ScheduledSend]) -> Result<()> {
        write_document(&self.root.join(SCHEDULED_FILE), &sends)
    }
}

// ---------------------------------------------------------------------------
// Import / export (user-initiated; errors are surfaced)
// ---------------------------------------------------------------------------

/// Write `leads` as a pretty-printed JSON array to `path`.
pub fn export_leads(path: &Path, leads: &[Lead]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| OutreachError::io(parent, e))?;
    }
    write_document(path, &leads)?;
    tracing::info!(path = %path.display(), count = leads.len(), "exported leads");
    Ok(())
}

/// Read a JSON array of leads from `path`. Unlike [`DocumentStore::load_leads`],
/// a missing file is an error.
pub fn import_leads(path: &Path) -> Result<Vec<Lead>> {
    let content = fs::read_to_string(path).map_err(|e| OutreachError::io(path, e))?;
    let leads: Vec<Lead> = serde_json::from_str(&content)?;
    tracing::info!(path = %path.display(), count = leads.len(), "imported leads");
    Ok(leads)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "document missing, starting empty");
            return Ok(T::default());
        }
        Err(e) => return Err(OutreachError::io(path, e)),
    };

    if content.trim().is_empty() {
        return Ok(T::default());
    }

    serde_json::from_str(&content).map_err(|e| {
        OutreachError::Serialization(format!("{}: {e}", path.display()))
    })
}

fn write_document<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| OutreachError::Storage(format!("invalid document path {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    fs::write(&tmp, json).map_err(|e| OutreachError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| OutreachError::io(path, e))?;
    Ok(())
}
