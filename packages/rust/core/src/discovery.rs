//! Prospect discovery runner.
//!
//! Walks search regions in order, asks the [`LeadSource`] for prospects and
//! adds the ones whose address is not tracked yet. Cancellation is checked
//! before each region and before each prospect, never inside a search call.

use outreach_shared::Lead;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::collaborators::LeadSource;
use crate::state::PipelineState;

/// Summary of one discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Regions whose search call completed.
    pub regions_searched: usize,
    /// New leads added to the store.
    pub added: usize,
    /// Prospects skipped because their address is already tracked (or empty).
    pub duplicates: usize,
    /// Regions whose search failed (region, error message).
    pub failed_regions: Vec<(String, String)>,
    /// Whether the run stopped early because it was cancelled.
    pub cancelled: bool,
}

#[instrument(skip_all, fields(regions = regions.len(), query = %query))]
pub(crate) async fn run(
    state: &Mutex<PipelineState>,
    source: &dyn LeadSource,
    regions: &[String],
    query: &str,
    cancel: &CancellationToken,
) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();

    'regions: for region in regions {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let prospects = match source.search(region, query).await {
            Ok(prospects) => prospects,
            Err(e) => {
                warn!(%region, error = %e, "discovery search failed");
                report.failed_regions.push((region.clone(), e.to_string()));
                continue;
            }
        };
        report.regions_searched += 1;
        debug!(%region, found = prospects.len(), "search returned");

        for prospect in prospects {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break 'regions;
            }
            let mut state = state.lock().await;
            match state.add_lead(Lead::from(prospect)) {
                Ok(_) => report.added += 1,
                Err(_) => report.duplicates += 1,
            }
        }
    }

    info!(
        added = report.added,
        duplicates = report.duplicates,
        failed = report.failed_regions.len(),
        cancelled = report.cancelled,
        "discovery complete"
    );
    report
}
