//! Deduplication gate: natural-key filtering ahead of the commit.

use std::collections::HashSet;

use tracing::info;
use uuid::Uuid;

use crate::db::PipelineStore;
use crate::error::{AppError, AppResult};
use crate::models::{DestinationRecord, DestinationTable, MAX_TRACKING_REISSUES};

/// Candidates that survived deduplication.
#[derive(Debug, Clone, PartialEq)]
pub struct Deduplicated {
    pub records: Vec<DestinationRecord>,
    /// Existing-key and intra-batch collisions dropped
    pub filtered: u64,
}

/// Drop candidates whose key is in `existing` or already seen in the batch.
///
/// Keeps the first occurrence and the original order.
pub fn drop_known(candidates: Vec<DestinationRecord>, existing: &HashSet<String>) -> Deduplicated {
    let total = candidates.len() as u64;
    let mut seen = HashSet::new();
    let records: Vec<DestinationRecord> = candidates
        .into_iter()
        .filter(|record| {
            let key = record.natural_key();
            !existing.contains(&key) && seen.insert(key)
        })
        .collect();

    Deduplicated {
        filtered: total - records.len() as u64,
        records,
    }
}

/// Filter candidates against the tenant's rows in `table`.
pub async fn filter_new(
    store: &dyn PipelineStore,
    tenant_id: Uuid,
    table: DestinationTable,
    candidates: Vec<DestinationRecord>,
) -> AppResult<Deduplicated> {
    if candidates.is_empty() {
        return Ok(Deduplicated {
            records: candidates,
            filtered: 0,
        });
    }

    let keys: Vec<String> = candidates.iter().map(DestinationRecord::natural_key).collect();
    let existing = store.existing_natural_keys(tenant_id, table, &keys).await?;
    let result = drop_known(candidates, &existing);

    if result.filtered > 0 {
        info!(
            tenant_id = %tenant_id,
            table = %table,
            filtered = result.filtered,
            kept = result.records.len(),
            "Dropped duplicate records"
        );
    }
    Ok(result)
}

/// Reissue generated tracking numbers already held by another file's entries.
///
/// A generated number is derived from the preview, so a holder from the same
/// file means the document was approved before and dedup should drop it.
/// Returns how many numbers were reissued.
pub async fn reissue_foreign_tracking_numbers(
    store: &dyn PipelineStore,
    tenant_id: Uuid,
    file_id: Uuid,
    candidates: &mut [DestinationRecord],
) -> AppResult<u64> {
    let mut reissued = 0;

    for _ in 0..MAX_TRACKING_REISSUES {
        let numbers: Vec<String> = candidates
            .iter()
            .filter_map(|r| r.generated_tracking_number().map(str::to_string))
            .collect();
        if numbers.is_empty() {
            return Ok(reissued);
        }
        let sources = store.tracking_number_sources(tenant_id, &numbers).await?;

        let mut batch: HashSet<String> =
            candidates.iter().map(DestinationRecord::natural_key).collect();
        let mut changed = false;
        for record in candidates.iter_mut() {
            let foreign = record
                .generated_tracking_number()
                .and_then(|n| sources.get(n))
                .is_some_and(|source| *source != Some(file_id));
            if !foreign {
                continue;
            }
            while record.reissue_tracking_number() && !batch.insert(record.natural_key()) {}
            reissued += 1;
            changed = true;
        }

        if !changed {
            if reissued > 0 {
                info!(
                    tenant_id = %tenant_id,
                    file_id = %file_id,
                    reissued,
                    "Reissued tracking numbers held by other documents"
                );
            }
            return Ok(reissued);
        }
    }

    Err(AppError::Conflict(format!(
        "No free tracking number after {} attempts",
        MAX_TRACKING_REISSUES
    )))
}
