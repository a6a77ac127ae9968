// 💾 Record Importer - one transaction per business
//
// Address → business → permits, strictly in that order because each insert
// needs the id generated by the previous one. A failed record is rolled back,
// logged and counted; the batch carries on.

use tracing::{info, warn};

use crate::lookup::LookupTables;
use crate::reader::CleanedRecord;
use crate::store::{NewBusiness, PermitStore};

/// Progress is logged every this many imported records
pub const PROGRESS_INTERVAL: usize = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub processed: usize,
    pub errored: usize,
}

impl ImportSummary {
    pub fn total(&self) -> usize {
        self.processed + self.errored
    }
}

/// Resolve lookup ids for one record. Names missing from the lookup are
/// skipped.
pub fn resolve<'a>(record: &'a CleanedRecord, lookups: &LookupTables) -> NewBusiness<'a> {
    let suburb_id = record
        .suburb_name
        .as_deref()
        .and_then(|name| lookups.suburb_id(name));

    let permit_type_ids = record
        .permit_types
        .iter()
        .filter_map(|name| lookups.permit_type_id(name))
        .collect();

    NewBusiness {
        record,
        suburb_id,
        permit_type_ids,
    }
}

/// Import every record in order. Never fails as a whole.
pub async fn import_records(
    store: &dyn PermitStore,
    records: &[CleanedRecord],
    lookups: &LookupTables,
) -> ImportSummary {
    info!(records = records.len(), "Processing main business data");
    let mut summary = ImportSummary::default();

    for record in records {
        let business = resolve(record, lookups);

        match store.insert_business(&business).await {
            Ok(_) => {
                summary.processed += 1;
                if summary.processed % PROGRESS_INTERVAL == 0 {
                    info!(processed = summary.processed, "Import progress");
                }
            }
            Err(e) => {
                summary.errored += 1;
                warn!(
                    business = %record.business_name,
                    index = record.original_index,
                    error = %format!("{e:#}"),
                    "Error processing business"
                );
            }
        }
    }

    info!(
        processed = summary.processed,
        errored = summary.errored,
        "Import finished"
    );
    summary
}
