// 🔖 Lookup Builder - deduplicated suburbs and permit types
//
// Free-text names repeated across thousands of rows become one row each.
// Names are upserted in sorted order so ids are reproducible run to run.

use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap};
use tracing::info;

use crate::reader::CleanedRecord;
use crate::store::{LookupKind, PermitStore};

/// name → id for both lookup entities, built once per migration run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LookupTables {
    pub suburbs: HashMap<String, i64>,
    pub permit_types: HashMap<String, i64>,
}

impl LookupTables {
    pub fn suburb_id(&self, name: &str) -> Option<i64> {
        self.suburbs.get(name).copied()
    }

    pub fn permit_type_id(&self, name: &str) -> Option<i64> {
        self.permit_types.get(name).copied()
    }
}

/// Distinct non-null suburb names, sorted
pub fn distinct_suburbs(records: &[CleanedRecord]) -> BTreeSet<String> {
    records
        .iter()
        .filter_map(|r| r.suburb_name.clone())
        .collect()
}

/// Union of all permit type names, sorted
pub fn distinct_permit_types(records: &[CleanedRecord]) -> BTreeSet<String> {
    records
        .iter()
        .flat_map(|r| r.permit_types.iter().cloned())
        .collect()
}

async fn upsert_all(
    store: &dyn PermitStore,
    kind: LookupKind,
    names: &BTreeSet<String>,
) -> Result<HashMap<String, i64>> {
    let mut ids = HashMap::with_capacity(names.len());
    for name in names {
        let id = store
            .upsert_lookup(kind, name)
            .await
            .with_context(|| format!("Failed to upsert {} '{}'", kind.table(), name))?;
        ids.insert(name.clone(), id);
    }
    Ok(ids)
}

/// Persist every suburb and permit type referenced by `records`
pub async fn build_lookups(
    store: &dyn PermitStore,
    records: &[CleanedRecord],
) -> Result<LookupTables> {
    let suburbs = distinct_suburbs(records);
    info!(count = suburbs.len(), "Inserting unique suburbs");
    let suburbs = upsert_all(store, LookupKind::Suburb, &suburbs).await?;

    let permit_types = distinct_permit_types(records);
    info!(count = permit_types.len(), "Inserting unique permit types");
    let permit_types = upsert_all(store, LookupKind::PermitType, &permit_types).await?;

    Ok(LookupTables {
        suburbs,
        permit_types,
    })
}
