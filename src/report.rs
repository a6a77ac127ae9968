// 🔍 Reporter - post-import verification summary (read-only)

use anyhow::Result;
use std::fmt;

use crate::store::{BusinessDetails, DatabaseSummary, PermitStatistics, PermitStore};

pub const SAMPLE_SIZE: i64 = 5;
pub const TOP_PERMIT_TYPES: usize = 10;

#[derive(Debug, Clone)]
pub struct VerificationReport {
    pub summary: DatabaseSummary,
    pub sample: Vec<BusinessDetails>,
    pub top_permit_types: Vec<PermitStatistics>,
}

impl VerificationReport {
    pub async fn collect(store: &dyn PermitStore) -> Result<Self> {
        let summary = store.database_summary().await?;
        let sample = store.list_businesses(SAMPLE_SIZE, 0).await?;
        let top_permit_types = store
            .permit_statistics()
            .await?
            .into_iter()
            .filter(|p| p.business_count > 0)
            .take(TOP_PERMIT_TYPES)
            .collect();

        Ok(VerificationReport {
            summary,
            sample,
            top_permit_types,
        })
    }
}

fn or_dash<T: fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Database Statistics ===")?;
        writeln!(f, "Businesses:   {}", self.summary.total_businesses)?;
        writeln!(f, "Permits:      {}", self.summary.total_permits)?;
        writeln!(f, "Suburbs:      {}", self.summary.total_suburbs)?;
        writeln!(f, "Permit Types: {}", self.summary.total_permit_types)?;
        writeln!(f, "Avg Rating:   {}", or_dash(&self.summary.avg_rating))?;

        writeln!(f, "\n=== Sample Business Data ===")?;
        for b in &self.sample {
            writeln!(
                f,
                "{} | {} | {} | Rating: {}",
                b.business_name,
                or_dash(&b.permit_types),
                or_dash(&b.suburb_name),
                or_dash(&b.eat_safe_rating),
            )?;
        }

        writeln!(f, "\n=== Top Permit Types ===")?;
        for p in &self.top_permit_types {
            writeln!(
                f,
                "{}: {} businesses (avg rating: {})",
                p.permit_type_name,
                p.business_count,
                or_dash(&p.avg_rating),
            )?;
        }

        Ok(())
    }
}
