//! Chart-of-account reference data.

use daybook_core::balance::{CoaType, CoaTypeMap};
use daybook_core::source::{ChartOfAccounts, SourceError};
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder};
use tracing::warn;

use crate::entities::sub_categories;
use crate::error::source_error;

/// Reads the sub-category → chart-of-account type mapping.
#[derive(Debug, Clone)]
pub struct PgChartOfAccounts {
    db: DatabaseConnection,
}

impl PgChartOfAccounts {
    /// Creates a new catalog repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn all(&self) -> Result<Vec<sub_categories::Model>, SourceError> {
        sub_categories::Entity::find()
            .order_by_asc(sub_categories::Column::Code)
            .all(&self.db)
            .await
            .map_err(source_error)
    }
}

impl ChartOfAccounts for PgChartOfAccounts {
    async fn coa_types(&self) -> Result<CoaTypeMap, SourceError> {
        let rows = self.all().await?;
        Ok(coa_type_map(&rows))
    }

    async fn sub_categories(&self) -> Result<Vec<String>, SourceError> {
        let rows = self.all().await?;
        Ok(rows.into_iter().map(|row| row.code).collect())
    }
}

fn coa_type_map(rows: &[sub_categories::Model]) -> CoaTypeMap {
    rows.iter()
        .map(|row| {
            if !CoaType::is_known_code(&row.coa_type) {
                warn!(
                    sub_category = %row.code,
                    coa_type = %row.coa_type,
                    "Unknown chart-of-account type, treating as asset"
                );
            }
            (row.code.clone(), CoaType::from_code(&row.coa_type))
        })
        .collect()
}
