//! PostgreSQL-backed registry reading `source_registry` and `source_endpoints`.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::warn;

use crate::error::RegistryError;
use crate::source::Source;
use crate::store::SourceRepository;

const SELECT_SOURCES: &str = "
    SELECT sr.source_id, sr.name, sr.status, sr.tier, sr.access_type, sr.update_frequency,
           sr.allowed_use, sr.needs_partnership, sr.partnership_contact,
           COUNT(se.id) AS endpoint_count
      FROM source_registry sr
      LEFT JOIN source_endpoints se ON se.source_registry_id = sr.id";

/// Row from the registry join.
#[derive(Debug, sqlx::FromRow)]
struct SourceRow {
    source_id: String,
    name: Option<String>,
    status: String,
    tier: String,
    access_type: String,
    update_frequency: String,
    allowed_use: Option<serde_json::Value>,
    needs_partnership: bool,
    partnership_contact: Option<String>,
    endpoint_count: i64,
}

impl From<SourceRow> for Source {
    fn from(row: SourceRow) -> Self {
        // Anything other than an array of strings reads as "no tags", which
        // the lint then reports as MISSING_ALLOWED_USE.
        let allowed_use = match row.allowed_use {
            Some(serde_json::Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(other) if !other.is_null() => {
                warn!(source_id = %row.source_id, value = %other, "allowed_use is not an array");
                Vec::new()
            }
            _ => Vec::new(),
        };
        Source {
            source_id: row.source_id,
            name: row.name,
            status: row.status,
            tier: row.tier,
            access_type: row.access_type,
            update_frequency: row.update_frequency,
            allowed_use,
            endpoint_count: row.endpoint_count.max(0) as u32,
            needs_partnership: row.needs_partnership,
            partnership_contact: row.partnership_contact,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgSourceStore {
    pool: PgPool,
}

impl PgSourceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SourceRepository for PgSourceStore {
    async fn get(&self, source_id: &str) -> Result<Option<Source>, RegistryError> {
        let sql = format!("{} WHERE sr.source_id = $1 GROUP BY sr.id", SELECT_SOURCES);
        let row = sqlx::query_as::<_, SourceRow>(&sql)
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Source::from))
    }

    async fn list(&self) -> Result<Vec<Source>, RegistryError> {
        let sql = format!("{} GROUP BY sr.id ORDER BY sr.id", SELECT_SOURCES);
        let rows = sqlx::query_as::<_, SourceRow>(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Source::from).collect())
    }

    async fn schema_columns(&self) -> Result<Vec<String>, RegistryError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT column_name::text FROM information_schema.columns
              WHERE table_name = 'source_registry'",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }
}
