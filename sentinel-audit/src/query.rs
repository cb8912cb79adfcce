//! The paginated read surface over the on-disk audit log: most-recent
//! first, with optional verdict and since-time filters.

use std::path::Path;

use chrono::DateTime;
use chrono::Utc;
use sentinel_protocol::AuditRecord;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to read audit log at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub limit: usize,
    pub offset: usize,
    pub verdict_filter: Option<String>,
    pub since: Option<DateTime<Utc>>,
}

/// Reads `path` and returns up to `limit` records, most recently finalized
/// first, honoring `offset` and the optional filters. A missing log file
/// (nothing has been audited yet) is treated as an empty result, not an
/// error.
pub async fn query(path: &Path, query: &AuditQuery) -> Result<Vec<AuditRecord>, QueryError> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(QueryError::Read {
                path: path.display().to_string(),
                source,
            });
        }
    };

    let mut records: Vec<AuditRecord> = contents
        .lines()
        .filter_map(|line| serde_json::from_str::<AuditRecord>(line).ok())
        .collect();

    // Log order is verdict-finalization order, which is not necessarily
    // monotonically increasing by wall clock across concurrent sessions;
    // sort defensively so "most recent first" is always honest.
    records.sort_by(|a, b| b.finalized_wall_clock.cmp(&a.finalized_wall_clock));

    let filtered = records.into_iter().filter(|record| {
        let verdict_ok = query
            .verdict_filter
            .as_deref()
            .is_none_or(|wanted| record.verdict.label().eq_ignore_ascii_case(wanted));
        let since_ok = query.since.is_none_or(|since| record.finalized_wall_clock >= since);
        verdict_ok && since_ok
    });

    Ok(filtered.skip(query.offset).take(query.limit.max(1)).collect())
}
