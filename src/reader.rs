// System
use std::sync::Arc;

// Third Party
use async_trait::async_trait;
use tracing::{debug, warn};

// Local
use crate::error::FetchError;

const EXPECTED_HEADER: [&str; 3] = ["App Name", "Image", "Replicas"];

/// Replica count used when the `Replicas` cell cannot be parsed.
pub const FALLBACK_REPLICAS: i32 = 1;

/// The desired state of one app, as declared by one data row of the sheet.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AppDesiredState {
    pub name: String,
    pub image: String,
    pub replicas: i32,
}

/// Anything that can return the cells of a spreadsheet range as rows of strings.
#[async_trait]
pub trait SheetSource: Send + Sync {
    async fn values(
        &self,
        spreadsheet_id: &str,
        cell_range: &str,
    ) -> Result<Vec<Vec<String>>, anyhow::Error>;
}

/// Reads and validates app rows from a `SheetSource`.
#[derive(Clone)]
pub struct DesiredStateReader {
    source: Arc<dyn SheetSource>,
}

impl DesiredStateReader {
    pub fn new(source: Arc<dyn SheetSource>) -> Self {
        Self { source }
    }

    /// Fetch the apps declared in `cell_range`. The first row must be the header
    /// `App Name | Image | Replicas`; every following row becomes one `AppDesiredState`, in sheet
    /// order.
    pub async fn fetch(
        &self,
        spreadsheet_id: &str,
        cell_range: &str,
    ) -> Result<Vec<AppDesiredState>, FetchError> {
        if spreadsheet_id.is_empty() || cell_range.is_empty() {
            return Err(FetchError::InvalidInput);
        }
        let rows = self
            .source
            .values(spreadsheet_id, cell_range)
            .await
            .map_err(|error| FetchError::SourceUnavailable(error.into()))?;
        debug!(
            "Read {} rows from {} - {}",
            rows.len(),
            spreadsheet_id,
            cell_range
        );
        parse_rows(rows)
    }
}

fn parse_rows(rows: Vec<Vec<String>>) -> Result<Vec<AppDesiredState>, FetchError> {
    if rows.len() <= 1 {
        return Err(FetchError::InsufficientData { rows: rows.len() });
    }
    let mut apps = Vec::with_capacity(rows.len() - 1);
    for (index, row) in rows.into_iter().enumerate() {
        if row.len() != EXPECTED_HEADER.len() {
            return Err(FetchError::MalformedRow {
                row: index,
                columns: row.len(),
            });
        }
        if index == 0 {
            if row.iter().map(String::as_str).ne(EXPECTED_HEADER) {
                return Err(FetchError::SchemaMismatch { found: row });
            }
            continue;
        }
        let [name, image, replicas]: [String; 3] = match row.try_into() {
            Ok(cells) => cells,
            // Length was checked above.
            Err(row) => {
                return Err(FetchError::MalformedRow {
                    row: index,
                    columns: row.len(),
                })
            }
        };
        let replicas = parse_replicas(&replicas).unwrap_or_else(|| {
            warn!(
                "Unable to parse replicas `{}` for app {} on row {}, assuming {}",
                replicas, name, index, FALLBACK_REPLICAS
            );
            FALLBACK_REPLICAS
        });
        apps.push(AppDesiredState {
            name,
            image,
            replicas,
        });
    }
    Ok(apps)
}

fn parse_replicas(cell: &str) -> Option<i32> {
    cell.parse::<i32>().ok().filter(|replicas| *replicas >= 0)
}
