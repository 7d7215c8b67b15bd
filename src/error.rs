// Third Party
use thiserror::Error;

// Local
use crate::crd::SyncStatus;

/// Failure to obtain the desired state from the sheet.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("spreadsheet id and cell range must both be set")]
    InvalidInput,

    #[error("unable to read values from the sheet: {0}")]
    SourceUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("sheet returned {rows} row(s), expected a header row and at least one app")]
    InsufficientData { rows: usize },

    #[error("row {row} has {columns} column(s), expected exactly 3")]
    MalformedRow { row: usize, columns: usize },

    #[error("unexpected header {found:?}, expected columns 'App Name', 'Image' and 'Replicas'")]
    SchemaMismatch { found: Vec<String> },
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to fetch desired state: {0}")]
    Fetch(#[from] FetchError),

    #[error("failed to set status `{status}` on {request}: {source}")]
    StatusWrite {
        request: String,
        status: SyncStatus,
        #[source]
        source: kube::Error,
    },

    #[error("failed to look up workload {name}: {source}")]
    Lookup {
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("failed to {verb} workload {name}: {source}")]
    Apply {
        verb: &'static str,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("SheetSync {0} has no namespace")]
    MissingNamespace(String),
}
