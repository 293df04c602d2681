//! Spreadsheet import: header folding, row extraction and reconciliation
//! against an [`EmployeeStore`].

pub mod extract;
pub mod header;
pub mod reconcile;

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Reader};
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{info, warn};

pub use extract::{ImportCandidate, RowExtractor, DEFAULT_DEPARTMENT};
pub use header::{normalize_header, HeaderIndex};
pub use reconcile::{ImportReport, Outcome, Reconciler};

use crate::store::EmployeeStore;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("could not read workbook: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("workbook has no worksheets")]
    NoWorksheet,
    #[error("workbook reader stopped: {0}")]
    Reader(#[from] tokio::task::JoinError),
}

/// Parses the first worksheet into candidates. Row 1 holds the headers.
///
/// Rows that fail extraction are logged and left out; the call only fails
/// when the workbook itself cannot be read.
pub fn read_candidates(bytes: &[u8], today: NaiveDate) -> Result<Vec<ImportCandidate>, ImportError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ImportError::NoWorksheet)??;

    // The range starts at the first used cell; a blank first row means there
    // are no headers to map.
    match range.start() {
        None => return Ok(vec![]),
        Some((row, _)) if row > 0 => {
            warn!(first_used_row = row + 1, "worksheet has no header row");
            return Ok(vec![]);
        }
        Some(_) => {}
    }

    let mut rows = range.rows();
    let Some(header_row) = rows.next() else {
        return Ok(vec![]);
    };
    let headers = HeaderIndex::from_row(header_row);
    let extractor = RowExtractor::new(&headers, today);

    let mut candidates = Vec::new();
    for (offset, row) in rows.enumerate() {
        match extractor.extract(row) {
            Ok(Some(candidate)) => candidates.push(candidate),
            Ok(None) => {}
            Err(err) => warn!(row = offset + 2, error = %err, "skipping unreadable row"),
        }
    }
    Ok(candidates)
}

/// Reads `bytes` and merges every row into `store`. Parsing runs on the
/// blocking pool.
pub async fn import_workbook<S>(
    store: &S,
    bytes: &[u8],
    today: NaiveDate,
) -> Result<ImportReport, ImportError>
where
    S: EmployeeStore + ?Sized,
{
    let owned = bytes.to_vec();
    let candidates =
        tokio::task::spawn_blocking(move || read_candidates(&owned, today)).await??;
    let rows = candidates.len();
    let report = Reconciler::new(store).run(candidates).await;
    info!(
        rows,
        created = report.created,
        updated = report.updated,
        skipped = report.skipped,
        failed = report.failed,
        "employee import finished"
    );
    Ok(report)
}
