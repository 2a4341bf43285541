//! CSV export of successfully extracted invoices.
//!
//! One row per SUCCESS document, columns in this order:
//!
//! | File Name | Invoice Date | Invoice Number | PO Number | Quotation Number | Currency | Items | Total Amount |
//!
//! Every field is quoted so embedded commas and newlines survive, and quotes
//! are doubled as usual. The Items cell is the exception: it holds several
//! lines of model-extracted text, and any `"` in it is replaced by `'` so a
//! stray quote can never shift cell boundaries in spreadsheet tools.
//! The output starts with a UTF-8 byte-order mark so Excel picks the right
//! encoding.

use crate::error::InvoiceError;
use crate::model::{InvoiceData, LineItem};
use crate::session::{DocumentStatus, SessionSnapshot};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// UTF-8 byte-order mark.
pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Header row of the export.
pub const HEADERS: [&str; 8] = [
    "File Name",
    "Invoice Date",
    "Invoice Number",
    "PO Number",
    "Quotation Number",
    "Currency",
    "Items",
    "Total Amount",
];

/// A finished CSV file, ready to be saved or offered for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    /// Suggested file name, e.g. `invoices_2024-05-02.csv`.
    pub file_name: String,
    /// BOM-prefixed UTF-8 CSV bytes.
    pub bytes: Vec<u8>,
    /// Number of data rows (one per exported document).
    pub rows: usize,
}

/// File name for an export produced on `date`.
pub fn export_file_name(date: NaiveDate) -> String {
    format!("invoices_{}.csv", date.format("%Y-%m-%d"))
}

/// Render one line item for the Items cell.
pub fn format_item(item: &LineItem) -> String {
    format!(
        "{} (Qty: {}, Unit: {}, Total: {})",
        item.description, item.quantity, item.unit_price, item.total
    )
}

/// Build the Items cell: zero-total items dropped, one item per line,
/// double quotes turned into apostrophes.
pub fn items_cell(data: &InvoiceData) -> String {
    data.items
        .iter()
        .filter(|item| item.total != 0.0)
        .map(format_item)
        .collect::<Vec<_>>()
        .join("\n")
        .replace('"', "'")
}

/// Build the CSV for every SUCCESS document in `snapshot`.
///
/// Returns `None` when no document qualifies, in which case nothing should
/// be offered to the user.
pub fn build_export(
    snapshot: &SessionSnapshot,
    date: NaiveDate,
) -> Result<Option<CsvExport>, InvoiceError> {
    let rows: Vec<(&str, &InvoiceData)> = snapshot
        .items
        .iter()
        .filter(|item| item.status == DocumentStatus::Success)
        .filter_map(|item| item.data.as_ref().map(|d| (item.file.name.as_str(), d)))
        .collect();

    if rows.is_empty() {
        debug!("Nothing to export: no successfully extracted documents");
        return Ok(None);
    }

    let mut bytes = UTF8_BOM.to_vec();
    {
        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(&mut bytes);

        writer.write_record(HEADERS).map_err(csv_error)?;
        for (file_name, data) in &rows {
            let total = data.total_amount.to_string();
            let items = items_cell(data);
            writer
                .write_record([
                    *file_name,
                    data.invoice_date.as_str(),
                    data.invoice_number.as_str(),
                    data.po_number.as_str(),
                    data.quotation_number.as_str(),
                    data.currency.as_str(),
                    items.as_str(),
                    total.as_str(),
                ])
                .map_err(csv_error)?;
        }
        writer
            .flush()
            .map_err(|e| InvoiceError::Internal(format!("csv flush: {e}")))?;
    }

    Ok(Some(CsvExport {
        file_name: export_file_name(date),
        bytes,
        rows: rows.len(),
    }))
}

/// Build an export stamped with today's local date.
pub fn build_export_today(snapshot: &SessionSnapshot) -> Result<Option<CsvExport>, InvoiceError> {
    build_export(snapshot, chrono::Local::now().date_naive())
}

/// Write an export into `dir` under its suggested name.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub async fn write_export(export: &CsvExport, dir: impl AsRef<Path>) -> Result<PathBuf, InvoiceError> {
    let dir = dir.as_ref();
    let path = dir.join(&export.file_name);
    let write_err = |source: std::io::Error| InvoiceError::ExportWriteFailed {
        path: path.clone(),
        source,
    };

    tokio::fs::create_dir_all(dir).await.map_err(write_err)?;

    let tmp_path = path.with_extension("csv.tmp");
    tokio::fs::write(&tmp_path, &export.bytes)
        .await
        .map_err(write_err)?;
    tokio::fs::rename(&tmp_path, &path).await.map_err(write_err)?;

    info!("Exported {} invoice(s) to {}", export.rows, path.display());
    Ok(path)
}

fn csv_error(e: csv::Error) -> InvoiceError {
    InvoiceError::Internal(format!("csv: {e}"))
}
