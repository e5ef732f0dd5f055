use std::path::Path;

use crate::error::MapError;
use crate::record::MetadataRecord;

/// Provenance columns leading every output row, before the metadata fields.
const PROVENANCE_COLUMNS: [&str; 8] = [
    "Accession",
    "Database",
    "Module",
    "Fetched_At",
    "Error",
    "Downloads",
    "Verification",
    "Zip",
];

/// Union of metadata field names across all records, first-seen order.
/// Records seed the canonical schema at creation, so canonical columns
/// always lead and archive extras follow.
fn field_columns(records: &[MetadataRecord]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for name in record.field_names() {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.to_string());
            }
        }
    }
    columns
}

fn row_values(record: &MetadataRecord, fields: &[String]) -> Vec<String> {
    let mut row = vec![
        record.accession().to_string(),
        record.archive.to_string(),
        record.module.to_string(),
        record.fetched_at.clone(),
        record.error.clone().unwrap_or_default(),
        record.downloads.join(";"),
        record.verification.clone().unwrap_or_default(),
        record.archive_path.clone().unwrap_or_default(),
    ];
    for name in fields {
        row.push(record.get(name).unwrap_or_default().to_string());
    }
    row
}

/// Serializes the record set to CSV. Terminal step: records are never
/// mutated after this.
pub fn write_csv(records: &[MetadataRecord], path: &Path) -> Result<(), MapError> {
    let fields = field_columns(records);
    let mut writer = csv::Writer::from_path(path).map_err(|err| MapError::CsvWrite(err.to_string()))?;

    let mut header: Vec<&str> = PROVENANCE_COLUMNS.to_vec();
    header.extend(fields.iter().map(String::as_str));
    writer
        .write_record(&header)
        .map_err(|err| MapError::CsvWrite(err.to_string()))?;

    for record in records {
        writer
            .write_record(row_values(record, &fields))
            .map_err(|err| MapError::CsvWrite(err.to_string()))?;
    }
    writer.flush().map_err(|err| MapError::CsvWrite(err.to_string()))?;
    Ok(())
}

/// Dry-run preview of the first few rows, tab-separated.
pub fn render_preview(records: &[MetadataRecord], limit: usize) -> String {
    let fields = field_columns(records);
    let mut header: Vec<&str> = PROVENANCE_COLUMNS.to_vec();
    header.extend(fields.iter().map(String::as_str));

    let mut out = header.join("\t");
    for record in records.iter().take(limit) {
        out.push('\n');
        out.push_str(&row_values(record, &fields).join("\t"));
    }
    out
}
