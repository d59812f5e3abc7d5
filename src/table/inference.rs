use crate::table::TableStructure;
use serde::Serialize;

pub const DEFAULT_MAX_SAMPLES: usize = 3;

/// Shared context of a whole fill operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableContext {
    pub row_count: usize,
    pub column_count: usize,
    /// Column headers, empty when the table has none
    pub headers: Vec<String>,
    pub purpose: String,
    pub sample_data: Vec<Vec<String>>,
}

fn skips_first_row(structure: &TableStructure) -> bool {
    structure.info.has_headers || structure.header_config.has_column_headers
}

/// One-line description of what the table holds.
pub fn infer_table_purpose(structure: &TableStructure) -> String {
    let headers: Vec<&str> = structure.column_headers
        .iter()
        .flatten()
        .map(String::as_str)
        .filter(|header| !header.is_empty())
        .collect();
    if !headers.is_empty() {
        return format!("Table with columns: {}", headers.join(", "));
    }

    let first_row: Vec<&str> = structure.cells
        .first()
        .into_iter()
        .flatten()
        .filter(|cell| !cell.is_empty)
        .map(|cell| cell.text.trim())
        .collect();
    if !first_row.is_empty() {
        return format!("Table with data including: {}", first_row.join(", "));
    }
    "Data table".to_owned()
}

/// Up to `max_samples` rows with the most filled cells, header row excluded.
/// Rows with equal fill keep their table order.
pub fn extract_sample_data(structure: &TableStructure, max_samples: usize) -> Vec<Vec<String>> {
    let skip = usize::from(skips_first_row(structure));
    let mut rows: Vec<(usize, &Vec<_>)> = structure.cells
        .iter()
        .skip(skip)
        .map(|cells| (cells.iter().filter(|cell| !cell.is_empty).count(), cells))
        .collect();
    rows.sort_by(|a, b| b.0.cmp(&a.0));
    rows.into_iter()
        .take(max_samples)
        .map(|(_, cells)| cells.iter().map(|cell| cell.text.to_owned()).collect())
        .collect()
}

pub fn build_table_context(structure: &TableStructure) -> TableContext {
    TableContext {
        row_count: structure.info.row_count,
        column_count: structure.info.column_count,
        headers: structure.column_headers.clone().unwrap_or_default(),
        purpose: infer_table_purpose(structure),
        sample_data: extract_sample_data(structure, DEFAULT_MAX_SAMPLES),
    }
}
