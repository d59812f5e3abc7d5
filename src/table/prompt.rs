use crate::table::context::CellContext;
use crate::table::inference::TableContext;
use std::fmt::Write;

/// Whether a cell carries its own question, e.g. `"Capital of France=?"`.
pub fn is_self_describing(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && (text.ends_with('?') || text.contains("=?"))
}

/// Instructions shared by every cell of one fill operation.
pub fn system_context(table: &TableContext, user_context: Option<&str>) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "You are filling in cells of a table in a document.");
    let _ = writeln!(text, "Table: {} ({} rows x {} columns).", table.purpose, table.row_count, table.column_count);
    if !table.headers.is_empty() {
        let _ = writeln!(text, "Column headers: {}", table.headers.join(" | "));
    }
    let samples: Vec<_> = table.sample_data
        .iter()
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .collect();
    if !samples.is_empty() {
        let _ = writeln!(text, "Sample rows:");
        for row in samples {
            let _ = writeln!(text, "- {}", row.join(" | "));
        }
    }
    if let Some(user_context) = user_context.map(str::trim).filter(|context| !context.is_empty()) {
        let _ = writeln!(text, "Additional context from the user:\n{user_context}");
    }
    let _ = write!(
        text,
        "Answer with the content of the requested cell only: no explanations, no quotes, no labels. \
         Match the style and format of the existing values."
    );
    text
}

/// Request text for one cell.
pub fn cell_prompt(cell: &CellContext) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "Cell at row {}, column {}.", cell.row_index + 1, cell.col_index + 1);
    match &cell.cell_purpose {
        Some(purpose) => {
            let _ = writeln!(text, "The cell holds: {purpose}");
        }
        None => {
            let _ = writeln!(
                text,
                "The table has no headers for this cell. The cell itself must contain a \
                 self-describing question (for example ending in \"=?\"); answer that question."
            );
        }
    }
    if let Some(header) = &cell.column_header {
        let _ = writeln!(text, "Column header: {header}");
    }
    if let Some(header) = &cell.row_header {
        let _ = writeln!(text, "Row header: {header}");
    }
    if !cell.original_content.trim().is_empty() {
        let _ = writeln!(text, "Current content: {}", cell.original_content.trim());
    }
    if !cell.row_context.is_empty() {
        let _ = writeln!(text, "Other values in this row: {}", cell.row_context.join(" | "));
    }
    if !cell.column_context.is_empty() {
        let _ = writeln!(text, "Other values in this column: {}", cell.column_context.join(" | "));
    }
    let neighbors = [
        ("left", &cell.adjacent_cells.left),
        ("right", &cell.adjacent_cells.right),
        ("above", &cell.adjacent_cells.top),
        ("below", &cell.adjacent_cells.bottom),
    ];
    for (side, neighbor) in neighbors {
        if let Some(neighbor) = neighbor.as_deref().map(str::trim).filter(|neighbor| !neighbor.is_empty()) {
            let _ = writeln!(text, "Cell {side}: {neighbor}");
        }
    }
    let _ = write!(text, "Content:");
    text
}
