use crate::table::CellInfo;
use crate::table::TableStructure;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

static TIME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(jan(uary)?|feb(ruary)?|mar(ch)?|apr(il)?|may|june?|july?|aug(ust)?|sep(t(ember)?)?",
        r"|oct(ober)?|nov(ember)?|dec(ember)?|monday|tuesday|wednesday|thursday|friday|saturday|sunday",
        r"|morning|afternoon|evening|night|today|daily|day|week(ly)?|month(ly)?|quarter(ly)?|year(ly)?",
        r"|q[1-4]|h[12]|fy\d{2,4}|\d{4})\b",
    ))
    .expect("Hardcode regex pattern")
});

static LOCATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(north|south|east|west|northeast|northwest|southeast|southwest|central|city|region",
        r"|country|state|province|county|district|area|zone|office|branch|store|site|location",
        r"|europe|asia|africa|america|emea|apac|latam)\b",
    ))
    .expect("Hardcode regex pattern")
});

static ENTITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)\b(product|item|person|people|employee|staff|customer|client|company|organization|team",
        r"|department|vendor|supplier|student|user|member|project|account|brand|model)s?\b",
    ))
    .expect("Hardcode regex pattern")
});

/// Text of the four neighbors of a cell. `None` means the table edge,
/// `Some("")` an empty neighbor.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AdjacentCells {
    pub left: Option<String>,
    pub right: Option<String>,
    pub top: Option<String>,
    pub bottom: Option<String>,
}

/// Everything known about one target cell, for one generation request.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellContext {
    pub row_index: usize,
    pub col_index: usize,
    pub original_content: String,
    pub column_header: Option<String>,
    pub row_header: Option<String>,
    /// `None` when the cell has no headers and must describe itself
    pub cell_purpose: Option<String>,
    pub is_header_cell: bool,
    pub row_context: Vec<String>,
    pub column_context: Vec<String>,
    pub adjacent_cells: AdjacentCells,
}

/// Joins a column header and a row header with a preposition picked from the row header.
pub fn cell_purpose(column_header: Option<&str>, row_header: Option<&str>) -> Option<String> {
    match (column_header, row_header) {
        (Some(column), Some(row)) => {
            let preposition = if TIME_PATTERN.is_match(row) || LOCATION_PATTERN.is_match(row) {
                "in"
            } else if ENTITY_PATTERN.is_match(row) {
                "of"
            } else {
                "for"
            };
            Some(format!("{column} {preposition} {row}"))
        }
        (Some(header), None) | (None, Some(header)) => Some(header.to_owned()),
        (None, None) => None,
    }
}

/// Derives the context of `cell` from the structure it belongs to.
pub fn build_cell_context(cell: &CellInfo, structure: &TableStructure) -> CellContext {
    let (row, col) = (cell.row_index, cell.col_index);
    let config = &structure.header_config;
    let header = |text: Option<&str>| text.filter(|text| !text.is_empty()).map(str::to_owned);
    let column_header = header(structure.column_header(col));
    let row_header = header(structure.row_header(row));

    let row_context = structure.cells
        .get(row)
        .into_iter()
        .flatten()
        .filter(|other| other.col_index != col && !config.is_header_cell(row, other.col_index) && !other.is_empty)
        .map(|other| other.text.trim().to_owned())
        .collect();
    let column_context = structure.cells
        .iter()
        .filter_map(|cells| cells.get(col))
        .filter(|other| other.row_index != row && !config.is_header_cell(other.row_index, col) && !other.is_empty)
        .map(|other| other.text.trim().to_owned())
        .collect();

    let text_at = |row: Option<usize>, col: Option<usize>| {
        structure.cell(row?, col?).map(|cell| cell.text.to_owned())
    };
    let adjacent_cells = AdjacentCells {
        left: text_at(Some(row), col.checked_sub(1)),
        right: text_at(Some(row), col.checked_add(1)),
        top: text_at(row.checked_sub(1), Some(col)),
        bottom: text_at(row.checked_add(1), Some(col)),
    };

    CellContext {
        row_index: row,
        col_index: col,
        original_content: cell.text.to_owned(),
        cell_purpose: cell_purpose(column_header.as_deref(), row_header.as_deref()),
        column_header,
        row_header,
        is_header_cell: config.is_header_cell(row, col),
        row_context,
        column_context,
        adjacent_cells,
    }
}
