//! # Table Model Module
//!
//! Normalized structural model of a document table and the pure functions that
//! derive generation context from it:
//!
//! - [`detector`]: table enumeration and full structure parsing
//! - [`context`]: per-cell context (headers, purpose, neighbors)
//! - [`inference`]: table purpose and representative sample rows
//! - [`prompt`]: prompt text built from those contexts
use crate::document::DocumentError;
use crate::error::ErrorKind;
use serde::Serialize;
use thiserror::Error;

pub mod context;
pub mod detector;
pub mod inference;
pub mod prompt;

/// Structural failures. A parse either yields a complete [`TableStructure`] or one of these.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TableError {
    #[error("Invalid table index {0}")]
    InvalidTableIndex(usize),

    #[error("Table access failed: {0}")]
    TableAccess(String),

    #[error("Parse table structure failed: {0}")]
    StructureParse(String),
}

impl TableError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidTableIndex(_) => ErrorKind::InvalidTableIndex,
            Self::TableAccess(_) => ErrorKind::TableAccessError,
            Self::StructureParse(_) => ErrorKind::StructureParseError,
        }
    }
}

impl From<DocumentError> for TableError {
    fn from(error: DocumentError) -> Self {
        match error {
            DocumentError::TableNotFound(index) => Self::InvalidTableIndex(index),
            error => Self::TableAccess(error.to_string()),
        }
    }
}

/// Part of the document a table lives in.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableLocation {
    #[default]
    Body,
    Header,
    Footer,
}

impl TableLocation {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Body => "body",
            Self::Header => "header",
            Self::Footer => "footer",
        }
    }
}

/// Header layout of a table.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderType {
    #[default]
    None,
    /// First column labels each row
    Row,
    /// First row labels each column
    Column,
    Both,
}

impl HeaderType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Row => "row",
            Self::Column => "column",
            Self::Both => "both",
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderConfig {
    #[serde(rename = "type")]
    pub kind: HeaderType,
    pub has_row_headers: bool,
    pub has_column_headers: bool,
}

impl HeaderConfig {
    pub const fn new(has_row_headers: bool, has_column_headers: bool) -> Self {
        let kind = match (has_row_headers, has_column_headers) {
            (true, true) => HeaderType::Both,
            (true, false) => HeaderType::Row,
            (false, true) => HeaderType::Column,
            (false, false) => HeaderType::None,
        };
        Self {
            kind,
            has_row_headers,
            has_column_headers,
        }
    }

    /// Header cells label other cells and are never filled.
    pub const fn is_header_cell(&self, row: usize, col: usize) -> bool {
        (self.has_column_headers && row == 0) || (self.has_row_headers && col == 0)
    }
}

/// Identity and shape of one table, from the cheap detection scan.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub index: usize,
    pub row_count: usize,
    pub column_count: usize,
    /// First row is bold
    pub has_headers: bool,
    pub location: TableLocation,
    pub total_cells: usize,
    /// Possibly true: merge detection can miss merges.
    pub has_merged_cells: bool,
}

/// A rectangular merged region anchored at its top-left cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedCellInfo {
    pub row: usize,
    pub col: usize,
    pub row_span: usize,
    pub col_span: usize,
}

impl MergedCellInfo {
    pub fn covers(&self, row: usize, col: usize) -> bool {
        (self.row..self.row + self.row_span).contains(&row)
            && (self.col..self.col + self.col_span).contains(&col)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellInfo {
    pub row_index: usize,
    pub col_index: usize,
    pub text: String,
    pub is_empty: bool,
    pub is_merged: bool,
    pub has_nested_table: bool,
    pub character_count: usize,
    /// `"{row}-{col}"`
    pub id: String,
}

impl CellInfo {
    pub fn new(row_index: usize, col_index: usize, text: String) -> Self {
        Self {
            row_index,
            col_index,
            is_empty: text.trim().is_empty(),
            is_merged: false,
            has_nested_table: false,
            character_count: text.chars().count(),
            id: cell_id(row_index, col_index),
            text,
        }
    }
}

pub fn cell_id(row: usize, col: usize) -> String {
    format!("{row}-{col}")
}

/// Full snapshot of one table. Parsed fresh for every operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStructure {
    pub info: TableInfo,
    pub header_config: HeaderConfig,
    /// Row-major grid, `info.row_count` rows of `info.column_count` cells
    pub cells: Vec<Vec<CellInfo>>,
    /// The same cells flattened in row-major order
    pub cells_flat: Vec<CellInfo>,
    pub column_headers: Option<Vec<String>>,
    pub row_headers: Option<Vec<String>>,
    pub merged_cells: Vec<MergedCellInfo>,
}

impl TableStructure {
    /// Assembles a structure from a complete grid, deriving the flat view and header arrays.
    pub fn new(
        info: TableInfo,
        header_config: HeaderConfig,
        cells: Vec<Vec<CellInfo>>,
        merged_cells: Vec<MergedCellInfo>,
    ) -> Self {
        let cells_flat = cells.iter().flatten().cloned().collect();
        let column_headers = header_config.has_column_headers.then(|| {
            cells.first()
                .map(|row| row.iter().map(|cell| cell.text.trim().to_owned()).collect())
                .unwrap_or_default()
        });
        let row_headers = header_config.has_row_headers.then(|| {
            cells.iter()
                .filter_map(|row| row.first())
                .map(|cell| cell.text.trim().to_owned())
                .collect()
        });
        Self {
            info,
            header_config,
            cells,
            cells_flat,
            column_headers,
            row_headers,
            merged_cells,
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&CellInfo> {
        self.cells.get(row).and_then(|cells| cells.get(col))
    }

    pub fn column_header(&self, col: usize) -> Option<&str> {
        self.column_headers.as_ref()?.get(col).map(String::as_str)
    }

    pub fn row_header(&self, row: usize) -> Option<&str> {
        self.row_headers.as_ref()?.get(row).map(String::as_str)
    }

    /// Checks the grid invariants: dimensions match `info` and `cells_flat` mirrors `cells`.
    pub fn is_well_formed(&self) -> bool {
        self.cells.len() == self.info.row_count
            && self.cells.iter().all(|row| row.len() == self.info.column_count)
            && self.cells_flat.len() == self.info.row_count * self.info.column_count
            && self.cells.iter().flatten().zip(&self.cells_flat).all(|(a, b)| a == b)
    }
}
