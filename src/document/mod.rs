//! # Document Access Module
//!
//! Collaborator interfaces between the fill core and a live document, plus two
//! implementations: an in-memory grid ([`memory::MemoryDocument`]) and a
//! WordprocessingML package ([`docx::DocxDocument`]).
//!
//! All reads and writes go through [`Document::with_session`]. A session sees a
//! consistent view of the document, and its writes become visible only when the
//! session closure returns `Ok`.
use crate::table::MergedCellInfo;
use crate::table::TableLocation;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

pub mod docx;
pub mod memory;

/// Errors raised by document accessors and sessions.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    #[error("Table {0} not found")]
    TableNotFound(usize),

    #[error("Cell ({row}, {col}) is outside table {table}")]
    CellOutOfRange { table: usize, row: usize, col: usize },

    #[error("Read table {table} failed: {message}")]
    ReadFailed { table: usize, message: String },

    #[error("Write table {table} failed: {message}")]
    WriteFailed { table: usize, message: String },

    #[error("Document session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Missing package part '{0}'")]
    MissingPart(String),

    #[error("Invalid package part '{part}': {message}")]
    InvalidPart { part: String, message: String },
}

/// Identifies one table among all tables of a document.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TableHandle {
    /// Position in [`TableAccessor::list_tables`]
    pub index: usize,
    pub location: TableLocation,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub rows: usize,
    pub cols: usize,
}

impl Dimensions {
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }
}

/// Read/write access to the tables of a document, valid inside one session.
pub trait TableAccessor {
    /// Lists every table, body tables first, then header and footer tables.
    fn list_tables(&self) -> Vec<TableHandle>;

    fn dimensions(&self, table: &TableHandle) -> Result<Dimensions, DocumentError>;

    fn cell_text(&self, table: &TableHandle, row: usize, col: usize) -> Result<String, DocumentError>;

    /// Styling hint used for header classification. Best effort.
    fn is_cell_bold(&self, table: &TableHandle, row: usize, col: usize) -> Result<bool, DocumentError>;

    /// Merged regions of the table. Accessors that cannot report merges return none.
    fn merged_regions(&self, _table: &TableHandle) -> Result<Vec<MergedCellInfo>, DocumentError> {
        Ok(Vec::new())
    }

    fn has_nested_table(&self, _table: &TableHandle, _row: usize, _col: usize) -> Result<bool, DocumentError> {
        Ok(false)
    }

    /// Replaces the content of a cell, keeping the cell's formatting where possible.
    fn clear_and_set_cell_text(
        &mut self,
        table: &TableHandle,
        row: usize,
        col: usize,
        text: &str,
    ) -> Result<(), DocumentError>;

    /// Resolves a table index against the current document.
    fn table(&self, index: usize) -> Result<TableHandle, DocumentError> {
        self.list_tables()
            .into_iter()
            .find(|handle| handle.index == index)
            .ok_or(DocumentError::TableNotFound(index))
    }
}

/// A document that hands out scoped, transactional accessor sessions.
pub trait Document: Send + Sync {
    /// Runs `f` against a consistent view of the document.
    /// Writes made by `f` are committed together only when it returns `Ok`.
    fn with_session<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<DocumentError>,
        F: FnOnce(&mut dyn TableAccessor) -> Result<R, E>;
}

impl<T: Document> Document for Arc<T> {
    fn with_session<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<DocumentError>,
        F: FnOnce(&mut dyn TableAccessor) -> Result<R, E>,
    {
        self.as_ref().with_session(f)
    }
}
