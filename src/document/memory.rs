//! In-memory document made of plain text grids.
//! Used by hosts that already hold table contents, and throughout the tests.
use crate::document::Dimensions;
use crate::document::Document;
use crate::document::DocumentError;
use crate::document::TableAccessor;
use crate::document::TableHandle;
use crate::table::MergedCellInfo;
use crate::table::TableLocation;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Mutex;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryCell {
    pub text: String,
    pub bold: bool,
    pub nested_table: bool,
}

/// One table of a [`MemoryDocument`]. Rows are padded to equal length on construction.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryTable {
    pub location: TableLocation,
    pub rows: Vec<Vec<MemoryCell>>,
    pub merged: Vec<MergedCellInfo>,
}

impl MemoryTable {
    pub fn from_rows<R, S>(rows: &[R]) -> Self
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        let width = rows.iter().map(|row| row.as_ref().len()).max().unwrap_or(0);
        let rows = rows.iter()
            .map(|row| {
                let mut cells: Vec<MemoryCell> = row.as_ref()
                    .iter()
                    .map(|text| MemoryCell {
                        text: text.as_ref().to_owned(),
                        ..MemoryCell::default()
                    })
                    .collect();
                cells.resize(width, MemoryCell::default());
                cells
            })
            .collect();
        Self {
            location: TableLocation::Body,
            rows,
            merged: Vec::new(),
        }
    }

    pub fn in_location(mut self, location: TableLocation) -> Self {
        self.location = location;
        self
    }

    pub fn with_bold_first_row(mut self) -> Self {
        if let Some(row) = self.rows.first_mut() {
            row.iter_mut().for_each(|cell| cell.bold = true);
        }
        self
    }

    pub fn with_bold_first_column(mut self) -> Self {
        self.rows.iter_mut()
            .filter_map(|row| row.first_mut())
            .for_each(|cell| cell.bold = true);
        self
    }

    pub fn with_merged(mut self, region: MergedCellInfo) -> Self {
        self.merged.push(region);
        self
    }

    pub fn with_nested_table(mut self, row: usize, col: usize) -> Self {
        if let Some(cell) = self.rows.get_mut(row).and_then(|cells| cells.get_mut(col)) {
            cell.nested_table = true;
        }
        self
    }

    pub fn texts(&self) -> Vec<Vec<String>> {
        self.rows.iter()
            .map(|row| row.iter().map(|cell| cell.text.to_owned()).collect())
            .collect()
    }

    fn dimensions(&self) -> Dimensions {
        Dimensions {
            rows: self.rows.len(),
            cols: self.rows.iter().map(Vec::len).max().unwrap_or(0),
        }
    }
}

/// Thread-safe in-memory document. Sessions work on a copy that replaces the
/// stored tables only when the session succeeds.
#[derive(Debug, Default)]
pub struct MemoryDocument {
    tables: Mutex<Vec<MemoryTable>>,
    read_only: AtomicBool,
}

impl MemoryDocument {
    pub fn new(tables: Vec<MemoryTable>) -> Self {
        Self {
            tables: Mutex::new(tables),
            read_only: AtomicBool::new(false),
        }
    }

    /// Rejects every write, as a protected document would.
    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::Relaxed);
    }

    /// Current text grid of a table, outside of any session.
    pub fn table_texts(&self, index: usize) -> Option<Vec<Vec<String>>> {
        let tables = self.tables.lock().ok()?;
        tables.get(index).map(MemoryTable::texts)
    }

    /// Replaces a table wholesale, standing in for a concurrent user edit.
    pub fn replace_table(&self, index: usize, table: MemoryTable) -> Result<(), DocumentError> {
        let mut tables = self.lock()?;
        let slot = tables.get_mut(index).ok_or(DocumentError::TableNotFound(index))?;
        *slot = table;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<MemoryTable>>, DocumentError> {
        self.tables
            .lock()
            .map_err(|error| DocumentError::SessionUnavailable(error.to_string()))
    }
}

impl Document for MemoryDocument {
    fn with_session<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<DocumentError>,
        F: FnOnce(&mut dyn TableAccessor) -> Result<R, E>,
    {
        let mut tables = self.lock()?;
        let mut session = MemorySession {
            tables: tables.clone(),
            read_only: self.read_only.load(Ordering::Relaxed),
            dirty: false,
        };
        let result = f(&mut session)?;
        if session.dirty {
            *tables = session.tables;
        }
        Ok(result)
    }
}

struct MemorySession {
    tables: Vec<MemoryTable>,
    read_only: bool,
    dirty: bool,
}

impl MemorySession {
    fn table(&self, handle: &TableHandle) -> Result<&MemoryTable, DocumentError> {
        self.tables
            .get(handle.index)
            .ok_or(DocumentError::TableNotFound(handle.index))
    }

    fn cell(&self, handle: &TableHandle, row: usize, col: usize) -> Result<&MemoryCell, DocumentError> {
        self.table(handle)?
            .rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .ok_or(DocumentError::CellOutOfRange { table: handle.index, row, col })
    }
}

impl TableAccessor for MemorySession {
    fn list_tables(&self) -> Vec<TableHandle> {
        self.tables
            .iter()
            .enumerate()
            .map(|(index, table)| TableHandle { index, location: table.location })
            .collect()
    }

    fn dimensions(&self, table: &TableHandle) -> Result<Dimensions, DocumentError> {
        Ok(self.table(table)?.dimensions())
    }

    fn cell_text(&self, table: &TableHandle, row: usize, col: usize) -> Result<String, DocumentError> {
        Ok(self.cell(table, row, col)?.text.to_owned())
    }

    fn is_cell_bold(&self, table: &TableHandle, row: usize, col: usize) -> Result<bool, DocumentError> {
        Ok(self.cell(table, row, col)?.bold)
    }

    fn merged_regions(&self, table: &TableHandle) -> Result<Vec<MergedCellInfo>, DocumentError> {
        Ok(self.table(table)?.merged.to_owned())
    }

    fn has_nested_table(&self, table: &TableHandle, row: usize, col: usize) -> Result<bool, DocumentError> {
        Ok(self.cell(table, row, col)?.nested_table)
    }

    fn clear_and_set_cell_text(
        &mut self,
        table: &TableHandle,
        row: usize,
        col: usize,
        text: &str,
    ) -> Result<(), DocumentError> {
        if self.read_only {
            return Err(DocumentError::WriteFailed {
                table: table.index,
                message: "document is read-only".to_owned(),
            });
        }
        let cell = self.tables
            .get_mut(table.index)
            .ok_or(DocumentError::TableNotFound(table.index))?
            .rows
            .get_mut(row)
            .and_then(|cells| cells.get_mut(col))
            .ok_or(DocumentError::CellOutOfRange { table: table.index, row, col })?;
        cell.text = text.to_owned();
        self.dirty = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> MemoryDocument {
        MemoryDocument::new(vec![
            MemoryTable::from_rows(&[vec!["A", "B"], vec!["1"]]).with_bold_first_row(),
            MemoryTable::from_rows(&[["x"]]).in_location(TableLocation::Footer),
        ])
    }

    #[test]
    fn rows_are_padded() {
        let document = document();
        assert_eq!(
            document.table_texts(0),
            Some(vec![vec!["A".to_owned(), "B".to_owned()], vec!["1".to_owned(), "".to_owned()]])
        );
    }

    #[test]
    fn session_reads() -> Result<(), DocumentError> {
        let document = document();
        document.with_session(|accessor| {
            let tables = accessor.list_tables();
            assert_eq!(tables.len(), 2);
            assert_eq!(tables[1].location, TableLocation::Footer);
            assert_eq!(accessor.dimensions(&tables[0])?, Dimensions { rows: 2, cols: 2 });
            assert!(accessor.is_cell_bold(&tables[0], 0, 1)?);
            assert!(!accessor.is_cell_bold(&tables[0], 1, 0)?);
            assert_eq!(
                accessor.cell_text(&tables[0], 5, 0),
                Err(DocumentError::CellOutOfRange { table: 0, row: 5, col: 0 })
            );
            assert_eq!(accessor.table(7), Err(DocumentError::TableNotFound(7)));
            Ok(())
        })
    }

    #[test]
    fn failed_session_discards_writes() {
        let document = document();
        let result: Result<(), DocumentError> = document.with_session(|accessor| {
            let table = accessor.table(0)?;
            accessor.clear_and_set_cell_text(&table, 1, 1, "written")?;
            accessor.clear_and_set_cell_text(&table, 9, 9, "out of range")
        });
        assert!(result.is_err());
        assert_eq!(document.table_texts(0).unwrap()[1][1], "");
    }

    #[test]
    fn successful_session_commits() -> Result<(), DocumentError> {
        let document = document();
        document.with_session(|accessor| {
            let table = accessor.table(0)?;
            accessor.clear_and_set_cell_text(&table, 1, 1, "written")
        })?;
        assert_eq!(document.table_texts(0).unwrap()[1][1], "written");
        Ok(())
    }

    #[test]
    fn read_only_rejects_writes() {
        let document = document();
        document.set_read_only(true);
        let result: Result<(), DocumentError> = document.with_session(|accessor| {
            let table = accessor.table(0)?;
            accessor.clear_and_set_cell_text(&table, 0, 0, "x")
        });
        assert!(matches!(result, Err(DocumentError::WriteFailed { table: 0, .. })));
    }
}
