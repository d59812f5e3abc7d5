//! WordprocessingML (.docx) documents.
//!
//! Tables are read from the main document part and from every header and footer
//! part. Cell edits are kept per cell and applied when the package is written out
//! with [`DocxDocument::to_bytes`] or [`DocxDocument::save`]; everything outside
//! the edited cells is streamed back unchanged.
//!
//! Merges follow the table grid: `w:gridSpan` widens a cell and `w:vMerge`
//! continues the cell above. Every grid position covered by a merge reads and
//! writes its origin cell. Positions not backed by any `w:tc` (ragged rows or
//! `w:gridBefore`) read as empty and cannot be written.
use crate::document::Dimensions;
use crate::document::Document;
use crate::document::DocumentError;
use crate::document::TableAccessor;
use crate::document::TableHandle;
use crate::error::ResultMessage;
use crate::error::TableFillError;
use crate::helpers::zip::write_package;
use crate::helpers::zip::ZipHelper;
use crate::table::MergedCellInfo;
use crate::table::TableLocation;
use glob::Pattern;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::io::Cursor;
use std::io::Read;
use std::io::Seek;
use std::path::Path;
use std::sync::Mutex;
use std::sync::MutexGuard;
use tracing::debug;
use zip::ZipArchive;

mod reader;
mod writer;

const MAIN_PART: &str = "word/document.xml";
const HEADER_PARTS: &str = "word/header*.xml";
const FOOTER_PARTS: &str = "word/footer*.xml";

#[derive(Copy, Clone, Debug, PartialEq)]
pub(super) enum VerticalMerge {
    Restart,
    Continue,
}

#[derive(Clone, Debug, Default)]
pub(super) struct DocxCell {
    pub(super) text: String,
    /// Every run with visible text is bold
    pub(super) bold: bool,
    pub(super) grid_span: usize,
    pub(super) vertical_merge: Option<VerticalMerge>,
    pub(super) nested_table: bool,
}

#[derive(Clone, Debug, Default)]
pub(super) struct DocxRow {
    pub(super) cells: Vec<DocxCell>,
    /// `w:tblHeader` row
    pub(super) is_header: bool,
    pub(super) grid_before: usize,
}

/// One top-level table with its cells mapped onto the table grid.
#[derive(Clone, Debug)]
pub(super) struct DocxTable {
    pub(super) part: String,
    /// Position among the top-level tables of `part`
    pub(super) ordinal: usize,
    pub(super) location: TableLocation,
    pub(super) rows: Vec<DocxRow>,
    pub(super) columns: usize,
    /// Owning `(row, w:tc index)` of every grid position
    grid: Vec<Vec<Option<(usize, usize)>>>,
}

impl DocxTable {
    pub(super) fn new(part: &str, ordinal: usize, location: TableLocation, grid_columns: usize, rows: Vec<DocxRow>) -> Self {
        let columns = rows.iter()
            .map(|row| row.grid_before + row.cells.iter().map(|cell| cell.grid_span).sum::<usize>())
            .max()
            .unwrap_or(0)
            .max(grid_columns);

        let mut grid = vec![vec![None; columns]; rows.len()];
        for (r, row) in rows.iter().enumerate() {
            let mut col = row.grid_before;
            for (index, cell) in row.cells.iter().enumerate() {
                let above = match (cell.vertical_merge, r.checked_sub(1)) {
                    (Some(VerticalMerge::Continue), Some(previous)) => grid[previous].get(col).copied().flatten(),
                    _ => None,
                };
                let owner = above.unwrap_or((r, index));
                for position in col..(col + cell.grid_span).min(columns) {
                    grid[r][position] = Some(owner);
                }
                col += cell.grid_span;
            }
        }

        Self {
            part: part.to_owned(),
            ordinal,
            location,
            rows,
            columns,
            grid,
        }
    }

    fn dimensions(&self) -> Dimensions {
        Dimensions {
            rows: self.rows.len(),
            cols: self.columns,
        }
    }

    fn owner(&self, row: usize, col: usize) -> Option<(usize, usize)> {
        self.grid.get(row)?.get(col).copied().flatten()
    }

    fn cell(&self, row: usize, col: usize) -> Option<&DocxCell> {
        let (row, index) = self.owner(row, col)?;
        self.rows.get(row)?.cells.get(index)
    }

    /// Bounding box of every cell spanning more than one grid position, in row-major order.
    fn merged_regions(&self) -> Vec<MergedCellInfo> {
        let mut bounds = BTreeMap::<(usize, usize), (usize, usize, usize, usize)>::new();
        for (r, positions) in self.grid.iter().enumerate() {
            for (c, owner) in positions.iter().enumerate() {
                if let Some(owner) = owner {
                    let bound = bounds.entry(*owner).or_insert((r, c, r, c));
                    bound.0 = bound.0.min(r);
                    bound.1 = bound.1.min(c);
                    bound.2 = bound.2.max(r);
                    bound.3 = bound.3.max(c);
                }
            }
        }
        let mut regions: Vec<MergedCellInfo> = bounds.into_values()
            .map(|(top, left, bottom, right)| MergedCellInfo {
                row: top,
                col: left,
                row_span: bottom - top + 1,
                col_span: right - left + 1,
            })
            .filter(|region| region.row_span > 1 || region.col_span > 1)
            .collect();
        regions.sort_by_key(|region| (region.row, region.col));
        regions
    }
}

struct DocxState {
    /// Every package entry in stored order, as loaded
    entries: Vec<(String, Vec<u8>)>,
    tables: Vec<DocxTable>,
    /// Final text of every edited cell, by (table index, row, `w:tc` index)
    edits: BTreeMap<(usize, usize, usize), String>,
}

/// A .docx package held in memory.
pub struct DocxDocument {
    name: String,
    state: Mutex<DocxState>,
}

impl DocxDocument {
    /// Opens a .docx file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<DocxDocument, TableFillError> {
        let name = path.as_ref().to_string_lossy().to_string();
        let file = File::open(&path).map_err(TableFillError::from).with_prefix(&name)?;
        Self::load(&name, BufReader::new(file))
    }

    /// Reads a .docx package from memory. `name` only labels errors.
    pub fn from_bytes(name: &str, bytes: Vec<u8>) -> Result<DocxDocument, TableFillError> {
        Self::load(name, Cursor::new(bytes))
    }

    fn load<RS: Read + Seek>(name: &str, source: RS) -> Result<DocxDocument, TableFillError> {
        let mut zip = ZipArchive::new(source).map_err(TableFillError::from).with_prefix(name)?;
        let tables = load_tables(&mut zip).with_prefix(name)?;
        let entries = zip.read_entries().with_prefix(name)?;
        debug!(document = name, tables = tables.len(), parts = entries.len(), "Loaded docx package");
        Ok(DocxDocument {
            name: name.to_owned(),
            state: Mutex::new(DocxState {
                entries,
                tables,
                edits: BTreeMap::new(),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether any session has committed a cell edit.
    pub fn is_modified(&self) -> Result<bool, TableFillError> {
        Ok(!self.lock()?.edits.is_empty())
    }

    /// Serializes the package with every committed edit applied.
    pub fn to_bytes(&self) -> Result<Vec<u8>, TableFillError> {
        let state = self.lock()?;
        let mut edits_by_part = BTreeMap::<&str, BTreeMap<writer::CellKey, String>>::new();
        for ((table, row, index), text) in &state.edits {
            let table = &state.tables[*table];
            edits_by_part
                .entry(table.part.as_str())
                .or_default()
                .insert((table.ordinal, *row, *index), text.to_owned());
        }

        let mut parts = Vec::with_capacity(state.entries.len());
        for (name, bytes) in &state.entries {
            match edits_by_part.get(name.as_str()) {
                Some(edits) => parts.push((name.as_str(), writer::rewrite_part(name, bytes, edits).with_prefix(&self.name)?)),
                None => parts.push((name.as_str(), bytes.to_owned())),
            }
        }
        write_package(parts.iter().map(|(name, bytes)| (*name, bytes.as_slice())))
    }

    /// Writes the package with every committed edit applied to `path`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TableFillError> {
        let bytes = self.to_bytes()?;
        std::fs::write(&path, bytes)
            .map_err(TableFillError::from)
            .with_prefix(&path.as_ref().to_string_lossy())
    }

    fn lock(&self) -> Result<MutexGuard<'_, DocxState>, DocumentError> {
        self.state
            .lock()
            .map_err(|error| DocumentError::SessionUnavailable(error.to_string()))
    }
}

/// Body tables first, then header parts, then footer parts, each in part-name order.
fn load_tables<RS: Read + Seek>(zip: &mut ZipArchive<RS>) -> Result<Vec<DocxTable>, TableFillError> {
    let mut parts = vec![(MAIN_PART.to_owned(), TableLocation::Body)];
    for name in zip.part_names(&Pattern::new(HEADER_PARTS)?) {
        parts.push((name, TableLocation::Header));
    }
    for name in zip.part_names(&Pattern::new(FOOTER_PARTS)?) {
        parts.push((name, TableLocation::Footer));
    }

    let mut tables = Vec::new();
    for (name, location) in parts {
        let bytes = zip.read_part(&name)?.ok_or_else(|| DocumentError::MissingPart(name.to_owned()))?;
        let found = reader::read_tables(&name, &bytes, location).with_prefix(&name)?;
        debug!(part = %name, location = location.as_str(), tables = found.len(), "Read part tables");
        tables.extend(found);
    }
    Ok(tables)
}

impl Document for DocxDocument {
    fn with_session<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<DocumentError>,
        F: FnOnce(&mut dyn TableAccessor) -> Result<R, E>,
    {
        let mut state = self.lock()?;
        let mut session = DocxSession {
            tables: state.tables.clone(),
            edits: BTreeMap::new(),
        };
        let result = f(&mut session)?;
        if !session.edits.is_empty() {
            debug!(document = %self.name, cells = session.edits.len(), "Committed cell edits");
            state.tables = session.tables;
            state.edits.extend(session.edits);
        }
        Ok(result)
    }
}

struct DocxSession {
    tables: Vec<DocxTable>,
    edits: BTreeMap<(usize, usize, usize), String>,
}

impl DocxSession {
    fn table(&self, handle: &TableHandle) -> Result<&DocxTable, DocumentError> {
        self.tables
            .get(handle.index)
            .ok_or(DocumentError::TableNotFound(handle.index))
    }

    fn checked(&self, handle: &TableHandle, row: usize, col: usize) -> Result<&DocxTable, DocumentError> {
        let table = self.table(handle)?;
        if table.dimensions().contains(row, col) {
            Ok(table)
        } else {
            Err(DocumentError::CellOutOfRange { table: handle.index, row, col })
        }
    }
}

impl TableAccessor for DocxSession {
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
        let table = self.checked(table, row, col)?;
        Ok(table.cell(row, col).map(|cell| cell.text.to_owned()).unwrap_or_default())
    }

    fn is_cell_bold(&self, table: &TableHandle, row: usize, col: usize) -> Result<bool, DocumentError> {
        let table = self.checked(table, row, col)?;
        Ok(table.rows[row].is_header || table.cell(row, col).map(|cell| cell.bold).unwrap_or(false))
    }

    fn merged_regions(&self, table: &TableHandle) -> Result<Vec<MergedCellInfo>, DocumentError> {
        Ok(self.table(table)?.merged_regions())
    }

    fn has_nested_table(&self, table: &TableHandle, row: usize, col: usize) -> Result<bool, DocumentError> {
        let table = self.checked(table, row, col)?;
        Ok(table.cell(row, col).map(|cell| cell.nested_table).unwrap_or(false))
    }

    fn clear_and_set_cell_text(
        &mut self,
        handle: &TableHandle,
        row: usize,
        col: usize,
        text: &str,
    ) -> Result<(), DocumentError> {
        let (owner_row, index) = self.checked(handle, row, col)?
            .owner(row, col)
            .ok_or(DocumentError::CellOutOfRange { table: handle.index, row, col })?;
        let table = &mut self.tables[handle.index];
        table.rows[owner_row].cells[index].text = text.to_owned();
        self.edits.insert((handle.index, owner_row, index), text.to_owned());
        Ok(())
    }
}
