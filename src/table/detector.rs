use crate::document::Dimensions;
use crate::document::DocumentError;
use crate::document::TableAccessor;
use crate::document::TableHandle;
use crate::table::CellInfo;
use crate::table::HeaderConfig;
use crate::table::TableError;
use crate::table::TableInfo;
use crate::table::TableLocation;
use crate::table::TableStructure;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

/// Scope of a detection scan. Body tables are always included.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectOptions {
    pub include_header_footer: bool,
}

impl DetectOptions {
    fn accept(&self, location: TableLocation) -> bool {
        location == TableLocation::Body || self.include_header_footer
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TableDetection {
    pub tables: Vec<TableInfo>,
}

/// Decides the header layout of a table.
/// Implementations are best effort; a wrong answer degrades prompts but is never an error.
pub trait HeaderClassifier: Send + Sync {
    fn classify(
        &self,
        accessor: &dyn TableAccessor,
        table: &TableHandle,
        dimensions: Dimensions,
    ) -> Result<HeaderConfig, DocumentError>;
}

/// Classifies headers from bold styling: a bold first row holds column headers,
/// a bold first column (below the first row) holds row headers.
#[derive(Copy, Clone, Debug, Default)]
pub struct StyleHeaderClassifier;

impl HeaderClassifier for StyleHeaderClassifier {
    fn classify(
        &self,
        accessor: &dyn TableAccessor,
        table: &TableHandle,
        dimensions: Dimensions,
    ) -> Result<HeaderConfig, DocumentError> {
        let column_headers = first_row_bold(accessor, table, dimensions)?;
        let row_headers = all_bold(accessor, table, (1..dimensions.rows).map(|row| (row, 0)))?;
        Ok(HeaderConfig::new(row_headers, column_headers))
    }
}

/// True when at least one of the cells has text and every cell with text is bold.
/// Cells without text carry no run formatting, so they are not counted.
fn all_bold<I>(accessor: &dyn TableAccessor, table: &TableHandle, cells: I) -> Result<bool, DocumentError>
where
    I: IntoIterator<Item = (usize, usize)>,
{
    let mut seen = false;
    for (row, col) in cells {
        if accessor.cell_text(table, row, col)?.trim().is_empty() {
            continue;
        }
        if !accessor.is_cell_bold(table, row, col)? {
            return Ok(false);
        }
        seen = true;
    }
    Ok(seen)
}

fn first_row_bold(accessor: &dyn TableAccessor, table: &TableHandle, dimensions: Dimensions) -> Result<bool, DocumentError> {
    if dimensions.rows == 0 {
        return Ok(false);
    }
    all_bold(accessor, table, (0..dimensions.cols).map(|col| (0, col)))
}

/// Cheap scan of every table in scope: shape and styling hints, no cell grid.
pub fn detect_tables(accessor: &dyn TableAccessor, options: &DetectOptions) -> Result<TableDetection, TableError> {
    let access = |error: DocumentError| TableError::TableAccess(error.to_string());
    let mut tables = Vec::new();
    for handle in accessor.list_tables() {
        if !options.accept(handle.location) {
            continue;
        }
        let dimensions = accessor.dimensions(&handle).map_err(access)?;
        let has_headers = first_row_bold(accessor, &handle, dimensions).map_err(access)?;
        let has_merged_cells = !accessor.merged_regions(&handle).map_err(access)?.is_empty();
        tables.push(TableInfo {
            index: handle.index,
            row_count: dimensions.rows,
            column_count: dimensions.cols,
            has_headers,
            location: handle.location,
            total_cells: dimensions.rows * dimensions.cols,
            has_merged_cells,
        });
    }
    debug!(tables = tables.len(), include_header_footer = options.include_header_footer, "Detected tables");
    Ok(TableDetection { tables })
}

/// Full parse of one table. Either every cell is read or the parse fails as a whole.
pub fn parse_table_structure(
    accessor: &dyn TableAccessor,
    index: usize,
    detect_merged_cells: bool,
    classifier: &dyn HeaderClassifier,
) -> Result<TableStructure, TableError> {
    let parse = |error: DocumentError| TableError::StructureParse(error.to_string());
    let handle = accessor.table(index)?;
    let dimensions = accessor.dimensions(&handle)?;

    let header_config = classifier.classify(accessor, &handle, dimensions).map_err(parse)?;
    let has_headers = first_row_bold(accessor, &handle, dimensions).map_err(parse)?;
    let merged_cells = if detect_merged_cells {
        accessor.merged_regions(&handle).map_err(parse)?
    } else {
        Vec::new()
    };

    let mut cells = Vec::with_capacity(dimensions.rows);
    for row in 0..dimensions.rows {
        let mut line = Vec::with_capacity(dimensions.cols);
        for col in 0..dimensions.cols {
            let text = accessor.cell_text(&handle, row, col).map_err(parse)?;
            let mut cell = CellInfo::new(row, col, text);
            cell.is_merged = merged_cells.iter().any(|region| region.covers(row, col));
            cell.has_nested_table = accessor.has_nested_table(&handle, row, col).map_err(parse)?;
            line.push(cell);
        }
        cells.push(line);
    }

    let info = TableInfo {
        index,
        row_count: dimensions.rows,
        column_count: dimensions.cols,
        has_headers,
        location: handle.location,
        total_cells: dimensions.rows * dimensions.cols,
        has_merged_cells: !merged_cells.is_empty(),
    };
    debug!(
        table = index,
        location = info.location.as_str(),
        rows = info.row_count,
        cols = info.column_count,
        headers = header_config.kind.as_str(),
        merged = merged_cells.len(),
        "Parsed table structure"
    );
    Ok(TableStructure::new(info, header_config, cells, merged_cells))
}
