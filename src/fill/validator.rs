use crate::fill::out_of_range_cells;
use crate::fill::select_cells;
use crate::fill::FillOptions;
use crate::fill::FillStrategy;
use crate::table::prompt::is_self_describing;
use crate::table::HeaderType;
use crate::table::TableStructure;
use serde::Serialize;

/// Above this many targeted cells a cost warning is raised.
pub const LARGE_FILL_THRESHOLD: usize = 50;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FillValidation {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Cells the fill would target, as counted by [`select_cells`]
    pub fillable_count: usize,
}

fn invalid_indexes(indexes: Option<&Vec<usize>>, bound: usize) -> Option<String> {
    let invalid: Vec<String> = indexes?
        .iter()
        .filter(|index| **index >= bound)
        .map(usize::to_string)
        .collect();
    (!invalid.is_empty()).then(|| invalid.join(", "))
}

/// Pre-flight checks of a fill operation on a freshly parsed structure.
pub fn validate_fill_operation(
    structure: &TableStructure,
    explicit_cells: Option<&[(usize, usize)]>,
    strategy: FillStrategy,
    options: &FillOptions,
) -> FillValidation {
    let info = &structure.info;
    let mut errors = Vec::new();
    if let Err(error) = options.validate() {
        errors.push(error.to_string());
    }
    if !structure.is_well_formed() {
        errors.push("Table structure is malformed".to_owned());
    } else if info.total_cells == 0 {
        errors.push("Table has no cells".to_owned());
    }
    if let Some(rows) = invalid_indexes(options.target_rows.as_ref(), info.row_count) {
        errors.push(format!("Invalid target rows: {rows} (table has {} rows)", info.row_count));
    }
    if let Some(columns) = invalid_indexes(options.target_columns.as_ref(), info.column_count) {
        errors.push(format!("Invalid target columns: {columns} (table has {} columns)", info.column_count));
    }
    if let Some(cells) = explicit_cells.and_then(|cells| out_of_range_cells(structure, cells)) {
        errors.push(format!("Invalid cell coordinates: {cells}"));
    }
    if !errors.is_empty() {
        return FillValidation { valid: false, errors, ..FillValidation::default() };
    }

    let selected = select_cells(structure, explicit_cells, strategy, options);
    let mut warnings = Vec::new();
    match structure.header_config.kind {
        HeaderType::None => warnings.push(
            "Table has no headers; cells must describe their own content (for example \"Capital of France=?\")".to_owned(),
        ),
        HeaderType::Row => warnings.push("Table has row headers only; cells get no column context".to_owned()),
        HeaderType::Column => warnings.push("Table has column headers only; cells get no row context".to_owned()),
        HeaderType::Both => (),
    }
    if selected.is_empty() {
        warnings.push("No cells match the current fill options".to_owned());
    } else if selected.len() > LARGE_FILL_THRESHOLD {
        warnings.push(format!(
            "{} cells selected; filling them may take a while and consume many tokens",
            selected.len()
        ));
    }
    if info.has_merged_cells && !options.skip_merged_cells {
        warnings.push("Table may contain merged cells; enable skipMergedCells to leave them untouched".to_owned());
    }
    if structure.header_config.kind == HeaderType::None {
        let undescribed = selected.iter()
            .filter(|cell| cell.is_empty && !is_self_describing(&cell.text))
            .count();
        if undescribed > 0 {
            warnings.push(format!(
                "{undescribed} selected cells are empty with no headers and no self-describing question; they cannot be filled meaningfully"
            ));
        }
    }

    FillValidation {
        valid: true,
        errors,
        warnings,
        fillable_count: selected.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::structure;
    use crate::table::HeaderConfig;

    fn table() -> TableStructure {
        structure(
            &[&["Name", "Age", "City"], &["Ann", "", "Oslo"], &["Bob", "41", ""]],
            HeaderConfig::new(true, true),
        )
    }

    #[test]
    fn target_rows_out_of_range() {
        let options = FillOptions { target_rows: Some(vec![5, 10]), ..FillOptions::default() };
        let validation = validate_fill_operation(&table(), None, FillStrategy::Batch, &options);
        assert!(!validation.valid);
        assert!(validation.errors[0].contains("Invalid target rows"));
        assert!(validation.warnings.is_empty());
        assert_eq!(validation.fillable_count, 0);

        let options = FillOptions { target_columns: Some(vec![1, 3]), ..FillOptions::default() };
        let validation = validate_fill_operation(&table(), None, FillStrategy::Batch, &options);
        assert_eq!(validation.errors, vec!["Invalid target columns: 3 (table has 3 columns)".to_owned()]);
    }

    #[test]
    fn empty_and_malformed_tables() {
        let empty = structure(&[], HeaderConfig::default());
        let validation = validate_fill_operation(&empty, None, FillStrategy::Batch, &FillOptions::default());
        assert_eq!(validation.errors, vec!["Table has no cells".to_owned()]);

        let mut broken = table();
        broken.cells_flat.clear();
        assert!(!validate_fill_operation(&broken, None, FillStrategy::Batch, &FillOptions::default()).valid);
    }

    #[test]
    fn counts_like_the_fill() {
        let validation = validate_fill_operation(&table(), None, FillStrategy::Batch, &FillOptions::default());
        assert!(validation.valid);
        assert_eq!(validation.fillable_count, 2);
        assert!(validation.warnings.is_empty());

        let options = FillOptions { max_cells: Some(1), ..FillOptions::default() };
        assert_eq!(validate_fill_operation(&table(), None, FillStrategy::Batch, &options).fillable_count, 1);

        let explicit = [(1, 2), (2, 1)];
        let validation = validate_fill_operation(&table(), Some(&explicit), FillStrategy::Batch, &FillOptions::default());
        assert_eq!(validation.fillable_count, 2);
        let validation = validate_fill_operation(&table(), Some(&[(4, 0)]), FillStrategy::Batch, &FillOptions::default());
        assert_eq!(validation.errors, vec!["Invalid cell coordinates: (4, 0)".to_owned()]);
    }

    #[test]
    fn warnings() {
        let partial = structure(&[&["Name", "Age"], &["Ann", ""]], HeaderConfig::new(false, true));
        let validation = validate_fill_operation(&partial, None, FillStrategy::Batch, &FillOptions::default());
        assert!(validation.valid);
        assert_eq!(validation.warnings.len(), 1);
        assert!(validation.warnings[0].contains("column headers only"));

        let full = structure(&[&["Name", "Age"], &["Ann", "3"]], HeaderConfig::new(true, true));
        let validation = validate_fill_operation(&full, None, FillStrategy::Batch, &FillOptions::default());
        assert_eq!(validation.warnings, vec!["No cells match the current fill options".to_owned()]);

        let mut merged = table();
        merged.info.has_merged_cells = true;
        let validation = validate_fill_operation(&merged, None, FillStrategy::Batch, &FillOptions::default());
        assert!(validation.warnings[0].contains("merged cells"));
        let options = FillOptions { skip_merged_cells: true, ..FillOptions::default() };
        assert!(validate_fill_operation(&merged, None, FillStrategy::Batch, &options).warnings.is_empty());
    }

    #[test]
    fn headerless_and_large_tables() {
        let rows: Vec<Vec<&str>> = (0..8).map(|_| vec![""; 8]).collect();
        let rows: Vec<&[&str]> = rows.iter().map(Vec::as_slice).collect();
        let mut grid = structure(&rows, HeaderConfig::default());
        grid.cells[0][0].text = "Capital of France=?".to_owned();
        grid.cells_flat[0].text = "Capital of France=?".to_owned();

        let options = FillOptions { empty_only: false, ..FillOptions::default() };
        let validation = validate_fill_operation(&grid, None, FillStrategy::Batch, &options);
        assert!(validation.valid);
        assert_eq!(validation.fillable_count, 64);
        assert!(validation.warnings[0].contains("no headers"));
        assert!(validation.warnings[1].starts_with("64 cells selected"));
        assert!(validation.warnings[2].starts_with("63 selected cells"));
    }

    #[test]
    fn filled_cells_are_not_flagged_as_undescribed() {
        let table = structure(&[&["Paris", "Capital of France=?", ""]], HeaderConfig::default());
        let options = FillOptions { empty_only: false, ..FillOptions::default() };
        let validation = validate_fill_operation(&table, None, FillStrategy::Batch, &options);
        assert_eq!(validation.fillable_count, 3);
        assert!(validation.warnings.iter().any(|warning| warning.starts_with("1 selected cells are empty")));

        let table = structure(&[&["Paris", "Capital of France=?"]], HeaderConfig::default());
        let validation = validate_fill_operation(&table, None, FillStrategy::Batch, &options);
        assert!(validation.warnings.iter().all(|warning| !warning.contains("cannot be filled")));
    }
}
