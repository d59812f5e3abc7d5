//! # Fill Module
//!
//! Options, result types and cell selection for fill operations:
//!
//! - [`generation`]: contract of the text-generation backend
//! - [`validator`]: pre-flight checks
//! - [`orchestrator`]: the batched fill loop and its [`orchestrator::TableFiller`] entry point
use crate::error::ErrorKind;
use crate::fill::generation::Attachment;
use crate::fill::OptionsError::*;
use crate::table::CellInfo;
use crate::table::TableStructure;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;

pub mod generation;
pub mod orchestrator;
pub mod validator;

/// Longest accepted `user_context`, in characters.
pub const MAX_USER_CONTEXT_CHARS: usize = 10_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptionsError {
    #[error("maxCells must be greater than 0")]
    ZeroMaxCells,

    #[error("userContext is {length} characters long, the limit is {limit}")]
    UserContextTooLong { length: usize, limit: usize },

    #[error("Unknown fill strategy '{0}'")]
    UnknownStrategy(String),

    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    #[error("Invalid cell coordinates: {0}")]
    InvalidCells(String),
}

impl OptionsError {
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidOptions
    }
}

/// How cells are batched and, for `Selective`, narrowed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FillStrategy {
    /// Small batches, richer per-call context
    #[default]
    Contextual,
    /// Larger batches for throughput
    Batch,
    /// Targets the intersection of `target_rows` and `target_columns`
    Selective,
}

impl FillStrategy {
    /// Number of generation calls issued together.
    pub const fn batch_size(&self) -> usize {
        match self {
            Self::Contextual => 5,
            Self::Batch => 10,
            Self::Selective => 5,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Contextual => "CONTEXTUAL",
            Self::Batch => "BATCH",
            Self::Selective => "SELECTIVE",
        }
    }

    /// Parses a strategy name, case-insensitive.
    pub fn parse(name: &str) -> Result<Self, OptionsError> {
        match name.trim().to_ascii_uppercase().as_str() {
            "CONTEXTUAL" => Ok(Self::Contextual),
            "BATCH" => Ok(Self::Batch),
            "SELECTIVE" => Ok(Self::Selective),
            _ => Err(UnknownStrategy(name.to_string())),
        }
    }
}

/// Per-call fill options. [`FillOptions::default`] is the single documented default:
/// empty non-header cells anywhere in the table, merged cells included, no cap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FillOptions {
    /// Only target cells whose trimmed text is empty
    pub empty_only: bool,
    /// Allow header-row and header-column cells as targets
    pub include_headers: bool,
    pub target_rows: Option<Vec<usize>>,
    pub target_columns: Option<Vec<usize>>,
    pub skip_merged_cells: bool,
    /// Keep only the first cells in row-major order
    pub max_cells: Option<usize>,
    pub detect_merged_cells: bool,
    /// Free text added to the shared instructions
    pub user_context: Option<String>,
    /// Reference files forwarded to the generation backend untouched
    #[serde(skip)]
    pub attachments: Vec<Attachment>,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self {
            empty_only: true,
            include_headers: false,
            target_rows: None,
            target_columns: None,
            skip_merged_cells: false,
            max_cells: None,
            detect_merged_cells: true,
            user_context: None,
            attachments: Vec::new(),
        }
    }
}

impl FillOptions {
    /// Checks values that no table could make valid.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.max_cells == Some(0) {
            Err(ZeroMaxCells)?;
        }
        if let Some(context) = &self.user_context {
            let length = context.chars().count();
            if length > MAX_USER_CONTEXT_CHARS {
                Err(UserContextTooLong { length, limit: MAX_USER_CONTEXT_CHARS })?;
            }
        }
        Ok(())
    }

    fn target_rows(&self) -> Option<&[usize]> {
        self.target_rows.as_deref().filter(|rows| !rows.is_empty())
    }

    fn target_columns(&self) -> Option<&[usize]> {
        self.target_columns.as_deref().filter(|columns| !columns.is_empty())
    }

    fn targets(&self, strategy: FillStrategy, row: usize, col: usize) -> bool {
        let in_rows = self.target_rows().map(|rows| rows.contains(&row));
        let in_columns = self.target_columns().map(|columns| columns.contains(&col));
        match (in_rows, in_columns) {
            (None, None) => true,
            (Some(matches), None) | (None, Some(matches)) => matches,
            (Some(in_rows), Some(in_columns)) if strategy == FillStrategy::Selective => in_rows && in_columns,
            (Some(in_rows), Some(in_columns)) => in_rows || in_columns,
        }
    }
}

/// Settings of one [`orchestrator::TableFiller`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FillerConfig {
    /// Pause between two batches, never inside one
    pub inter_batch_delay: Duration,
}

impl Default for FillerConfig {
    fn default() -> Self {
        Self {
            inter_batch_delay: Duration::from_secs(1),
        }
    }
}

/// Sorted, deduplicated explicit coordinates.
pub(crate) fn normalize_cells(cells: &[(usize, usize)]) -> Vec<(usize, usize)> {
    cells.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Explicit coordinates outside the table, formatted for error messages.
pub(crate) fn out_of_range_cells(structure: &TableStructure, cells: &[(usize, usize)]) -> Option<String> {
    let invalid: Vec<String> = normalize_cells(cells)
        .into_iter()
        .filter(|(row, col)| structure.cell(*row, *col).is_none())
        .map(|(row, col)| format!("({row}, {col})"))
        .collect();
    (!invalid.is_empty()).then(|| invalid.join(", "))
}

/// Covered by a merged region without being its anchor.
fn is_merge_continuation(structure: &TableStructure, row: usize, col: usize) -> bool {
    structure.merged_cells
        .iter()
        .any(|region| region.covers(row, col) && (region.row, region.col) != (row, col))
}

/// The cells a fill operation targets, in row-major order.
///
/// Without `explicit` cells: empty cells (unless `empty_only` is off), minus header
/// cells (unless `include_headers`), restricted to the target rows/columns (union,
/// or intersection for [`FillStrategy::Selective`]), minus merged cells when
/// `skip_merged_cells`. Explicit cells skip the emptiness and target filters.
/// A merged region is one physical cell, so only its top-left anchor is ever
/// selected. Both are finally capped to a `max_cells` prefix.
pub fn select_cells<'a>(
    structure: &'a TableStructure,
    explicit: Option<&[(usize, usize)]>,
    strategy: FillStrategy,
    options: &FillOptions,
) -> Vec<&'a CellInfo> {
    let config = &structure.header_config;
    let candidates: Vec<&CellInfo> = match explicit {
        Some(cells) => normalize_cells(cells)
            .into_iter()
            .filter_map(|(row, col)| structure.cell(row, col))
            .collect(),
        None => structure.cells_flat
            .iter()
            .filter(|cell| !options.empty_only || cell.is_empty)
            .filter(|cell| options.targets(strategy, cell.row_index, cell.col_index))
            .collect(),
    };
    candidates.into_iter()
        .filter(|cell| options.include_headers || !config.is_header_cell(cell.row_index, cell.col_index))
        .filter(|cell| !options.skip_merged_cells || !cell.is_merged)
        .filter(|cell| !is_merge_continuation(structure, cell.row_index, cell.col_index))
        .take(options.max_cells.unwrap_or(usize::MAX))
        .collect()
}

/// Outcome of one cell.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellUpdate {
    pub row_index: usize,
    pub col_index: usize,
    pub content: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CellUpdate {
    pub fn filled(row_index: usize, col_index: usize, content: String) -> Self {
        Self { row_index, col_index, content, success: true, error: None }
    }

    pub fn failed(row_index: usize, col_index: usize, error: String) -> Self {
        Self { row_index, col_index, content: String::new(), success: false, error: Some(error) }
    }

    pub(crate) fn fail(&mut self, error: &str) {
        self.success = false;
        self.error = Some(error.to_owned());
    }
}

/// Token usage reported by the generation backend.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Summary of one fill run.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FillOperationResult {
    /// False only for operation-level failures
    pub success: bool,
    pub updates: Vec<CellUpdate>,
    pub filled_count: usize,
    pub failed_count: usize,
    pub total_attempted: usize,
    /// Summed over successful cells; absent when none reported usage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl FillOperationResult {
    pub(crate) fn completed(updates: Vec<CellUpdate>, usage: Option<Usage>) -> Self {
        let filled_count = updates.iter().filter(|update| update.success).count();
        Self {
            success: true,
            filled_count,
            failed_count: updates.len() - filled_count,
            total_attempted: updates.len(),
            updates,
            usage,
            error: None,
            error_kind: None,
        }
    }

    pub(crate) fn failure(kind: ErrorKind, error: String) -> Self {
        Self {
            success: false,
            error: Some(error),
            error_kind: Some(kind),
            ..Self::default()
        }
    }
}
