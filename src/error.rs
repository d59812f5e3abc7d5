use serde::Serialize;
use thiserror::Error;

/// Main error type for the table fill crate.
/// Aggregates errors from various sources including standard library, dependencies, and internal modules.
#[derive(Error, Debug)]
pub enum TableFillError {
    #[error("{0}")]
    WithContextError(String),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    // Third-party library errors
    #[error("{0}")]
    PatternError(#[from] glob::PatternError),

    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    // Helper module errors
    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    // Domain module errors
    #[error("{0}")]
    DocumentError(#[from] crate::document::DocumentError),

    #[error("{0}")]
    TableError(#[from] crate::table::TableError),

    #[error("{0}")]
    OptionsError(#[from] crate::fill::OptionsError),
}

/// Stable tags for operation-level failures, reported next to the message.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidTableIndex,
    TableAccessError,
    StructureParseError,
    InvalidOptions,
    DocumentWriteError,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidTableIndex => "INVALID_TABLE_INDEX",
            Self::TableAccessError => "TABLE_ACCESS_ERROR",
            Self::StructureParseError => "STRUCTURE_PARSE_ERROR",
            Self::InvalidOptions => "INVALID_OPTIONS",
            Self::DocumentWriteError => "DOCUMENT_WRITE_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, TableFillError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| TableFillError::WithContextError(format!("{}: {}", message, e)))
    }
}
