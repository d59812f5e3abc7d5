//! # Table Auto-Fill Core
//!
//! Reads the tables of a word-processing document, works out what each empty cell
//! should hold from its headers and neighbors, asks a text-generation backend for
//! the content, and writes the answers back in one transactional pass.
//!
//! ## Modules
//!
//! - [`document`]: session-scoped document access, with in-memory and `.docx` backends
//! - [`table`]: structure detection, cell context, table purpose and prompts
//! - [`fill`]: fill options, validation and the batched [`TableFiller`]
//!
//! ## Example flow
//!
//! 1. Open a document, e.g. [`DocxDocument::open`]
//! 2. Wrap it in a [`TableFiller`] together with a [`GenerationClient`]
//! 3. Call [`TableFiller::validate`] or [`TableFiller::preview_fill`] to check the plan
//! 4. Call [`TableFiller::fill_empty_cells`], then save the document
pub mod document;
pub mod error;
pub mod fill;
mod helpers;
pub mod table;

pub use crate::document::docx::DocxDocument;
pub use crate::document::memory::MemoryDocument;
pub use crate::document::Document;
pub use crate::error::ErrorKind;
pub use crate::error::TableFillError;
pub use crate::fill::generation::GenerationClient;
pub use crate::fill::orchestrator::TableFiller;
pub use crate::fill::FillOperationResult;
pub use crate::fill::FillOptions;
pub use crate::fill::FillStrategy;
