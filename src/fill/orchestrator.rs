//! The batched fill loop.
//!
//! A fill reads the table once in its own session, generates content batch by
//! batch, then writes every accepted cell in a single second session. Nothing is
//! written while generation runs.
use crate::document::Document;
use crate::document::DocumentError;
use crate::error::ErrorKind;
use crate::fill::generation::GenerationClient;
use crate::fill::generation::GenerationRequest;
use crate::fill::generation::GenerationSettings;
use crate::fill::out_of_range_cells;
use crate::fill::select_cells;
use crate::fill::validator::validate_fill_operation;
use crate::fill::validator::FillValidation;
use crate::fill::CellUpdate;
use crate::fill::FillOperationResult;
use crate::fill::FillOptions;
use crate::fill::FillStrategy;
use crate::fill::FillerConfig;
use crate::fill::OptionsError;
use crate::fill::Usage;
use crate::table::context::build_cell_context;
use crate::table::context::CellContext;
use crate::table::detector;
use crate::table::detector::DetectOptions;
use crate::table::detector::HeaderClassifier;
use crate::table::detector::StyleHeaderClassifier;
use crate::table::detector::TableDetection;
use crate::table::inference::build_table_context;
use crate::table::inference::TableContext;
use crate::table::prompt;
use crate::table::CellInfo;
use crate::table::TableError;
use crate::table::TableStructure;
use futures::future::join_all;
use serde::Serialize;
use std::future::Future;
use tracing::debug;
use tracing::info;
use tracing::instrument::WithSubscriber;
use tracing::warn;
use tracing::Dispatch;

/// Failure recorded when a cell no longer exists at write time.
pub const INVALID_COORDINATES: &str = "Invalid cell coordinates";

/// Failure recorded when the backend answers with blank text.
pub const EMPTY_RESPONSE: &str = "Empty response from generation backend";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellPreview {
    pub context: CellContext,
    pub prompt: String,
}

/// What a fill would send, without calling the backend.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FillPreview {
    pub validation: FillValidation,
    pub table_context: TableContext,
    pub system_context: String,
    /// Empty when `validation` failed
    pub cells: Vec<CellPreview>,
}

/// Entry point of every table operation on one document.
pub struct TableFiller<D, G> {
    document: D,
    client: G,
    config: FillerConfig,
    classifier: Box<dyn HeaderClassifier>,
    dispatch: Option<Dispatch>,
}

impl<D: Document, G: GenerationClient> TableFiller<D, G> {
    pub fn new(document: D, client: G) -> Self {
        Self {
            document,
            client,
            config: FillerConfig::default(),
            classifier: Box::new(StyleHeaderClassifier),
            dispatch: None,
        }
    }

    pub fn with_config(mut self, config: FillerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the bold-styling header heuristic.
    pub fn with_classifier<C: HeaderClassifier + 'static>(mut self, classifier: C) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    /// Routes every log event of this filler to `dispatch` instead of the global subscriber.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn client(&self) -> &G {
        &self.client
    }

    fn scoped<R>(&self, f: impl FnOnce() -> R) -> R {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }

    async fn instrumented<F: Future>(&self, future: F) -> F::Output {
        match &self.dispatch {
            Some(dispatch) => future.with_subscriber(dispatch.clone()).await,
            None => future.await,
        }
    }

    fn read_structure(&self, index: usize, detect_merged_cells: bool) -> Result<TableStructure, TableError> {
        self.document.with_session(|accessor| {
            detector::parse_table_structure(accessor, index, detect_merged_cells, self.classifier.as_ref())
        })
    }

    pub fn detect_tables(&self, options: &DetectOptions) -> Result<TableDetection, TableError> {
        self.scoped(|| self.document.with_session(|accessor| detector::detect_tables(accessor, options)))
    }

    /// Parses a fresh structure snapshot of one table.
    pub fn parse_table(&self, index: usize, detect_merged_cells: bool) -> Result<TableStructure, TableError> {
        self.scoped(|| self.read_structure(index, detect_merged_cells))
    }

    pub fn validate(
        &self,
        index: usize,
        explicit_cells: Option<&[(usize, usize)]>,
        strategy: FillStrategy,
        options: &FillOptions,
    ) -> Result<FillValidation, TableError> {
        self.scoped(|| {
            let structure = self.read_structure(index, options.detect_merged_cells)?;
            Ok(validate_fill_operation(&structure, explicit_cells, strategy, options))
        })
    }

    pub fn preview_fill(&self, index: usize, strategy: FillStrategy, options: &FillOptions) -> Result<FillPreview, TableError> {
        self.scoped(|| {
            let structure = self.read_structure(index, options.detect_merged_cells)?;
            let validation = validate_fill_operation(&structure, None, strategy, options);
            let table_context = build_table_context(&structure);
            let system_context = prompt::system_context(&table_context, options.user_context.as_deref());
            let cells = match validation.valid {
                true => select_cells(&structure, None, strategy, options)
                    .into_iter()
                    .map(|cell| {
                        let context = build_cell_context(cell, &structure);
                        CellPreview { prompt: prompt::cell_prompt(&context), context }
                    })
                    .collect(),
                false => Vec::new(),
            };
            debug!(table = index, cells = cells.len(), "Built fill preview");
            Ok(FillPreview { validation, table_context, system_context, cells })
        })
    }

    /// Fills the cells selected by `options`.
    pub async fn fill_empty_cells(
        &self,
        index: usize,
        strategy: FillStrategy,
        settings: &GenerationSettings,
        options: &FillOptions,
    ) -> FillOperationResult {
        self.instrumented(self.run(index, None, strategy, settings, options)).await
    }

    /// Fills an explicit selection of cells, regardless of their content.
    /// Header exclusion, `skip_merged_cells` and `max_cells` still apply.
    pub async fn fill_selected_cells(
        &self,
        index: usize,
        cells: &[(usize, usize)],
        strategy: FillStrategy,
        settings: &GenerationSettings,
        options: &FillOptions,
    ) -> FillOperationResult {
        self.instrumented(self.run(index, Some(cells), strategy, settings, options)).await
    }

    async fn run(
        &self,
        index: usize,
        explicit: Option<&[(usize, usize)]>,
        strategy: FillStrategy,
        settings: &GenerationSettings,
        options: &FillOptions,
    ) -> FillOperationResult {
        if let Err(error) = options.validate() {
            warn!(table = index, error = %error, "Rejected fill options");
            return FillOperationResult::failure(error.kind(), error.to_string());
        }
        let structure = match self.read_structure(index, options.detect_merged_cells) {
            Ok(structure) => structure,
            Err(error) => {
                warn!(table = index, error = %error, "Cannot read table");
                return FillOperationResult::failure(error.kind(), error.to_string());
            }
        };
        if let Some(cells) = explicit.and_then(|cells| out_of_range_cells(&structure, cells)) {
            let error = OptionsError::InvalidCells(cells);
            warn!(table = index, error = %error, "Rejected explicit cells");
            return FillOperationResult::failure(error.kind(), error.to_string());
        }

        let targets = select_cells(&structure, explicit, strategy, options);
        info!(table = index, strategy = strategy.as_str(), cells = targets.len(), "Starting table fill");
        if targets.is_empty() {
            return FillOperationResult::completed(Vec::new(), None);
        }

        let table_context = build_table_context(&structure);
        let system_context = prompt::system_context(&table_context, options.user_context.as_deref());
        let (mut updates, usage) = self
            .generate(&structure, &targets, &system_context, strategy, settings, options)
            .await;

        if let Err(error) = self.write_back(index, &mut updates) {
            let kind = match error {
                DocumentError::TableNotFound(_) => ErrorKind::InvalidTableIndex,
                _ => ErrorKind::DocumentWriteError,
            };
            let message = format!("Document write failed: {error}");
            warn!(table = index, error = %error, "Write session aborted");
            updates.iter_mut()
                .filter(|update| update.success)
                .for_each(|update| update.fail(&message));
            return FillOperationResult {
                success: false,
                error: Some(message),
                error_kind: Some(kind),
                ..FillOperationResult::completed(updates, usage)
            };
        }

        let result = FillOperationResult::completed(updates, usage);
        info!(
            table = index,
            filled = result.filled_count,
            failed = result.failed_count,
            "Table fill finished"
        );
        result
    }

    /// Runs generation batch by batch. Calls of one batch run concurrently; the
    /// configured delay separates consecutive batches.
    async fn generate(
        &self,
        structure: &TableStructure,
        targets: &[&CellInfo],
        system_context: &str,
        strategy: FillStrategy,
        settings: &GenerationSettings,
        options: &FillOptions,
    ) -> (Vec<CellUpdate>, Option<Usage>) {
        let mut updates = Vec::with_capacity(targets.len());
        let mut usage: Option<Usage> = None;
        for (number, batch) in targets.chunks(strategy.batch_size()).enumerate() {
            if number > 0 {
                tokio::time::sleep(self.config.inter_batch_delay).await;
            }
            debug!(batch = number + 1, size = batch.len(), "Dispatching batch");
            let requests = batch.iter().map(|cell| {
                let context = build_cell_context(cell, structure);
                self.client.generate(GenerationRequest {
                    prompt: prompt::cell_prompt(&context),
                    system_context: system_context.to_owned(),
                    attachments: options.attachments.clone(),
                    settings: settings.clone(),
                })
            });
            let results = join_all(requests).await;

            for (cell, result) in batch.iter().zip(results) {
                let (row, col) = (cell.row_index, cell.col_index);
                match result {
                    Ok(generated) if generated.text.trim().is_empty() => {
                        warn!(cell = %cell.id, "Empty generation response");
                        updates.push(CellUpdate::failed(row, col, EMPTY_RESPONSE.to_owned()));
                    }
                    Ok(generated) => {
                        if let Some(reported) = generated.usage {
                            *usage.get_or_insert_with(Usage::default) += reported;
                        }
                        updates.push(CellUpdate::filled(row, col, generated.text.trim().to_owned()));
                    }
                    Err(error) => {
                        warn!(cell = %cell.id, retryable = error.is_retryable(), error = %error, "Cell generation failed");
                        updates.push(CellUpdate::failed(row, col, error.cell_message()));
                    }
                }
            }
        }
        (updates, usage)
    }

    /// Writes every successful update in one session, checking coordinates against
    /// the live table. Vanished cells become failed updates; any other write error
    /// aborts the session.
    fn write_back(&self, index: usize, updates: &mut [CellUpdate]) -> Result<(), DocumentError> {
        if !updates.iter().any(|update| update.success) {
            return Ok(());
        }
        self.document.with_session(|accessor| {
            let table = accessor.table(index)?;
            let dimensions = accessor.dimensions(&table)?;
            for update in updates.iter_mut().filter(|update| update.success) {
                let (row, col) = (update.row_index, update.col_index);
                let written = match dimensions.contains(row, col) {
                    true => accessor.clear_and_set_cell_text(&table, row, col, &update.content),
                    false => Err(DocumentError::CellOutOfRange { table: index, row, col }),
                };
                match written {
                    Ok(()) => (),
                    Err(DocumentError::CellOutOfRange { .. }) => {
                        warn!(table = index, row, col, "Cell vanished before write");
                        update.fail(INVALID_COORDINATES);
                    }
                    Err(error) => return Err(error),
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::memory::MemoryDocument;
    use crate::document::memory::MemoryTable;
    use crate::document::docx::DocxDocument;
    use crate::fill::generation::GenerationError;
    use crate::fill::generation::Generated;
    use crate::fill::generation::GENERIC_FAILURE;
    use crate::helpers::zip::write_package;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;
    use tracing_subscriber::layer::SubscriberExt;

    type Responder = Box<dyn Fn(usize, usize) -> Result<Generated, GenerationError> + Send + Sync>;

    /// Answers by cell position, read back from the prompt.
    struct MockClient {
        responder: Responder,
        latency: Duration,
        calls: Mutex<Vec<(usize, usize, Instant)>>,
    }

    impl MockClient {
        fn new<F>(responder: F) -> Self
        where
            F: Fn(usize, usize) -> Result<Generated, GenerationError> + Send + Sync + 'static,
        {
            Self {
                responder: Box::new(responder),
                latency: Duration::ZERO,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        fn calls(&self) -> Vec<(usize, usize, Instant)> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn position(prompt: &str) -> (usize, usize) {
        let numbers: Vec<usize> = prompt
            .lines()
            .next()
            .unwrap()
            .split(|c: char| !c.is_ascii_digit())
            .filter(|part| !part.is_empty())
            .map(|part| part.parse().unwrap())
            .collect();
        (numbers[0] - 1, numbers[1] - 1)
    }

    #[async_trait]
    impl GenerationClient for MockClient {
        async fn generate(&self, request: GenerationRequest) -> Result<Generated, GenerationError> {
            let (row, col) = position(&request.prompt);
            self.calls.lock().unwrap().push((row, col, Instant::now()));
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            (self.responder)(row, col)
        }
    }

    fn ok(text: &str) -> Result<Generated, GenerationError> {
        Ok(Generated {
            text: text.to_owned(),
            usage: Some(Usage { prompt_tokens: 10, completion_tokens: 5, total_tokens: 15 }),
        })
    }

    fn echo(row: usize, col: usize) -> Result<Generated, GenerationError> {
        ok(&format!("v{row}{col}"))
    }

    fn people() -> MemoryTable {
        MemoryTable::from_rows(&[["Name", "Age", "City"], ["Ann", "", "Oslo"], ["Bob", "41", ""]]).with_bold_first_row()
    }

    fn texts(rows: &[&[&str]]) -> Option<Vec<Vec<String>>> {
        Some(rows.iter().map(|row| row.iter().map(|text| text.to_string()).collect()).collect())
    }

    async fn fill<D: Document>(filler: &TableFiller<D, MockClient>, strategy: FillStrategy) -> FillOperationResult {
        filler.fill_empty_cells(0, strategy, &GenerationSettings::default(), &FillOptions::default()).await
    }

    #[tokio::test(start_paused = true)]
    async fn batch_fill_writes_every_empty_cell() {
        let filler = TableFiller::new(MemoryDocument::new(vec![people()]), MockClient::new(echo));
        let result = fill(&filler, FillStrategy::Batch).await;

        assert!(result.success);
        assert_eq!((result.filled_count, result.failed_count, result.total_attempted), (2, 0, 2));
        assert_eq!(result.usage, Some(Usage { prompt_tokens: 20, completion_tokens: 10, total_tokens: 30 }));
        assert_eq!(
            filler.document().table_texts(0),
            texts(&[&["Name", "Age", "City"], &["Ann", "v11", "Oslo"], &["Bob", "41", "v22"]])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn one_rejected_call_does_not_stop_the_run() {
        let client = MockClient::new(|row, col| match (row, col) {
            (2, 2) => Err(GenerationError::Server { status: 500, message: "overloaded".to_owned() }),
            _ => echo(row, col),
        });
        let filler = TableFiller::new(MemoryDocument::new(vec![people()]), client);
        let result = fill(&filler, FillStrategy::Batch).await;

        assert!(result.success);
        assert_eq!((result.filled_count, result.failed_count), (1, 1));
        assert_eq!(result.updates.len(), 2);
        assert_eq!(result.updates[0], CellUpdate::filled(1, 1, "v11".to_owned()));
        assert!(!result.updates[1].success);
        assert_eq!(result.updates[1].error.as_deref(), Some("Generation backend error (500): overloaded"));
        assert_eq!(result.usage.map(|usage| usage.total_tokens), Some(15));
        assert_eq!(filler.document().table_texts(0).unwrap()[2][2], "");
    }

    #[tokio::test(start_paused = true)]
    async fn batches_run_concurrently_with_pauses_between() {
        let table = MemoryTable::from_rows(&[["", "", ""], ["", "", ""], ["", "", ""], ["", "", ""]]);
        let client = MockClient::new(echo).with_latency(Duration::from_millis(100));
        let filler = TableFiller::new(MemoryDocument::new(vec![table]), client);

        let started = Instant::now();
        let result = fill(&filler, FillStrategy::Contextual).await;
        let elapsed = started.elapsed();
        assert_eq!(result.filled_count, 12);

        let calls = filler.client().calls();
        assert_eq!(calls.len(), 12);
        let offsets: Vec<Duration> = calls.iter().map(|(_, _, at)| *at - calls[0].2).collect();
        assert!(offsets[..5].iter().all(|offset| offset.is_zero()));
        assert!(offsets[5..10].iter().all(|offset| *offset == offsets[5]));
        assert!(offsets[10..].iter().all(|offset| *offset == offsets[10]));
        assert!(offsets[5] >= Duration::from_millis(1100) && offsets[5] < Duration::from_millis(1200));
        assert!(offsets[10] - offsets[5] >= Duration::from_millis(1100));
        // no pause after the last batch
        assert!(elapsed < Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn usage_is_omitted_when_never_reported() {
        let client = MockClient::new(|row, col| Ok(Generated { text: format!("v{row}{col}"), usage: None }));
        let filler = TableFiller::new(MemoryDocument::new(vec![people()]), client);
        let result = fill(&filler, FillStrategy::Batch).await;
        assert_eq!(result.filled_count, 2);
        assert_eq!(result.usage, None);
    }

    #[tokio::test(start_paused = true)]
    async fn uncategorized_and_empty_responses_fail_their_cell() {
        let client = MockClient::new(|row, _| match row {
            1 => Err(anyhow::anyhow!("connection reset").into()),
            _ => ok("   "),
        });
        let filler = TableFiller::new(MemoryDocument::new(vec![people()]), client);
        let result = fill(&filler, FillStrategy::Batch).await;

        assert!(result.success);
        assert_eq!((result.filled_count, result.failed_count), (0, 2));
        assert_eq!(result.updates[0].error.as_deref(), Some(GENERIC_FAILURE));
        assert_eq!(result.updates[1].error.as_deref(), Some(EMPTY_RESPONSE));
        assert_eq!(result.usage, None);
        assert_eq!(filler.document().table_texts(0), MemoryDocument::new(vec![people()]).table_texts(0));
    }

    #[tokio::test(start_paused = true)]
    async fn write_session_failure_aborts_the_run() {
        let document = MemoryDocument::new(vec![people()]);
        document.set_read_only(true);
        let filler = TableFiller::new(document, MockClient::new(echo));
        let result = fill(&filler, FillStrategy::Batch).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::DocumentWriteError));
        assert!(result.error.unwrap().contains("read-only"));
        assert_eq!((result.filled_count, result.failed_count, result.total_attempted), (0, 2, 2));
        assert_eq!(filler.document().table_texts(0).unwrap()[1][1], "");
    }

    #[tokio::test(start_paused = true)]
    async fn coordinates_are_checked_against_the_live_table() {
        let document = Arc::new(MemoryDocument::new(vec![people()]));
        let shared = document.clone();
        let client = MockClient::new(move |row, col| {
            if (row, col) == (1, 1) {
                shared.replace_table(0, MemoryTable::from_rows(&[["Name", "Age"], ["Ann", ""]])).unwrap();
            }
            echo(row, col)
        });
        let filler = TableFiller::new(document, client);
        let result = fill(&filler, FillStrategy::Batch).await;

        assert!(result.success);
        assert_eq!((result.filled_count, result.failed_count), (1, 1));
        assert_eq!(result.updates[1].error.as_deref(), Some(INVALID_COORDINATES));
        assert_eq!(filler.document().table_texts(0), texts(&[&["Name", "Age"], &["Ann", "v11"]]));
    }

    #[tokio::test]
    async fn operation_level_failures() {
        let filler = TableFiller::new(MemoryDocument::new(vec![people()]), MockClient::new(echo));
        let settings = GenerationSettings::default();

        let result = filler.fill_empty_cells(4, FillStrategy::Batch, &settings, &FillOptions::default()).await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::InvalidTableIndex));
        assert_eq!(result.total_attempted, 0);

        let options = FillOptions { max_cells: Some(0), ..FillOptions::default() };
        let result = filler.fill_empty_cells(0, FillStrategy::Batch, &settings, &options).await;
        assert_eq!(result.error_kind, Some(ErrorKind::InvalidOptions));

        let result = filler.fill_selected_cells(0, &[(1, 1), (7, 7)], FillStrategy::Batch, &settings, &FillOptions::default()).await;
        assert_eq!(result.error_kind, Some(ErrorKind::InvalidOptions));
        assert!(result.error.unwrap().contains("(7, 7)"));
        assert!(filler.client().calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn selected_cells_are_filled_even_when_not_empty() {
        let filler = TableFiller::new(MemoryDocument::new(vec![people()]), MockClient::new(echo));
        let result = filler
            .fill_selected_cells(0, &[(2, 1), (1, 0), (0, 0)], FillStrategy::Contextual, &GenerationSettings::default(), &FillOptions::default())
            .await;

        assert_eq!(result.filled_count, 2);
        assert_eq!(
            filler.document().table_texts(0),
            texts(&[&["Name", "Age", "City"], &["v10", "", "Oslo"], &["Bob", "v21", ""]])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn written_content_reads_back() -> Result<(), TableError> {
        let client = MockClient::new(|row, col| ok(&format!("  line one\nline {row}{col} ")));
        let filler = TableFiller::new(MemoryDocument::new(vec![people()]), client);
        let result = fill(&filler, FillStrategy::Selective).await;

        let structure = filler.parse_table(0, true)?;
        for update in &result.updates {
            let cell = &structure.cells[update.row_index][update.col_index];
            assert_eq!(cell.text, update.content);
            assert_eq!(cell.is_empty, update.content.trim().is_empty());
        }
        assert_eq!(structure.cells[1][1].text, "line one\nline 11");
        Ok(())
    }

    #[test]
    fn preview_and_validate_do_not_generate() -> Result<(), TableError> {
        let filler = TableFiller::new(MemoryDocument::new(vec![people()]), MockClient::new(echo));
        let preview = filler.preview_fill(0, FillStrategy::Batch, &FillOptions::default())?;

        assert!(preview.validation.valid);
        assert_eq!(preview.validation.fillable_count, preview.cells.len());
        assert_eq!(preview.cells[0].context.cell_purpose.as_deref(), Some("Age"));
        assert!(preview.cells[1].prompt.starts_with("Cell at row 3, column 3."));
        assert!(preview.system_context.contains("Table with columns: Name, Age, City"));

        let options = FillOptions { target_rows: Some(vec![5, 10]), ..FillOptions::default() };
        let validation = filler.validate(0, None, FillStrategy::Batch, &options)?;
        assert!(!validation.valid);
        assert!(validation.errors[0].contains("Invalid target rows"));
        assert!(filler.preview_fill(0, FillStrategy::Batch, &options)?.cells.is_empty());

        assert_eq!(filler.detect_tables(&DetectOptions::default())?.tables.len(), 1);
        assert!(filler.client().calls().is_empty());
        Ok(())
    }

    struct CountingLayer(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CountingLayer {
        fn on_event(&self, _event: &tracing::Event<'_>, _context: tracing_subscriber::layer::Context<'_, S>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn logs_go_to_the_injected_dispatch() {
        let events = Arc::new(AtomicUsize::new(0));
        let dispatch = Dispatch::new(tracing_subscriber::registry().with(CountingLayer(events.clone())));
        let filler = TableFiller::new(MemoryDocument::new(vec![people()]), MockClient::new(echo)).with_dispatch(dispatch);

        fill(&filler, FillStrategy::Batch).await;
        let after_fill = events.load(Ordering::SeqCst);
        assert!(after_fill > 0);

        filler.parse_table(0, true).unwrap();
        assert!(events.load(Ordering::SeqCst) > after_fill);
    }

    fn docx(rows: &[&[&str]]) -> Vec<u8> {
        let rows: String = rows.iter()
            .enumerate()
            .map(|(index, cells)| {
                let cells: String = cells.iter()
                    .map(|text| match (index, text.is_empty()) {
                        (_, true) => "<w:tc><w:p/></w:tc>".to_owned(),
                        (0, false) => format!("<w:tc><w:p><w:r><w:rPr><w:b/></w:rPr><w:t>{text}</w:t></w:r></w:p></w:tc>"),
                        _ => format!("<w:tc><w:p><w:r><w:t>{text}</w:t></w:r></w:p></w:tc>"),
                    })
                    .collect();
                format!("<w:tr>{cells}</w:tr>")
            })
            .collect();
        package(&rows)
    }

    fn package(rows: &str) -> Vec<u8> {
        let document = format!(
            r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:tbl>{rows}</w:tbl></w:body></w:document>"#
        );
        write_package([
            ("[Content_Types].xml", "<Types/>".as_bytes()),
            ("word/document.xml", document.as_bytes()),
        ])
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn fills_a_docx_table() -> Result<(), crate::error::TableFillError> {
        let document = DocxDocument::from_bytes("people.docx", docx(&[&["Name", "Age", "City"], &["Ann", "", "Oslo"], &["Bob", "41", ""]]))?;
        let filler = TableFiller::new(document, MockClient::new(echo));
        let result = fill(&filler, FillStrategy::Batch).await;
        assert_eq!(result.filled_count, 2);

        let saved = DocxDocument::from_bytes("saved.docx", filler.document().to_bytes()?)?;
        let filler = TableFiller::new(saved, MockClient::new(echo));
        let structure = filler.parse_table(0, true)?;
        assert_eq!(structure.cells[1][1].text, "v11");
        assert_eq!(structure.cells[2][2].text, "v22");
        assert_eq!(structure.header_config.kind, crate::table::HeaderType::Column);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn vertically_merged_docx_cell_is_filled_once() -> Result<(), crate::error::TableFillError> {
        let bold = |text: &str| format!("<w:tc><w:p><w:r><w:rPr><w:b/></w:rPr><w:t>{text}</w:t></w:r></w:p></w:tc>");
        let plain = |text: &str| format!("<w:tc><w:p><w:r><w:t>{text}</w:t></w:r></w:p></w:tc>");
        let restart = r#"<w:tc><w:tcPr><w:vMerge w:val="restart"/></w:tcPr><w:p/></w:tc>"#;
        let merged = r#"<w:tc><w:tcPr><w:vMerge/></w:tcPr><w:p/></w:tc>"#;
        let rows = format!(
            "<w:tr>{}{}</w:tr><w:tr>{}{restart}</w:tr><w:tr>{}{merged}</w:tr><w:tr>{}{merged}</w:tr>",
            bold("Item"),
            bold("Notes"),
            plain("A"),
            plain("B"),
            plain("C"),
        );
        let document = DocxDocument::from_bytes("merged.docx", package(&rows))?;
        let filler = TableFiller::new(document, MockClient::new(echo));
        let result = fill(&filler, FillStrategy::Batch).await;

        assert_eq!(filler.client().calls().len(), 1);
        assert_eq!((result.filled_count, result.total_attempted), (1, 1));
        assert_eq!(result.updates, vec![CellUpdate::filled(1, 1, "v11".to_owned())]);

        let saved = DocxDocument::from_bytes("saved.docx", filler.document().to_bytes()?)?;
        let structure = TableFiller::new(saved, MockClient::new(echo)).parse_table(0, true)?;
        let column: Vec<&str> = structure.cells.iter().map(|row| row[1].text.as_str()).collect();
        assert_eq!(column, vec!["Notes", "v11", "v11", "v11"]);
        Ok(())
    }
}
