//! The reload loop of an open document.
//!
//! Every open document is driven by its own tokio task. The task renders the
//! document once on open, then waits for change events, debounces them and
//! renders again. Loading, rendering and handing the page to the sink happen
//! sequentially on that task, so two renders of the same document never
//! overlap, and events arriving meanwhile collapse into a single follow-up
//! render.

use crate::assets::PageComposer;
use crate::document::{absolute_document_path, DocumentState};
use crate::images::inline_images;
use crate::loader::{DocumentLoader, FsReader, RetryPolicy, SourceReader};
use crate::render::{MarkdownRenderer, RendererKind};
use crate::scroll::ScrollStateStore;
use crate::sink::DisplaySink;
use crate::watcher::{ChangeEvent, ChangeWatcher, WatcherConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

/// Tunables of the reload loop.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Quiet period after the last change event before re-rendering.
    pub debounce: Duration,
    pub retry: RetryPolicy,
    pub renderer: RendererKind,
    pub watcher: WatcherConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(100),
            retry: RetryPolicy::default(),
            renderer: RendererKind::default(),
            watcher: WatcherConfig::default(),
        }
    }
}

/// Opens documents and spawns their reload loops.
pub struct RenderOrchestrator {
    config: OrchestratorConfig,
    reader: Arc<dyn SourceReader>,
    composer: PageComposer,
    scroll_store: Arc<ScrollStateStore>,
}

impl std::fmt::Debug for RenderOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderOrchestrator")
            .field("config", &self.config)
            .field("scroll_store", &self.scroll_store)
            .finish_non_exhaustive()
    }
}

impl RenderOrchestrator {
    pub fn new(config: OrchestratorConfig, scroll_store: Arc<ScrollStateStore>) -> Self {
        Self {
            config,
            reader: Arc::new(FsReader),
            composer: PageComposer::new(),
            scroll_store,
        }
    }

    /// Replaces the source of the document text.
    pub fn with_reader(mut self, reader: Arc<dyn SourceReader>) -> Self {
        self.reader = reader;
        self
    }

    /// Opens `path` and shows it on `sink`, re-rendering on every change.
    ///
    /// Must be called within a tokio runtime. If the file cannot be watched
    /// the document is still displayed once, without live reload.
    pub fn open(&self, path: &Path, sink: Arc<dyn DisplaySink>) -> DocumentHandle {
        let path = absolute_document_path(path).unwrap_or_else(|_| path.to_path_buf());

        let (watcher, events) = match ChangeWatcher::watch(&path, &self.config.watcher) {
            Ok((watcher, events)) => (Some(watcher), Some(events)),
            Err(err) => {
                tracing::warn!(%err, "Live reload disabled");
                (None, None)
            }
        };

        self.spawn(path, sink, watcher, events)
    }

    /// Like [`Self::open`], with the change events supplied by the caller.
    #[cfg(test)]
    pub(crate) fn open_with_events(
        &self,
        path: &Path,
        sink: Arc<dyn DisplaySink>,
        events: UnboundedReceiver<ChangeEvent>,
    ) -> DocumentHandle {
        self.spawn(path.to_path_buf(), sink, None, Some(events))
    }

    fn spawn(
        &self,
        path: PathBuf,
        sink: Arc<dyn DisplaySink>,
        watcher: Option<ChangeWatcher>,
        events: Option<UnboundedReceiver<ChangeEvent>>,
    ) -> DocumentHandle {
        let (state_tx, state_rx) = watch::channel(DocumentState::Idle);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let is_watching = events.is_some();

        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let task = DocumentTask {
            scroll_offset: self.scroll_store.get(&path),
            path: path.clone(),
            base_dir,
            sink,
            loader: DocumentLoader::new(self.reader.clone(), self.config.retry),
            renderer: MarkdownRenderer::new(self.config.renderer),
            composer: self.composer.clone(),
            scroll_store: self.scroll_store.clone(),
            watcher,
            state_tx,
            debounce: self.config.debounce,
        };

        let span = tracing::debug_span!("document", path = %path.display());
        let join_handle = tokio::spawn(task.run(events, shutdown_rx).instrument(span));

        DocumentHandle {
            path,
            state_rx,
            is_watching,
            shutdown: Some(shutdown_tx),
            task: Some(join_handle),
        }
    }
}

/// Handle to an open document.
///
/// Closing (or dropping) the handle cancels the reload loop, including a
/// pending debounce or read retry, and releases the file watcher.
#[derive(Debug)]
pub struct DocumentHandle {
    path: PathBuf,
    state_rx: watch::Receiver<DocumentState>,
    is_watching: bool,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl DocumentHandle {
    /// Absolute path of the document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> DocumentState {
        *self.state_rx.borrow()
    }

    /// Subscribes to state changes.
    pub fn subscribe(&self) -> watch::Receiver<DocumentState> {
        self.state_rx.clone()
    }

    /// Whether changes of the file trigger a re-render.
    pub fn is_watching(&self) -> bool {
        self.is_watching
    }

    /// Stops the reload loop and waits until the document is fully closed.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::error!(?err, path = %self.path.display(), "Document task failed");
            }
        }
    }
}

impl Drop for DocumentHandle {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn next_event(events: &mut Option<UnboundedReceiver<ChangeEvent>>) -> Option<ChangeEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

struct DocumentTask {
    path: PathBuf,
    base_dir: PathBuf,
    sink: Arc<dyn DisplaySink>,
    loader: DocumentLoader,
    renderer: MarkdownRenderer,
    composer: PageComposer,
    scroll_store: Arc<ScrollStateStore>,
    watcher: Option<ChangeWatcher>,
    state_tx: watch::Sender<DocumentState>,
    debounce: Duration,
    /// Offset restored after the next page load.
    scroll_offset: f64,
}

impl DocumentTask {
    async fn run(
        mut self,
        mut events: Option<UnboundedReceiver<ChangeEvent>>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        // If no render is pending, the debounce timer is set to expire "never",
        // which is actually just 1 year in the future.
        const NEVER: Duration = Duration::from_secs(365 * 24 * 60 * 60);

        let cancelled = tokio::select! {
            biased;
            _ = &mut shutdown => true,
            _ = self.reload(true) => false,
        };

        if !cancelled {
            let debounce_timer = tokio::time::sleep(NEVER);
            tokio::pin!(debounce_timer);

            let mut pending = false;
            let mut reattach = false;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown => break,
                    maybe_event = next_event(&mut events) => {
                        match maybe_event {
                            Some(event) => {
                                tracing::trace!(?event, "Received change event");
                                reattach |= event.kind.requires_reattach();
                                pending = true;
                                debounce_timer.as_mut().reset(Instant::now() + self.debounce);
                            }
                            None => {
                                tracing::debug!("Change events closed, live reload stopped");
                                events = None;
                            }
                        }
                    }
                    _ = debounce_timer.as_mut(), if pending => {
                        debounce_timer.as_mut().reset(Instant::now() + NEVER);
                        pending = false;

                        let cancelled = tokio::select! {
                            biased;
                            _ = &mut shutdown => true,
                            _ = self.reload(false) => false,
                        };
                        if cancelled {
                            break;
                        }

                        if std::mem::take(&mut reattach) {
                            self.reattach_watcher();
                        }
                    }
                }
            }
        }

        self.close().await;
    }

    fn set_state(&self, state: DocumentState) {
        tracing::trace!(?state, "Document state changed");
        self.state_tx.send_replace(state);
    }

    fn state(&self) -> DocumentState {
        *self.state_tx.borrow()
    }

    /// Caches the offset currently shown by the sink.
    ///
    /// The scroll position of an error page is meaningless and not recorded.
    async fn remember_scroll_offset(&mut self) {
        if self.state() != DocumentState::Displayed {
            return;
        }
        if let Some(offset) = self.sink.current_scroll_offset().await {
            self.scroll_offset = offset;
            self.scroll_store.set(&self.path, offset);
        }
    }

    async fn reload(&mut self, initial: bool) {
        if !initial {
            self.remember_scroll_offset().await;
        }

        self.set_state(DocumentState::Loading);

        match self.loader.load(&self.path).await {
            Ok(text) => {
                self.set_state(DocumentState::Rendering);

                let fragment = self.renderer.render(&text);
                let fragment = inline_images(&fragment, &self.base_dir);
                let page = self.composer.compose(&fragment);

                self.sink.load_page(&page, &self.base_dir).await;
                if self.scroll_offset > 0.0 {
                    self.sink.scroll_to(self.scroll_offset).await;
                }
                self.scroll_store.set(&self.path, self.scroll_offset);

                self.set_state(DocumentState::Displayed);
                tracing::debug!(initial, bytes = text.len(), "Rendered document");
            }
            Err(err) => {
                tracing::warn!(%err, "Showing error page");
                let page = self.composer.error_page();
                self.sink.load_page(&page, &self.base_dir).await;
                self.set_state(DocumentState::ErrorDisplayed);
            }
        }
    }

    fn reattach_watcher(&mut self) {
        if let Some(watcher) = self.watcher.as_mut() {
            if let Err(err) = watcher.reattach() {
                tracing::warn!(%err, "Failed to re-attach file watcher");
            }
        }
    }

    async fn close(mut self) {
        self.remember_scroll_offset().await;

        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }

        tracing::debug!("Document closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::HtmlPage;
    use crate::watcher::ChangeKind;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

    #[derive(Debug, Clone, PartialEq)]
    enum SinkCall {
        LoadPage(String),
        ScrollTo(f64),
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Mutex<Vec<SinkCall>>,
        offset: Mutex<Option<f64>>,
    }

    impl RecordingSink {
        fn calls(&self) -> Vec<SinkCall> {
            self.calls.lock().clone()
        }

        fn pages(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    SinkCall::LoadPage(page) => Some(page),
                    SinkCall::ScrollTo(_) => None,
                })
                .collect()
        }

        fn set_offset(&self, offset: f64) {
            *self.offset.lock() = Some(offset);
        }
    }

    #[async_trait::async_trait]
    impl DisplaySink for RecordingSink {
        async fn load_page(&self, page: &HtmlPage, _base_url: &Path) {
            self.calls
                .lock()
                .push(SinkCall::LoadPage(page.as_str().to_string()));
        }

        async fn current_scroll_offset(&self) -> Option<f64> {
            *self.offset.lock()
        }

        async fn scroll_to(&self, offset: f64) {
            self.calls.lock().push(SinkCall::ScrollTo(offset));
        }
    }

    /// Serves the document from memory; `None` content fails the read, as do
    /// the first `failures` reads.
    #[derive(Default)]
    struct MemoryReader {
        content: Mutex<Option<String>>,
        failures: AtomicUsize,
        reads: AtomicUsize,
    }

    impl MemoryReader {
        fn with_content(content: &str) -> Self {
            Self {
                content: Mutex::new(Some(content.to_string())),
                ..Default::default()
            }
        }

        fn failing_first(failures: usize, content: &str) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                ..Self::with_content(content)
            }
        }

        fn set(&self, content: Option<&str>) {
            *self.content.lock() = content.map(str::to_string);
        }
    }

    #[async_trait::async_trait]
    impl SourceReader for MemoryReader {
        async fn read(&self, _path: &Path) -> std::io::Result<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "busy"));
            }
            self.content
                .lock()
                .clone()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))
        }
    }

    struct Fixture {
        reader: Arc<MemoryReader>,
        sink: Arc<RecordingSink>,
        store: Arc<ScrollStateStore>,
        events: UnboundedSender<ChangeEvent>,
        handle: DocumentHandle,
    }

    const DOC: &str = "/notes/doc.md";

    fn open(reader: MemoryReader, store: ScrollStateStore) -> Fixture {
        let reader = Arc::new(reader);
        let store = Arc::new(store);
        let sink = Arc::new(RecordingSink::default());
        let (events, rx) = unbounded_channel();

        let orchestrator = RenderOrchestrator::new(OrchestratorConfig::default(), store.clone())
            .with_reader(reader.clone());
        let handle = orchestrator.open_with_events(Path::new(DOC), sink.clone(), rx);

        Fixture {
            reader,
            sink,
            store,
            events,
            handle,
        }
    }

    fn change(kind: ChangeKind) -> ChangeEvent {
        ChangeEvent {
            kind,
            path: PathBuf::from(DOC),
        }
    }

    async fn settled(handle: &DocumentHandle) -> DocumentState {
        let mut state_rx = handle.subscribe();
        let state = *state_rx.wait_for(|state| state.is_settled()).await.unwrap();
        state
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_render() {
        let f = open(
            MemoryReader::with_content("# Title\n\nHello **world**."),
            ScrollStateStore::in_memory(),
        );

        assert_eq!(settled(&f.handle).await, DocumentState::Displayed);

        let pages = f.sink.pages();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].contains("<h1>Title</h1>"));
        assert!(pages[0].contains("<p>Hello <strong>world</strong>.</p>"));
        // Nothing to restore at offset 0.
        assert_eq!(f.sink.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_changes_renders_once() {
        let f = open(MemoryReader::with_content("# v1"), ScrollStateStore::in_memory());
        settled(&f.handle).await;

        f.reader.set(Some("# v2"));
        for _ in 0..5 {
            f.events.send(change(ChangeKind::Write)).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        let pages = f.sink.pages();
        assert_eq!(pages.len(), 2);
        assert!(pages[1].contains("<h1>v2</h1>"));
        assert_eq!(f.reader.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_are_debounced() {
        let f = open(MemoryReader::with_content("# v1"), ScrollStateStore::in_memory());
        settled(&f.handle).await;

        f.events.send(change(ChangeKind::Write)).unwrap();

        tokio::time::sleep(Duration::from_millis(95)).await;
        assert_eq!(f.reader.reads.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.reader.reads.load(Ordering::SeqCst), 2);
        assert_eq!(f.sink.pages().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_during_render_collapse_into_one() {
        // The initial load retries for 300ms.
        let f = open(
            MemoryReader::failing_first(3, "# v1"),
            ScrollStateStore::in_memory(),
        );

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            f.events.send(change(ChangeKind::Write)).unwrap();
        }
        assert_eq!(f.handle.state(), DocumentState::Loading);

        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(f.handle.state(), DocumentState::Displayed);
        let pages = f.sink.pages();
        assert_eq!(pages.len(), 2);
        assert!(pages.iter().all(|page| page.contains("<h1>v1</h1>")));
        assert_eq!(f.reader.reads.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_unwatchable_document_is_shown_once() {
        let dir = tempfile::tempdir().unwrap();
        let doc = dir.path().join("later").join("doc.md");
        let sink = Arc::new(RecordingSink::default());

        let orchestrator =
            RenderOrchestrator::new(OrchestratorConfig::default(), Default::default())
                .with_reader(Arc::new(MemoryReader::with_content("# Static")));
        let handle = orchestrator.open(&doc, sink.clone());

        assert!(!handle.is_watching());
        assert_eq!(settled(&handle).await, DocumentState::Displayed);

        let pages = sink.pages();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].contains("<h1>Static</h1>"));

        handle.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restores_stored_scroll_offset() {
        let store = ScrollStateStore::in_memory();
        store.set(Path::new(DOC), 240.0);

        let f = open(MemoryReader::with_content("# Long"), store);
        settled(&f.handle).await;

        let calls = f.sink.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[0], SinkCall::LoadPage(_)));
        assert_eq!(calls[1], SinkCall::ScrollTo(240.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scroll_position_survives_reload() {
        let f = open(MemoryReader::with_content("# v1"), ScrollStateStore::in_memory());
        settled(&f.handle).await;

        f.sink.set_offset(80.0);
        f.events.send(change(ChangeKind::Write)).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(f.sink.calls().last(), Some(&SinkCall::ScrollTo(80.0)));
        assert_eq!(f.store.get(Path::new(DOC)), 80.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_document_shows_error_page() {
        let f = open(MemoryReader::default(), ScrollStateStore::in_memory());

        assert_eq!(settled(&f.handle).await, DocumentState::ErrorDisplayed);
        assert_eq!(f.reader.reads.load(Ordering::SeqCst), 4);
        let pages = f.sink.pages();
        assert_eq!(pages.len(), 1);
        assert!(pages[0].contains("Could not read file"));

        // The error page is left on the next change.
        f.reader.set(Some("# Back"));
        f.events.send(change(ChangeKind::Write)).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(f.handle.state(), DocumentState::Displayed);
        assert!(f.sink.pages()[1].contains("<h1>Back</h1>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_error_page_keeps_cached_offset() {
        let store = ScrollStateStore::in_memory();
        store.set(Path::new(DOC), 120.0);
        let f = open(MemoryReader::with_content("# v1"), store);
        settled(&f.handle).await;
        f.sink.set_offset(120.0);

        f.reader.set(None);
        f.events.send(change(ChangeKind::Delete)).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(f.handle.state(), DocumentState::ErrorDisplayed);

        // The error page reports the top of the page.
        f.sink.set_offset(0.0);
        f.reader.set(Some("# v2"));
        f.events.send(change(ChangeKind::Write)).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(f.sink.calls().last(), Some(&SinkCall::ScrollTo(120.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_render() {
        let f = open(MemoryReader::with_content("# v1"), ScrollStateStore::in_memory());
        settled(&f.handle).await;

        f.sink.set_offset(55.0);
        f.events.send(change(ChangeKind::Write)).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        f.handle.close().await;

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(f.sink.pages().len(), 1);
        assert_eq!(f.reader.reads.load(Ordering::SeqCst), 1);
        assert_eq!(f.store.get(Path::new(DOC)), 55.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_retrying_load() {
        let reader = Arc::new(MemoryReader::default());
        let sink = Arc::new(RecordingSink::default());
        let (_events, rx) = unbounded_channel::<ChangeEvent>();

        let orchestrator =
            RenderOrchestrator::new(OrchestratorConfig::default(), Default::default())
                .with_reader(reader.clone());
        let handle = orchestrator.open_with_events(Path::new(DOC), sink.clone(), rx);

        // Let the first attempt fail, then drop during the retry delay.
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(handle);
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(reader.reads.load(Ordering::SeqCst), 1);
        assert!(sink.pages().is_empty());
    }
}
