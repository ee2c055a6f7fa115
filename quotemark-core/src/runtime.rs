//! Drives a [`Controller`] from a single message queue.
//!
//! Document opening and page fetches run as spawned tasks that post their
//! results back into the queue, so the loop never blocks on them. Match
//! requests are also posted back, letting pending events run first.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, instrument, warn};

use crate::config::ViewerConfig;
use crate::controller::{Controller, Effect, Phase, PublishedHighlights, Ticket, ViewerEvent};
use crate::error::PageFetchError;
use crate::model::PageContent;
use crate::window::{PageSet, ScrollDebouncer, ScrollPosition};
use crate::{DocumentHandle, DocumentRef, DocumentSource, VisibilityObserver};

/// Counts mounted documents. Messages stamped with an older session are dropped.
type Session = u64;

enum Message {
    Event(ViewerEvent),
    Opened {
        session: Session,
        document: Arc<dyn DocumentHandle>,
    },
    OpenFailed {
        session: Session,
        reason: String,
    },
    Visibility {
        session: Session,
        page: usize,
        visible: bool,
    },
    Scroll(ScrollPosition),
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewerNotification {
    PagesMaterialized { pages: Vec<usize> },
    LoadingProgress { progress: f32 },
    LoadingFinished,
    ScrollToPage { page: usize },
    HighlightsPublished(PublishedHighlights),
    PageFailed { page: usize, reason: String },
    DocumentFailed { reason: String },
    DocumentClosed,
}

/// Inbound side of a running viewer.
#[derive(Clone)]
pub struct ViewerHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl ViewerHandle {
    pub fn mount(&self, reference: DocumentRef) -> Result<()> {
        self.send(Message::Event(ViewerEvent::Mount(reference)))
    }

    pub fn scroll(&self, position: ScrollPosition) -> Result<()> {
        self.send(Message::Scroll(position))
    }

    pub fn set_quote(&self, quote: impl Into<String>) -> Result<()> {
        self.send(Message::Event(ViewerEvent::QuoteChanged(quote.into())))
    }

    pub fn set_focal_page(&self, page: usize) -> Result<()> {
        self.send(Message::Event(ViewerEvent::FocalPageChanged(page)))
    }

    pub fn close(&self) -> Result<()> {
        self.send(Message::Event(ViewerEvent::Close))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(Message::Shutdown)
    }

    fn send(&self, message: Message) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| anyhow!("viewer runtime has stopped"))
    }
}

/// Write end of one page surface's visibility stream.
#[derive(Clone)]
pub struct VisibilitySink {
    session: Session,
    page: usize,
    tx: mpsc::UnboundedSender<Message>,
}

impl VisibilitySink {
    pub fn page(&self) -> usize {
        self.page
    }

    /// Returns false once the runtime has gone away.
    pub fn notify(&self, visible: bool) -> bool {
        self.tx
            .send(Message::Visibility {
                session: self.session,
                page: self.page,
                visible,
            })
            .is_ok()
    }
}

/// Headless observer: every surface paints and becomes visible as soon as it is created.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateVisibility;

impl VisibilityObserver for ImmediateVisibility {
    fn observe(&self, _page: usize, sink: VisibilitySink) {
        sink.notify(true);
    }
}

pub struct ViewerRuntime {
    controller: Controller,
    source: Arc<dyn DocumentSource>,
    observer: Arc<dyn VisibilityObserver>,
    document: Option<Arc<dyn DocumentHandle>>,
    session: Session,
    subscribed: PageSet,
    debouncer: ScrollDebouncer,
    tx: mpsc::UnboundedSender<Message>,
    rx: mpsc::UnboundedReceiver<Message>,
    notifications: Arc<Mutex<Vec<ViewerNotification>>>,
    phase: watch::Sender<Phase>,
}

impl ViewerRuntime {
    pub fn new(
        config: ViewerConfig,
        source: Arc<dyn DocumentSource>,
        observer: Arc<dyn VisibilityObserver>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (phase, _) = watch::channel(Phase::Idle);
        let debouncer = ScrollDebouncer::new(config.scroll_debounce());
        Self {
            controller: Controller::new(config),
            source,
            observer,
            document: None,
            session: 0,
            subscribed: PageSet::new(),
            debouncer,
            tx,
            rx,
            notifications: Arc::new(Mutex::new(Vec::new())),
            phase,
        }
    }

    pub fn handle(&self) -> ViewerHandle {
        ViewerHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn notifications(&self) -> Arc<Mutex<Vec<ViewerNotification>>> {
        Arc::clone(&self.notifications)
    }

    pub fn phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Processes messages until [`ViewerHandle::shutdown`] and hands back the final controller.
    #[instrument(skip(self))]
    pub async fn run(mut self) -> Controller {
        loop {
            let deadline = self.debouncer.deadline();
            let message = tokio::select! {
                message = self.rx.recv() => message,
                _ = wait_until(deadline) => {
                    if let Some(position) = self.debouncer.take_ready(Instant::now()) {
                        self.dispatch(ViewerEvent::ScrollSettled(position));
                    }
                    continue;
                }
            };

            match message {
                Some(Message::Event(event)) => self.dispatch(event),
                Some(Message::Opened { session, document }) => {
                    if self.is_current(session) {
                        let page_count = document.page_count();
                        self.document = Some(document);
                        self.dispatch(ViewerEvent::DocumentOpened { page_count });
                    }
                }
                Some(Message::OpenFailed { session, reason }) => {
                    if self.is_current(session) {
                        self.dispatch(ViewerEvent::DocumentFailed { reason });
                    }
                }
                Some(Message::Visibility {
                    session,
                    page,
                    visible,
                }) => {
                    if self.is_current(session) {
                        self.dispatch(ViewerEvent::Visibility { page, visible });
                    }
                }
                Some(Message::Scroll(position)) => self.debouncer.queue(position, Instant::now()),
                Some(Message::Shutdown) | None => break,
            }
        }
        debug!("viewer runtime stopped");
        self.controller
    }

    fn is_current(&self, session: Session) -> bool {
        if session != self.session {
            debug!(session, current = self.session, "dropping message from a closed session");
            return false;
        }
        true
    }

    fn dispatch(&mut self, event: ViewerEvent) {
        let effects = self.controller.handle(event);
        self.phase.send_replace(self.controller.phase().clone());
        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::OpenDocument(reference) => {
                self.session += 1;
                self.document = None;
                self.subscribed.reset();
                self.spawn_open(reference);
            }
            Effect::Materialize(pages) => {
                for &page in &pages {
                    if self.subscribed.insert(page) {
                        self.observer.observe(
                            page,
                            VisibilitySink {
                                session: self.session,
                                page,
                                tx: self.tx.clone(),
                            },
                        );
                    }
                }
                self.notify(ViewerNotification::PagesMaterialized { pages });
            }
            Effect::FetchPage { page, ticket } => self.spawn_fetch(page, ticket),
            Effect::RunMatch { page, ticket } => {
                let _ = self
                    .tx
                    .send(Message::Event(ViewerEvent::MatchDue { page, ticket }));
            }
            Effect::Progress(progress) => {
                self.notify(ViewerNotification::LoadingProgress { progress })
            }
            Effect::LoadingFinished => self.notify(ViewerNotification::LoadingFinished),
            Effect::ScrollToPage(page) => self.notify(ViewerNotification::ScrollToPage { page }),
            Effect::Publish(highlights) => {
                self.notify(ViewerNotification::HighlightsPublished(highlights))
            }
            Effect::PageError { page, reason } => {
                self.notify(ViewerNotification::PageFailed { page, reason })
            }
            Effect::DocumentError(reason) => {
                self.document = None;
                self.notify(ViewerNotification::DocumentFailed { reason });
            }
            Effect::Closed => {
                self.session += 1;
                self.document = None;
                self.subscribed.reset();
                self.notify(ViewerNotification::DocumentClosed);
            }
        }
    }

    fn spawn_open(&self, reference: DocumentRef) {
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        let session = self.session;
        tokio::spawn(async move {
            let message = match source.open(&reference).await {
                Ok(document) => Message::Opened { session, document },
                Err(err) => {
                    warn!(%reference, error = ?err, "failed to open document");
                    Message::OpenFailed {
                        session,
                        reason: err.to_string(),
                    }
                }
            };
            let _ = tx.send(message);
        });
    }

    fn spawn_fetch(&self, page: usize, ticket: Ticket) {
        let tx = self.tx.clone();
        let Some(document) = self.document.clone() else {
            let _ = tx.send(Message::Event(ViewerEvent::PageFailed {
                page,
                ticket,
                reason: "no document is open".to_owned(),
            }));
            return;
        };
        tokio::spawn(async move {
            let event = match fetch_page(document, page).await {
                Ok(content) => ViewerEvent::PageLoaded {
                    page,
                    ticket,
                    content,
                },
                Err(err) => ViewerEvent::PageFailed {
                    page,
                    ticket,
                    reason: err.to_string(),
                },
            };
            let _ = tx.send(Message::Event(event));
        });
    }

    fn notify(&self, notification: ViewerNotification) {
        self.notifications.lock().push(notification);
    }
}

async fn fetch_page(
    document: Arc<dyn DocumentHandle>,
    page: usize,
) -> Result<PageContent, PageFetchError> {
    let handle = document.page(page)?;
    debug!(page = handle.page_number(), "fetching page content");
    let tokens = handle.text_tokens().await?;
    let operators = handle.draw_operators().await?;
    Ok(PageContent {
        height: handle.height(),
        tokens,
        operators,
    })
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}
