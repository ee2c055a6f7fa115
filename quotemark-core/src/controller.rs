//! The viewer's pipeline as a state machine.
//!
//! [`Controller::handle`] consumes one [`ViewerEvent`] and returns the
//! [`Effect`]s the driver must carry out. It performs no I/O, so every
//! transition can be exercised without a rendering harness.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::TextTokenCache;
use crate::config::ViewerConfig;
use crate::locator::{locate_with, MatchOutcome, NO_CANDIDATE};
use crate::model::{HighlightRect, PageContent};
use crate::projector::project;
use crate::tracker::RenderTracker;
use crate::window::{page_at_offset, PageWindow, ScrollPosition, WindowManager};
use crate::DocumentRef;

/// Identifies one fetch/match request. Only the latest ticket is honoured.
pub type Ticket = u64;

#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Idle,
    FetchingDocument,
    AwaitingFocalPage,
    FetchingPage(usize),
    Matching(usize),
    Ready,
    Failed(String),
}

impl Phase {
    fn has_document(&self) -> bool {
        matches!(
            self,
            Phase::AwaitingFocalPage | Phase::FetchingPage(_) | Phase::Matching(_) | Phase::Ready
        )
    }
}

#[derive(Debug, Clone)]
pub enum ViewerEvent {
    Mount(DocumentRef),
    DocumentOpened {
        page_count: usize,
    },
    DocumentFailed {
        reason: String,
    },
    Visibility {
        page: usize,
        visible: bool,
    },
    ScrollSettled(ScrollPosition),
    PageLoaded {
        page: usize,
        ticket: Ticket,
        content: PageContent,
    },
    PageFailed {
        page: usize,
        ticket: Ticket,
        reason: String,
    },
    MatchDue {
        page: usize,
        ticket: Ticket,
    },
    FocalPageChanged(usize),
    QuoteChanged(String),
    Close,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedHighlights {
    pub page: usize,
    pub score: f32,
    pub rects: Vec<HighlightRect>,
}

impl PublishedHighlights {
    fn empty(page: usize) -> Self {
        Self {
            page,
            score: NO_CANDIDATE,
            rects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    OpenDocument(DocumentRef),
    /// Pages added to the window; their surfaces must be created and observed.
    Materialize(Vec<usize>),
    FetchPage { page: usize, ticket: Ticket },
    RunMatch { page: usize, ticket: Ticket },
    Progress(f32),
    LoadingFinished,
    ScrollToPage(usize),
    Publish(PublishedHighlights),
    PageError { page: usize, reason: String },
    DocumentError(String),
    Closed,
}

pub struct Controller {
    config: ViewerConfig,
    phase: Phase,
    page_count: usize,
    focal_page: usize,
    window: WindowManager,
    tracker: RenderTracker,
    cache: TextTokenCache,
    published: HashMap<usize, PublishedHighlights>,
    ticket: Ticket,
    /// Last ticket issued before the current session began.
    session_start: Ticket,
    loading_finished: bool,
}

impl Controller {
    pub fn new(config: ViewerConfig) -> Self {
        let config = config.normalized();
        let focal_page = config.focal_page;
        Self {
            config,
            phase: Phase::Idle,
            page_count: 0,
            focal_page,
            window: WindowManager::new(),
            tracker: RenderTracker::new(),
            cache: TextTokenCache::new(),
            published: HashMap::new(),
            ticket: 0,
            session_start: 0,
            loading_finished: false,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn focal_page(&self) -> usize {
        self.focal_page
    }

    pub fn window(&self) -> &PageWindow {
        self.window.window()
    }

    pub fn tracker(&self) -> &RenderTracker {
        &self.tracker
    }

    pub fn cache(&self) -> &TextTokenCache {
        &self.cache
    }

    pub fn highlights(&self, page: usize) -> Option<&PublishedHighlights> {
        self.published.get(&page)
    }

    pub fn progress(&self) -> f32 {
        self.tracker.progress(self.page_count)
    }

    pub fn is_loading(&self) -> bool {
        self.phase.has_document() && !self.tracker.is_complete(self.page_count)
    }

    pub fn handle(&mut self, event: ViewerEvent) -> Vec<Effect> {
        let before = self.phase.clone();
        let effects = match event {
            ViewerEvent::Mount(reference) => self.on_mount(reference),
            ViewerEvent::DocumentOpened { page_count } => self.on_document_opened(page_count),
            ViewerEvent::DocumentFailed { reason } => self.on_document_failed(reason),
            ViewerEvent::Visibility { page, visible } => self.on_visibility(page, visible),
            ViewerEvent::ScrollSettled(position) => self.on_scroll(position),
            ViewerEvent::PageLoaded {
                page,
                ticket,
                content,
            } => self.on_page_loaded(page, ticket, content),
            ViewerEvent::PageFailed {
                page,
                ticket,
                reason,
            } => self.on_page_failed(page, ticket, reason),
            ViewerEvent::MatchDue { page, ticket } => self.on_match_due(page, ticket),
            ViewerEvent::FocalPageChanged(page) => self.on_focal_changed(page),
            ViewerEvent::QuoteChanged(quote) => self.on_quote_changed(quote),
            ViewerEvent::Close => self.on_close(),
        };
        if before != self.phase {
            debug!(from = ?before, to = ?self.phase, "viewer phase changed");
        }
        effects
    }

    fn on_mount(&mut self, reference: DocumentRef) -> Vec<Effect> {
        if self.phase != Phase::Idle {
            warn!(%reference, phase = ?self.phase, "ignoring mount while a document is active");
            return Vec::new();
        }
        self.reset_session();
        self.phase = Phase::FetchingDocument;
        vec![Effect::OpenDocument(reference)]
    }

    fn on_document_opened(&mut self, page_count: usize) -> Vec<Effect> {
        if self.phase != Phase::FetchingDocument {
            return Vec::new();
        }
        self.page_count = page_count;
        if page_count == 0 {
            self.phase = Phase::Ready;
            return Vec::new();
        }

        self.focal_page = self.config.focal_page.clamp(1, page_count);
        let added = self
            .window
            .seed(self.focal_page, page_count, self.config.radius);
        self.phase = Phase::AwaitingFocalPage;
        vec![Effect::Materialize(added), Effect::Progress(0.0)]
    }

    fn on_document_failed(&mut self, reason: String) -> Vec<Effect> {
        if self.phase != Phase::FetchingDocument {
            return Vec::new();
        }
        self.reset_session();
        self.phase = Phase::Failed(reason.clone());
        vec![Effect::DocumentError(reason)]
    }

    fn on_visibility(&mut self, page: usize, visible: bool) -> Vec<Effect> {
        if !visible || !self.phase.has_document() {
            return Vec::new();
        }
        if !self.window.window().contains(page) {
            debug!(page, "visibility reported for a page outside the window");
            return Vec::new();
        }
        if !self.tracker.on_page_ready(page) {
            return Vec::new();
        }

        let mut effects = vec![Effect::Progress(self.progress())];
        if !self.loading_finished && self.tracker.is_complete(self.page_count) {
            self.loading_finished = true;
            effects.push(Effect::LoadingFinished);
            effects.push(Effect::ScrollToPage(self.focal_page));
        }
        if page == self.focal_page && self.phase == Phase::AwaitingFocalPage {
            effects.extend(self.begin_focal());
        }
        effects
    }

    fn on_scroll(&mut self, position: ScrollPosition) -> Vec<Effect> {
        if !self.phase.has_document() {
            return Vec::new();
        }
        let current = page_at_offset(position.offset, position.page_height, self.page_count);
        let added = self
            .window
            .expand(current, self.page_count, self.config.radius);
        if added.is_empty() {
            Vec::new()
        } else {
            vec![Effect::Materialize(added)]
        }
    }

    fn on_page_loaded(
        &mut self,
        page: usize,
        ticket: Ticket,
        content: PageContent,
    ) -> Vec<Effect> {
        if !self.phase.has_document() || ticket <= self.session_start {
            debug!(page, ticket, "dropping page result from a previous session");
            return Vec::new();
        }
        // Page data stays valid even when the request that fetched it is stale.
        self.cache.insert(page, content);
        if ticket != self.ticket || self.phase != Phase::FetchingPage(page) {
            warn!(page, ticket, current = self.ticket, "discarding stale page result");
            return Vec::new();
        }
        self.phase = Phase::Matching(page);
        vec![Effect::RunMatch { page, ticket }]
    }

    fn on_page_failed(&mut self, page: usize, ticket: Ticket, reason: String) -> Vec<Effect> {
        if ticket != self.ticket || self.phase != Phase::FetchingPage(page) {
            warn!(page, ticket, %reason, "discarding stale page failure");
            return Vec::new();
        }
        warn!(page, %reason, "page fetch failed");
        self.phase = Phase::Ready;
        let empty = PublishedHighlights::empty(page);
        self.published.insert(page, empty.clone());
        vec![Effect::PageError { page, reason }, Effect::Publish(empty)]
    }

    fn on_match_due(&mut self, page: usize, ticket: Ticket) -> Vec<Effect> {
        if ticket != self.ticket || self.phase != Phase::Matching(page) {
            debug!(page, ticket, "skipping superseded match");
            return Vec::new();
        }
        let Some(cached) = self.cache.get(page) else {
            return self.begin_focal();
        };

        let lines = cached.lines();
        let outcome = locate_with(&lines, &self.config.quote, self.config.match_policy());
        let rects = match &outcome {
            MatchOutcome::Matched(result) => {
                project(result.tokens(&lines), &cached.images, cached.height)
                    .into_iter()
                    .map(|rect| rect.scaled(self.config.scale))
                    .collect()
            }
            MatchOutcome::NoMatch { best_score } => {
                debug!(page, best_score, "no span accepted for quote");
                Vec::new()
            }
        };

        let published = PublishedHighlights {
            page,
            score: outcome.score(),
            rects,
        };
        debug!(
            page,
            score = published.score,
            rects = published.rects.len(),
            "publishing highlights"
        );
        self.published.insert(page, published.clone());
        self.phase = Phase::Ready;
        vec![Effect::Publish(published)]
    }

    fn on_focal_changed(&mut self, page: usize) -> Vec<Effect> {
        let page = page.max(1);
        self.config.focal_page = page;
        if !self.phase.has_document() {
            if self.phase == Phase::Idle {
                self.focal_page = page;
            }
            return Vec::new();
        }
        if self.page_count == 0 {
            return Vec::new();
        }

        let page = page.min(self.page_count);
        if page == self.focal_page {
            return Vec::new();
        }

        let previous = self.focal_page;
        self.focal_page = page;
        // Invalidate anything still in flight for the previous page.
        self.ticket += 1;

        let mut effects = Vec::new();
        if self.published.remove(&previous).is_some() {
            effects.push(Effect::Publish(PublishedHighlights::empty(previous)));
        }
        let added = self.window.expand(page, self.page_count, self.config.radius);
        if !added.is_empty() {
            effects.push(Effect::Materialize(added));
        }

        if self.tracker.is_ready(page) {
            effects.extend(self.begin_focal());
        } else {
            self.phase = Phase::AwaitingFocalPage;
        }
        effects
    }

    fn on_quote_changed(&mut self, quote: String) -> Vec<Effect> {
        if quote == self.config.quote {
            return Vec::new();
        }
        self.config.quote = quote;
        // A fetch or match already in flight will read the new quote when it runs.
        if self.phase == Phase::Ready
            && self.page_count > 0
            && self.tracker.is_ready(self.focal_page)
        {
            return self.begin_focal();
        }
        Vec::new()
    }

    fn on_close(&mut self) -> Vec<Effect> {
        if self.phase == Phase::Idle {
            return Vec::new();
        }
        self.reset_session();
        self.phase = Phase::Idle;
        vec![Effect::Closed]
    }

    fn begin_focal(&mut self) -> Vec<Effect> {
        self.ticket += 1;
        let page = self.focal_page;
        let ticket = self.ticket;
        if self.cache.contains(page) {
            self.phase = Phase::Matching(page);
            vec![Effect::RunMatch { page, ticket }]
        } else {
            self.phase = Phase::FetchingPage(page);
            vec![Effect::FetchPage { page, ticket }]
        }
    }

    fn reset_session(&mut self) {
        self.window.clear();
        self.tracker.clear();
        self.cache.clear();
        self.published.clear();
        self.page_count = 0;
        self.focal_page = self.config.focal_page;
        self.loading_finished = false;
        self.ticket += 1;
        self.session_start = self.ticket;
    }
}
