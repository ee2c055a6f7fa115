use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod locator;
pub mod model;
pub mod projector;
pub mod runtime;
pub mod tracker;
pub mod window;

pub use cache::{CachedPage, TextTokenCache};
pub use config::{MatchMode, ViewerConfig};
pub use controller::{Controller, Effect, Phase, PublishedHighlights, Ticket, ViewerEvent};
pub use error::{DocumentOpenError, PageFetchError};
pub use locator::{locate, locate_with, similarity, MatchOutcome, MatchPolicy, MatchResult};
pub use model::{
    split_lines, DrawOperator, HighlightRect, ImageRegion, Line, OpCode, PageContent, PageRect,
    TextToken,
};
pub use projector::project;
pub use runtime::{
    ImmediateVisibility, ViewerHandle, ViewerNotification, ViewerRuntime, VisibilitySink,
};
pub use tracker::RenderTracker;
pub use window::{
    page_at_offset, PageSet, PageWindow, ScrollDebouncer, ScrollPosition, WindowManager,
};

/// Where a document comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentRef {
    Path(PathBuf),
    Bytes { name: String, data: Arc<[u8]> },
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentRef::Path(path) => write!(f, "{}", path.display()),
            DocumentRef::Bytes { name, data } => write!(f, "{} ({} bytes)", name, data.len()),
        }
    }
}

#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn open(
        &self,
        reference: &DocumentRef,
    ) -> Result<Arc<dyn DocumentHandle>, DocumentOpenError>;
}

pub trait DocumentHandle: Send + Sync {
    fn page_count(&self) -> usize;
    /// Looks up a page by its 1-based number.
    fn page(&self, page: usize) -> Result<Arc<dyn PageHandle>, PageFetchError>;
}

#[async_trait]
pub trait PageHandle: Send + Sync {
    fn page_number(&self) -> usize;
    /// Page height in page-space units.
    fn height(&self) -> f32;
    async fn text_tokens(&self) -> Result<Vec<TextToken>, PageFetchError>;
    async fn draw_operators(&self) -> Result<Vec<DrawOperator>, PageFetchError>;
}

/// Reports when a materialized page surface becomes visible.
pub trait VisibilityObserver: Send + Sync {
    /// Starts observing a page surface. Changes are pushed into `sink` for as long as the
    /// surface exists.
    fn observe(&self, page: usize, sink: VisibilitySink);
}
