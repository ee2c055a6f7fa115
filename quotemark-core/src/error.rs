use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentOpenError {
    #[error("document {reference} is unreachable")]
    Unreachable {
        reference: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("document {reference} is corrupt: {reason}")]
    Corrupt { reference: String, reason: String },
}

#[derive(Debug, Error)]
pub enum PageFetchError {
    #[error("page {page} is outside a document of {page_count} pages")]
    OutOfRange { page: usize, page_count: usize },
    #[error("data for page {page} is unavailable")]
    Unavailable {
        page: usize,
        #[source]
        source: anyhow::Error,
    },
}

impl PageFetchError {
    pub fn page(&self) -> usize {
        match self {
            PageFetchError::OutOfRange { page, .. } | PageFetchError::Unavailable { page, .. } => {
                *page
            }
        }
    }
}
