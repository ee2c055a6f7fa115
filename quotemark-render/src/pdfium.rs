use std::env;
use std::mem;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use pdfium_render::prelude::*;
use quotemark_core::{
    DocumentHandle, DocumentOpenError, DocumentRef, DocumentSource, DrawOperator, OpCode,
    PageFetchError, PageHandle, TextToken,
};
use tracing::{debug, instrument, warn};

const LIBRARY_PATH_ENV: &str = "QUOTEMARK_PDFIUM_LIBRARY_PATH";

/// Opens PDF documents through a dynamically bound pdfium library.
pub struct PdfiumDocumentSource {
    pdfium: Arc<Pdfium>,
}

impl PdfiumDocumentSource {
    pub fn new() -> Result<Self> {
        let pdfium = match bind_pdfium_from_env() {
            Some(pdfium) => pdfium,
            None => bind_pdfium_default()?,
        };
        Ok(Self {
            pdfium: Arc::new(pdfium),
        })
    }
}

#[async_trait]
impl DocumentSource for PdfiumDocumentSource {
    #[instrument(skip_all, fields(reference = %reference))]
    async fn open(
        &self,
        reference: &DocumentRef,
    ) -> Result<Arc<dyn DocumentHandle>, DocumentOpenError> {
        if let DocumentRef::Path(path) = reference {
            if !path.exists() {
                return Err(DocumentOpenError::Unreachable {
                    reference: reference.to_string(),
                    source: anyhow!("{:?} does not exist", path),
                });
            }
        }

        let loaded = LoadedDocument::load(Arc::clone(&self.pdfium), reference).map_err(|err| {
            DocumentOpenError::Corrupt {
                reference: reference.to_string(),
                reason: format!("{:#}", err),
            }
        })?;
        debug!(pages = loaded.page_count, "opened document");
        Ok(Arc::new(PdfiumDocument {
            inner: Arc::new(loaded),
        }))
    }
}

struct LoadedDocument {
    // Declared before `pdfium` so it is dropped first.
    document: Mutex<PdfDocument<'static>>,
    page_count: usize,
    pdfium: Arc<Pdfium>,
}

impl LoadedDocument {
    fn load(pdfium: Arc<Pdfium>, reference: &DocumentRef) -> Result<Self> {
        let document = match reference {
            DocumentRef::Path(path) => pdfium
                .load_pdf_from_file(path, None)
                .with_context(|| format!("failed to open {:?}", path))?,
            DocumentRef::Bytes { name, data } => pdfium
                .load_pdf_from_byte_vec(data.to_vec(), None)
                .with_context(|| format!("failed to open {}", name))?,
        };
        // SAFETY: the document borrows the bindings owned by `pdfium`. Both live in this
        // struct, the Arc keeps the bindings alive, and struct fields drop in declaration
        // order, so the document is always dropped while the bindings are still valid.
        let document = unsafe { mem::transmute::<PdfDocument<'_>, PdfDocument<'static>>(document) };
        let page_count = usize::try_from(document.pages().len()).unwrap_or_default();
        Ok(Self {
            document: Mutex::new(document),
            page_count,
            pdfium,
        })
    }

    fn with_page<R, F>(&self, number: usize, f: F) -> Result<R>
    where
        F: FnOnce(&PdfPage<'_>) -> Result<R>,
    {
        let index: PdfPageIndex = number
            .checked_sub(1)
            .and_then(|index| index.try_into().ok())
            .ok_or_else(|| anyhow!("page {} is out of supported range", number))?;
        let document = self.document.lock();
        let page = document
            .pages()
            .get(index)
            .with_context(|| format!("page {} out of range", number))?;
        f(&page)
    }
}

struct PdfiumDocument {
    inner: Arc<LoadedDocument>,
}

impl DocumentHandle for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.inner.page_count
    }

    fn page(&self, page: usize) -> Result<Arc<dyn PageHandle>, PageFetchError> {
        if page == 0 || page > self.inner.page_count {
            return Err(PageFetchError::OutOfRange {
                page,
                page_count: self.inner.page_count,
            });
        }
        let height = self
            .inner
            .with_page(page, |pdf_page| Ok(pdf_page.height().value))
            .map_err(|source| PageFetchError::Unavailable { page, source })?;
        Ok(Arc::new(PdfiumPage {
            document: Arc::clone(&self.inner),
            number: page,
            height,
        }))
    }
}

struct PdfiumPage {
    document: Arc<LoadedDocument>,
    number: usize,
    height: f32,
}

#[async_trait]
impl PageHandle for PdfiumPage {
    fn page_number(&self) -> usize {
        self.number
    }

    fn height(&self) -> f32 {
        self.height
    }

    #[instrument(skip(self), fields(page = self.number))]
    async fn text_tokens(&self) -> Result<Vec<TextToken>, PageFetchError> {
        self.document
            .with_page(self.number, extract_tokens)
            .map_err(|source| PageFetchError::Unavailable {
                page: self.number,
                source,
            })
    }

    #[instrument(skip(self), fields(page = self.number))]
    async fn draw_operators(&self) -> Result<Vec<DrawOperator>, PageFetchError> {
        self.document
            .with_page(self.number, extract_operators)
            .map_err(|source| PageFetchError::Unavailable {
                page: self.number,
                source,
            })
    }
}

struct Segment {
    text: String,
    left: f32,
    bottom: f32,
    right: f32,
    top: f32,
}

impl Segment {
    fn height(&self) -> f32 {
        self.top - self.bottom
    }

    fn shares_baseline(&self, other: &Segment) -> bool {
        let tolerance = (self.height().min(other.height()) * 0.5).max(1.0);
        (self.bottom - other.bottom).abs() <= tolerance
    }
}

fn extract_tokens(page: &PdfPage<'_>) -> Result<Vec<TextToken>> {
    let text = page.text().context("failed to extract page text")?;
    let segments: Vec<Segment> = text
        .segments()
        .iter()
        .map(|segment| {
            let bounds = segment.bounds();
            Segment {
                text: segment.text(),
                left: bounds.left().value,
                bottom: bounds.bottom().value,
                right: bounds.right().value,
                top: bounds.top().value,
            }
        })
        .collect();

    let tokens = segments
        .iter()
        .enumerate()
        .map(|(idx, segment)| {
            let ends_line = segments
                .get(idx + 1)
                .map_or(true, |next| !segment.shares_baseline(next));
            TextToken::new(
                segment.text.clone(),
                (segment.left, segment.bottom),
                (segment.right - segment.left, segment.height()),
                ends_line,
            )
        })
        .collect();
    Ok(tokens)
}

fn extract_operators(page: &PdfPage<'_>) -> Result<Vec<DrawOperator>> {
    let mut operators = Vec::new();
    for object in page.objects().iter() {
        let opcode = match object.object_type() {
            PdfPageObjectType::Image => OpCode::PaintImage,
            PdfPageObjectType::Text => OpCode::ShowText,
            PdfPageObjectType::Path => OpCode::PaintPath,
            _ => OpCode::Other,
        };
        let bounds = match object.bounds() {
            Ok(bounds) => bounds,
            Err(err) => {
                warn!(?err, ?opcode, "failed to resolve page object bounds");
                continue;
            }
        };
        let left = bounds.left().value;
        let bottom = bounds.bottom().value;
        operators.push(DrawOperator::new(
            opcode,
            vec![
                left,
                bottom,
                bounds.right().value - left,
                bounds.top().value - bottom,
            ],
        ));
    }
    Ok(operators)
}

fn bind_pdfium_from_env() -> Option<Pdfium> {
    match env::var(LIBRARY_PATH_ENV) {
        Ok(path) if !path.is_empty() => match Pdfium::bind_to_library(&path) {
            Ok(bindings) => Some(Pdfium::new(bindings)),
            Err(err) => {
                warn!("failed to load pdfium from {}={}: {}", LIBRARY_PATH_ENV, path, err);
                None
            }
        },
        _ => None,
    }
}

fn bind_pdfium_default() -> Result<Pdfium> {
    let mut errors = Vec::new();

    let cwd_path = Pdfium::pdfium_platform_library_name_at_path("./");

    match Pdfium::bind_to_library(&cwd_path) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("{}: {}", cwd_path.display(), err));
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(err) => {
            errors.push(format!("system: {err}"));
            Err(anyhow!(
                "failed to bind to a pdfium library; set {} or install it ({})",
                LIBRARY_PATH_ENV,
                errors.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(bottom: f32, top: f32) -> Segment {
        Segment {
            text: String::new(),
            left: 0.0,
            bottom,
            right: 10.0,
            top,
        }
    }

    #[test]
    fn segments_on_the_same_baseline_share_a_line() {
        assert!(segment(700.0, 712.0).shares_baseline(&segment(700.4, 711.0)));
        assert!(!segment(700.0, 712.0).shares_baseline(&segment(686.0, 698.0)));
    }

    #[test]
    fn tiny_glyphs_still_tolerate_jitter() {
        assert!(segment(100.0, 100.5).shares_baseline(&segment(100.8, 101.2)));
    }
}
