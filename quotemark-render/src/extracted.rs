//! Documents whose pages were extracted ahead of time and stored as JSON.

use std::fs;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use quotemark_core::{
    DocumentHandle, DocumentOpenError, DocumentRef, DocumentSource, DrawOperator, PageContent,
    PageFetchError, PageHandle, TextToken,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub pages: Vec<ExtractedPage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub height: f32,
    #[serde(default)]
    pub tokens: Vec<TextToken>,
    #[serde(default)]
    pub operators: Vec<DrawOperator>,
}

impl From<ExtractedPage> for PageContent {
    fn from(page: ExtractedPage) -> Self {
        PageContent {
            height: page.height,
            tokens: page.tokens,
            operators: page.operators,
        }
    }
}

impl ExtractedDocument {
    pub fn from_json(raw: &[u8]) -> anyhow::Result<Self> {
        serde_json::from_slice(raw).context("failed to decode extracted document")
    }
}

/// Serves [`ExtractedDocument`] JSON files or buffers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractedDocumentSource;

#[async_trait]
impl DocumentSource for ExtractedDocumentSource {
    #[instrument(skip_all, fields(reference = %reference))]
    async fn open(
        &self,
        reference: &DocumentRef,
    ) -> Result<Arc<dyn DocumentHandle>, DocumentOpenError> {
        let raw = match reference {
            DocumentRef::Path(path) => {
                fs::read(path).map_err(|err| DocumentOpenError::Unreachable {
                    reference: reference.to_string(),
                    source: anyhow!(err),
                })?
            }
            DocumentRef::Bytes { data, .. } => data.to_vec(),
        };
        let document =
            ExtractedDocument::from_json(&raw).map_err(|err| DocumentOpenError::Corrupt {
                reference: reference.to_string(),
                reason: format!("{:#}", err),
            })?;
        Ok(Arc::new(ExtractedHandle {
            pages: document.pages.into_iter().map(Arc::new).collect(),
        }))
    }
}

struct ExtractedHandle {
    pages: Vec<Arc<ExtractedPage>>,
}

impl DocumentHandle for ExtractedHandle {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&self, page: usize) -> Result<Arc<dyn PageHandle>, PageFetchError> {
        let data = page
            .checked_sub(1)
            .and_then(|index| self.pages.get(index))
            .ok_or(PageFetchError::OutOfRange {
                page,
                page_count: self.pages.len(),
            })?;
        Ok(Arc::new(ExtractedPageHandle {
            number: page,
            data: Arc::clone(data),
        }))
    }
}

struct ExtractedPageHandle {
    number: usize,
    data: Arc<ExtractedPage>,
}

#[async_trait]
impl PageHandle for ExtractedPageHandle {
    fn page_number(&self) -> usize {
        self.number
    }

    fn height(&self) -> f32 {
        self.data.height
    }

    async fn text_tokens(&self) -> Result<Vec<TextToken>, PageFetchError> {
        Ok(self.data.tokens.clone())
    }

    async fn draw_operators(&self) -> Result<Vec<DrawOperator>, PageFetchError> {
        Ok(self.data.operators.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotemark_core::OpCode;
    use tempfile::tempdir;

    const SAMPLE: &str = r#"{
        "pages": [
            {
                "height": 792.0,
                "tokens": [
                    {"text": "Hello", "x": 10.0, "y": 700.0, "width": 50.0, "height": 12.0, "ends_line": true}
                ],
                "operators": [
                    {"opcode": "PaintImage", "args": [0.0, 0.0, 100.0, 100.0]}
                ]
            },
            {"height": 600.0}
        ]
    }"#;

    #[tokio::test]
    async fn opens_json_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.json");
        std::fs::write(&path, SAMPLE).unwrap();

        let document = ExtractedDocumentSource
            .open(&DocumentRef::Path(path))
            .await
            .unwrap();
        assert_eq!(document.page_count(), 2);

        let first = document.page(1).unwrap();
        assert_eq!(first.height(), 792.0);
        assert_eq!(first.text_tokens().await.unwrap()[0].text, "Hello");
        assert_eq!(
            first.draw_operators().await.unwrap()[0].opcode,
            OpCode::PaintImage
        );

        let second = document.page(2).unwrap();
        assert!(second.text_tokens().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn page_numbers_are_one_based() {
        let document = ExtractedDocumentSource
            .open(&DocumentRef::Bytes {
                name: "inline".to_owned(),
                data: Arc::from(SAMPLE.as_bytes()),
            })
            .await
            .unwrap();
        assert!(matches!(
            document.page(0),
            Err(PageFetchError::OutOfRange { page: 0, page_count: 2 })
        ));
        assert!(document.page(3).is_err());
        assert_eq!(document.page(2).unwrap().page_number(), 2);
    }

    #[tokio::test]
    async fn missing_and_corrupt_files_are_distinguished() {
        let dir = tempdir().unwrap();
        let missing = ExtractedDocumentSource
            .open(&DocumentRef::Path(dir.path().join("absent.json")))
            .await;
        assert!(matches!(missing, Err(DocumentOpenError::Unreachable { .. })));

        let corrupt = ExtractedDocumentSource
            .open(&DocumentRef::Bytes {
                name: "broken".to_owned(),
                data: Arc::from(&b"{not json"[..]),
            })
            .await;
        assert!(matches!(corrupt, Err(DocumentOpenError::Corrupt { .. })));
    }
}
