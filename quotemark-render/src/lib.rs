mod extracted;
#[cfg(feature = "pdf")]
mod pdfium;

pub use extracted::{ExtractedDocument, ExtractedDocumentSource, ExtractedPage};
#[cfg(feature = "pdf")]
pub use pdfium::PdfiumDocumentSource;
