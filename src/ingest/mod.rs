pub mod document;

pub use document::{parse_extracted_document, DocumentError, ExtractedDocument, ExtractedLineItem};
