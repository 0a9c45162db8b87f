use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::{debug, warn};

const FORM_FEED: char = '\u{000c}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Splits a source document into numbered pages of raw text.
///
/// Pages without enough text are skipped but never renumbered, so a blank
/// page 2 still leaves the next page as page 3. An extractor that finds no
/// usable page at all returns [`IngestError::NoReadableText`].
pub trait DocumentExtractor: Send + Sync {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Clone, Copy)]
pub struct LopdfExtractor {
    pub min_text_length: usize,
}

impl DocumentExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document = Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            match document.extract_text(&[page_no]) {
                Ok(text) => keep_page(&mut pages, page_no, text, self.min_text_length),
                Err(error) => warn!(page = page_no, error = %error, "failed to extract page text"),
            }
        }

        finish(pages, path)
    }
}

/// Plain-text manuals, paginated on form feeds.
#[derive(Debug, Clone, Copy)]
pub struct PlainTextExtractor {
    pub min_text_length: usize,
}

impl DocumentExtractor for PlainTextExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let bytes = std::fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes);

        let mut pages = Vec::new();
        for (index, page) in text.split(FORM_FEED).enumerate() {
            keep_page(&mut pages, (index + 1) as u32, page.to_string(), self.min_text_length);
        }

        finish(pages, path)
    }
}

/// Picks an extractor from the file extension.
#[derive(Debug, Clone, Copy)]
pub struct FileExtractor {
    pdf: LopdfExtractor,
    text: PlainTextExtractor,
}

impl FileExtractor {
    pub fn new(min_text_length: usize) -> Self {
        Self {
            pdf: LopdfExtractor { min_text_length },
            text: PlainTextExtractor { min_text_length },
        }
    }
}

impl DocumentExtractor for FileExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let extracted = match extension.as_str() {
            "pdf" => self.pdf.extract_pages(path),
            "txt" => self.text.extract_pages(path),
            _ => return Err(IngestError::UnsupportedFile(path.display().to_string())),
        };

        // A file lopdf cannot parse has no readable text as far as callers care.
        extracted.map_err(|error| match error {
            IngestError::PdfParse(details) => {
                IngestError::NoReadableText(format!("{} ({details})", path.display()))
            }
            other => other,
        })
    }
}

fn keep_page(pages: &mut Vec<PageText>, number: u32, text: String, min_text_length: usize) {
    let length = text.trim().chars().count();
    if length == 0 {
        warn!(page = number, "no text extracted from page");
    } else if length < min_text_length {
        debug!(page = number, length, "page text below minimum length");
    } else {
        pages.push(PageText { number, text });
    }
}

fn finish(pages: Vec<PageText>, path: &Path) -> Result<Vec<PageText>, IngestError> {
    if pages.is_empty() {
        return Err(IngestError::NoReadableText(path.display().to_string()));
    }

    debug!(path = %path.display(), pages = pages.len(), "extracted page text");
    Ok(pages)
}
