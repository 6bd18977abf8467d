//! Plain-text extraction from regulation PDFs.
//!
//! Each document is parsed with `lopdf`, its pages are extracted in order, and the non-empty page
//! texts are joined into a single corpus entry. Multiple documents are combined with
//! [`aggregate`], which is what the review pipeline hands to the analysis service.

use log::debug;
use lopdf::Document;

use crate::error::{ReportError, Result};

/// Separator placed between page texts of a single document.
pub const PAGE_SEPARATOR: &str = "\n\n";

/// Separator placed between the texts of different documents.
pub const DOCUMENT_SEPARATOR: &str = "\n\n---\n\n";

/// Text extracted from one regulation document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegulationText {
    pages: Vec<String>,
    text: String,
}

impl RegulationText {
    /// Builds the combined text from raw page strings, honouring the character budget.
    pub fn from_pages(pages: Vec<String>, max_chars: usize) -> Self {
        let text = join_pages(&pages, max_chars);
        Self { pages, text }
    }

    /// Raw text of every page that produced any text, in page order and before trimming.
    pub fn pages(&self) -> &[String] {
        &self.pages
    }

    /// Joined, trimmed and length-capped text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the document produced no text at all.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Consumes the value and returns the combined text.
    pub fn into_text(self) -> String {
        self.text
    }
}

/// Extracts the combined text of a PDF document, capped at `max_chars` characters.
///
/// Fails with [`ReportError::MalformedDocument`] when the bytes are not a parseable PDF.
pub fn extract(document: &[u8], max_chars: usize) -> Result<String> {
    extract_regulation(document, max_chars).map(RegulationText::into_text)
}

/// Like [`extract`], but keeps the per-page texts around.
pub fn extract_regulation(document: &[u8], max_chars: usize) -> Result<RegulationText> {
    let parsed =
        Document::load_mem(document).map_err(|source| ReportError::MalformedDocument { source })?;

    let pages = parsed.get_pages();
    let mut texts = Vec::with_capacity(pages.len());

    for &page_number in pages.keys() {
        match parsed.extract_text(&[page_number]) {
            Ok(text) if !text.trim().is_empty() => texts.push(text),
            Ok(_) => debug!("Page {} has no extractable text", page_number),
            Err(err) => debug!("Skipping page {}: {}", page_number, err),
        }
    }

    debug!(
        "Extracted text from {} of {} pages",
        texts.len(),
        pages.len()
    );

    Ok(RegulationText::from_pages(texts, max_chars))
}

/// Trims every page, drops the empty ones, joins the rest with a blank line and applies the
/// character budget to the trimmed result.
pub fn join_pages<S: AsRef<str>>(pages: &[S], max_chars: usize) -> String {
    let joined = pages
        .iter()
        .map(|page| page.as_ref().trim())
        .filter(|page| !page.is_empty())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR);
    truncate_chars(joined.trim(), max_chars).to_owned()
}

/// Combines the texts of several documents into one corpus.
///
/// Empty texts are left out, the rest is joined with a `---` line between blank lines and the
/// result is trimmed. An empty return value means nothing could be extracted.
pub fn aggregate<S: AsRef<str>>(texts: &[S]) -> String {
    texts
        .iter()
        .map(|text| text.as_ref())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR)
        .trim()
        .to_owned()
}

/// Returns the prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
