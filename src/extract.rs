//! Text extraction from uploaded documents.
//!
//! Supported kinds:
//! - **PDF** via `pdf-extract` (guarded against panics on malformed fonts)
//! - **Plain text**, decoded as lossy UTF-8
//! - **Email** (`message/rfc822` / `.eml`) via `mail-parser`

use std::sync::LazyLock;

use mail_parser::MessageParser;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::ExtractionError;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static whitespace regex"));

/// An uploaded document plus its media-type hints.
#[derive(Debug, Clone)]
pub struct Document {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub filename: Option<String>,
}

impl Document {
    pub fn new(bytes: Vec<u8>, content_type: Option<String>, filename: Option<String>) -> Self {
        Self {
            bytes,
            content_type,
            filename,
        }
    }
}

/// Document formats we know how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    PlainText,
    Email,
}

impl DocumentKind {
    /// Classify a document from its content type and file extension.
    ///
    /// Returns `None` for anything we can't read.
    pub fn detect(content_type: Option<&str>, filename: Option<&str>) -> Option<Self> {
        let content_type = content_type.unwrap_or_default().to_lowercase();
        let filename = filename.unwrap_or_default().to_lowercase();

        if content_type.contains("pdf") || filename.ends_with(".pdf") {
            Some(Self::Pdf)
        } else if content_type.starts_with("message/rfc822") || filename.ends_with(".eml") {
            Some(Self::Email)
        } else if content_type.starts_with("text") || filename.ends_with(".txt") {
            Some(Self::PlainText)
        } else {
            None
        }
    }

    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::PlainText => "text",
            Self::Email => "email",
        }
    }
}

/// Capability: produce plain text from a document.
///
/// Implementations are synchronous; callers run them on the blocking pool.
pub trait TextSource: Send + Sync {
    fn extract(&self, document: &Document) -> Result<String, ExtractionError>;
}

/// Default extractor covering every [`DocumentKind`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor;

impl DocumentExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl TextSource for DocumentExtractor {
    fn extract(&self, document: &Document) -> Result<String, ExtractionError> {
        let kind = DocumentKind::detect(
            document.content_type.as_deref(),
            document.filename.as_deref(),
        )
        .ok_or_else(|| {
            ExtractionError::Unsupported(
                document
                    .content_type
                    .clone()
                    .or_else(|| document.filename.clone())
                    .unwrap_or_else(|| "unknown".into()),
            )
        })?;

        debug!(kind = kind.label(), bytes = document.bytes.len(), "Extracting document text");

        match kind {
            DocumentKind::Pdf => extract_pdf(&document.bytes),
            DocumentKind::PlainText => Ok(extract_plain(&document.bytes)),
            DocumentKind::Email => extract_email(&document.bytes),
        }
    }
}

fn extract_plain(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    // pdf-extract can panic on malformed fonts/glyphs.
    let text = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(bytes)
    })) {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!(error = %e, "PDF extraction failed");
            return Err(ExtractionError::Pdf(e.to_string()));
        }
        Err(_panic) => {
            warn!("PDF extraction panicked, likely malformed fonts");
            return Err(ExtractionError::Pdf(
                "extraction panicked, the PDF likely contains malformed fonts".into(),
            ));
        }
    };

    let pages: Vec<&str> = text
        .split('\u{c}')
        .map(str::trim)
        .filter(|page| !page.is_empty())
        .collect();
    Ok(pages.join("\n"))
}

fn extract_email(bytes: &[u8]) -> Result<String, ExtractionError> {
    let parsed = MessageParser::default()
        .parse(bytes)
        .ok_or_else(|| ExtractionError::Email("not a valid RFC 822 message".into()))?;

    let body = if let Some(text) = parsed.body_text(0) {
        text.trim().to_string()
    } else if let Some(html) = parsed.body_html(0) {
        strip_html(html.as_ref())
    } else {
        String::new()
    };

    Ok(match parsed.subject() {
        Some(subject) if !subject.trim().is_empty() => format!("{}\n\n{body}", subject.trim()),
        _ => body,
    })
}

/// Strip HTML tags and collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                result.push(' ');
            }
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    normalize_whitespace(&result)
}

/// Collapse whitespace runs to a single space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_by_content_type() {
        assert_eq!(
            DocumentKind::detect(Some("application/pdf"), None),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(
            DocumentKind::detect(Some("text/plain; charset=utf-8"), None),
            Some(DocumentKind::PlainText)
        );
        assert_eq!(
            DocumentKind::detect(Some("message/rfc822"), None),
            Some(DocumentKind::Email)
        );
    }

    #[test]
    fn detect_by_extension_when_content_type_is_generic() {
        assert_eq!(
            DocumentKind::detect(Some("application/octet-stream"), Some("Report.PDF")),
            Some(DocumentKind::Pdf)
        );
        assert_eq!(
            DocumentKind::detect(None, Some("mail.eml")),
            Some(DocumentKind::Email)
        );
        assert_eq!(
            DocumentKind::detect(None, Some("notes.txt")),
            Some(DocumentKind::PlainText)
        );
    }

    #[test]
    fn detect_rejects_unknown() {
        assert_eq!(DocumentKind::detect(Some("image/png"), Some("photo.png")), None);
        assert_eq!(DocumentKind::detect(None, None), None);
    }

    #[test]
    fn plain_text_is_decoded_and_trimmed() {
        let doc = Document::new(
            "  Olá, preciso de ajuda  \n".as_bytes().to_vec(),
            Some("text/plain".into()),
            None,
        );
        let text = DocumentExtractor::new().extract(&doc).unwrap();
        assert_eq!(text, "Olá, preciso de ajuda");
    }

    #[test]
    fn plain_text_tolerates_invalid_utf8() {
        let doc = Document::new(vec![b'o', b'k', 0xff, b'!'], None, Some("a.txt".into()));
        let text = DocumentExtractor::new().extract(&doc).unwrap();
        assert!(text.starts_with("ok"));
        assert!(text.ends_with('!'));
    }

    #[test]
    fn email_extracts_subject_and_body() {
        let raw = "From: alice@example.com\r\n\
                   To: support@example.com\r\n\
                   Subject: Erro no sistema\r\n\
                   Content-Type: text/plain; charset=utf-8\r\n\
                   \r\n\
                   Não consigo acessar minha conta.\r\n";
        let doc = Document::new(raw.as_bytes().to_vec(), None, Some("msg.eml".into()));
        let text = DocumentExtractor::new().extract(&doc).unwrap();
        assert!(text.starts_with("Erro no sistema"));
        assert!(text.contains("Não consigo acessar"));
    }

    #[test]
    fn invalid_pdf_is_an_error() {
        let doc = Document::new(b"definitely not a pdf".to_vec(), Some("application/pdf".into()), None);
        let result = DocumentExtractor::new().extract(&doc);
        assert!(matches!(result, Err(ExtractionError::Pdf(_))));
    }

    #[test]
    fn unsupported_kind_is_an_error() {
        let doc = Document::new(vec![1, 2, 3], Some("image/png".into()), None);
        let result = DocumentExtractor::new().extract(&doc);
        assert!(matches!(result, Err(ExtractionError::Unsupported(_))));
    }

    #[test]
    fn strip_html_removes_tags() {
        assert_eq!(
            strip_html("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic"
        );
    }

    #[test]
    fn normalize_collapses_runs() {
        assert_eq!(normalize_whitespace("  a \n\n b\t c  "), "a b c");
    }
}
