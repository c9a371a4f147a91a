//! Output file typing from the `Content-Type` header.

use std::fmt;

use serde::Serialize;

/// Kind of document written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// `application/pdf` and friends.
    Pdf,
    /// Any XML content type.
    Xml,
    /// Everything else, including a missing header.
    Text,
}

impl FileKind {
    /// Classifies a `Content-Type` header value.
    ///
    /// Matching is a case-insensitive substring test; `pdf` wins over `xml`.
    #[must_use]
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let lowered = content_type.unwrap_or_default().to_ascii_lowercase();
        if lowered.contains("pdf") {
            Self::Pdf
        } else if lowered.contains("xml") {
            Self::Xml
        } else {
            Self::Text
        }
    }

    /// File extension without the dot.
    #[must_use]
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Xml => "xml",
            Self::Text => "txt",
        }
    }

    /// Content type to report when serving a stored file.
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Xml => "application/xml",
            Self::Text => "text/plain",
        }
    }

    /// Every kind, in the order stored files are looked up.
    #[must_use]
    pub fn all() -> [Self; 3] {
        [Self::Pdf, Self::Xml, Self::Text]
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_content_types() {
        assert_eq!(FileKind::from_content_type(Some("application/pdf")), FileKind::Pdf);
        assert_eq!(
            FileKind::from_content_type(Some("Application/PDF; charset=binary")),
            FileKind::Pdf
        );
    }

    #[test]
    fn test_xml_content_types() {
        assert_eq!(FileKind::from_content_type(Some("text/xml")), FileKind::Xml);
        assert_eq!(
            FileKind::from_content_type(Some("application/xhtml+XML")),
            FileKind::Xml
        );
    }

    #[test]
    fn test_other_and_missing_content_types_fall_back_to_text() {
        assert_eq!(FileKind::from_content_type(Some("text/html")), FileKind::Text);
        assert_eq!(FileKind::from_content_type(None), FileKind::Text);
        assert_eq!(FileKind::Text.extension(), "txt");
    }
}
