//! Plain-text extraction from downloaded Office documents.

pub mod docx;
pub mod pptx;

pub use docx::docx_words;
pub use pptx::pptx_words;

/// MIME types the OneDrive connector downloads and extracts.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const PPTX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const LEGACY_DOC_MIME: &str = "application/msword";
pub const LEGACY_PPT_MIME: &str = "application/vnd.ms-powerpoint";

/// Whether the crawler can extract text from this MIME type.
pub fn is_supported_office_mime(mime: &str) -> bool {
    matches!(mime, DOCX_MIME | PPTX_MIME | LEGACY_DOC_MIME | LEGACY_PPT_MIME)
}

/// Whether the MIME routes to the word-processing extractor (as opposed to
/// the presentation extractor).
pub fn is_word_mime(mime: &str) -> bool {
    matches!(mime, DOCX_MIME | LEGACY_DOC_MIME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_allow_list() {
        assert!(is_supported_office_mime(DOCX_MIME));
        assert!(is_supported_office_mime(PPTX_MIME));
        assert!(is_supported_office_mime(LEGACY_DOC_MIME));
        assert!(is_supported_office_mime(LEGACY_PPT_MIME));
        assert!(!is_supported_office_mime("application/pdf"));
        assert!(!is_supported_office_mime("image/png"));
    }

    #[test]
    fn word_vs_presentation_routing() {
        assert!(is_word_mime(DOCX_MIME));
        assert!(is_word_mime(LEGACY_DOC_MIME));
        assert!(!is_word_mime(PPTX_MIME));
    }
}
