//! Word-document text extraction via docx-rs.

use service_core::error::AppError;

/// Extract the document's text as a flat word list, walking paragraphs and
/// runs in document order.
pub fn docx_words(bytes: &[u8]) -> Result<Vec<String>, AppError> {
    let docx = docx_rs::read_docx(bytes)
        .map_err(|e| AppError::Malformed(anyhow::anyhow!("Failed to parse DOCX: {}", e)))?;

    let mut words = Vec::new();
    for child in &docx.document.children {
        if let docx_rs::DocumentChild::Paragraph(para) = child {
            let mut paragraph_text = String::new();
            for child in &para.children {
                if let docx_rs::ParagraphChild::Run(run) = child {
                    for child in &run.children {
                        if let docx_rs::RunChild::Text(t) = child {
                            if !paragraph_text.is_empty() {
                                paragraph_text.push(' ');
                            }
                            paragraph_text.push_str(&t.text);
                        }
                    }
                }
            }
            words.extend(
                paragraph_text
                    .split_whitespace()
                    .map(|w| w.to_string()),
            );
        }
    }

    Ok(words)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docx_rs::{Docx, Paragraph, Run};

    fn build_docx(paragraphs: &[&str]) -> Vec<u8> {
        let mut docx = Docx::new();
        for text in paragraphs {
            docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*text)));
        }
        let mut buf = std::io::Cursor::new(Vec::new());
        docx.build().pack(&mut buf).unwrap();
        buf.into_inner()
    }

    #[test]
    fn extracts_words_in_document_order() {
        let bytes = build_docx(&["quarterly revenue grew", "headcount stayed flat"]);
        let words = docx_words(&bytes).unwrap();
        assert_eq!(
            words,
            vec!["quarterly", "revenue", "grew", "headcount", "stayed", "flat"]
        );
    }

    #[test]
    fn empty_document_yields_no_words() {
        let bytes = build_docx(&[]);
        assert!(docx_words(&bytes).unwrap().is_empty());
    }

    #[test]
    fn invalid_bytes_are_malformed() {
        let err = docx_words(b"not a zip archive").unwrap_err();
        assert!(matches!(err, AppError::Malformed(_)));
    }
}
