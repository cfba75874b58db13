//! Presentation text extraction: unzip the OOXML package and pull the text
//! runs (`<a:t>`) out of each slide part in deck order.

use quick_xml::events::Event;
use quick_xml::Reader;
use service_core::error::AppError;
use std::io::{Cursor, Read};

/// Extract the deck's text as a flat word list, slides in deck order.
pub fn pptx_words(bytes: &[u8]) -> Result<Vec<String>, AppError> {
    let mut words = Vec::new();
    for slide in pptx_slides(bytes)? {
        words.extend(slide.split_whitespace().map(|w| w.to_string()));
    }
    Ok(words)
}

/// Extract per-slide text, one string per slide, in deck order.
pub fn pptx_slides(bytes: &[u8]) -> Result<Vec<String>, AppError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| AppError::Malformed(anyhow::anyhow!("Failed to open PPTX: {}", e)))?;

    // Slide parts are ppt/slides/slide{N}.xml; the archive does not
    // guarantee ordering, so sort by N.
    let mut slide_names: Vec<(usize, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slide_names.sort();

    let mut slides = Vec::with_capacity(slide_names.len());
    for (_, name) in slide_names {
        let mut xml = String::new();
        archive
            .by_name(&name)
            .map_err(|e| AppError::Malformed(anyhow::anyhow!("Missing slide part: {}", e)))?
            .read_to_string(&mut xml)
            .map_err(|e| AppError::Malformed(anyhow::anyhow!("Unreadable slide part: {}", e)))?;
        slides.push(slide_text(&xml)?);
    }

    Ok(slides)
}

/// Concatenate the contents of every `<a:t>` element in one slide's XML.
fn slide_text(xml: &str) -> Result<String, AppError> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_text_run = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"a:t" => in_text_run = true,
            Ok(Event::End(e)) if e.name().as_ref() == b"a:t" => in_text_run = false,
            Ok(Event::Text(t)) if in_text_run => {
                let run = t.unescape().map_err(|e| {
                    AppError::Malformed(anyhow::anyhow!("Bad slide XML text: {}", e))
                })?;
                if !text.is_empty() {
                    text.push(' ');
                }
                text.push_str(&run);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(AppError::Malformed(anyhow::anyhow!(
                    "Bad slide XML: {}",
                    e
                )))
            }
        }
        buf.clear();
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn slide_xml(texts: &[&str]) -> String {
        let runs: String = texts
            .iter()
            .map(|t| format!("<a:r><a:rPr/><a:t>{}</a:t></a:r>", t))
            .collect();
        format!(
            "<?xml version=\"1.0\"?><p:sld><p:cSld><p:spTree>{}</p:spTree></p:cSld></p:sld>",
            runs
        )
    }

    fn build_pptx(slides: &[&[&str]]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (i, texts) in slides.iter().enumerate() {
            zip.start_file(format!("ppt/slides/slide{}.xml", i + 1), options)
                .unwrap();
            zip.write_all(slide_xml(texts).as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn extracts_text_runs_across_slides() {
        let bytes = build_pptx(&[&["Roadmap", "2024"], &["Ship the crawler"]]);
        assert_eq!(
            pptx_words(&bytes).unwrap(),
            vec!["Roadmap", "2024", "Ship", "the", "crawler"]
        );
        assert_eq!(
            pptx_slides(&bytes).unwrap(),
            vec!["Roadmap 2024".to_string(), "Ship the crawler".to_string()]
        );
    }

    #[test]
    fn slide_order_follows_numbering_not_archive_order() {
        // Insert slide10 before slide2 in the archive.
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        zip.start_file("ppt/slides/slide10.xml", options).unwrap();
        zip.write_all(slide_xml(&["ten"]).as_bytes()).unwrap();
        zip.start_file("ppt/slides/slide2.xml", options).unwrap();
        zip.write_all(slide_xml(&["two"]).as_bytes()).unwrap();
        zip.start_file("ppt/slides/slide1.xml", options).unwrap();
        zip.write_all(slide_xml(&["one"]).as_bytes()).unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        assert_eq!(pptx_words(&bytes).unwrap(), vec!["one", "two", "ten"]);
    }

    #[test]
    fn escaped_entities_are_unescaped() {
        let bytes = build_pptx(&[&["R&amp;D budget"]]);
        assert_eq!(pptx_words(&bytes).unwrap(), vec!["R&D", "budget"]);
    }

    #[test]
    fn invalid_bytes_are_malformed() {
        assert!(matches!(
            pptx_words(b"definitely not a zip"),
            Err(AppError::Malformed(_))
        ));
    }
}
