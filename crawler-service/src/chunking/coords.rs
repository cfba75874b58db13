//! Chunk-ID coordinate codecs.
//!
//! Each source encodes the position of a chunk in its own native
//! coordinates. Encodings are plain strings so they survive any transport;
//! parsing failures surface as `Malformed` and are never retried.

use service_core::error::AppError;

fn malformed(kind: &str, raw: &str) -> AppError {
    AppError::Malformed(anyhow::anyhow!("invalid {} chunk id: {}", kind, raw))
}

/// Google Docs: paragraph index within the body plus byte offset within the
/// paragraph, where each word contributes its length + 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocsCoords {
    pub start_paragraph: usize,
    pub start_offset: usize,
    pub end_paragraph: usize,
    pub end_offset: usize,
}

impl DocsCoords {
    pub fn encode(&self) -> String {
        format!(
            "StartParagraph:{}-StartOffset:{}-EndParagraph:{}-EndOffset:{}",
            self.start_paragraph, self.start_offset, self.end_paragraph, self.end_offset
        )
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let mut values = [0usize; 4];
        let labels = ["StartParagraph", "StartOffset", "EndParagraph", "EndOffset"];
        let parts: Vec<&str> = raw.split('-').collect();
        if parts.len() != 4 {
            return Err(malformed("docs", raw));
        }
        for (i, part) in parts.iter().enumerate() {
            let value = part
                .strip_prefix(labels[i])
                .and_then(|rest| rest.strip_prefix(':'))
                .and_then(|v| v.parse().ok())
                .ok_or_else(|| malformed("docs", raw))?;
            values[i] = value;
        }
        Ok(Self {
            start_paragraph: values[0],
            start_offset: values[1],
            end_paragraph: values[2],
            end_offset: values[3],
        })
    }
}

/// Google Slides: slide index plus byte offset within the slide, same
/// word-length convention as Docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlidesCoords {
    pub start_slide: usize,
    pub start_offset: usize,
    pub end_slide: usize,
    pub end_offset: usize,
}

impl SlidesCoords {
    pub fn encode(&self) -> String {
        format!(
            "{}-{}-{}-{}",
            self.start_slide, self.start_offset, self.end_slide, self.end_offset
        )
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let parts: Vec<usize> = raw
            .split('-')
            .map(|p| p.parse::<usize>())
            .collect::<Result<_, _>>()
            .map_err(|_| malformed("slides", raw))?;
        if parts.len() != 4 {
            return Err(malformed("slides", raw));
        }
        Ok(Self {
            start_slide: parts[0],
            start_offset: parts[1],
            end_slide: parts[2],
            end_offset: parts[3],
        })
    }
}

/// Notion: block IDs plus word offsets within the first and last block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotionCoords {
    pub start_block: String,
    pub start_offset: usize,
    pub end_block: String,
    pub end_offset: usize,
}

impl NotionCoords {
    pub fn encode(&self) -> String {
        format!(
            "start_block={};start_offset={};end_block={};end_offset={}",
            self.start_block, self.start_offset, self.end_block, self.end_offset
        )
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let mut start_block = None;
        let mut start_offset = None;
        let mut end_block = None;
        let mut end_offset = None;

        for field in raw.split(';') {
            let (key, value) = field.split_once('=').ok_or_else(|| malformed("notion", raw))?;
            match key {
                "start_block" => start_block = Some(value.to_string()),
                "start_offset" => {
                    start_offset = Some(value.parse().map_err(|_| malformed("notion", raw))?)
                }
                "end_block" => end_block = Some(value.to_string()),
                "end_offset" => {
                    end_offset = Some(value.parse().map_err(|_| malformed("notion", raw))?)
                }
                _ => return Err(malformed("notion", raw)),
            }
        }

        match (start_block, start_offset, end_block, end_offset) {
            (Some(start_block), Some(start_offset), Some(end_block), Some(end_offset)) => {
                Ok(Self {
                    start_block,
                    start_offset,
                    end_block,
                    end_offset,
                })
            }
            _ => Err(malformed("notion", raw)),
        }
    }
}

/// Gmail: rune offsets into the decoded message body, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GmailCoords {
    pub start: usize,
    pub end: usize,
}

impl GmailCoords {
    pub fn encode(&self) -> String {
        format!("start:{}-end:{}", self.start, self.end)
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let rest = raw.strip_prefix("start:").ok_or_else(|| malformed("gmail", raw))?;
        let (start, end) = rest.split_once("-end:").ok_or_else(|| malformed("gmail", raw))?;
        Ok(Self {
            start: start.parse().map_err(|_| malformed("gmail", raw))?,
            end: end.parse().map_err(|_| malformed("gmail", raw))?,
        })
    }
}

/// Microsoft Word/PowerPoint: inclusive word indices over the whole
/// document's word list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfficeCoords {
    pub start: usize,
    pub end: usize,
}

impl OfficeCoords {
    pub fn encode(&self) -> String {
        format!("startoffset:{}-endoffset:{}", self.start, self.end)
    }

    pub fn parse(raw: &str) -> Result<Self, AppError> {
        let rest = raw
            .strip_prefix("startoffset:")
            .ok_or_else(|| malformed("office", raw))?;
        let (start, end) = rest
            .split_once("-endoffset:")
            .ok_or_else(|| malformed("office", raw))?;
        Ok(Self {
            start: start.parse().map_err(|_| malformed("office", raw))?,
            end: end.parse().map_err(|_| malformed("office", raw))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docs_round_trip() {
        let coords = DocsCoords {
            start_paragraph: 2,
            start_offset: 17,
            end_paragraph: 5,
            end_offset: 240,
        };
        let encoded = coords.encode();
        assert_eq!(
            encoded,
            "StartParagraph:2-StartOffset:17-EndParagraph:5-EndOffset:240"
        );
        assert_eq!(DocsCoords::parse(&encoded).unwrap(), coords);
    }

    #[test]
    fn docs_rejects_garbage() {
        assert!(DocsCoords::parse("StartParagraph:2-StartOffset:17").is_err());
        assert!(DocsCoords::parse("start:0-end:100").is_err());
        assert!(DocsCoords::parse("StartParagraph:x-StartOffset:0-EndParagraph:0-EndOffset:0").is_err());
    }

    #[test]
    fn slides_round_trip() {
        let coords = SlidesCoords {
            start_slide: 0,
            start_offset: 0,
            end_slide: 3,
            end_offset: 52,
        };
        assert_eq!(coords.encode(), "0-0-3-52");
        assert_eq!(SlidesCoords::parse("0-0-3-52").unwrap(), coords);
        assert!(SlidesCoords::parse("0-0-3").is_err());
        assert!(SlidesCoords::parse("a-b-c-d").is_err());
    }

    #[test]
    fn notion_round_trip() {
        let coords = NotionCoords {
            start_block: "abc123_properties".to_string(),
            start_offset: 0,
            end_block: "def456".to_string(),
            end_offset: 9,
        };
        let encoded = coords.encode();
        assert_eq!(
            encoded,
            "start_block=abc123_properties;start_offset=0;end_block=def456;end_offset=9"
        );
        assert_eq!(NotionCoords::parse(&encoded).unwrap(), coords);
        assert!(NotionCoords::parse("start_block=a;start_offset=0").is_err());
    }

    #[test]
    fn gmail_round_trip() {
        let coords = GmailCoords { start: 1000, end: 2000 };
        assert_eq!(coords.encode(), "start:1000-end:2000");
        assert_eq!(GmailCoords::parse("start:1000-end:2000").unwrap(), coords);
        assert!(GmailCoords::parse("1000-2000").is_err());
        assert!(GmailCoords::parse("start:a-end:b").is_err());
    }

    #[test]
    fn office_round_trip() {
        let coords = OfficeCoords { start: 320, end: 719 };
        assert_eq!(coords.encode(), "startoffset:320-endoffset:719");
        assert_eq!(
            OfficeCoords::parse("startoffset:320-endoffset:719").unwrap(),
            coords
        );
        assert!(OfficeCoords::parse("startoffset:320").is_err());
    }
}
