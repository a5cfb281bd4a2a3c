use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;

use crate::parsed::{ParsedResponse, ResponseFormat};

/// Interpret `raw` as the declared format.
///
/// Generative backends often wrap structured output in markdown code
/// fences; a fenced block matching the declared format is extracted before
/// parsing, otherwise the raw text is used verbatim. Malformed input
/// produces the `ParseError` variant — this function never fails toward
/// the caller.
pub fn parse(raw: &str, format: ResponseFormat) -> ParsedResponse {
    match format {
        ResponseFormat::Text => ParsedResponse::Text {
            raw: raw.to_string(),
        },
        ResponseFormat::Json => {
            let candidate = extract_fenced_block(raw, "json");
            match serde_json::from_str::<Value>(&candidate) {
                Ok(value) => ParsedResponse::Json {
                    raw: raw.to_string(),
                    value,
                },
                Err(error) => ParsedResponse::ParseError {
                    raw: raw.to_string(),
                    expected: ResponseFormat::Json,
                    detail: error.to_string(),
                },
            }
        }
        ResponseFormat::Xml => {
            let candidate = extract_fenced_block(raw, "xml");
            match scan_xml_document(&candidate) {
                Ok(root_tag) => ParsedResponse::Xml {
                    raw: raw.to_string(),
                    document: candidate,
                    root_tag,
                },
                Err(detail) => ParsedResponse::ParseError {
                    raw: raw.to_string(),
                    expected: ResponseFormat::Xml,
                    detail,
                },
            }
        }
    }
}

/// Extract the contents of a ```<language> fenced block, falling back to a
/// bare ``` fence, falling back to the trimmed text itself.
pub fn extract_fenced_block(text: &str, language: &str) -> String {
    let fence = format!("```{}", language);
    if let Some(start) = text.find(&fence) {
        let rest = &text[start + fence.len()..];
        let rest = rest.strip_prefix('\n').unwrap_or(rest);
        if let Some(end) = rest.find("```") {
            return rest[..end].trim().to_string();
        }
    }

    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        // Skip an optional language tag on the first line.
        let rest = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest,
        };
        if let Some(content) = rest.strip_suffix("```") {
            return content.trim().to_string();
        }
    }

    trimmed.to_string()
}

/// Event-parse an XML document to completion, returning the local name of
/// its root element. Local names keep the scan namespace-tolerant.
pub(crate) fn scan_xml_document(text: &str) -> Result<String, String> {
    let mut reader = Reader::from_str(text);
    let mut buf = Vec::new();
    let mut root_tag: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                if root_tag.is_none() {
                    let local_name = e.local_name();
                    let name = std::str::from_utf8(local_name.as_ref())
                        .map_err(|e| format!("invalid element name: {}", e))?;
                    root_tag = Some(name.to_string());
                }
            }
            Ok(Event::Eof) => break,
            Err(error) => return Err(format!("xml parse error: {}", error)),
            _ => {}
        }
        buf.clear();
    }

    root_tag.ok_or_else(|| "document has no root element".to_string())
}
