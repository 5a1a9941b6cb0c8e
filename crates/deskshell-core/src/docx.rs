//! Plain-text extraction from Word (OOXML) documents.

use std::io::{Cursor, Read};

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::BridgeError;

const DOCUMENT_PART: &str = "word/document.xml";

/// Pull the raw text out of a `.docx` package.
///
/// Paragraphs are separated by a blank line; tabs and manual breaks inside runs are kept.
/// Formatting, headers and footers are dropped.
pub fn extract_text(bytes: &[u8]) -> Result<String, BridgeError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| BridgeError::ReadError(format!("not a Word document: {}", e)))?;

    let mut xml = String::new();
    archive
        .by_name(DOCUMENT_PART)
        .map_err(|e| BridgeError::ReadError(format!("missing {}: {}", DOCUMENT_PART, e)))?
        .read_to_string(&mut xml)
        .map_err(|e| BridgeError::ReadError(format!("failed to read {}: {}", DOCUMENT_PART, e)))?;

    text_from_document_xml(&xml)
}

fn text_from_document_xml(xml: &str) -> Result<String, BridgeError> {
    let mut reader = Reader::from_str(xml);
    let mut out = String::new();
    // open paragraphs, innermost last; text boxes nest paragraphs inside runs
    let mut paragraphs: Vec<String> = Vec::new();
    let mut run_depth = 0usize;
    let mut in_text = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| BridgeError::ReadError(format!("malformed document: {}", e)))?;
        match event {
            Event::Start(e) => match e.local_name().as_ref() {
                b"r" => run_depth += 1,
                b"t" => in_text = run_depth > 0,
                b"p" => paragraphs.push(String::new()),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" if run_depth > 0 => push_text(&mut paragraphs, &mut out, "\t"),
                b"br" | b"cr" if run_depth > 0 => push_text(&mut paragraphs, &mut out, "\n"),
                b"p" => push_text(&mut paragraphs, &mut out, "\n\n"),
                _ => {}
            },
            Event::Text(t) if in_text => {
                let text = t
                    .unescape()
                    .map_err(|e| BridgeError::ReadError(format!("malformed text: {}", e)))?;
                push_text(&mut paragraphs, &mut out, &text);
            }
            Event::CData(t) if in_text => {
                push_text(&mut paragraphs, &mut out, &String::from_utf8_lossy(&t));
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"r" => run_depth = run_depth.saturating_sub(1),
                b"p" => {
                    if let Some(mut paragraph) = paragraphs.pop() {
                        paragraph.push_str("\n\n");
                        push_text(&mut paragraphs, &mut out, &paragraph);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    // unterminated paragraphs still count
    while let Some(paragraph) = paragraphs.pop() {
        push_text(&mut paragraphs, &mut out, &paragraph);
    }

    Ok(out)
}

/// Append to the innermost open paragraph, or to the document at top level
fn push_text(paragraphs: &mut [String], out: &mut String, text: &str) {
    match paragraphs.last_mut() {
        Some(paragraph) => paragraph.push_str(text),
        None => out.push_str(text),
    }
}
