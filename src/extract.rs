//! Per-format text extraction for uploaded documents.
//!
//! Every format works on the same in-memory byte slice; the caller never
//! hands this module a filesystem path. The format is chosen from the file
//! name's extension by [`DocumentSource::from_file_name`].

use std::io::Read;

use thiserror::Error;

/// Maximum decompressed bytes to read from `word/document.xml` (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

const DOCX_BODY_ENTRY: &str = "word/document.xml";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("DOCX extraction failed: {0}")]
    Docx(String),
    #[error("CSV extraction failed: {0}")]
    Csv(String),
}

/// The kind of document an upload holds, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentSource {
    Pdf,
    Docx,
    /// Comma-separated rows. Anything that is not `.pdf` or `.docx` lands here.
    DelimitedText,
}

impl DocumentSource {
    pub fn from_file_name(name: &str) -> Self {
        let ext = std::path::Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if ext.eq_ignore_ascii_case("pdf") {
            DocumentSource::Pdf
        } else if ext.eq_ignore_ascii_case("docx") {
            DocumentSource::Docx
        } else {
            DocumentSource::DelimitedText
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentSource::Pdf => "pdf",
            DocumentSource::Docx => "docx",
            DocumentSource::DelimitedText => "csv",
        }
    }

    pub fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        match self {
            DocumentSource::Pdf => extract_pdf(bytes),
            DocumentSource::Docx => extract_docx(bytes),
            DocumentSource::DelimitedText => extract_delimited(bytes),
        }
    }
}

/// Pages come back concatenated with no separator between them.
fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs instead of returning Err.
    let result = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes));
    match result {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
        Err(_) => Err(ExtractError::Pdf("parser panicked".to_string())),
    }
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name(DOCX_BODY_ENTRY)
        .map_err(|_| ExtractError::Docx(format!("{} not found", DOCX_BODY_ENTRY)))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(format!(
            "{} exceeds size limit ({} bytes)",
            DOCX_BODY_ENTRY, MAX_XML_ENTRY_BYTES
        )));
    }
    let paragraphs = docx_paragraphs(&doc_xml)?;
    Ok(paragraphs.join(" "))
}

/// Collects the text of every `<w:p>` element, in document order.
fn docx_paragraphs(xml: &[u8]) -> Result<Vec<String>, ExtractError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut paragraphs = Vec::new();
    let mut current: Option<String> = None;
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"p" => current = Some(String::new()),
                b"t" => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"p" => paragraphs.push(String::new()),
                b"tab" => {
                    if let Some(p) = current.as_mut() {
                        p.push('\t');
                    }
                }
                b"br" | b"cr" => {
                    if let Some(p) = current.as_mut() {
                        p.push('\n');
                    }
                }
                _ => {}
            },
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Docx(e.to_string()))?;
                if let Some(p) = current.as_mut() {
                    p.push_str(&text);
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if let Some(p) = current.take() {
                        paragraphs.push(p);
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(paragraphs)
}

/// Every cell of every row, space-joined in reading order.
fn extract_delimited(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut cells: Vec<String> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ExtractError::Csv(e.to_string()))?;
        cells.extend(record.iter().map(str::to_string));
    }
    Ok(cells.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with_body(body: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file(DOCX_BODY_ENTRY, zip::write::SimpleFileOptions::default())
                .unwrap();
            let xml = format!(
                "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
                body
            );
            zip.write_all(xml.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn dispatch_by_extension() {
        assert_eq!(DocumentSource::from_file_name("a.pdf"), DocumentSource::Pdf);
        assert_eq!(DocumentSource::from_file_name("A.PDF"), DocumentSource::Pdf);
        assert_eq!(DocumentSource::from_file_name("notes.docx"), DocumentSource::Docx);
        assert_eq!(
            DocumentSource::from_file_name("table.csv"),
            DocumentSource::DelimitedText
        );
        assert_eq!(
            DocumentSource::from_file_name("no_extension"),
            DocumentSource::DelimitedText
        );
        assert_eq!(
            DocumentSource::from_file_name("archive.docx.bak"),
            DocumentSource::DelimitedText
        );
    }

    #[test]
    fn csv_cells_are_space_joined() {
        let text = DocumentSource::DelimitedText
            .extract_text(b"a,b\nc,d\n")
            .unwrap();
        assert_eq!(text, "a b c d");
    }

    #[test]
    fn csv_allows_ragged_rows_and_quotes() {
        let text = DocumentSource::DelimitedText
            .extract_text(b"name,city\n\"Doe, Jane\",Paris,extra\nsolo\n")
            .unwrap();
        assert_eq!(text, "name city Doe, Jane Paris extra solo");
    }

    #[test]
    fn empty_csv_is_empty_text() {
        assert_eq!(DocumentSource::DelimitedText.extract_text(b"").unwrap(), "");
    }

    #[test]
    fn csv_rejects_invalid_utf8() {
        let err = DocumentSource::DelimitedText
            .extract_text(&[0x61, 0x2c, 0xff, 0xfe, 0x0a])
            .unwrap_err();
        assert!(matches!(err, ExtractError::Csv(_)));
    }

    #[test]
    fn docx_paragraphs_are_space_joined() {
        let bytes = docx_with_body(
            "<w:p><w:r><w:t>First</w:t></w:r><w:r><w:t xml:space=\"preserve\"> line</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Second</w:t><w:tab/><w:t>tabbed</w:t></w:r></w:p>",
        );
        let text = DocumentSource::Docx.extract_text(&bytes).unwrap();
        assert_eq!(text, "First line Second\ttabbed");
    }

    #[test]
    fn docx_unescapes_entities() {
        let bytes = docx_with_body("<w:p><w:r><w:t>R&amp;D &lt;2024&gt;</w:t></w:r></w:p>");
        let text = DocumentSource::Docx.extract_text(&bytes).unwrap();
        assert_eq!(text, "R&D <2024>");
    }

    #[test]
    fn docx_without_body_is_an_error() {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
            zip.start_file("other.xml", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"<x/>").unwrap();
            zip.finish().unwrap();
        }
        let err = DocumentSource::Docx.extract_text(&buf).unwrap_err();
        assert!(err.to_string().contains("word/document.xml not found"));
    }

    #[test]
    fn invalid_zip_returns_error_for_docx() {
        let err = DocumentSource::Docx.extract_text(b"not a zip").unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    /// One Courier text run per page.
    fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![72.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }
        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => count,
                "Kids" => kids,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn pdf_pages_are_concatenated_in_order() {
        let pdf = pdf_with_pages(&["alpha", "beta"]);
        let text = DocumentSource::Pdf.extract_text(&pdf).unwrap();
        assert_eq!(text.trim(), "alphabeta");
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = DocumentSource::Pdf.extract_text(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }
}
