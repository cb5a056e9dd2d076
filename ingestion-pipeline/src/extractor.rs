//! Text Extractor port: selects a parser by MIME type and produces plain
//! text from raw file bytes. Plain-text/UTF-8 is the default branch;
//! PDF is extracted via `pdf-extract` with a `lopdf`-based fallback for
//! malformed documents the primary crate rejects; DOCX is extracted via
//! `docx-rs`.

use async_trait::async_trait;

use common::AppError;

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, mime_type: &str, bytes: &[u8]) -> Result<String, AppError>;
}

pub struct DefaultTextExtractor;

#[async_trait]
impl TextExtractor for DefaultTextExtractor {
    async fn extract(&self, mime_type: &str, bytes: &[u8]) -> Result<String, AppError> {
        match mime_type {
            "text/plain" | "text/markdown" | "application/octet-stream" => {
                extract_plain_text(bytes)
            }
            "application/pdf" => extract_pdf(bytes),
            DOCX_MIME => extract_docx(bytes),
            other => Err(AppError::Validation(format!(
                "unsupported mime type for extraction: {other}"
            ))),
        }
    }
}

fn extract_plain_text(bytes: &[u8]) -> Result<String, AppError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| AppError::Validation("file is not valid UTF-8 text".into()))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, AppError> {
    if let Ok(text) = pdf_extract::extract_text_from_mem(bytes) {
        if !text.trim().is_empty() {
            return Ok(text);
        }
    }
    extract_pdf_via_lopdf(bytes)
}

fn extract_pdf_via_lopdf(bytes: &[u8]) -> Result<String, AppError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| AppError::Validation(format!("failed to parse pdf: {e}")))?;

    let mut text = String::new();
    for (page_num, _) in doc.get_pages() {
        if let Ok(page_text) = doc.extract_text(&[page_num]) {
            text.push_str(&page_text);
            text.push('\n');
        }
    }

    if text.trim().is_empty() {
        return Err(AppError::Validation(
            "pdf contained no extractable text".into(),
        ));
    }
    Ok(text)
}

fn extract_docx(bytes: &[u8]) -> Result<String, AppError> {
    let docx = docx_rs::read_docx(bytes)
        .map_err(|e| AppError::Validation(format!("failed to parse docx: {e}")))?;

    let mut text = String::new();
    for child in &docx.document.children {
        push_document_child(child, &mut text);
    }

    if text.trim().is_empty() {
        return Err(AppError::Validation(
            "docx contained no extractable text".into(),
        ));
    }
    Ok(text)
}

fn push_document_child(child: &docx_rs::DocumentChild, out: &mut String) {
    match child {
        docx_rs::DocumentChild::Paragraph(paragraph) => {
            push_paragraph_text(paragraph, out);
            out.push('\n');
        }
        docx_rs::DocumentChild::Table(table) => {
            for row in &table.rows {
                let docx_rs::TableChild::TableRow(row) = row else {
                    continue;
                };
                for cell in &row.cells {
                    let docx_rs::TableRowChild::TableCell(cell) = cell else {
                        continue;
                    };
                    for content in &cell.children {
                        if let docx_rs::TableCellContent::Paragraph(paragraph) = content {
                            push_paragraph_text(paragraph, out);
                            out.push(' ');
                        }
                    }
                }
            }
            out.push('\n');
        }
        _ => {}
    }
}

fn push_paragraph_text(paragraph: &docx_rs::Paragraph, out: &mut String) {
    for child in &paragraph.children {
        if let docx_rs::ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                if let docx_rs::RunChild::Text(t) = run_child {
                    out.push_str(&t.text);
                }
            }
        }
    }
}

/// Strips NUL bytes and collapses runs of whitespace down to single
/// spaces while preserving paragraph breaks, matching the extraction
/// cleanup step the async processor runs before chunking.
pub fn sanitize_extracted_text(text: &str) -> String {
    let without_nuls: String = text.chars().filter(|c| *c != '\0').collect();
    let mut result = String::with_capacity(without_nuls.len());
    let mut chars = without_nuls.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ' ' || c == '\t' {
            while matches!(chars.peek(), Some(' ') | Some('\t')) {
                chars.next();
            }
            result.push(' ');
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn extracts_plain_text() {
        let extractor = DefaultTextExtractor;
        let text = extractor
            .extract("text/plain", b"hello world")
            .await
            .unwrap();
        assert_eq!(text, "hello world");
    }

    #[tokio::test]
    async fn rejects_non_utf8_plain_text() {
        let extractor = DefaultTextExtractor;
        let result = extractor.extract("text/plain", &[0xff, 0xfe, 0x00]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn rejects_unsupported_mime_type() {
        let extractor = DefaultTextExtractor;
        let result = extractor.extract("image/png", b"not a real image").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn sanitize_strips_null_bytes_and_collapses_spaces() {
        let input = "hello\0  \t world";
        assert_eq!(sanitize_extracted_text(input), "hello world");
    }

    #[test]
    fn sanitize_preserves_newlines() {
        let input = "line one\n\nline two";
        assert_eq!(sanitize_extracted_text(input), "line one\n\nline two");
    }

    fn build_docx(paragraphs: &[&str]) -> Vec<u8> {
        let mut docx = docx_rs::Docx::new();
        for text in paragraphs {
            docx = docx.add_paragraph(
                docx_rs::Paragraph::new().add_run(docx_rs::Run::new().add_text(*text)),
            );
        }
        let mut cursor = std::io::Cursor::new(Vec::new());
        docx.build().pack(&mut cursor).expect("pack docx for test fixture");
        cursor.into_inner()
    }

    #[tokio::test]
    async fn extracts_docx_paragraph_text() {
        let bytes = build_docx(&["hello docx", "second paragraph"]);
        let extractor = DefaultTextExtractor;
        let text = extractor.extract(DOCX_MIME, &bytes).await.unwrap();
        assert!(text.contains("hello docx"));
        assert!(text.contains("second paragraph"));
    }

    #[tokio::test]
    async fn rejects_empty_docx() {
        let bytes = build_docx(&[]);
        let extractor = DefaultTextExtractor;
        let result = extractor.extract(DOCX_MIME, &bytes).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
