use crate::error::{CoreError, Result};

/// One file as received from the upload form or the command line.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedDocument {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub fn looks_like_pdf(&self) -> bool {
        self.bytes.starts_with(b"%PDF-")
    }
}

/// Extract the text layer of a PDF.
///
/// Runs `pdf-extract` on a blocking thread; a parser panic surfaces as a
/// `CoreError::Pdf` through the join error.
pub async fn extract_text(bytes: Vec<u8>) -> Result<String> {
    let raw = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| CoreError::Pdf(format!("extraction task failed: {e}")))?
        .map_err(|e| CoreError::Pdf(format!("failed to extract text: {e}")))?;

    Ok(normalize_text(&raw))
}

/// Drop NULs and trailing whitespace, and collapse runs of blank lines
/// into a single paragraph break.
pub fn normalize_text(raw: &str) -> String {
    let cleaned = raw.replace('\0', "");
    let mut out = String::with_capacity(cleaned.len());
    let mut blank_run = 0usize;

    for line in cleaned.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run == 1 && !out.is_empty() {
                out.push('\n');
            }
            continue;
        }
        blank_run = 0;
        out.push_str(line);
        out.push('\n');
    }

    out.trim_end().to_string()
}
