//! Resume text extraction from uploaded PDFs.
//!
//! Every failure here is fatal for the request and happens before any model call.

use bytes::Bytes;
use tracing::{debug, info};

use crate::errors::AppError;

const PDF_MAGIC: &[u8] = b"%PDF-";

/// Checks the upload size and PDF signature before any parsing work.
pub fn check_upload(bytes: &[u8], max_bytes: usize) -> Result<(), AppError> {
    if bytes.len() > max_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "File size exceeds {} limit",
            human_size(max_bytes)
        )));
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(AppError::UnprocessableEntity(
            "Uploaded CV must be a PDF file".to_string(),
        ));
    }
    Ok(())
}

/// Extracts the text of every page. PDF parsing is CPU-bound, so it runs on the
/// blocking pool.
pub async fn extract_resume_text(bytes: Bytes, max_bytes: usize) -> Result<String, AppError> {
    check_upload(&bytes, max_bytes)?;
    let size = bytes.len();

    let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .map_err(|e| {
            // pdf-extract panics on some malformed documents.
            if e.is_panic() {
                AppError::UnprocessableEntity(
                    "Could not read text from the uploaded PDF".to_string(),
                )
            } else {
                AppError::Internal(anyhow::anyhow!("PDF extraction task failed: {e}"))
            }
        })?
        .map_err(|e| {
            debug!("PDF extraction error: {e}");
            AppError::UnprocessableEntity("Could not read text from the uploaded PDF".to_string())
        })?;

    let text = require_text(text)?;
    info!("Extracted {} chars from {size}-byte PDF", text.chars().count());
    Ok(text)
}

/// Rejects resume text that is empty after trimming.
pub fn require_text(text: String) -> Result<String, AppError> {
    if text.trim().is_empty() {
        return Err(AppError::UnprocessableEntity(
            "No text could be extracted from the uploaded CV".to_string(),
        ));
    }
    Ok(text)
}

fn human_size(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{} MB", bytes / MIB)
    } else {
        format!("{bytes} bytes")
    }
}
