//! Multipart form decoding for `POST /api/modify`

use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::StatusCode;
use json_agent_core::MutationError;
use serde_json::Value;

use crate::error::ApiError;

pub const NEITHER_INPUT: &str = "Provide either a JSON file upload or json_text.";
pub const BOTH_INPUTS: &str = "Provide only one of file or json_text, not both.";

/// An uploaded file part
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: Option<String>,
    pub content: Bytes,
}

impl Upload {
    /// Browsers send an empty, unnamed part when no file was chosen
    fn is_empty(&self) -> bool {
        self.content.is_empty() && self.filename.as_deref().map_or(true, str::is_empty)
    }
}

/// Fields of a modify request. Unknown fields are ignored.
#[derive(Debug, Default, Clone)]
pub struct ModifyForm {
    pub prompt: Option<String>,
    pub file: Option<Upload>,
    pub json_text: Option<String>,
    pub schema_path: Option<String>,
}

impl ModifyForm {
    /// Read all parts of `multipart`
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = ModifyForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error("Invalid multipart body", e))?
        {
            let name = field.name().unwrap_or_default().to_string();

            match name.as_str() {
                "prompt" | "json_text" | "schema_path" => {
                    let text = field.text().await.map_err(|e| {
                        multipart_error(&format!("Invalid form field '{}'", name), e)
                    })?;
                    match name.as_str() {
                        "prompt" => form.prompt = Some(text),
                        "json_text" => form.json_text = Some(text),
                        _ => form.schema_path = Some(text),
                    }
                }
                "file" => {
                    let filename = field.file_name().map(str::to_string);
                    let content = field
                        .bytes()
                        .await
                        .map_err(|e| multipart_error("Failed to read uploaded file", e))?;
                    form.file = Some(Upload { filename, content });
                }
                other => {
                    tracing::debug!(field = %other, "Ignoring unknown form field");
                }
            }
        }

        Ok(form)
    }

    /// The instruction; a missing prompt is a request validation error
    pub fn prompt(&self) -> Result<&str, ApiError> {
        match self.prompt.as_deref() {
            Some(prompt) if !prompt.trim().is_empty() => Ok(prompt),
            _ => Err(ApiError::ValidationFailed("Field required: prompt".to_string())),
        }
    }

    /// The client-selected schema path, if any
    pub fn schema_path(&self) -> Option<&str> {
        self.schema_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Decode exactly one of the two document sources
    pub fn document(&self) -> Result<Value, MutationError> {
        let file = self.file.as_ref().filter(|f| !f.is_empty());
        let text = self.json_text.as_deref().filter(|t| !t.is_empty());

        match (file, text) {
            (Some(_), Some(_)) => Err(MutationError::ambiguous_input(BOTH_INPUTS)),
            (None, None) => Err(MutationError::ambiguous_input(NEITHER_INPUT)),
            (Some(file), None) => serde_json::from_slice(&file.content)
                .map_err(|e| MutationError::malformed_input(e.to_string())),
            (None, Some(text)) => serde_json::from_str(text)
                .map_err(|e| MutationError::malformed_input(e.to_string())),
        }
    }
}

/// Oversized bodies keep their 413; every other multipart failure is a 400
fn multipart_error(context: &str, err: MultipartError) -> ApiError {
    let detail = format!("{}: {}", context, err.body_text());
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(detail)
    } else {
        ApiError::BadRequest(detail)
    }
}
