//! Request bodies that may arrive either as JSON or as `multipart/form-data`.
//!
//! In multipart form, every text field holds a JSON value (`{"first_name": ..}`,
//! `[..]`, `true`, `42`) or, failing to parse as JSON, a plain string. File
//! parts are collected separately in arrival order.

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::{header::CONTENT_TYPE, StatusCode},
    Json,
};
use bytes::Bytes;
use serde_json::{Map, Value};

use crate::errors::AppError;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field_name: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, Default)]
pub struct UploadForm {
    texts: Vec<(String, String)>,
    files: Vec<UploadedFile>,
}

impl UploadForm {
    pub fn new(texts: Vec<(String, String)>, files: Vec<UploadedFile>) -> Self {
        Self { texts, files }
    }

    /// All text values submitted under `name`, in order.
    pub fn texts(&self, name: &str) -> Vec<&str> {
        self.texts
            .iter()
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Removes and returns the first file submitted under `name`.
    pub fn take_file(&mut self, name: &str) -> Option<UploadedFile> {
        let idx = self.files.iter().position(|f| f.field_name == name)?;
        Some(self.files.remove(idx))
    }

    /// Removes and returns every file submitted under `name`, in order.
    pub fn take_files(&mut self, name: &str) -> Vec<UploadedFile> {
        let (taken, rest): (Vec<_>, Vec<_>) =
            self.files.drain(..).partition(|f| f.field_name == name);
        self.files = rest;
        taken
    }

    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    /// Text fields as a JSON object, skipping the `exclude`d selector fields.
    /// Repeated keys keep the last value.
    pub fn json_fields(&self, exclude: &[&str]) -> Map<String, Value> {
        let mut map = Map::new();
        for (k, v) in &self.texts {
            if exclude.contains(&k.as_str()) {
                continue;
            }
            let value = serde_json::from_str::<Value>(v).unwrap_or_else(|_| Value::String(v.clone()));
            map.insert(k.clone(), value);
        }
        map
    }
}

/// A body that was sent as JSON or as multipart.
#[derive(Debug)]
pub enum Payload {
    Json(Value),
    Multipart(UploadForm),
}

impl Payload {
    /// Splits the payload into its JSON fields and the (possibly empty) file set.
    /// `exclude` names multipart text fields that are selectors, not document data.
    pub fn into_parts(self, exclude: &[&str]) -> Result<(Map<String, Value>, UploadForm), AppError> {
        match self {
            Payload::Json(Value::Object(map)) => Ok((map, UploadForm::default())),
            Payload::Json(_) => Err(AppError::Validation(
                "Request body must be a JSON object".to_string(),
            )),
            Payload::Multipart(form) => Ok((form.json_fields(exclude), form)),
        }
    }
}

#[async_trait]
impl<S> FromRequest<S> for Payload
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| rejection_error(e.status(), e.body_text()))?;
            Ok(Payload::Multipart(read_form(multipart).await?))
        } else {
            let Json(value) = Json::<Value>::from_request(req, state)
                .await
                .map_err(|e| rejection_error(e.status(), e.body_text()))?;
            Ok(Payload::Json(value))
        }
    }
}

/// Drains a multipart stream into text fields and files.
pub async fn read_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut texts = Vec::new();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(map_multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();
        if field_name.is_empty() {
            continue;
        }

        match field.file_name().map(str::to_string) {
            Some(file_name) => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(map_multipart_error)?;
                files.push(UploadedFile {
                    field_name,
                    file_name,
                    content_type,
                    bytes,
                });
            }
            None => {
                let text = field.text().await.map_err(map_multipart_error)?;
                texts.push((field_name, text));
            }
        }
    }

    Ok(UploadForm::new(texts, files))
}

fn map_multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    rejection_error(e.status(), format!("Malformed multipart body: {}", e.body_text()))
}

pub fn rejection_error(status: StatusCode, message: String) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Upload exceeds the maximum allowed size".to_string())
    } else {
        AppError::Validation(message)
    }
}
