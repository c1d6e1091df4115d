use std::collections::HashMap;
use std::str::FromStr;

use axum::extract::Multipart;
use bytes::Bytes;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub content_type: String,
    pub body: Bytes,
}

/// A fully read multipart body: text fields by name, files in arrival order.
#[derive(Debug, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: Vec<UploadedFile>,
}

impl MultipartForm {
    pub async fn collect(mut mp: Multipart) -> Result<Self, AppError> {
        let mut form = MultipartForm::default();
        while let Some(field) = mp
            .next_field()
            .await
            .map_err(|e| AppError::bad_request(format!("Malformed multipart body: {e}")))?
        {
            let Some(name) = field.name().map(|s| s.trim_end_matches("[]").to_string()) else {
                continue;
            };

            if field.file_name().is_some() {
                let content_type = field
                    .content_type()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "application/octet-stream".into());
                let body = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::bad_request(format!("Failed to read upload: {e}")))?;
                if !body.is_empty() {
                    form.files.push(UploadedFile {
                        field: name,
                        content_type,
                        body,
                    });
                }
            } else {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::bad_request(format!("Failed to read field: {e}")))?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    /// Trimmed, non-empty text field.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn text_owned(&self, name: &str) -> Option<String> {
        self.text(name).map(str::to_string)
    }

    /// Field present at all, even if empty. Lets updates clear a value.
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.as_str())
    }

    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, AppError> {
        match self.text(name) {
            None => Ok(None),
            Some(v) => v
                .parse::<T>()
                .map(Some)
                .map_err(|_| AppError::bad_request(format!("Invalid value for {name}"))),
        }
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == name)
    }

    pub fn files<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a UploadedFile> + 'a {
        self.files.iter().filter(move |f| f.field == name)
    }

    #[cfg(test)]
    pub(crate) fn from_parts(fields: &[(&str, &str)], files: Vec<UploadedFile>) -> Self {
        Self {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            files,
        }
    }
}

/// Parses the loose booleans HTML forms send.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_fields_are_trimmed_and_blank_is_absent() {
        let form = MultipartForm::from_parts(&[("title", "  Summer Sale "), ("description", "  ")], vec![]);
        assert_eq!(form.text("title"), Some("Summer Sale"));
        assert_eq!(form.text("description"), None);
        assert_eq!(form.raw("description"), Some("  "));
    }

    #[test]
    fn typed_parse_reports_field_name() {
        let form = MultipartForm::from_parts(&[("price", "12.5x")], vec![]);
        let err = form.parse::<f64>("price").unwrap_err();
        assert!(err.to_string().contains("price"));
        assert_eq!(form.parse::<i32>("stock").expect("absent is fine"), None);
    }

    #[test]
    fn files_are_grouped_by_field() {
        let file = |field: &str| UploadedFile {
            field: field.into(),
            content_type: "image/png".into(),
            body: Bytes::from_static(b"x"),
        };
        let form = MultipartForm::from_parts(&[], vec![file("images"), file("images"), file("picture")]);
        assert_eq!(form.files("images").count(), 2);
        assert!(form.file("picture").is_some());
        assert!(form.file("image").is_none());
    }

    #[test]
    fn loose_booleans() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
