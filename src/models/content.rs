use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{ChatError, ChatResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    Low,
    High,
    #[default]
    Auto,
}

impl ImageDetail {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageDetail::Low => "low",
            ImageDetail::High => "high",
            ImageDetail::Auto => "auto",
        }
    }
}

/// One element of a message's content.
///
/// File parts carry either a remote file id or an inline payload, never both;
/// the two encodings are distinct variants so the wire form is unambiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentPart {
    Text { text: String },
    FileRef { file_id: String },
    FileInline { filename: String, file_data: String },
    Image { url: String, detail: ImageDetail },
}

impl ContentPart {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn file_ref<S: Into<String>>(file_id: S) -> Self {
        ContentPart::FileRef {
            file_id: file_id.into(),
        }
    }

    pub fn image<S: Into<String>>(url: S, detail: ImageDetail) -> Self {
        ContentPart::Image {
            url: url.into(),
            detail,
        }
    }

    /// Get the text if this is a `Text` part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            _ => None,
        }
    }

    /// Render this part in the wire shape the completion endpoint expects.
    pub fn to_wire(&self) -> Value {
        match self {
            ContentPart::Text { text } => json!({"type": "text", "text": text}),
            ContentPart::FileRef { file_id } => {
                json!({"type": "input_file", "file_id": file_id})
            }
            ContentPart::FileInline {
                filename,
                file_data,
            } => json!({
                "type": "input_file",
                "filename": filename,
                "file_data": file_data,
            }),
            ContentPart::Image { url, detail } => json!({
                "type": "image_url",
                "image_url": {"url": url, "detail": detail.as_str()},
            }),
        }
    }

    /// Classify a caller-supplied part-shaped object by the key it carries.
    ///
    /// Accepts both the loose input shapes (`text`, `input_file`,
    /// `input_image`) and this module's own wire output, so normalizing an
    /// already-normalized part is a no-op.
    pub fn from_value(value: &Value) -> ChatResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| ChatError::Format(format!("content part is not an object: {value}")))?;

        if let Some(text) = object.get("text") {
            let text = text
                .as_str()
                .ok_or_else(|| ChatError::Format("text part is not a string".into()))?;
            return Ok(ContentPart::text(text));
        }

        if let Some(file) = object.get("input_file") {
            return Self::file_from_object(file);
        }
        if object.get("type").and_then(Value::as_str) == Some("input_file") {
            return Self::file_from_object(value);
        }

        if let Some(image) = object.get("input_image") {
            let url = image
                .get("image_url")
                .and_then(Value::as_str)
                .ok_or_else(|| ChatError::Format("input_image is missing image_url".into()))?;
            return Ok(ContentPart::image(url, parse_detail(image.get("detail"))?));
        }
        if let Some(image) = object.get("image_url") {
            let url = image
                .get("url")
                .and_then(Value::as_str)
                .ok_or_else(|| ChatError::Format("image_url is missing url".into()))?;
            return Ok(ContentPart::image(url, parse_detail(image.get("detail"))?));
        }

        Err(ChatError::Format(format!(
            "unrecognized content part shape: {value}"
        )))
    }

    fn file_from_object(value: &Value) -> ChatResult<Self> {
        if let Some(file_id) = value.get("file_id").and_then(Value::as_str) {
            return Ok(ContentPart::file_ref(file_id));
        }
        let filename = value.get("filename").and_then(Value::as_str);
        let file_data = value.get("file_data").and_then(Value::as_str);
        match (filename, file_data) {
            (Some(filename), Some(file_data)) => Ok(ContentPart::FileInline {
                filename: filename.to_string(),
                file_data: file_data.to_string(),
            }),
            _ => Err(ChatError::Format(
                "file part needs either file_id or filename + file_data".into(),
            )),
        }
    }
}

fn parse_detail(value: Option<&Value>) -> ChatResult<ImageDetail> {
    match value {
        None | Some(Value::Null) => Ok(ImageDetail::Auto),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|_| ChatError::Format(format!("invalid image detail: {value}"))),
    }
}

/// Normalize caller-supplied message content into content parts.
///
/// A plain string becomes a single text part; an array is classified element
/// by element. Anything else is a format error.
pub fn normalize(content: &Value) -> ChatResult<Vec<ContentPart>> {
    match content {
        Value::String(text) => Ok(vec![ContentPart::text(text)]),
        Value::Array(parts) => parts.iter().map(ContentPart::from_value).collect(),
        other => Err(ChatError::Format(format!(
            "invalid message content: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_string_becomes_single_text_part() {
        let parts = normalize(&json!("hello")).unwrap();
        assert_eq!(parts, vec![ContentPart::text("hello")]);
    }

    #[test]
    fn classifies_parts_by_key() {
        let parts = normalize(&json!([
            {"text": "look at this"},
            {"input_file": {"file_id": "file-123"}},
            {"input_file": {"filename": "notes.pdf", "file_data": "QUJD"}},
            {"input_image": {"image_url": "https://example.com/cat.png", "detail": "high"}},
        ]))
        .unwrap();

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], ContentPart::text("look at this"));
        assert_eq!(parts[1], ContentPart::file_ref("file-123"));
        assert_eq!(
            parts[2],
            ContentPart::FileInline {
                filename: "notes.pdf".into(),
                file_data: "QUJD".into(),
            }
        );
        assert_eq!(
            parts[3],
            ContentPart::image("https://example.com/cat.png", ImageDetail::High)
        );
    }

    #[test]
    fn image_detail_defaults_to_auto() {
        let parts = normalize(&json!([
            {"input_image": {"image_url": "data:image/png;base64,AAAA"}},
        ]))
        .unwrap();
        assert_eq!(
            parts[0],
            ContentPart::image("data:image/png;base64,AAAA", ImageDetail::Auto)
        );
    }

    #[test]
    fn unrecognized_shape_is_a_format_error() {
        let err = normalize(&json!([{"audio": "bytes"}])).unwrap_err();
        assert!(matches!(err, ChatError::Format(_)));

        let err = normalize(&json!(42)).unwrap_err();
        assert!(matches!(err, ChatError::Format(_)));
    }

    #[test]
    fn normalizing_wire_output_is_a_fixed_point() {
        let parts = vec![
            ContentPart::text("hi"),
            ContentPart::file_ref("file-9"),
            ContentPart::FileInline {
                filename: "a.pdf".into(),
                file_data: "QQ==".into(),
            },
            ContentPart::image("https://example.com/x.jpg", ImageDetail::Low),
        ];

        let wire: Vec<Value> = parts.iter().map(ContentPart::to_wire).collect();
        let reparsed = normalize(&Value::Array(wire)).unwrap();
        assert_eq!(reparsed, parts);
    }
}
