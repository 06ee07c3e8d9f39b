//! Stream record shapes

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix every data record carries
pub const DATA_PREFIX: &str = "data: ";

/// Payload marking the end of content
pub const DONE_SENTINEL: &str = "[DONE]";

/// A reference descriptor attached to a reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Fields the client does not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl SourceRef {
    /// Best human label for the source
    pub fn label(&self) -> &str {
        self.title
            .as_deref()
            .or(self.url.as_deref())
            .or(self.id.as_deref())
            .unwrap_or("untitled source")
    }
}

/// One recognised record from the stream body
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    /// Incremental reply text (`choices[0].delta.content`)
    Delta(String),
    /// Sidecar carrying retrieved reference material
    Sources(Vec<SourceRef>),
    /// Sidecar reporting a backend failure mid-stream
    ServerError(String),
    /// The `[DONE]` sentinel
    Done,
}

impl StreamFrame {
    /// Parse a record payload (the text after `data: `).
    ///
    /// `Err` means the payload is not complete JSON yet. `Ok` with an empty
    /// vector means it is valid JSON of a shape the client ignores.
    pub fn parse(payload: &str) -> Result<Vec<StreamFrame>, serde_json::Error> {
        if payload.trim() == DONE_SENTINEL {
            return Ok(vec![StreamFrame::Done]);
        }

        let value: Value = serde_json::from_str(payload)?;
        let mut frames = Vec::new();

        if let Some(sources) = value.get("sources") {
            match serde_json::from_value::<Vec<SourceRef>>(sources.clone()) {
                Ok(sources) => frames.push(StreamFrame::Sources(sources)),
                Err(e) => tracing::warn!(error = %e, "ignoring malformed sources sidecar"),
            }
        }

        if let Some(content) = value["choices"][0]["delta"]["content"].as_str() {
            if !content.is_empty() {
                frames.push(StreamFrame::Delta(content.to_string()));
            }
        }

        // Text carried by the same record is kept before the abort.
        if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
            let message = error
                .as_str()
                .map(str::to_string)
                .or_else(|| {
                    error
                        .get("message")
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| error.to_string());
            frames.push(StreamFrame::ServerError(message));
        }

        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delta() {
        let frames = StreamFrame::parse(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#).unwrap();
        assert_eq!(frames, vec![StreamFrame::Delta("Hel".into())]);
    }

    #[test]
    fn test_parse_role_only_delta_is_ignored() {
        let frames =
            StreamFrame::parse(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#).unwrap();
        assert!(frames.is_empty());
    }

    #[test]
    fn test_parse_sources_keeps_unknown_fields() {
        let frames = StreamFrame::parse(
            r#"{"sources":[{"title":"Note A","url":"https://x/a","kind":"note"}]}"#,
        )
        .unwrap();

        let StreamFrame::Sources(sources) = &frames[0] else {
            panic!("expected sources, got {:?}", frames);
        };
        assert_eq!(sources[0].label(), "Note A");
        assert_eq!(sources[0].extra["kind"], "note");
    }

    #[test]
    fn test_parse_error_sidecar() {
        let frames = StreamFrame::parse(r#"{"error":{"message":"model overloaded"}}"#).unwrap();
        assert_eq!(
            frames,
            vec![StreamFrame::ServerError("model overloaded".into())]
        );
    }

    #[test]
    fn test_parse_null_error_field_is_not_an_error() {
        let frames =
            StreamFrame::parse(r#"{"choices":[{"delta":{"content":"Hi"}}],"error":null}"#).unwrap();
        assert_eq!(frames, vec![StreamFrame::Delta("Hi".into())]);
    }

    #[test]
    fn test_parse_error_keeps_text_of_same_record() {
        let frames = StreamFrame::parse(
            r#"{"choices":[{"delta":{"content":"last words"}}],"error":"overloaded"}"#,
        )
        .unwrap();
        assert_eq!(
            frames,
            vec![
                StreamFrame::Delta("last words".into()),
                StreamFrame::ServerError("overloaded".into()),
            ]
        );
    }

    #[test]
    fn test_parse_done_and_incomplete() {
        assert_eq!(StreamFrame::parse("[DONE]").unwrap(), vec![StreamFrame::Done]);
        assert!(StreamFrame::parse(r#"{"choices":[{"delta":{"con"#).is_err());
    }
}
