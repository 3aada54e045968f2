use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{Subreducer, SubreducerResult, elapsed_ms};
use crate::types::{ErrorDetail, WorkflowRequest, WorkflowType, json_type_name};

const NAME: &str = "document_regeneration";

/// Rebuilds a document from its id and section list.
///
/// Content is placeholder text per section; what matters downstream is the
/// shape of the result (content, counts, format).
#[derive(Debug, Clone, Default)]
pub struct DocumentRegenerationSubreducer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Markdown,
    Text,
}

impl DocumentFormat {
    fn parse(raw: Option<&Value>) -> Result<Self, ErrorDetail> {
        match raw {
            None | Some(Value::Null) => Ok(DocumentFormat::Markdown),
            Some(Value::String(s)) if s == "markdown" => Ok(DocumentFormat::Markdown),
            Some(Value::String(s)) if s == "text" => Ok(DocumentFormat::Text),
            Some(Value::String(other)) => Err(ErrorDetail::business(
                "InvalidPayload",
                format!("Unsupported document format '{other}'"),
            )),
            Some(other) => Err(ErrorDetail::business(
                "InvalidPayload",
                format!("'format' must be a string, got {}", json_type_name(other)),
            )),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Markdown => "markdown",
            DocumentFormat::Text => "text",
        }
    }
}

impl DocumentRegenerationSubreducer {
    fn regenerate(&self, payload: &Map<String, Value>) -> Result<Value, ErrorDetail> {
        let document_id = payload
            .get("document_id")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ErrorDetail::business("InvalidPayload", "Missing 'document_id'"))?;

        let format = DocumentFormat::parse(payload.get("format"))?;
        let title = payload
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Document {document_id}"));

        let sections = parse_sections(payload)?;

        let content = render(&title, &sections, format);
        let word_count = content.split_whitespace().count();

        Ok(json!({
            "document_id": document_id,
            "title": title,
            "format": format.as_str(),
            "content": content,
            "section_count": sections.len(),
            "word_count": word_count,
            "regenerated": true,
        }))
    }
}

/// `["Overview"]` when absent; otherwise every entry must be a string.
fn parse_sections(payload: &Map<String, Value>) -> Result<Vec<String>, ErrorDetail> {
    let items = match payload.get("sections") {
        None | Some(Value::Null) => return Ok(vec!["Overview".to_string()]),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(ErrorDetail::business(
                "InvalidPayload",
                format!("'sections' must be an array, got {}", json_type_name(other)),
            ));
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_str().map(str::to_string).ok_or_else(|| {
                ErrorDetail::business(
                    "InvalidPayload",
                    format!("'sections' must contain only strings (index {i} is {})", json_type_name(v)),
                )
                .with_detail("index", i)
            })
        })
        .collect()
}

fn render(title: &str, sections: &[String], format: DocumentFormat) -> String {
    let mut out = String::new();
    match format {
        DocumentFormat::Markdown => out.push_str(&format!("# {title}\n")),
        DocumentFormat::Text => {
            out.push_str(title);
            out.push('\n');
            out.push_str(&"=".repeat(title.chars().count()));
            out.push('\n');
        }
    }
    for section in sections {
        out.push('\n');
        match format {
            DocumentFormat::Markdown => out.push_str(&format!("## {section}\n")),
            DocumentFormat::Text => out.push_str(&format!("{section}\n")),
        }
        out.push_str(&format!("Regenerated content for section {section}.\n"));
    }
    out
}

#[async_trait]
impl Subreducer for DocumentRegenerationSubreducer {
    fn name(&self) -> &str {
        NAME
    }

    fn supports_workflow_type(&self, workflow_type: WorkflowType) -> bool {
        workflow_type == WorkflowType::DocumentRegeneration
    }

    async fn process(&self, request: &WorkflowRequest) -> SubreducerResult {
        let start = Instant::now();
        match self.regenerate(request.payload()) {
            Ok(result) => {
                SubreducerResult::success(request.workflow_id(), NAME, result, elapsed_ms(start))
            }
            Err(error) => {
                tracing::warn!(workflow_id = %request.workflow_id(), "document regeneration rejected payload");
                SubreducerResult::failure(request.workflow_id(), NAME, error, elapsed_ms(start))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(payload: Value) -> WorkflowRequest {
        WorkflowRequest::new(WorkflowType::DocumentRegeneration, "doc-7")
            .unwrap()
            .with_payload(payload)
            .unwrap()
    }

    #[tokio::test]
    async fn regenerates_markdown_by_default() {
        let sub = DocumentRegenerationSubreducer;
        let result = sub
            .process(&request(json!({
                "document_id": "DOC-1",
                "sections": ["Intro", "Usage"]
            })))
            .await;

        assert!(result.success);
        let out = result.result.unwrap();
        assert_eq!(out["format"], "markdown");
        assert_eq!(out["section_count"], 2);
        let content = out["content"].as_str().unwrap();
        assert!(content.starts_with("# Document DOC-1\n"));
        assert!(content.contains("## Usage"));
    }

    #[tokio::test]
    async fn text_format_underlines_title() {
        let sub = DocumentRegenerationSubreducer;
        let result = sub
            .process(&request(json!({
                "document_id": "DOC-2",
                "title": "Guide",
                "format": "text"
            })))
            .await;

        let out = result.result.unwrap();
        assert!(out["content"].as_str().unwrap().starts_with("Guide\n=====\n"));
        assert_eq!(out["section_count"], 1);
    }

    #[tokio::test]
    async fn missing_document_id_fails() {
        let sub = DocumentRegenerationSubreducer;
        let result = sub.process(&request(json!({"title": "x"}))).await;

        assert!(!result.success);
        assert_eq!(result.error.unwrap().error_message, "Missing 'document_id'");
    }

    #[tokio::test]
    async fn unknown_format_fails() {
        let sub = DocumentRegenerationSubreducer;
        let result = sub
            .process(&request(json!({"document_id": "D", "format": "pdf"})))
            .await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn non_string_section_fails() {
        let sub = DocumentRegenerationSubreducer;
        let result = sub
            .process(&request(json!({"document_id": "D", "sections": ["Intro", 7]})))
            .await;

        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.error_type, "InvalidPayload");
        assert_eq!(error.details["index"], json!(1));
    }

    #[tokio::test]
    async fn non_array_sections_fail() {
        let sub = DocumentRegenerationSubreducer;
        let result = sub
            .process(&request(json!({"document_id": "D", "sections": "Intro"})))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().error_message.contains("must be an array"));
    }
}
