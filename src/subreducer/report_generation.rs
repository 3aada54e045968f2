use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};

use super::{Subreducer, SubreducerResult, elapsed_ms};
use crate::types::{ErrorDetail, WorkflowRequest, WorkflowType};

const NAME: &str = "report_generation";

/// Renders `{title, sections: [{heading, content}]}` into a report.
#[derive(Debug, Clone)]
pub struct ReportGenerationSubreducer {
    default_format: String,
}

impl Default for ReportGenerationSubreducer {
    fn default() -> Self {
        Self {
            default_format: "markdown".to_string(),
        }
    }
}

struct Section {
    heading: String,
    content: String,
}

impl ReportGenerationSubreducer {
    pub fn with_default_format(format: impl Into<String>) -> Self {
        Self {
            default_format: format.into(),
        }
    }

    fn generate(&self, payload: &Map<String, Value>) -> Result<Value, ErrorDetail> {
        let title = payload
            .get("title")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ErrorDetail::business("InvalidPayload", "Missing report 'title'"))?;

        let sections = parse_sections(payload)?;
        let format = payload
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or(&self.default_format);

        let body = match format {
            "markdown" => render_markdown(title, &sections),
            "text" => render_text(title, &sections),
            "json" => serde_json::to_string_pretty(&json!({
                "title": title,
                "sections": sections
                    .iter()
                    .map(|s| json!({"heading": s.heading, "content": s.content}))
                    .collect::<Vec<_>>(),
            }))
            .map_err(|e| ErrorDetail::system("SerializationError", e.to_string()))?,
            other => {
                return Err(ErrorDetail::business(
                    "InvalidPayload",
                    format!("Unsupported report format '{other}'"),
                ));
            }
        };

        Ok(json!({
            "title": title,
            "format": format,
            "report": body,
            "section_count": sections.len(),
            "generated_at": Utc::now().to_rfc3339(),
        }))
    }
}

fn parse_sections(payload: &Map<String, Value>) -> Result<Vec<Section>, ErrorDetail> {
    let items = payload
        .get("sections")
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
        .ok_or_else(|| ErrorDetail::business("InvalidPayload", "Report needs at least one section"))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let heading = item.get("heading").and_then(Value::as_str);
            let content = item.get("content").and_then(Value::as_str);
            match (heading, content) {
                (Some(h), Some(c)) => Ok(Section {
                    heading: h.to_string(),
                    content: c.to_string(),
                }),
                _ => Err(ErrorDetail::business(
                    "InvalidPayload",
                    format!("Section {i} needs string 'heading' and 'content'"),
                )
                .with_detail("index", i)),
            }
        })
        .collect()
}

fn render_markdown(title: &str, sections: &[Section]) -> String {
    let mut out = format!("# {title}\n");
    for s in sections {
        out.push_str(&format!("\n## {}\n\n{}\n", s.heading, s.content));
    }
    out
}

fn render_text(title: &str, sections: &[Section]) -> String {
    let mut out = format!("{}\n", title.to_uppercase());
    for (i, s) in sections.iter().enumerate() {
        out.push_str(&format!("\n{}. {}\n{}\n", i + 1, s.heading, s.content));
    }
    out
}

#[async_trait]
impl Subreducer for ReportGenerationSubreducer {
    fn name(&self) -> &str {
        NAME
    }

    fn supports_workflow_type(&self, workflow_type: WorkflowType) -> bool {
        workflow_type == WorkflowType::ReportGeneration
    }

    async fn process(&self, request: &WorkflowRequest) -> SubreducerResult {
        let start = Instant::now();
        match self.generate(request.payload()) {
            Ok(result) => {
                SubreducerResult::success(request.workflow_id(), NAME, result, elapsed_ms(start))
            }
            Err(error) => {
                SubreducerResult::failure(request.workflow_id(), NAME, error, elapsed_ms(start))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(payload: Value) -> WorkflowRequest {
        WorkflowRequest::new(WorkflowType::ReportGeneration, "weekly-42")
            .unwrap()
            .with_payload(payload)
            .unwrap()
    }

    fn sections() -> Value {
        json!([
            {"heading": "Summary", "content": "All good."},
            {"heading": "Risks", "content": "None."}
        ])
    }

    #[tokio::test]
    async fn renders_markdown() {
        let sub = ReportGenerationSubreducer::default();
        let result = sub
            .process(&request(json!({"title": "Weekly", "sections": sections()})))
            .await;

        assert!(result.success);
        let out = result.result.unwrap();
        assert_eq!(
            out["report"],
            "# Weekly\n\n## Summary\n\nAll good.\n\n## Risks\n\nNone.\n"
        );
        assert_eq!(out["section_count"], 2);
    }

    #[tokio::test]
    async fn renders_text_with_numbered_sections() {
        let sub = ReportGenerationSubreducer::with_default_format("text");
        let result = sub
            .process(&request(json!({"title": "Weekly", "sections": sections()})))
            .await;

        let report = result.result.unwrap()["report"].as_str().unwrap().to_string();
        assert!(report.starts_with("WEEKLY\n"));
        assert!(report.contains("2. Risks\nNone."));
    }

    #[tokio::test]
    async fn json_format_is_parseable() {
        let sub = ReportGenerationSubreducer::default();
        let result = sub
            .process(&request(
                json!({"title": "Weekly", "sections": sections(), "format": "json"}),
            ))
            .await;

        let report = result.result.unwrap()["report"].as_str().unwrap().to_string();
        let parsed: Value = serde_json::from_str(&report).unwrap();
        assert_eq!(parsed["sections"][1]["heading"], "Risks");
    }

    #[tokio::test]
    async fn missing_title_or_sections_fails() {
        let sub = ReportGenerationSubreducer::default();
        let no_title = sub.process(&request(json!({"sections": sections()}))).await;
        assert!(!no_title.success);

        let no_sections = sub
            .process(&request(json!({"title": "T", "sections": []})))
            .await;
        assert_eq!(
            no_sections.error.unwrap().error_message,
            "Report needs at least one section"
        );
    }

    #[tokio::test]
    async fn malformed_section_reports_index() {
        let sub = ReportGenerationSubreducer::default();
        let result = sub
            .process(&request(json!({
                "title": "T",
                "sections": [{"heading": "ok", "content": "ok"}, {"heading": "no content"}]
            })))
            .await;
        assert_eq!(result.error.unwrap().details["index"], json!(1));
    }
}
