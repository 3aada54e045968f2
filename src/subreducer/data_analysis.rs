use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{Subreducer, SubreducerResult, elapsed_ms};
use crate::types::{ErrorDetail, WorkflowRequest, WorkflowType, json_type_name};

const NAME: &str = "data_analysis";

/// Operations computed when the payload does not ask for a subset.
pub const DEFAULT_OPERATIONS: &[&str] = &[
    "count", "sum", "mean", "median", "mode", "stdev", "variance", "min", "max", "range",
];

/// Descriptive statistics over `payload.data`.
#[derive(Debug, Clone)]
pub struct DataAnalysisSubreducer {
    precision: u32,
}

impl Default for DataAnalysisSubreducer {
    fn default() -> Self {
        Self { precision: 4 }
    }
}

impl DataAnalysisSubreducer {
    pub fn with_precision(precision: u32) -> Self {
        Self { precision }
    }

    fn analyze(&self, payload: &Map<String, Value>) -> Result<Value, ErrorDetail> {
        let data = parse_data(payload)?;
        let operations = parse_operations(payload)?;

        let mut statistics = Map::new();
        let mut warnings = Vec::new();
        for op in &operations {
            let value = match (op.as_str(), compute(op, &data)) {
                ("count", _) => json!(data.len()),
                (_, Some(v)) if v.is_finite() => json!(round_to(v, self.precision)),
                (_, Some(_)) => {
                    warnings.push(format!("{op} overflowed the range of a 64-bit float"));
                    Value::Null
                }
                (_, None) => {
                    warnings.push(format!("{op} needs at least two data points"));
                    Value::Null
                }
            };
            statistics.insert(op.clone(), value);
        }

        Ok(json!({
            "analysis_type": "descriptive_statistics",
            "data_points": data.len(),
            "operations": operations,
            "statistics": statistics,
            "warnings": warnings,
        }))
    }
}

fn parse_data(payload: &Map<String, Value>) -> Result<Vec<f64>, ErrorDetail> {
    let raw = match payload.get("data") {
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(ErrorDetail::business(
                "InvalidPayload",
                format!("'data' must be an array, got {}", json_type_name(other)),
            ));
        }
        None => {
            return Err(ErrorDetail::business("InvalidPayload", "No data provided"));
        }
    };
    if raw.is_empty() {
        return Err(ErrorDetail::business("InvalidPayload", "No data provided"));
    }

    raw.iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_f64().ok_or_else(|| {
                ErrorDetail::business(
                    "InvalidPayload",
                    format!("'data' must contain only numbers (index {i} is {})", json_type_name(v)),
                )
                .with_detail("index", i)
            })
        })
        .collect()
}

fn parse_operations(payload: &Map<String, Value>) -> Result<Vec<String>, ErrorDetail> {
    let Some(requested) = payload.get("operations") else {
        return Ok(DEFAULT_OPERATIONS.iter().map(|s| s.to_string()).collect());
    };
    let Some(items) = requested.as_array() else {
        return Err(ErrorDetail::business(
            "InvalidPayload",
            "'operations' must be an array of operation names",
        ));
    };

    let mut operations = Vec::with_capacity(items.len());
    for item in items {
        match item.as_str() {
            Some(op) if DEFAULT_OPERATIONS.contains(&op) => operations.push(op.to_string()),
            Some(op) => {
                return Err(ErrorDetail::business(
                    "UnsupportedOperation",
                    format!("Unsupported operation '{op}'"),
                )
                .with_detail("supported", DEFAULT_OPERATIONS.to_vec()));
            }
            None => {
                return Err(ErrorDetail::business(
                    "InvalidPayload",
                    "'operations' must be an array of operation names",
                ));
            }
        }
    }
    Ok(operations)
}

/// `None` when the statistic is undefined for this many points.
fn compute(op: &str, data: &[f64]) -> Option<f64> {
    match op {
        "count" => Some(data.len() as f64),
        "sum" => Some(data.iter().sum()),
        "mean" => Some(mean(data)),
        "median" => Some(median(data)),
        "mode" => Some(mode(data)),
        "variance" => sample_variance(data),
        "stdev" => sample_variance(data).map(f64::sqrt),
        "min" => data.iter().copied().reduce(f64::min),
        "max" => data.iter().copied().reduce(f64::max),
        "range" => {
            let min = data.iter().copied().reduce(f64::min)?;
            let max = data.iter().copied().reduce(f64::max)?;
            Some(max - min)
        }
        _ => None,
    }
}

fn mean(data: &[f64]) -> f64 {
    data.iter().sum::<f64>() / data.len() as f64
}

fn median(data: &[f64]) -> f64 {
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Most common value; ties go to the value seen first.
fn mode(data: &[f64]) -> f64 {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    let mut order: Vec<f64> = Vec::new();
    for &x in data {
        // -0.0 and 0.0 count as the same value
        let x = if x == 0.0 { 0.0 } else { x };
        let entry = counts.entry(x.to_bits()).or_insert(0);
        if *entry == 0 {
            order.push(x);
        }
        *entry += 1;
    }

    let mut best = order[0];
    let mut best_count = 0;
    for x in order {
        let count = counts[&x.to_bits()];
        if count > best_count {
            best = x;
            best_count = count;
        }
    }
    best
}

fn sample_variance(data: &[f64]) -> Option<f64> {
    if data.len() < 2 {
        return None;
    }
    let m = mean(data);
    let ss: f64 = data.iter().map(|x| (x - m).powi(2)).sum();
    Some(ss / (data.len() - 1) as f64)
}

/// Values too large to scale by `10^precision` are returned unrounded.
fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    let scaled = value * factor;
    if scaled.is_finite() {
        scaled.round() / factor
    } else {
        value
    }
}

#[async_trait]
impl Subreducer for DataAnalysisSubreducer {
    fn name(&self) -> &str {
        NAME
    }

    fn supports_workflow_type(&self, workflow_type: WorkflowType) -> bool {
        workflow_type == WorkflowType::DataAnalysis
    }

    async fn process(&self, request: &WorkflowRequest) -> SubreducerResult {
        let start = Instant::now();
        match self.analyze(request.payload()) {
            Ok(result) => {
                tracing::debug!(workflow_id = %request.workflow_id(), "data analysis complete");
                SubreducerResult::success(request.workflow_id(), NAME, result, elapsed_ms(start))
            }
            Err(error) => {
                tracing::warn!(
                    workflow_id = %request.workflow_id(),
                    error_type = %error.error_type,
                    "data analysis rejected payload"
                );
                SubreducerResult::failure(request.workflow_id(), NAME, error, elapsed_ms(start))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(payload: Value) -> WorkflowRequest {
        WorkflowRequest::new(WorkflowType::DataAnalysis, "analysis-1")
            .unwrap()
            .with_payload(payload)
            .unwrap()
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn mode_prefers_first_on_tie() {
        assert_eq!(mode(&[1.0, 2.0, 2.0, 3.0]), 2.0);
        assert_eq!(mode(&[5.0, 7.0, 7.0, 5.0]), 5.0);
        assert_eq!(mode(&[9.0]), 9.0);
    }

    #[test]
    fn sample_variance_matches_known_values() {
        // 2,4,4,4,5,5,7,9: mean 5, sum of squares 32, n-1 = 7
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let var = sample_variance(&data).unwrap();
        assert!((var - 32.0 / 7.0).abs() < 1e-12);
        assert_eq!(sample_variance(&[1.0]), None);
    }

    #[tokio::test]
    async fn computes_all_statistics_by_default() {
        let sub = DataAnalysisSubreducer::default();
        let result = sub
            .process(&request(json!({"data": [1, 2, 3, 4, 4]})))
            .await;

        assert!(result.success);
        let stats = &result.result.unwrap()["statistics"];
        assert_eq!(stats["count"], json!(5));
        assert_eq!(stats["sum"], json!(14.0));
        assert_eq!(stats["mean"], json!(2.8));
        assert_eq!(stats["median"], json!(3.0));
        assert_eq!(stats["mode"], json!(4.0));
        assert_eq!(stats["range"], json!(3.0));
        assert_eq!(stats["variance"], json!(1.7));
    }

    #[tokio::test]
    async fn honours_requested_operations_and_precision() {
        let sub = DataAnalysisSubreducer::with_precision(2);
        let result = sub
            .process(&request(json!({"data": [1, 2, 2], "operations": ["mean"]})))
            .await;

        let out = result.result.unwrap();
        let stats = out["statistics"].as_object().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats["mean"], json!(1.67));
    }

    #[tokio::test]
    async fn single_point_nulls_spread_statistics() {
        let sub = DataAnalysisSubreducer::default();
        let result = sub.process(&request(json!({"data": [42]}))).await;

        assert!(result.success);
        let out = result.result.unwrap();
        assert_eq!(out["statistics"]["stdev"], Value::Null);
        assert_eq!(out["warnings"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_data_fails() {
        let sub = DataAnalysisSubreducer::default();
        let result = sub.process(&request(json!({"data": []}))).await;

        assert!(!result.success);
        let error = result.error.unwrap();
        assert_eq!(error.error_message, "No data provided");
        assert_eq!(error.kind, crate::error::FailureKind::Business);
    }

    #[tokio::test]
    async fn non_numeric_data_fails() {
        let sub = DataAnalysisSubreducer::default();
        let result = sub.process(&request(json!({"data": [1, "two"]}))).await;

        assert!(!result.success);
        assert_eq!(result.error.unwrap().details["index"], json!(1));
    }

    #[tokio::test]
    async fn unknown_operation_fails() {
        let sub = DataAnalysisSubreducer::default();
        let result = sub
            .process(&request(json!({"data": [1, 2], "operations": ["kurtosis"]})))
            .await;

        assert!(!result.success);
        assert_eq!(result.error.unwrap().error_type, "UnsupportedOperation");
    }

    #[test]
    fn round_to_keeps_huge_values() {
        assert_eq!(round_to(1e305, 4), 1e305);
        assert_eq!(round_to(1.23456, 2), 1.23);
    }

    #[tokio::test]
    async fn huge_values_are_kept_and_overflow_is_reported() {
        let sub = DataAnalysisSubreducer::default();
        let result = sub
            .process(&request(
                json!({"data": [1e305, 1e305], "operations": ["max", "sum", "count"]}),
            ))
            .await;

        assert!(result.success);
        let out = result.result.unwrap();
        assert_eq!(out["statistics"]["max"], json!(1e305));
        assert_eq!(out["statistics"]["count"], json!(2));
        assert_eq!(out["statistics"]["sum"], Value::Null);
        let warnings = out["warnings"].as_array().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].as_str().unwrap().starts_with("sum overflowed"));
    }
}
