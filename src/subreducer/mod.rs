//! The subreducer interface and the built-in implementations.
//!
//! A subreducer owns the business logic for one or more workflow types. It
//! never raises: bad input comes back as a failed [`SubreducerResult`].

mod data_analysis;
mod document_regeneration;
mod report_generation;

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::types::{WorkflowRequest, WorkflowType};

pub use data_analysis::DataAnalysisSubreducer;
pub use document_regeneration::DocumentRegenerationSubreducer;
pub use report_generation::ReportGenerationSubreducer;
pub use crate::types::SubreducerResult;

#[async_trait]
pub trait Subreducer: Send + Sync {
    /// Name the router maps workflow types to.
    fn name(&self) -> &str;

    fn supports_workflow_type(&self, workflow_type: WorkflowType) -> bool;

    async fn process(&self, request: &WorkflowRequest) -> SubreducerResult;
}

/// Builds subreducer instances on demand for the registry.
pub type SubreducerFactory = Arc<dyn Fn() -> Arc<dyn Subreducer> + Send + Sync>;

/// Wrap a constructor closure as a [`SubreducerFactory`].
pub fn factory<S, F>(build: F) -> SubreducerFactory
where
    S: Subreducer + 'static,
    F: Fn() -> S + Send + Sync + 'static,
{
    Arc::new(move || Arc::new(build()) as Arc<dyn Subreducer>)
}

pub(crate) fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
