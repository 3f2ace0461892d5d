pub mod anatomy;
pub mod config;
pub mod evaluation;
pub mod geometry;
pub mod guidance;
pub mod mesh;
pub mod metric;
pub mod metrics;
pub mod params;
pub mod registry;
pub mod report;
pub mod sample;


pub use config::{EvaluationConfig, Recording, Thresholds};
pub use evaluation::{Evaluation, EvaluationError};
pub use guidance::ToolGeometry;
pub use metric::{MetricValue, StreamingMetric};
pub use registry::{Metric, MetricKind, MetricNotFound, MetricRegistry};
pub use report::EvaluationReport;
pub use sample::{PoseSample, ReferenceTrajectory, Role};
