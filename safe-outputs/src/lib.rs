//! Safe outputs: the boundary between an agent's free-form output stream and
//! the side effects performed on its behalf.
//!
//! At run time [`BatchCollector`] repairs, validates, sanitizes and quota
//! checks each emitted line into a [`Batch`]. At compile time
//! [`JobSpecBuilder`] turns the workflow configuration into one gated
//! dispatch step per enabled type.

mod collect;
pub mod condition;
mod config;
mod error;
pub mod manifest;
mod quota;
pub mod registry;
mod render;
mod repair;
pub mod sanitize;
mod steps;
mod telemetry;
pub mod token;
mod validate;

pub use collect::Batch;
pub use collect::BatchCollector;
pub use collect::DEFAULT_OUTPUT_PATH;
pub use collect::DEFAULT_REDACTED_LOG_PATH;
pub use condition::Condition;
pub use config::EngineConfig;
pub use config::IfNoChanges;
pub use config::SafeOutputsConfig;
pub use config::TypeConfig;
pub use config::WorkflowConfig;
pub use config::validate_token;
pub use error::CollectError;
pub use error::ConfigError;
pub use error::SafeOutputsError;
pub use error::SafeOutputsResult;
pub use manifest::EnvVarManifestEntry;
pub use quota::Quota;
pub use quota::QuotaEnforcer;
pub use quota::QuotaExceeded;
pub use registry::TypeSpec;
pub use render::RenderedJob;
pub use render::RenderedStep;
pub use render::render_jobs;
pub use render::to_json as jobs_to_json;
pub use render::to_yaml as jobs_to_yaml;
pub use repair::ParseError;
pub use repair::RawRecord;
pub use repair::parse_line;
pub use repair::repair;
pub use sanitize::RedactedDomainLog;
pub use sanitize::SanitizePolicy;
pub use sanitize::Sanitizer;
pub use steps::JobSpecBuilder;
pub use steps::PreStep;
pub use steps::StepSpecification;
pub use steps::build as build_steps;
pub use token::ResolvedToken;
pub use token::TokenSource;
pub use validate::SafeOutputItem;
pub use validate::validate;
