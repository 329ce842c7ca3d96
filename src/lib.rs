//! Climate and environmental time-series analysis.
//!
//! A dataset of timestamped observations goes through validation,
//! cleaning, normalization and one requested analysis (trend, anomaly
//! detection or model evaluation) and comes back as an `AnalysisResult`.
//!
//! ```no_run
//! use climate_pipeline::{AnalysisRequest, Dataset, Pipeline, PipelineConfig};
//!
//! # fn load() -> Dataset { unimplemented!() }
//! let pipeline = Pipeline::new(PipelineConfig::default());
//! let request = AnalysisRequest::new("trend").with_param("window", 14);
//! let result = pipeline.run(&load(), &request)?;
//! println!("{}", serde_json::to_string_pretty(&result)?);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod analysis;
pub mod budget;
pub mod cache;
pub mod clean;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod features;
pub mod logging;
pub mod model;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod request;
pub mod result;
pub mod validate;

pub use cache::{CacheKey, InMemoryCache, ResultCache};
pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use model::{DataPoint, Dataset, Warning, WarningKind};
pub use pipeline::Pipeline;
pub use request::{AnalysisRequest, AnalysisType};
pub use result::{AnalysisResult, Section};
