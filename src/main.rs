//! climate-pipeline
//!
//! Runs one analysis over a JSON dataset and prints the result as JSON.
//!
//!   climate-pipeline --dataset data.json --analysis trend \
//!       [--config pipeline.toml] [--param window=14 ...] [--pretty]
//!
//! The dataset file is either a full `Dataset` object
//! (`{"source", "description", "points": [...]}`) or a bare array of
//! points, in which case the file name is used as the source.

use clap::Parser;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use climate_pipeline::config;
use climate_pipeline::logging::{self, Stage};
use climate_pipeline::{AnalysisRequest, DataPoint, Dataset, Pipeline};

#[derive(Parser)]
#[command(name = "climate-pipeline")]
#[command(about = "Clean, analyze and model climate time series", long_about = None)]
struct Cli {
    /// Dataset file (JSON)
    #[arg(short, long)]
    dataset: PathBuf,

    /// Analysis type (trend, anomaly, model-eval)
    #[arg(short, long)]
    analysis: String,

    /// Pipeline configuration (TOML); defaults to $CLIMATE_PIPELINE_CONFIG
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Request parameter as key=value; the value is read as JSON when it
    /// parses, otherwise as a string
    #[arg(short, long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Pretty-print the result
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let config = config::load_from_env(cli.config.as_deref())?;
    let level = config.logging.log_level()?;
    if let Err(e) = logging::init_logger(level, config.logging.file.as_deref(), config.logging.timestamps) {
        eprintln!("{}", e);
    }

    let dataset = load_dataset(&cli.dataset)?;
    let mut request = AnalysisRequest::new(cli.analysis.as_str());
    for param in &cli.params {
        let (key, value) = parse_param(param)?;
        request = request.with_param(key, value);
    }

    let pipeline = Pipeline::new(config);
    let result = match pipeline.run(&dataset, &request) {
        Ok(result) => result,
        Err(err) => {
            logging::error(Stage::System, Some(dataset.source()), &err.to_string());
            return Err(err.into());
        }
    };

    let json = if cli.pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", json);
    Ok(())
}

fn load_dataset(path: &Path) -> Result<Dataset, Box<dyn Error>> {
    let text = fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    if value.is_array() {
        let points: Vec<DataPoint> = serde_json::from_value(value)?;
        let source = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        return Ok(Dataset::new(source, "", points));
    }
    Ok(serde_json::from_value(value)?)
}

fn parse_param(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("parameter '{}' is not of the form key=value", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("parameter '{}' has an empty key", raw));
    }
    let value = serde_json::from_str(value.trim())
        .unwrap_or_else(|_| serde_json::Value::String(value.trim().to_string()));
    Ok((key.to_string(), value))
}
