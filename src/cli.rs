use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::{Table, Tabled};

use wildguard::ml::{
    load_records, parse_record, parse_records, Label, ModelLifecycle, ModelStore, PredictionService,
    Record, TrainedModel,
};
use wildguard::Config;

#[derive(Parser)]
#[command(name = "wildguard")]
#[command(author, version, about = "Isolation-forest anomaly detection for sensor telemetry")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Model artifact path (overrides the config file)
    #[arg(short, long, global = true)]
    pub model: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train a model unless one is already persisted
    Train {
        /// Training records (JSON array or JSON Lines)
        #[arg(long)]
        data: PathBuf,
    },

    /// Train a new model and replace the persisted one
    Retrain {
        /// Training records (JSON array or JSON Lines); fallback model if omitted
        #[arg(long)]
        data: Option<PathBuf>,
    },

    /// Classify records as inliers or outliers
    Predict {
        /// A single record as a JSON object
        #[arg(short, long, conflicts_with = "input")]
        record: Option<String>,

        /// File of records (JSON array or JSON Lines); stdin if neither is given
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Decision threshold (default from config)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "json")]
        format: OutputFormat,
    },

    /// Show persisted model metadata
    Info,

    /// Generate default configuration file
    GenConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line
    Json,
    /// Human-readable table
    Table,
}

/// Table row for predictions
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Missing")]
    missing: String,
}

pub fn run_command(cli: Cli) -> Result<()> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;
    if let Some(path) = cli.model {
        config.storage.model_path = path;
    }

    match cli.command {
        Commands::Train { data } => cmd_train(config, data),
        Commands::Retrain { data } => cmd_retrain(config, data),
        Commands::Predict {
            record,
            input,
            threshold,
            format,
        } => cmd_predict(config, record, input, threshold, format),
        Commands::Info => cmd_info(config),
        Commands::GenConfig { output } => cmd_gen_config(output),
    }
}

fn lifecycle(config: &Config) -> ModelLifecycle {
    ModelLifecycle::with_path(config.model.clone(), config.model_path())
}

fn read_dataset(path: &Path) -> Result<Vec<Record>> {
    load_records(path).with_context(|| format!("Failed to load dataset: {}", path.display()))
}

fn cmd_train(config: Config, data: PathBuf) -> Result<()> {
    let lifecycle = lifecycle(&config);
    let existed = lifecycle.store().exists();
    let records = read_dataset(&data)?;

    let model = lifecycle.obtain(Some(records.as_slice()))?;

    if existed {
        println!(
            "{} model already exists at {} (use retrain to replace it)",
            "Note:".yellow().bold(),
            config.model_path().display()
        );
    }
    print_model_summary(&model);
    Ok(())
}

fn cmd_retrain(config: Config, data: Option<PathBuf>) -> Result<()> {
    let lifecycle = lifecycle(&config);
    let records = data.as_deref().map(read_dataset).transpose()?;

    let model = lifecycle.retrain(records.as_deref())?;

    println!(
        "{} {}",
        "Retrained:".green().bold(),
        config.model_path().display()
    );
    print_model_summary(&model);
    Ok(())
}

fn print_model_summary(model: &TrainedModel) {
    let origin = if model.is_fallback() {
        model.origin.as_str().yellow().bold()
    } else {
        model.origin.as_str().green().bold()
    };
    println!("Origin:       {}", origin);
    println!("Samples:      {}", model.sample_count);
    println!("Trees:        {}", model.forest.num_trees());
    println!("Sample size:  {}", model.forest.sample_size());
    println!(
        "Trained at:   {}",
        model.trained_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
}

fn cmd_predict(
    config: Config,
    record: Option<String>,
    input: Option<PathBuf>,
    threshold: Option<f64>,
    format: OutputFormat,
) -> Result<()> {
    let records = match (record, input) {
        (Some(json), _) => vec![parse_record(&json).context("Invalid --record")?],
        (None, Some(path)) => read_dataset(&path)?,
        (None, None) => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Failed to read records from stdin")?;
            parse_records(&content).context("Invalid records on stdin")?
        }
    };

    let model = lifecycle(&config).obtain(None)?;
    let threshold = threshold.unwrap_or(config.model.threshold);
    let service = PredictionService::new(Arc::new(model), threshold)?;

    let predictions = service.predict_batch(&records);

    match format {
        OutputFormat::Json => {
            for prediction in &predictions {
                println!("{}", serde_json::to_string(prediction)?);
            }
        }
        OutputFormat::Table => {
            let rows: Vec<PredictionRow> = records
                .iter()
                .zip(&predictions)
                .map(|(record, p)| PredictionRow {
                    node: record
                        .get("node_id")
                        .and_then(Value::as_str)
                        .unwrap_or("-")
                        .to_string(),
                    label: match p.label {
                        Label::Outlier => p.label.as_str().red().bold().to_string(),
                        Label::Inlier => p.label.as_str().to_string(),
                    },
                    score: p
                        .score
                        .map(|s| format!("{:.4}", s))
                        .unwrap_or_else(|| "-".to_string()),
                    missing: p.missing_feature.clone().unwrap_or_default(),
                })
                .collect();

            println!("{}", Table::new(rows));

            let stats = service.stats();
            println!(
                "{} records, {} outliers, {} missing features",
                stats.predictions, stats.outliers, stats.missing_features
            );
        }
    }

    Ok(())
}

fn cmd_info(config: Config) -> Result<()> {
    let store = ModelStore::new(config.model_path());
    let Some(info) = store.info()? else {
        println!(
            "No model at {} (run train to create one)",
            config.model_path().display()
        );
        return Ok(());
    };

    println!("{}", "=== wildguard Model ===".bold());
    println!("Path:         {}", info.path.display());
    println!("Format:       v{}", info.version);
    println!("Size:         {} bytes", info.size_bytes);
    println!("Origin:       {}", info.origin.as_str());
    println!("Samples:      {}", info.sample_count);
    println!("Trees:        {}", info.num_trees);
    println!("Sample size:  {}", info.sample_size);
    println!(
        "Trained at:   {}",
        info.trained_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "Saved at:     {} on {}",
        info.saved_at.format("%Y-%m-%d %H:%M:%S UTC"),
        info.host_id
    );

    Ok(())
}

fn cmd_gen_config(output: Option<PathBuf>) -> Result<()> {
    let config = Config::default();

    match output {
        Some(path) => {
            config.save(&path)?;
            println!("Configuration written to {}", path.display());
        }
        None => {
            println!("{}", config.to_toml()?);
        }
    }

    Ok(())
}
