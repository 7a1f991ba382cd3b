//! Heart Risk CLI Tool
//!
//! Assess heart disease risk from questionnaire answers and inspect the
//! artifacts and reference data behind the assessment.
//!
//! Usage:
//!   heart-risk [--config <file>] [--threshold <t>] assess --input <answers.json|->
//!   heart-risk check
//!   heart-risk summary [--dataset <file.csv>]
//!   heart-risk evaluate [--dataset <file.csv>] [--parallel]
//!   heart-risk importance [--top <n>] [--by-column]

use clap::{Parser, Subcommand, ValueEnum};
use heart_risk::batch::BatchConfig;
use heart_risk::metrics::evaluate;
use heart_risk::summary::DatasetSummary;
use heart_risk::*;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "heart-risk")]
#[command(version)]
#[command(about = "Heart disease risk inference from survey health indicators", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Decision threshold, overrides configuration
    #[arg(short, long, global = true)]
    threshold: Option<f64>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Output file (stdout if not specified)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Pretty-printed JSON
    Json,
    /// Single-line JSON
    Compact,
}

#[derive(Subcommand)]
enum Commands {
    /// Assess one questionnaire submission
    Assess {
        /// JSON file with the answers, or '-' for stdin
        #[arg(short, long, default_value = "-")]
        input: String,
    },

    /// Load the artifacts and run the startup self-check
    Check,

    /// Describe the reference dataset
    Summary {
        /// Survey CSV (defaults to the configured dataset)
        #[arg(short, long)]
        dataset: Option<PathBuf>,
    },

    /// Score a labelled dataset and report classifier quality
    Evaluate {
        /// Survey CSV (defaults to the configured dataset)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Process in parallel (requires parallel feature)
        #[arg(long)]
        parallel: bool,

        /// Skip rows that cannot be scored instead of failing
        #[arg(long)]
        skip_invalid: bool,
    },

    /// Rank the encoded features by classifier importance
    Importance {
        /// Number of features to show
        #[arg(short = 'n', long, default_value_t = heart_risk::importance::DEFAULT_TOP_FEATURES)]
        top: usize,

        /// Sum one-hot slots into their source column
        #[arg(long)]
        by_column: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(threshold) = cli.threshold {
        config = config.with_threshold(threshold);
        config.validate()?;
    }

    let result = match cli.command {
        Commands::Assess { input } => run_assess(&config, &input)?,
        Commands::Check => run_check(&config)?,
        Commands::Summary { dataset } => run_summary(&config, dataset)?,
        Commands::Evaluate {
            dataset,
            parallel,
            skip_invalid,
        } => run_evaluate(&config, dataset, parallel, skip_invalid)?,
        Commands::Importance { top, by_column } => run_importance(&config, top, by_column)?,
    };

    let exit_code = match &result {
        Outcome::Report(_) => 0,
        Outcome::Rejected(_) => 2,
    };

    // Output result
    let output_str = match cli.format {
        OutputFormat::Json => serde_json::to_string_pretty(result.value())?,
        OutputFormat::Compact => serde_json::to_string(result.value())?,
    };

    if let Some(output_path) = cli.output {
        fs::write(&output_path, &output_str)?;
        eprintln!("Output written to: {}", output_path.display());
    } else {
        println!("{}", output_str);
    }

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

/// Command output; rejected submissions exit non-zero
enum Outcome {
    Report(serde_json::Value),
    Rejected(serde_json::Value),
}

impl Outcome {
    fn value(&self) -> &serde_json::Value {
        match self {
            Outcome::Report(v) | Outcome::Rejected(v) => v,
        }
    }
}

fn run_assess(config: &EngineConfig, input: &str) -> Result<Outcome, Box<dyn std::error::Error>> {
    let text = if input == "-" {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(input)?
    };
    let raw: RawInput = serde_json::from_str(&text)?;

    let engine = RiskEngine::from_config(config)?;

    let issues = engine.issues(&raw);
    if !issues.is_empty() {
        return Ok(Outcome::Rejected(serde_json::json!({
            "valid": false,
            "issues": issues,
        })));
    }

    let assessment = engine.assess(&raw)?;
    Ok(Outcome::Report(serde_json::to_value(&assessment)?))
}

fn run_check(config: &EngineConfig) -> Result<Outcome, Box<dyn std::error::Error>> {
    let engine = RiskEngine::from_config(config)?;
    engine.check()?;
    Ok(Outcome::Report(serde_json::json!({
        "status": "ok",
        "engine": engine.info(),
    })))
}

fn resolve_dataset(
    config: &EngineConfig,
    dataset: Option<PathBuf>,
) -> Result<ReferenceDataset, Box<dyn std::error::Error>> {
    let path = dataset
        .or_else(|| config.dataset_path.clone())
        .ok_or("No dataset given and none configured")?;
    Ok(ReferenceDataset::load(&path)?)
}

fn run_summary(
    config: &EngineConfig,
    dataset: Option<PathBuf>,
) -> Result<Outcome, Box<dyn std::error::Error>> {
    let dataset = resolve_dataset(config, dataset)?;
    let summary = DatasetSummary::from_dataset(&dataset)?;
    Ok(Outcome::Report(serde_json::to_value(&summary)?))
}

fn run_evaluate(
    config: &EngineConfig,
    dataset: Option<PathBuf>,
    parallel: bool,
    skip_invalid: bool,
) -> Result<Outcome, Box<dyn std::error::Error>> {
    let dataset = resolve_dataset(config, dataset)?;
    let engine = RiskEngine::from_config(config)?;

    let batch = BatchConfig::default()
        .with_parallel(parallel)
        .with_skip_invalid(skip_invalid);
    let report = evaluate(&engine, &dataset, engine.threshold(), batch)?;
    Ok(Outcome::Report(serde_json::to_value(&report)?))
}

fn run_importance(
    config: &EngineConfig,
    top: usize,
    by_column: bool,
) -> Result<Outcome, Box<dyn std::error::Error>> {
    let engine = RiskEngine::from_config(config)?;
    let mut report = engine.feature_importance()?;
    if by_column {
        report = report.by_column();
    }
    Ok(Outcome::Report(serde_json::to_value(report.truncated(top))?))
}
