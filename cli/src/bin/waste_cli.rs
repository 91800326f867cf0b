use clap::{Parser, Subcommand, ValueEnum};
use cli::AnalysisConfig;
use color_eyre::eyre::{Result, eyre};
use dataset::{DatasetRecord, ExportFormat, export_dataset};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{self, EnvFilter};
use waste_vision::{AnalysisCommand, BatchRunner, McCriteria, collect_images};

#[derive(Parser)]
#[command(author, version, about = "Decide whether photographed waste containers are full", long_about = None)]
struct Cli {
    /// Analysis configuration (.toml or .json); defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone, Default)]
struct FieldObservation {
    /// Lighting observed on site (faible, nuit, sombre, normal, fort, soleil, lumineux)
    #[arg(long)]
    eclairage: Option<String>,
    /// The container lid was open
    #[arg(long)]
    ouverte: bool,
    /// Chevron markings were visible
    #[arg(long)]
    chevrons: bool,
}

impl FieldObservation {
    fn is_set(&self) -> bool {
        self.eclairage.is_some() || self.ouverte || self.chevrons
    }

    fn to_criteria(&self) -> Result<Option<McCriteria>> {
        if !self.is_set() {
            return Ok(None);
        }
        Ok(Some(McCriteria::from_observation(
            self.eclairage.as_deref(),
            self.ouverte,
            self.chevrons,
        )?))
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum BatchMode {
    /// Basic features with rule and Canny labels
    Basic,
    /// The full fusion feature table
    Fusion,
}

#[derive(Clone, Copy, ValueEnum)]
enum SchemaTarget {
    Config,
    Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Basic features, rule label and Canny label for one image
    Classify {
        image: PathBuf,
        #[command(flatten)]
        observation: FieldObservation,
    },
    /// Top/bottom Canny edge ratio for one image
    Canny { image: PathBuf },
    /// Fusion feature row for one image
    Fusion {
        image: PathBuf,
        /// Write the row as a one-line dataset instead of printing JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Analyze every image in a folder and export a dataset
    Batch {
        folder: PathBuf,
        #[arg(short, long, value_enum, default_value = "basic")]
        mode: BatchMode,
        /// CSV path; the JSON document lands next to it
        #[arg(short, long, default_value = "image_features.csv")]
        output: PathBuf,
        /// Override the configured export format (csv, csv+json)
        #[arg(long)]
        format: Option<ExportFormat>,
        /// Override the configured worker count
        #[arg(long)]
        workers: Option<usize>,
        /// Override the configured per-image timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        #[command(flatten)]
        observation: FieldObservation,
    },
    /// Print a JSON schema
    Schema {
        #[arg(value_enum, default_value = "config")]
        target: SchemaTarget,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Classify { image, observation } => classify(config, &image, &observation)?,
        Commands::Canny { image } => canny(&config, &image)?,
        Commands::Fusion { image, output } => fusion(&config, &image, output.as_deref())?,
        Commands::Batch {
            folder,
            mode,
            output,
            format,
            workers,
            timeout_secs,
            observation,
        } => {
            let mut config = config;
            if let Some(workers) = workers {
                config.batch.workers = workers;
            }
            if let Some(timeout_secs) = timeout_secs {
                config.batch.timeout_secs = timeout_secs;
            }
            if let Some(format) = format {
                config.export_format = format;
            }
            if let Some(criteria) = observation.to_criteria()? {
                config.mc_criteria = Some(criteria);
            }
            batch(config, &folder, mode, &output).await?;
        }
        Commands::Schema { target } => {
            let schema = match target {
                SchemaTarget::Config => serde_json::to_value(AnalysisConfig::schema())?,
                SchemaTarget::Commands => serde_json::to_value(AnalysisCommand::schema())?,
            };
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<AnalysisConfig> {
    match path {
        Some(path) => {
            let config = AnalysisConfig::from_file(path)?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        }
        None => Ok(AnalysisConfig::default()),
    }
}

fn classify(mut config: AnalysisConfig, image: &Path, observation: &FieldObservation) -> Result<()> {
    if let Some(criteria) = observation.to_criteria()? {
        config.mc_criteria = Some(criteria);
    }
    let analyzer = config.analyzer()?;
    let analysis = analyzer.analyze_path(image)?;
    info!(
        "{}: rules say {} (score {}), canny says {}",
        analysis.filename,
        analysis.rules.label,
        analysis.rules.score,
        analysis
            .canny
            .map(|c| c.label.to_string())
            .unwrap_or_else(|| "nothing".to_string()),
    );
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}

fn canny(config: &AnalysisConfig, image: &Path) -> Result<()> {
    let analyzer = config.analyzer()?;
    let loaded = analyzer.load(waste_vision::ImageSource::Path(image))?;
    let verdict = analyzer
        .classify_canny(&loaded)?
        .ok_or_else(|| eyre!("Canny classification is disabled in the configuration"))?;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}

fn fusion(config: &AnalysisConfig, image: &Path, output: Option<&Path>) -> Result<()> {
    let analyzer = config.analyzer()?;
    let row = analyzer.fusion_path(image)?;
    info!("Extracted {} fusion values from {}", row.len(), image.display());

    match output {
        Some(output) => {
            let record = DatasetRecord::from_fusion(&row)?;
            let paths = export_dataset(&[record], output, config.export_format)?;
            info!("Row saved to {}", paths.csv.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&row)?),
    }
    Ok(())
}

async fn batch(config: AnalysisConfig, folder: &Path, mode: BatchMode, output: &Path) -> Result<()> {
    let images = collect_images(folder)?;
    if images.is_empty() {
        warn!("No images found in {}", folder.display());
        return Ok(());
    }
    info!("Found {} images in {}", images.len(), folder.display());

    let analyzer = Arc::new(config.analyzer()?);
    info!("{}", analyzer.info());
    let runner = BatchRunner::new(&config.batch)?;

    let (records, processed, failed, rate) = match mode {
        BatchMode::Basic => {
            let report = runner.analyze(analyzer, images).await;
            let (full, empty) = report.label_counts();
            info!("Labels: {full} pleine, {empty} vide");
            let agreeing = report
                .successes()
                .filter(|(_, analysis)| analysis.agrees() == Some(true))
                .count();
            info!("Rules and Canny agree on {agreeing} images");
            let records: Vec<_> = report
                .successes()
                .map(|(_, analysis)| DatasetRecord::from_analysis(analysis))
                .collect();
            (records, report.processed, report.failed, report.completion_rate())
        }
        BatchMode::Fusion => {
            let report = runner.fusion(analyzer, images).await;
            let records = report
                .successes()
                .map(|(_, row)| DatasetRecord::from_fusion(row))
                .collect::<Result<Vec<_>, _>>()?;
            (records, report.processed, report.failed, report.completion_rate())
        }
    };

    info!("Processed {processed} images, {failed} errors ({:.1}% completed)", rate * 100.0);
    if records.is_empty() {
        warn!("Every image failed; nothing exported");
        return Ok(());
    }

    let paths = export_dataset(&records, output, config.export_format)?;
    info!("Dataset saved to {}", paths.csv.display());
    if let Some(json) = paths.json {
        info!("JSON document saved to {}", json.display());
    }
    Ok(())
}
