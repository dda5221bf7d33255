use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use prospector::assess::{pre_assess_item, translate_headline};
use prospector::db::{Database, Persistence};
use prospector::llm::LLMProvider;
use prospector::pipeline::{AbortHandle, HttpFetcher, PipelineCoordinator};
use prospector::schema::{self, SchemaName};
use prospector::{CandidateItem, PipelineConfig, Source};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and print the run report as JSON
    Run {
        /// JSON file with source definitions; they are stored before the run.
        /// Without it, sources are loaded from the database.
        #[arg(short, long)]
        sources: Option<PathBuf>,
    },

    /// Store source definitions from a JSON file
    ImportSources {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Classify a single headline
    Triage {
        #[arg(long)]
        headline: String,

        /// Publication the headline came from
        #[arg(short, long, default_value = "cli")]
        source: String,
    },

    /// Translate a headline (and optional summary) into English
    Translate {
        #[arg(long)]
        headline: String,

        #[arg(long)]
        summary: Option<String>,
    },

    /// Check a JSON file against a structured-output contract
    Validate {
        /// Contract name, e.g. batchHeadlineAssessment
        #[arg(short, long)]
        schema: SchemaName,

        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print the JSON Schema of a contract
    Schema {
        #[arg(short, long)]
        name: SchemaName,
    },
}

fn read_sources(path: &PathBuf) -> Result<Vec<Source>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing sources in {}", path.display()))
}

async fn open_database(config: &PipelineConfig) -> Result<Database> {
    Database::new(&config.database_path)
        .await
        .with_context(|| format!("opening database {}", config.database_path))
}

async fn import_sources(db: &Database, sources: &[Source]) -> Result<()> {
    for source in sources {
        db.upsert_source(source).await?;
    }
    info!("Stored {} sources", sources.len());
    Ok(())
}

async fn run_pipeline(config: PipelineConfig, sources_file: Option<PathBuf>) -> Result<()> {
    let db = Arc::new(open_database(&config).await?);
    if let Some(path) = &sources_file {
        import_sources(&db, &read_sources(path)?).await?;
    }
    let sources = db.load_sources().await?;
    if sources.is_empty() {
        return Err(anyhow!("no sources configured; use --sources or import-sources"));
    }

    let provider = Arc::new(LLMProvider::from_config(&config)?);
    let fetcher = Arc::new(HttpFetcher::new()?);
    let abort = AbortHandle::new();
    let mut coordinator = PipelineCoordinator::new(provider, db, fetcher).with_abort_handle(abort.clone());
    coordinator.initialize(config).await?;

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_err() {
            error!("Failed to listen for ctrl-c");
            return;
        }
        info!("Abort requested; stopping after the current stage");
        abort.abort();
    });

    let report = coordinator.run(&sources).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    prospector::logging::configure_logging();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env()?;

    match cli.command {
        Commands::Run { sources } => run_pipeline(config, sources).await?,
        Commands::ImportSources { file } => {
            let db = open_database(&config).await?;
            import_sources(&db, &read_sources(&file)?).await?;
        }
        Commands::Triage { headline, source } => {
            config.verify()?;
            let provider = LLMProvider::from_config(&config)?;
            let item = CandidateItem {
                headline,
                link: String::new(),
                source: source.clone(),
                newspaper: source,
                custom_data: None,
            };
            let triage = pre_assess_item(&provider, &item).await.map_err(|e| anyhow!("{}", e))?;
            println!("{}", serde_json::to_string_pretty(&triage)?);
        }
        Commands::Translate { headline, summary } => {
            config.verify()?;
            let provider = LLMProvider::from_config(&config)?;
            let translated = translate_headline(&provider, &headline, summary.as_deref())
                .await
                .map_err(|e| anyhow!("{}", e))?;
            println!("{}", serde_json::to_string_pretty(&translated)?);
        }
        Commands::Validate { schema, file } => {
            let raw = std::fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            match schema::validate(schema, &value) {
                Ok(_) => println!("{}: valid", schema),
                Err(errors) => {
                    for violation in errors.violations() {
                        println!("{}", violation);
                    }
                    return Err(anyhow!("{} violation(s) of {}", errors.violations().len(), schema));
                }
            }
        }
        Commands::Schema { name } => {
            println!("{}", serde_json::to_string_pretty(&name.json_schema())?);
        }
    }

    Ok(())
}
