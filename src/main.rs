use anyhow::Context;
use clap::{Parser, Subcommand};
use reporter_updater::batch::{self, BatchRunner, BatchSettings};
use reporter_updater::config::Config;
use reporter_updater::directory::{self, DirectoryStore};
use reporter_updater::handlers::{self, AppState};
use reporter_updater::models::BatchRequest;
use reporter_updater::services::{GoogleSearchService, GrokService};
use reporter_updater::table::FIRST_DATA_ROW;
use reporter_updater::table_storage::TableStorage;
use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE: &str = "reporter-updater.log";

#[derive(Parser)]
#[command(
    name = "reporter-updater",
    version,
    about = "Keeps a media contact list current using web search and LLM extraction"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the JSON API (default)
    Serve {
        /// Overrides PORT
        #[arg(long)]
        port: Option<u16>,
    },
    /// Process a window of working-table rows, then save once with a backup
    Batch {
        /// Sheet row to start at (row 1 is the header)
        #[arg(long, default_value_t = FIRST_DATA_ROW)]
        start_row: usize,
        /// Number of rows, defaults to BATCH_SIZE
        #[arg(long)]
        count: Option<usize>,
        /// Confidence threshold for auto-update, defaults to CONFIDENCE_THRESHOLD
        #[arg(long)]
        threshold: Option<u8>,
    },
    /// Search and extract one person without touching the working table
    Lookup {
        name: String,
        #[arg(long)]
        threshold: Option<u8>,
        /// Write the result to the cache folder
        #[arg(long)]
        save: bool,
    },
    /// Print the effective configuration and any problems
    CheckConfig,
    /// Call each collaborator once and report whether it answers
    TestApis,
    /// Journalist directory dataset
    Directory {
        #[command(subcommand)]
        action: DirectoryAction,
    },
}

#[derive(Subcommand)]
enum DirectoryAction {
    /// Organizations grouped by scraping priority
    List,
    /// Directory statistics
    Stats,
    /// Extract staff from already-fetched page text and merge them in
    Ingest {
        /// Organization id from media_organizations.json
        #[arg(long)]
        org: String,
        /// Text file with the page content
        #[arg(long)]
        file: PathBuf,
        /// Page URL recorded on each entry, defaults to the organization's staff page
        #[arg(long)]
        source_url: Option<String>,
    },
}

/// Stderr output plus a plain-text log file when it can be opened.
fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("reporter_updater={},tower_http=debug", config.log_level).into()
    });

    let log_path = config.logs_dir.join(LOG_FILE);
    let file_layer = std::fs::create_dir_all(&config.logs_dir)
        .and_then(|_| OpenOptions::new().create(true).append(true).open(&log_path))
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
        })
        .map_err(|e| eprintln!("Log file {} unavailable: {}", log_path.display(), e))
        .ok();

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    init_tracing(&config);
    tracing::info!("Configuration loaded successfully");

    for problem in config.validate() {
        tracing::warn!("{}", problem);
    }
    config
        .ensure_directories()
        .context("Failed to create output, log or cache folder")?;

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => serve(config, port).await,
        Commands::Batch {
            start_row,
            count,
            threshold,
        } => run_batch(&config, start_row, count, threshold).await,
        Commands::Lookup {
            name,
            threshold,
            save,
        } => run_lookup(&config, &name, threshold, save).await,
        Commands::CheckConfig => check_config(&config),
        Commands::TestApis => {
            test_apis(&config).await;
            Ok(())
        }
        Commands::Directory { action } => run_directory(&config, action).await,
    }
}

async fn serve(config: Config, port: Option<u16>) -> anyhow::Result<()> {
    config.log_summary();
    let port = port.unwrap_or(config.port);
    let state = Arc::new(AppState::from_config(config));

    // 10 req/sec per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .context("Invalid rate limiter configuration")?,
    );

    let app = handlers::router(state).layer(GovernorLayer {
        config: governor_conf,
    });

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn run_batch(
    config: &Config,
    start_row: usize,
    count: Option<usize>,
    threshold: Option<u8>,
) -> anyhow::Result<()> {
    config.log_summary();
    let search = GoogleSearchService::from_config(config)?;
    let extractor = GrokService::from_config(config)?;
    let storage = TableStorage::new(
        config.working_table.clone(),
        config.output_dir.clone(),
        &config.backup_entity,
    );

    let request = BatchRequest {
        start_row,
        count: count.unwrap_or(config.batch_size),
        threshold: threshold.unwrap_or(config.confidence_threshold),
    };

    let mut runner = BatchRunner::new(
        &search,
        &extractor,
        &storage,
        BatchSettings::from_config(config),
    );
    let result = runner.run(request).await?;

    print_json(&result)
}

async fn run_lookup(
    config: &Config,
    name: &str,
    threshold: Option<u8>,
    save: bool,
) -> anyhow::Result<()> {
    let search = GoogleSearchService::from_config(config)?;
    let extractor = GrokService::from_config(config)?;

    let report = batch::lookup(
        &search,
        &extractor,
        &BatchSettings::from_config(config),
        name,
        threshold.unwrap_or(config.confidence_threshold),
    )
    .await?;

    if save {
        let path = config.cache_dir.join(format!(
            "lookup_{}.json",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ));
        std::fs::write(&path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Lookup saved to {}", path.display());
    }

    print_json(&report)
}

fn check_config(config: &Config) -> anyhow::Result<()> {
    print_json(config)?;

    let problems = config.validate();
    if problems.is_empty() {
        println!("✓ Configuration OK");
    } else {
        for problem in problems {
            println!("✗ {}", problem);
        }
    }
    Ok(())
}

async fn test_apis(config: &Config) {
    match GoogleSearchService::from_config(config) {
        Ok(search) => match search.try_search("test", 1).await {
            Ok(results) => println!("✓ Google Search: OK ({} result(s))", results.len()),
            Err(e) => println!("✗ Google Search: {}", e),
        },
        Err(e) => println!("✗ Google Search: {}", e),
    }

    match GrokService::from_config(config) {
        Ok(grok) => match grok.ping().await {
            Ok(reply) => println!("✓ Grok ({}): OK, replied {:?}", config.grok_model, reply),
            Err(e) => println!("✗ Grok: {}", e),
        },
        Err(e) => println!("✗ Grok: {}", e),
    }
}

async fn run_directory(config: &Config, action: DirectoryAction) -> anyhow::Result<()> {
    let store = DirectoryStore::new(config.data_dir.clone());

    match action {
        DirectoryAction::List => {
            let orgs = store.load_organizations_async().await?.organizations;
            for (priority, group) in directory::organizations_by_priority(&orgs) {
                println!("Priority {} ({} organizations)", priority, group.len());
                for org in group {
                    println!(
                        "  {:<20} {:<30} {:<8} {}",
                        org.id,
                        org.name_english,
                        org.status.as_deref().unwrap_or("-"),
                        org.scrape_url().unwrap_or("-")
                    );
                }
            }
            Ok(())
        }
        DirectoryAction::Stats => {
            let data = store.load_journalists_async().await?;
            print_json(&directory::directory_stats(&data))
        }
        DirectoryAction::Ingest {
            org,
            file,
            source_url,
        } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let extractor = GrokService::from_config(config)?;

            let report = directory::ingest_page(
                &store,
                &extractor,
                &org,
                &content,
                source_url.as_deref(),
                chrono::Local::now(),
            )
            .await?;

            print_json(&report)
        }
    }
}
