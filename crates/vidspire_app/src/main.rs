use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use vidspire_app::app::App;
use vidspire_app::config::{self, Overrides};
use vidspire_app::persistence::Store;
use vidspire_core::{ContentType, Feature, IdeaRequest, SearchQuery, SortOrder};
use vidspire_engine::{ensure_state_dir, EngineHandle};

#[derive(Debug, Parser)]
#[command(name = "vidspire", version, about = "Terminal client for the Vidspire backend")]
struct Cli {
    /// Base URL of the HTTP API.
    #[arg(long, env = "VIDSPIRE_API_URL", global = true)]
    api_url: Option<String>,

    /// Base URL of the push channel.
    #[arg(long, env = "VIDSPIRE_SOCKET_URL", global = true)]
    socket_url: Option<String>,

    /// Directory holding the job ledger, usage snapshots and `vidspire.ron`.
    #[arg(long, default_value = ".vidspire", global = true)]
    state_dir: PathBuf,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze the comments of a video and follow the job to its end.
    Analyze { url: String },
    /// Open an existing job from a shared link or a job id.
    Resume { link: String },
    /// List active, completed and recent jobs.
    Jobs,
    /// Show remaining daily usage.
    Usage { feature: Option<Feature> },
    /// Score a video idea.
    Validate {
        #[arg(long)]
        idea: String,
        #[arg(long)]
        audience: String,
        #[arg(long)]
        goal: String,
    },
    /// Search for outlier videos.
    Search {
        query: String,
        #[arg(long)]
        content_type: Option<ContentType>,
        #[arg(long)]
        sort: Option<SortOrder>,
        #[arg(long)]
        viral_score: Option<u32>,
        #[arg(long)]
        min_views: Option<u64>,
        #[arg(long, default_value_t = vidspire_core::DEFAULT_MAX_RESULTS)]
        max_results: u32,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    engine_logging::initialize(level, cli.log_file.as_deref());

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    ensure_state_dir(&cli.state_dir)?;
    let settings = config::load(
        &cli.state_dir,
        Overrides {
            api_url: cli.api_url,
            socket_url: cli.socket_url,
        },
    )?;
    let engine = EngineHandle::new(settings.engine).context("failed to start engine")?;
    let mut app = App::new(engine, Store::new(settings.state_dir), io::stdout().lock());

    match cli.command {
        Command::Analyze { url } => app.analyze(&url),
        Command::Resume { link } => app.resume(&link),
        Command::Jobs => app.jobs().map(|()| true),
        Command::Usage { feature } => {
            let features = match feature {
                Some(feature) => vec![feature],
                None => Feature::ALL.to_vec(),
            };
            app.usage(&features).map(|()| true)
        }
        Command::Validate {
            idea,
            audience,
            goal,
        } => app.validate(IdeaRequest {
            idea,
            target_audience: audience,
            goal,
        }),
        Command::Search {
            query,
            content_type,
            sort,
            viral_score,
            min_views,
            max_results,
        } => app.search(SearchQuery {
            content_type,
            sort,
            viral_score,
            min_views,
            max_results: Some(max_results),
            ..SearchQuery::new(query)
        }),
    }
}
