use clap::{Parser, Subcommand};
use logloom::cli::{first_pass, init_db, second_pass};
use logloom::config::{load_config, resolve_config_path};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "logloom")]
#[command(about = "Log template learning pipeline", long_about = None)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rule evolution over a raw log file.
    FirstPass {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        normal_out: Option<PathBuf>,
        #[arg(long)]
        size_threshold: Option<usize>,
        #[arg(long)]
        max_per_micro_batch: Option<usize>,
        #[arg(long)]
        chunk_lines: Option<usize>,
        #[arg(long)]
        micro_batch: Option<usize>,
        #[arg(long)]
        match_workers: Option<usize>,
        /// Run the committee once more on whatever remains buffered at EOF.
        #[arg(long)]
        force_flush: bool,
    },
    /// Aggregate match statistics over a normalized file.
    SecondPass {
        #[arg(long)]
        path: PathBuf,
        /// Explicit file id; defaults to deriving it from the file.
        #[arg(long)]
        file_id: Option<String>,
        #[arg(long)]
        chunk_lines: Option<usize>,
        #[arg(long)]
        micro_batch: Option<usize>,
        #[arg(long)]
        match_workers: Option<usize>,
    },
    /// Create the catalog and apply the schema.
    InitDb {
        #[arg(long)]
        db: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logloom=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = match load_config(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[ERR] config: {}", e);
            std::process::exit(2);
        }
    };

    let result = match cli.command {
        Commands::FirstPass {
            path,
            normal_out,
            size_threshold,
            max_per_micro_batch,
            chunk_lines,
            micro_batch,
            match_workers,
            force_flush,
        } => {
            first_pass::run(
                first_pass::FirstPassArgs {
                    path,
                    normal_out,
                    size_threshold,
                    max_per_micro_batch,
                    chunk_lines,
                    micro_batch,
                    match_workers,
                    force_flush,
                },
                &config,
            )
            .await
        }
        Commands::SecondPass {
            path,
            file_id,
            chunk_lines,
            micro_batch,
            match_workers,
        } => {
            second_pass::run(
                second_pass::SecondPassArgs {
                    path,
                    file_id,
                    chunk_lines,
                    micro_batch,
                    match_workers,
                },
                &config,
            )
            .await
        }
        Commands::InitDb { db } => init_db::run(db, &config).await,
    };

    if let Err(e) = result {
        eprintln!("[ERR] {}", e);
        std::process::exit(1);
    }
}
