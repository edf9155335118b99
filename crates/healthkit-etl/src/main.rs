use std::path::PathBuf;

use clap::{Parser, Subcommand};
use healthkit_etl::cli::{commands, OutputFormat};
use healthkit_etl::config::{
    PipelineConfig, DEFAULT_BATCH_SIZE, DEFAULT_OUTPUT, DEFAULT_PROGRESS_INTERVAL,
};
use healthkit_etl::routes::MatchStrategyKind;

#[derive(Parser)]
#[command(name = "healthkit")]
#[command(author, version, about = "Convert an Apple Health export into a single Parquet dataset", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    /// Log per-route decisions and segment writes
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(clap::Args)]
struct ExportArgs {
    /// Path to export.xml
    #[arg(env = "HEALTHKIT_EXPORT")]
    export: PathBuf,

    /// Directory holding route files [default: <export dir>/workout-routes]
    #[arg(long, env = "HEALTHKIT_ROUTES")]
    routes: Option<PathBuf>,

    /// Route matching strategies, tried in order
    #[arg(long, value_enum, value_delimiter = ',', default_values = ["exact", "extension", "substring"])]
    strategy: Vec<MatchStrategyKind>,
}

impl ExportArgs {
    fn into_config(self) -> PipelineConfig {
        let mut config = PipelineConfig::new(self.export).with_strategies(self.strategy);
        if let Some(dir) = self.routes {
            config = config.with_route_dir(dir);
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Convert export.xml and its route files into one Parquet file
    Convert {
        #[command(flatten)]
        export: ExportArgs,

        /// Output Parquet file
        #[arg(short, long, env = "HEALTHKIT_OUTPUT", default_value = DEFAULT_OUTPUT)]
        output: PathBuf,

        /// Rows per segment (bounds memory use)
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Log progress every N elements (0 disables)
        #[arg(long, default_value_t = DEFAULT_PROGRESS_INTERVAL)]
        progress: u64,
    },
    /// Show how each workout's route reference resolves
    Routes {
        #[command(flatten)]
        export: ExportArgs,

        /// Only list references without a coordinate
        #[arg(long)]
        unresolved: bool,
    },
    /// Merge segments left by an interrupted run into the output
    Merge {
        /// Output Parquet file
        #[arg(short, long, env = "HEALTHKIT_OUTPUT", default_value = DEFAULT_OUTPUT)]
        output: PathBuf,

        /// Rows per row group in the merged file
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Delete segments left by an interrupted run
    Clean {
        /// Output Parquet file
        #[arg(short, long, env = "HEALTHKIT_OUTPUT", default_value = DEFAULT_OUTPUT)]
        output: PathBuf,
    },
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else if quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> healthkit_etl::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let result = match cli.command {
        Commands::Convert {
            export,
            output,
            batch_size,
            progress,
        } => {
            let config = export
                .into_config()
                .with_output(output)
                .with_batch_size(batch_size)
                .with_progress_interval(progress);
            commands::convert(config, cli.format).await
        }
        Commands::Routes { export, unresolved } => {
            commands::diagnose_routes(&export.into_config(), unresolved, cli.format)
        }
        Commands::Merge { output, batch_size } => commands::merge(&output, batch_size, cli.format),
        Commands::Clean { output } => commands::clean(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", healthkit_etl::error::format_user_error(&e));
        std::process::exit(1);
    }

    Ok(())
}
