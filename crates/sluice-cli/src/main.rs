use anyhow::Result;
use clap::{Parser, Subcommand};
use sluice::{
    compile_api_proposal_names, compile_task, transpile_task, watch_api_proposal_names, watch_task, CompileTaskOptions,
    SluiceConfig, CONFIG_FILE,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Compile, transpile and watch TypeScript source trees", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Configuration file
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Type-checking compile
    Compile {
        /// Source root (defaults to the configured one)
        #[arg(short, long)]
        src: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Production build: external source maps, localization, rewriting
        #[arg(short, long)]
        build: bool,

        /// Skip the rewrite stage
        #[arg(long)]
        disable_mangle: bool,
    },

    /// Transpile without type checking
    Transpile {
        #[arg(short, long)]
        src: Option<PathBuf>,

        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Use the in-process swc transpiler
        #[arg(long)]
        swc: bool,
    },

    /// Rebuild on every change
    Watch {
        #[arg(short, long)]
        src: Option<PathBuf>,

        #[arg(short, long)]
        out: Option<PathBuf>,

        #[arg(short, long)]
        build: bool,
    },

    /// Generate the API proposal manifest
    ApiProposalNames {
        #[arg(short, long)]
        src: Option<PathBuf>,

        /// Keep regenerating as proposals change
        #[arg(short, long)]
        watch: bool,
    },
}

/// Token cancelled on Ctrl-C
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
        }
        on_signal.cancel();
    });
    token
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        tracing::Level::TRACE
    } else if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.debug)
        .init();

    let config = SluiceConfig::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Compile {
            src,
            out,
            build,
            disable_mangle,
        } => {
            let options = CompileTaskOptions {
                disable_mangle: disable_mangle || config.disable_mangle,
                ..Default::default()
            };
            let src = src.unwrap_or(config.src);
            let out = out.unwrap_or(config.out);
            compile_task(&src, &out, build, options).await?;
        }
        Commands::Transpile { src, out, swc } => {
            let src = src.unwrap_or(config.src);
            let out = out.unwrap_or(config.out);
            transpile_task(&src, &out, swc).await?;
        }
        Commands::Watch { src, out, build } => {
            let src = src.unwrap_or_else(|| config.src.clone());
            let out = out.unwrap_or_else(|| config.out.clone());
            watch_task(&src, &out, build, &config, shutdown_token()).await?;
        }
        Commands::ApiProposalNames { src, watch } => {
            let src = src.unwrap_or_else(|| config.src.clone());
            if watch {
                watch_api_proposal_names(&src, &config, shutdown_token()).await?;
            } else {
                compile_api_proposal_names(&src).await?;
            }
        }
    }

    Ok(())
}
