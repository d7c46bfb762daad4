//! CLI argument parsing and command dispatch.

pub mod args;
pub mod commands;

use clap::{Parser, Subcommand};

use args::{CommonArgs, ServeArgs};

#[derive(Parser)]
#[command(name = "mdserve")]
#[command(about = "Browse and render a directory of Markdown files over HTTP", long_about = None)]
struct Cli {
    /// Log filter, e.g. "info" or "mdserve=debug" (RUST_LOG wins if set)
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the directory tree over HTTP
    Serve {
        #[command(flatten)]
        args: ServeArgs,
    },

    /// Print the scanned directory tree as JSON
    Tree {
        #[command(flatten)]
        args: CommonArgs,
    },

    /// Render a single markdown file to HTML on stdout
    Render {
        #[command(flatten)]
        args: CommonArgs,

        /// Path of the file, relative to the root
        file: String,
    },
}

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    match cli.command {
        Commands::Serve { args } => commands::serve::run(args),
        Commands::Tree { args } => commands::tree::run(args),
        Commands::Render { args, file } => commands::render::run(args, &file),
    }
}

fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    // keep stdout clean for command output (tree/render print there)
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
