mod cmd;
mod output;
mod root;
mod sign;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "save-video",
    about = "Generate and sign the Save Video shortcut, inspect generated documents, dry-run flows",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from shortcut.yaml or .git/)
    #[arg(long, global = true, env = "SAVE_VIDEO_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the main and debug documents and sign them (the default)
    Generate {
        /// Skip the signing service; only unsigned documents are written
        #[arg(long)]
        no_sign: bool,
    },

    /// Show the action outline of a generated document and validate it
    Inspect {
        /// Path to a .shortcut file
        file: PathBuf,
    },

    /// Dry-run a flow against a canned extraction response
    Trace {
        /// Extraction API response as JSON, or @path to read it from a file
        #[arg(long)]
        response: String,

        /// Share-sheet input URL
        #[arg(long)]
        input: Option<String>,

        /// Clipboard contents
        #[arg(long)]
        clipboard: Option<String>,

        /// Trace the debug flow instead of the main flow
        #[arg(long)]
        debug: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        None | Some(Commands::Generate { .. }) => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root_path = cli.root.as_deref();
    let root = root::resolve_root(root_path);

    let result = match cli.command {
        None => cmd::generate::run(&root, false, cli.json),
        Some(Commands::Generate { no_sign }) => cmd::generate::run(&root, no_sign, cli.json),
        Some(Commands::Inspect { file }) => cmd::inspect::run(&file, cli.json),
        Some(Commands::Trace {
            response,
            input,
            clipboard,
            debug,
        }) => cmd::trace::run(
            &root,
            cmd::trace::TraceArgs {
                response: &response,
                input: input.as_deref(),
                clipboard: clipboard.as_deref(),
                debug,
            },
            cli.json,
        ),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
