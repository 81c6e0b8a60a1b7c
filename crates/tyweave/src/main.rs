//! tyweave command-line front end
//!
//! ```bash
//! # Type every top-level statement of a normalized JSON syntax tree
//! tyweave infer program.json --stats
//!
//! # Show the tree as surface syntax
//! tyweave print program.json
//! ```

mod config;
mod json_frontend;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use config::CliConfig;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::debug;
use tyweave_core::syntax::{read_tree, NodeKind};
use tyweave_core::{infer_type, Node, PhaseStats, Program};

#[derive(Parser)]
#[command(
    name = "tyweave",
    version = env!("CARGO_PKG_VERSION"),
    about = "Whole-program type inference over normalized syntax trees"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer and print the type of every top-level statement
    Infer(InferArgs),

    /// Pretty-print a syntax tree
    Print {
        /// JSON syntax tree
        file: PathBuf,
    },
}

#[derive(Debug, Args)]
struct InferArgs {
    /// JSON syntax tree
    file: PathBuf,

    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print per-phase timings
    #[arg(long)]
    stats: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let result = match cli.command {
        Commands::Infer(args) => infer_command(&args),
        Commands::Print { file } => print_command(&file),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            debug!(?err, "command failed");
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &InferArgs) -> Result<CliConfig> {
    let mut config = match &args.config {
        Some(path) => CliConfig::from_file(path)?,
        None => CliConfig::default(),
    };
    if args.stats {
        config.inference.stats = true;
    }
    if args.no_color {
        config.output.color = false;
    }
    Ok(config)
}

fn infer_command(args: &InferArgs) -> Result<ExitCode> {
    let config = load_config(args)?;
    if !config.output.color {
        colored::control::set_override(false);
    }

    let tree = read_tree(&args.file)?;
    let sources = top_level_statements(&tree);
    debug!(file = %args.file.display(), statements = sources.len(), "loaded syntax tree");

    let mut program = Program::new();
    let collaborators = json_frontend::collaborators();
    let inferred = match infer_type(&mut program, tree, &collaborators, &config.inference) {
        Ok(inferred) => inferred,
        Err(err) => {
            eprint!("{}", err.render(None).red());
            return Ok(ExitCode::FAILURE);
        }
    };

    for (source, statement) in sources.iter().zip(inferred.statements(&program)) {
        let ty = program
            .expr_type_name(statement)
            .unwrap_or_else(|| "?".to_string());
        if config.output.show_source {
            println!("{source} : {}", ty.green());
        } else {
            println!("{}", ty.green());
        }
    }
    if let Some(stats) = &inferred.stats {
        print_stats(stats);
    }
    Ok(ExitCode::SUCCESS)
}

fn top_level_statements(tree: &Node) -> Vec<Node> {
    match &tree.kind {
        NodeKind::Expressions { expressions } => expressions.clone(),
        _ => vec![tree.clone()],
    }
}

fn print_stats(stats: &PhaseStats) {
    eprintln!("{}", "Inference statistics".bold());
    eprintln!("  lower:           {:?}", stats.lower);
    eprintln!("  traverse:        {:?}", stats.traverse);
    eprintln!("  constants:       {:?}", stats.constants);
    eprintln!("  fix empty types: {:?}", stats.fix_empty_types);
    eprintln!(
        "  {} expressions, {} nodes, {} types, {} untyped nodes fixed",
        stats.expressions, stats.nodes, stats.types, stats.fixed_nodes
    );
}

fn print_command(file: &Path) -> Result<ExitCode> {
    let tree = read_tree(file)?;
    println!("{tree}");
    Ok(ExitCode::SUCCESS)
}
