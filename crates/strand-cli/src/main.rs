//! strand command-line driver
//!
//! Runs small workloads on the green-thread scheduler and reports what the
//! executors did.

mod commands;
mod logger;
mod output;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use strand_core::{IdlePolicy, SchedulerConfig};

#[derive(Parser)]
#[command(name = "strand")]
#[command(about = "Cooperative green threads with a dedicated I/O executor", long_about = None)]
#[command(version)]
struct Cli {
    /// Scheduler configuration file (TOML)
    #[arg(short, long, global = true, env = "STRAND_CONFIG")]
    config: Option<PathBuf>,

    /// Number of compute executors (1 or 2)
    #[arg(short = 'w', long, global = true, env = "STRAND_COMPUTE_WORKERS")]
    compute_workers: Option<usize>,

    /// Usable stack bytes per task
    #[arg(long, global = true)]
    stack_size: Option<usize>,

    /// What idle executors do
    #[arg(long, global = true, value_enum)]
    idle: Option<IdleArg>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Colored output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum IdleArg {
    Park,
    Poll,
}

impl From<IdleArg> for IdlePolicy {
    fn from(arg: IdleArg) -> Self {
        match arg {
            IdleArg::Park => IdlePolicy::Park,
            IdleArg::Poll => IdlePolicy::Poll,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run tasks that only yield, and report throughput
    Yield {
        /// Number of tasks
        #[arg(short, long, default_value_t = 8)]
        tasks: usize,
        /// Yields per task
        #[arg(short, long, default_value_t = 1000)]
        yields: usize,
    },

    /// Run tasks that write a file, read it back and verify it
    Io {
        /// Number of tasks
        #[arg(short, long, default_value_t = 8)]
        tasks: usize,
        /// Bytes written by each task
        #[arg(short, long, default_value_t = 4096)]
        bytes: usize,
        /// Directory for the scratch files (default: a fresh temp directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// Keep the scratch files
        #[arg(long)]
        keep: bool,
    },

    /// Read files concurrently, one task per file, and print them in order
    Cat {
        /// Files to print
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show the effective configuration and environment
    Info,
}

fn main() {
    let cli = Cli::parse();
    let color = output::resolve_color_choice(cli.color.as_deref());
    logger::init(cli.verbose, color);

    if let Err(e) = run(cli, color) {
        let mut out = output::StyledOutput::new(color);
        out.error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli, color: termcolor::ColorChoice) -> anyhow::Result<()> {
    let config = resolve_config(&cli)?;
    let mut out = output::StyledOutput::new(color);

    match cli.command {
        Commands::Yield { tasks, yields } => {
            commands::yield_load::execute(config, tasks, yields, &mut out)
        }
        Commands::Io {
            tasks,
            bytes,
            dir,
            keep,
        } => commands::io_load::execute(config, tasks, bytes, dir, keep, &mut out),
        Commands::Cat { files } => commands::cat::execute(config, files),
        Commands::Info => commands::info::execute(&config, cli.config.as_deref(), &mut out),
    }
}

/// Config file first, then individual flag overrides
fn resolve_config(cli: &Cli) -> anyhow::Result<SchedulerConfig> {
    let mut config = match &cli.config {
        Some(path) => SchedulerConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => SchedulerConfig::default(),
    };

    if let Some(workers) = cli.compute_workers {
        config = config.with_compute_workers(workers);
    }
    if let Some(bytes) = cli.stack_size {
        config = config.with_stack_size(bytes);
    }
    if let Some(idle) = cli.idle {
        config = config.with_idle(idle.into());
    }

    config.validate()?;
    Ok(config)
}
