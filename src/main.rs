use clap::{Parser, Subcommand};
use scenebuild::config::{self, BuildMode};
use scenebuild::graph::TaskGraph;
use scenebuild::stages::BuildContext;
use scenebuild::tools::Toolchain;
use scenebuild::{output, pipeline, watch};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once; version_string runs a single time per process
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "scenebuild")]
#[command(about = "Build orchestration for multi-scene web applications")]
#[command(long_about = "\
Build orchestration for multi-scene web applications

Compiles scene scripts, stylesheets and HTML imports into a deployable bundle.

Project structure:

  project/
  ├── scenebuild.toml              # Build config (optional)
  ├── index.html                   # Index template with {{key}} placeholders
  ├── elements/elements_en.html    # Shared elements document
  ├── scenes/
  │   └── airport/
  │       ├── airport-scene.html   # Scene document → flattened into dist/
  │       ├── airport.scss         # → airport.css
  │       └── js/*.js              # → airport-scene.min.js
  ├── sass/*.scss                  # → sass/*.css
  ├── _messages/<locale>/          # Chrome-format message tables
  └── third_party/                 # Compiler shared library and externs

Tasks (run 'scenebuild tasks' for prerequisites):
  clean, compass, compile-scenes, vulcanize-scenes, vulcanize-elements,
  vulcanize, i18n-index, copy-assets, default

Run 'scenebuild gen-config' to generate a documented scenebuild.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Project root
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Keep output readable: no minification, no stripping, write to dist_pretty
    #[arg(long, global = true)]
    pretty: bool,

    /// Config file (defaults to <root>/scenebuild.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log diagnostic detail (overridden by RUST_LOG)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a task and everything it depends on
    Build {
        #[arg(default_value = pipeline::DEFAULT)]
        target: String,
    },
    /// Print the execution order for a task without running anything
    Plan {
        #[arg(default_value = pipeline::DEFAULT)]
        target: String,
    },
    /// Rebuild stylesheets whenever their sources change
    Watch,
    /// Validate config and scene table without building
    Check,
    /// List declared tasks and their prerequisites
    Tasks,
    /// Print a stock scenebuild.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Check => {
            println!("==> Checking {}", cli.root.display());
            let graph = load_graph(&cli)?;
            graph.plan(pipeline::DEFAULT)?;
            println!("==> Config is valid");
        }
        Command::Tasks => {
            let graph = load_graph(&cli)?;
            output::print_lines(&output::format_task_list(graph.tasks()));
        }
        Command::Plan { target } => {
            let graph = load_graph(&cli)?;
            let order = graph.plan(target)?;
            let prerequisites: HashMap<&str, &[String]> = graph.tasks().collect();
            output::print_lines(&output::format_plan(target, &order, |task| {
                prerequisites.get(task).copied().unwrap_or(&[])
            }));
        }
        Command::Build { target } => {
            let graph = load_graph(&cli)?;
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    output::print_task_event(&event);
                }
            });
            let result = graph.run(target, Some(tx));
            // `run` dropped the sender, so the printer drains and exits.
            let _ = printer.join();
            output::print_summary(&result?);
        }
        Command::Watch => {
            let ctx = load_context(&cli)?;
            let patterns = ctx.config.stylesheets.patterns.clone();
            let graph = declare(ctx);
            watch::watch(&cli.root, &patterns, &graph)?;
        }
    }

    Ok(())
}

/// Route `tracing` output to stderr. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "scenebuild=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_context(cli: &Cli) -> Result<BuildContext, Box<dyn std::error::Error>> {
    let config = config::load_config(&cli.root, cli.config.as_deref())?;
    init_thread_pool(&config.processing);
    let mode = BuildMode::from_pretty_flag(cli.pretty);
    Ok(BuildContext::new(&cli.root, config, mode)?)
}

fn load_graph(cli: &Cli) -> Result<TaskGraph, Box<dyn std::error::Error>> {
    Ok(declare(load_context(cli)?))
}

fn declare(ctx: BuildContext) -> TaskGraph {
    let tools = Toolchain::from_config(&ctx.root, &ctx.config);
    pipeline::declare_build(Arc::new(ctx), Arc::new(tools))
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores: config can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
