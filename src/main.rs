//! Pipegraph CLI - check and dry-run pipe bundles

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use rustc_hash::FxHashSet;
use serde_json::Value;

use pipegraph::runtime::DryRunGenerator;
use pipegraph::{
    FixSuggestion, JobMetadata, Library, PipeError, PipeRouter, RunMode, RuntimeConfig,
    StuffFactory, WorkingMemory,
};

#[derive(Parser)]
#[command(name = "pipegraph")]
#[command(about = "Pipegraph - declarative pipeline runtime")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.config/pipegraph/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a bundle, print the dependency order and validate it
    Check {
        /// Path to a YAML or JSON bundle
        bundle: PathBuf,
    },

    /// Run a pipe in dry mode and print the resulting memory
    DryRun {
        /// Path to a YAML or JSON bundle
        bundle: PathBuf,

        /// Code of the pipe to run
        pipe: String,

        /// Input as name=text (repeatable); missing inputs are mocked
        #[arg(short, long = "input", value_parser = parse_input)]
        inputs: Vec<(String, String)>,

        /// Print the event log as JSON
        #[arg(long)]
        events: bool,
    },
}

fn parse_input(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, text)| (name.trim().to_string(), text.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected name=text, got '{raw}'"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match load_config(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Check { bundle } => check_bundle(&bundle, &config),
            Commands::DryRun {
                bundle,
                pipe,
                inputs,
                events,
            } => dry_run(&bundle, &pipe, inputs, events, config).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<RuntimeConfig, PipeError> {
    match path {
        Some(path) => RuntimeConfig::load_from(path)?.with_env(),
        None => RuntimeConfig::load(),
    }
}

fn check_bundle(bundle: &Path, config: &RuntimeConfig) -> Result<(), PipeError> {
    let mut library = Library::new();
    let order = library.load_file(bundle)?;

    println!(
        "{} {} pipes loaded from {}",
        "✓".green(),
        order.len(),
        bundle.display().to_string().cyan()
    );
    for (i, code) in order.iter().enumerate() {
        println!("  {} {}", format!("{:>2}.", i + 1).dimmed(), code);
    }

    let report = library.validate(&config.validation)?;
    for finding in &report.logged {
        println!("  {} {}", "⚠".yellow(), finding);
    }
    if report.ignored > 0 {
        println!(
            "  {} {} finding(s) ignored by config",
            "·".dimmed(),
            report.ignored
        );
    }

    println!("{} {} pipes validated", "✓".green(), report.checked);
    Ok(())
}

async fn dry_run(
    bundle: &Path,
    pipe_code: &str,
    inputs: Vec<(String, String)>,
    print_events: bool,
    config: RuntimeConfig,
) -> Result<(), PipeError> {
    let mut library = Library::new();
    library.load_file(bundle)?;
    library.validate(&config.validation)?;

    let pipe = library.pipes().get_required_pipe(pipe_code)?;
    let needed = pipe.needed_inputs(library.pipes(), &mut FxHashSet::default());

    let mut memory = WorkingMemory::new();
    {
        let factory = StuffFactory::new(library.concepts());
        for (name, text) in inputs {
            let stuff = match needed.get(&name) {
                Some(requirement) => {
                    let content = factory
                        .content_from_value(&requirement.concept, Value::String(text))?;
                    factory.make_stuff_with_concept(
                        Arc::clone(&requirement.concept),
                        content,
                        Some(&name),
                        None,
                    )?
                }
                None => factory.make_stuff_from_value(Value::String(text), Some(&name))?,
            };
            memory.add_new_stuff(&name, stuff)?;
        }

        let generator = DryRunGenerator::new(library.concepts(), config.run.dry_run_list_size);
        for name in generator.fill_missing_inputs(&needed, &mut memory)? {
            println!("  {} mocked input {}", "·".dimmed(), name.cyan());
        }
    }

    let router = PipeRouter::new(Arc::new(library)).with_settings(config.run);
    let output = router
        .execute_pipeline(pipe_code, memory, Some(RunMode::Dry), JobMetadata::new(None))
        .await?;

    println!(
        "{} {} {}",
        "✓".green(),
        pipe_code.bold(),
        "completed (dry run)".dimmed()
    );
    for (name, stuff) in output.memory.iter() {
        let marker = if output.main_stuff_name() == Some(name) {
            "★".yellow()
        } else {
            " ".normal()
        };
        println!(
            "  {} {} {} {}",
            marker,
            name.cyan(),
            format!("[{}]", stuff.concept).dimmed(),
            preview(&stuff.content.rendered())
        );
    }

    if print_events {
        let json = serde_json::to_string_pretty(&router.event_log().to_json())
            .unwrap_or_else(|_| "[]".to_string());
        println!("{json}");
    }
    Ok(())
}

/// First line, truncated
fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > 72 {
        format!("{}…", line.chars().take(72).collect::<String>())
    } else {
        line.to_string()
    }
}
