mod agent;
mod config;
mod dataset;
mod report;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, warn};

use taskbench_core::{
    generate_analysis_report, index_tasks, Category, EvalOptions, LedgerStore,
    ReflectionOptions, RunConfig, Runner, Task, TaskFilter,
};
use taskbench_store::{
    analysis_path_for, list_snapshots, load_snapshot, write_json, JsonLedgerStore,
    JsonResultStore,
};

use crate::agent::CommandAgent;
use crate::config::Config;
use crate::report::RunHistorySink;

#[derive(Parser)]
#[command(
    name = "taskbench",
    version,
    about = "Benchmark harness for tool-using AI agents"
)]
struct Cli {
    /// Results directory (snapshots, wrong-answers ledger, run history)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct AgentArgs {
    /// Agent executable (overrides [agent].command)
    #[arg(long)]
    agent_cmd: Option<String>,

    /// Model label recorded in results
    #[arg(long)]
    model: Option<String>,

    /// Per-call timeout in seconds for buffered calls, 0 for none
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Stream the agent's output and show tool calls as they happen
    #[arg(long)]
    stream: bool,

    /// Print step-by-step tool traces
    #[arg(short, long)]
    verbose: bool,

    /// Ask the agent to review its answer and retry while unsure
    #[arg(long)]
    reflect: bool,

    /// Answer attempts per task in reflect mode
    #[arg(long, default_value = "3")]
    max_attempts: u32,

    /// Confidence (0-100) at which reflect mode stops
    #[arg(long, default_value = "80")]
    confidence_threshold: u8,

    /// Pause between tasks in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Directory holding dataset files
    #[arg(long)]
    dataset_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark on a dataset
    Run {
        /// Dataset name
        #[arg(short, long)]
        dataset: String,

        /// Only tasks of this level
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=3))]
        level: Option<u8>,

        /// Only tasks in this category (files, code, search, browser, reasoning)
        #[arg(short, long)]
        category: Option<Category>,

        /// Maximum number of tasks
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Shuffle tasks before applying the limit
        #[arg(long)]
        random: bool,

        /// Skip tasks already in the latest checkpoint
        #[arg(long)]
        resume: bool,

        #[command(flatten)]
        agent: AgentArgs,
    },

    /// Re-run only the tasks currently in the wrong-answers ledger
    Retry {
        /// Dataset name
        #[arg(short, long)]
        dataset: String,

        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=3))]
        level: Option<u8>,

        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Skip tasks already in the retry checkpoint
        #[arg(long)]
        resume: bool,

        #[command(flatten)]
        agent: AgentArgs,
    },

    /// Analyze a saved snapshot
    Analyze {
        /// Snapshot file
        snapshot: PathBuf,

        /// Directory holding dataset files, for exact task categories
        #[arg(long)]
        dataset_dir: Option<PathBuf>,

        /// Print only; do not write the analysis JSON
        #[arg(long)]
        no_write: bool,
    },

    /// List tasks currently answered wrong
    Wrong {
        #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=3))]
        level: Option<u8>,
    },

    /// List finished runs
    History {
        /// Only runs of this dataset
        #[arg(short, long)]
        dataset: Option<String>,
    },

    /// Show the active config file path
    Config,
}

fn default_output_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "taskbench", "taskbench")
        .map(|dirs| dirs.data_dir().join("results"))
        .unwrap_or_else(|| PathBuf::from("results"))
}

fn default_dataset_dir() -> PathBuf {
    directories::ProjectDirs::from("dev", "taskbench", "taskbench")
        .map(|dirs| dirs.data_dir().join("datasets"))
        .unwrap_or_else(|| PathBuf::from("datasets"))
}

fn resolve_output_dir(flag: Option<PathBuf>, config: &Config) -> PathBuf {
    flag.or_else(|| config.run.output_dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(default_output_dir)
}

fn resolve_dataset_dir(flag: Option<PathBuf>, config: &Config) -> PathBuf {
    flag.or_else(|| config.dataset.dir.as_ref().map(PathBuf::from))
        .unwrap_or_else(default_dataset_dir)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load_config()?;
    let output_dir = resolve_output_dir(cli.output_dir, &config);

    match cli.command {
        Commands::Run {
            dataset,
            level,
            category,
            limit,
            random,
            resume,
            agent,
        } => {
            let filter = TaskFilter {
                level,
                category,
                limit,
                random,
            };
            cmd_run(&config, &output_dir, &dataset, filter, resume, agent, false)
        }
        Commands::Retry {
            dataset,
            level,
            limit,
            resume,
            agent,
        } => {
            let filter = TaskFilter {
                level,
                limit,
                ..TaskFilter::default()
            };
            cmd_run(&config, &output_dir, &dataset, filter, resume, agent, true)
        }
        Commands::Analyze {
            snapshot,
            dataset_dir,
            no_write,
        } => cmd_analyze(&config, &snapshot, dataset_dir, no_write),
        Commands::Wrong { level } => cmd_wrong(&output_dir, level),
        Commands::History { dataset } => cmd_history(&output_dir, dataset.as_deref()),
        Commands::Config => {
            println!("{}", config::show_config_path());
            println!("Results:  {}", output_dir.display());
            println!(
                "Datasets: {}",
                resolve_dataset_dir(None, &config).display()
            );
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// run / retry
// ---------------------------------------------------------------------------

fn build_agent(config: &Config, args: &AgentArgs) -> Result<(CommandAgent, String)> {
    let Some(program) = args
        .agent_cmd
        .clone()
        .or_else(|| config.agent.command.clone())
    else {
        bail!("no agent command: pass --agent-cmd or set [agent].command in the config file");
    };

    let providers = config.agent.provider_selection()?;
    let timeout_secs = args.timeout_secs.unwrap_or(config.agent.timeout_secs);
    let timeout = (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs));
    let model = args
        .model
        .clone()
        .unwrap_or_else(|| config.agent.model.clone());

    let agent = CommandAgent::new(program, config.agent.args.clone())
        .with_name(config.agent.name.clone())
        .with_model(model)
        .with_timeout(timeout)
        .with_providers(&providers);
    Ok((agent, providers.summary()))
}

fn cmd_run(
    config: &Config,
    output_dir: &Path,
    dataset: &str,
    filter: TaskFilter,
    resume: bool,
    args: AgentArgs,
    retry: bool,
) -> Result<()> {
    let dataset_dir = resolve_dataset_dir(args.dataset_dir.clone(), config);
    let tasks = dataset::load_dataset(&dataset_dir, dataset)
        .with_context(|| format!("loading dataset {dataset}"))?;
    println!("Loaded {} tasks from {dataset}", tasks.len());

    let (agent, provider_summary) = build_agent(config, &args)?;
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let scope = if retry {
        format!("{dataset}_wrong_answers_retry")
    } else {
        dataset.to_string()
    };
    let results = JsonResultStore::new(output_dir, &scope);
    let ledger = JsonLedgerStore::new(output_dir);
    let history = RunHistorySink::new(output_dir);

    let run_config = RunConfig {
        dataset: dataset.to_string(),
        filter,
        resume,
        eval: EvalOptions {
            verbose: args.verbose,
            stream: args.stream,
            poll_interval: Duration::from_millis(config.run.poll_interval_ms.max(1)),
            instructions: config.agent.instructions.clone(),
        },
        reflection: args.reflect.then(|| ReflectionOptions {
            max_attempts: args.max_attempts.max(1),
            confidence_threshold: args.confidence_threshold.min(100),
        }),
        task_delay: Duration::from_millis(args.delay_ms.unwrap_or(config.run.task_delay_ms)),
        command: if retry { "retry" } else { "run" }.to_string(),
        provider_summary,
    };
    debug!("run config: {run_config:?}");

    let runner = Runner::new(&agent, &results, &ledger, run_config).with_docs(&history);
    let outcome = if retry {
        runner.retry(&tasks)
    } else {
        runner.run(&tasks)
    };

    report::print_report(&outcome.report);

    if !outcome.merge.added.is_empty() || !outcome.merge.removed.is_empty() {
        println!(
            "\nWrong answers: +{} new, {} still wrong, -{} fixed",
            outcome.merge.added.len(),
            outcome.merge.updated.len(),
            outcome.merge.removed.len()
        );
    }

    match &outcome.snapshot_path {
        Some(path) => {
            println!("\nResults:  {}", path.display());
            let analysis = analysis_path_for(path);
            match write_json(&analysis, &outcome.report) {
                Ok(()) => println!("Analysis: {}", analysis.display()),
                Err(e) => warn!("analysis report not written: {e}"),
            }
        }
        None => println!(
            "\nFinal snapshot not written; latest results remain in {}",
            results.latest_path().display()
        ),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// analyze / wrong / history
// ---------------------------------------------------------------------------

fn cmd_analyze(
    config: &Config,
    path: &Path,
    dataset_dir: Option<PathBuf>,
    no_write: bool,
) -> Result<()> {
    let snapshot =
        load_snapshot(path).with_context(|| format!("reading snapshot {}", path.display()))?;
    let meta = &snapshot.metadata;
    println!(
        "{} | {} | {} {} | {}",
        meta.dataset,
        meta.timestamp.format("%Y-%m-%d %H:%M"),
        meta.agent,
        meta.model,
        if meta.incremental { "incremental" } else { "final" }
    );

    // Exact categories need the dataset; without it, results are
    // re-categorized from their own question and attachment names.
    let dir = resolve_dataset_dir(dataset_dir, config);
    let tasks: Vec<Task> = match dataset::load_dataset(&dir, &meta.dataset) {
        Ok(t) => t,
        Err(e) => {
            debug!("analyzing without dataset: {e}");
            Vec::new()
        }
    };
    let index = index_tasks(&tasks);
    let analysis = generate_analysis_report(&snapshot.results, &index);
    report::print_report(&analysis);

    if !no_write {
        let out = analysis_path_for(path);
        write_json(&out, &analysis).with_context(|| format!("writing {}", out.display()))?;
        println!("\nAnalysis: {}", out.display());
    }
    Ok(())
}

fn cmd_wrong(output_dir: &Path, level: Option<u8>) -> Result<()> {
    let ledger = JsonLedgerStore::new(output_dir)
        .load()
        .with_context(|| format!("reading wrong-answers ledger in {}", output_dir.display()))?;
    report::print_ledger(&ledger, level);
    Ok(())
}

fn cmd_history(output_dir: &Path, dataset: Option<&str>) -> Result<()> {
    let entries = list_snapshots(output_dir, dataset)
        .with_context(|| format!("listing {}", output_dir.display()))?;
    report::print_history(&entries);
    Ok(())
}
