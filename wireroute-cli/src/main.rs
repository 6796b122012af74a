//! WireRoute CLI - run wire reconnection scenarios from the command line.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use tracing::Level;
use wireroute::scenario::MoveSpec;
use wireroute::{
    compute_connections, ConnectionData, ConnectorWorker, LoadedScenario, MoveGesture,
    MoveReport, Scenario,
};

#[derive(Parser)]
#[command(name = "wireroute")]
#[command(about = "Wire reconnection scenarios for schematic editors", long_about = None)]
#[command(version)]
struct Cli {
    /// Log engine progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Move the selection of a scenario and report the rerouted wiring
    Route {
        /// Path to a scenario .json file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Horizontal offset; replaces the scenario's moves
        #[arg(long, allow_hyphen_values = true)]
        dx: Option<i32>,

        /// Vertical offset; replaces the scenario's moves
        #[arg(long, allow_hyphen_values = true)]
        dy: Option<i32>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,

        /// Seed for the shuffled connection orderings
        #[arg(long)]
        seed: Option<u64>,

        /// Time budget per move, in seconds
        #[arg(long)]
        max_seconds: Option<u64>,

        /// Exit with code 2 if any connection is left unconnected
        #[arg(long)]
        fail_on_unsatisfied: bool,
    },

    /// List the connections between the selection and the rest of the circuit
    Connections {
        /// Path to a scenario .json file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output for scripts
    Json,
}

struct RouteOptions {
    dx: Option<i32>,
    dy: Option<i32>,
    seed: Option<u64>,
    max_seconds: Option<u64>,
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let exit_code = match cli.command {
        Commands::Route {
            file,
            dx,
            dy,
            format,
            seed,
            max_seconds,
            fail_on_unsatisfied,
        } => {
            let options = RouteOptions {
                dx,
                dy,
                seed,
                max_seconds,
            };
            handle_route(&file, options, format, fail_on_unsatisfied)
        }
        Commands::Connections { file, format } => handle_connections(&file, format),
    };

    process::exit(exit_code);
}

fn load_scenario(file: &Path) -> anyhow::Result<(Option<String>, LoadedScenario)> {
    let scenario = Scenario::from_path(file)
        .with_context(|| format!("Failed to read scenario {}", file.display()))?;
    let loaded = scenario
        .build()
        .with_context(|| format!("Invalid scenario {}", file.display()))?;
    Ok((scenario.name, loaded))
}

fn handle_route(file: &Path, options: RouteOptions, format: OutputFormat, fail_on_unsatisfied: bool) -> i32 {
    match run_route(file, options) {
        Ok((name, reports)) => {
            match format {
                OutputFormat::Human => output_route_human(file, name.as_deref(), &reports),
                OutputFormat::Json => output_route_json(file, &reports),
            }
            let unconnected: usize = reports.iter().map(|r| r.unconnected.len()).sum();
            if fail_on_unsatisfied && unconnected > 0 {
                return 2;
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

fn run_route(file: &Path, options: RouteOptions) -> anyhow::Result<(Option<String>, Vec<MoveReport>)> {
    let (name, mut loaded) = load_scenario(file)?;
    if let Some(seed) = options.seed {
        loaded.config.seed = Some(seed);
    }
    if let Some(max_seconds) = options.max_seconds {
        loaded.config.max_seconds = max_seconds;
    }

    let moves = if options.dx.is_some() || options.dy.is_some() {
        vec![MoveSpec {
            dx: options.dx.unwrap_or(0),
            dy: options.dy.unwrap_or(0),
        }]
    } else {
        loaded.moves.clone()
    };
    if moves.is_empty() {
        bail!("Scenario {} has no moves; pass --dx/--dy", file.display());
    }

    let worker = ConnectorWorker::new(loaded.config.clone()).context("Failed to start connector worker")?;
    let gesture = MoveGesture::new(&worker, Arc::new(loaded.circuit), loaded.selection);
    let mut reports = Vec::with_capacity(moves.len());
    for m in moves {
        let result = gesture
            .force_request(m.dx, m.dy)
            .with_context(|| format!("Move ({}, {}) was not computed", m.dx, m.dy))?;
        reports.push(result.report());
    }
    Ok((name, reports))
}

fn output_route_human(file: &Path, name: Option<&str>, reports: &[MoveReport]) {
    println!("\nScenario: {}", name.unwrap_or("(unnamed)"));
    println!("File: {}", file.display());
    println!("{}", "─".repeat(60));

    for report in reports {
        println!(
            "\n  Move ({}, {}): {:?}, cost {}",
            report.dx, report.dy, report.completion, report.total_cost
        );
        for wire in &report.added {
            println!("    + {}", wire);
        }
        for wire in &report.removed {
            println!("    - {}", wire);
        }
        for replacement in &report.replaced {
            let new: Vec<String> = replacement.new.iter().map(|w| w.to_string()).collect();
            println!("    ~ {} -> {}", replacement.old, new.join(", "));
        }
        for point in &report.unconnected {
            println!("    ! unconnected at {}", point);
        }
    }

    let unconnected: usize = reports.iter().map(|r| r.unconnected.len()).sum();
    println!("\n  Summary:");
    println!("    Moves:       {}", reports.len());
    println!("    Unconnected: {}", unconnected);
}

fn output_route_json(file: &Path, reports: &[MoveReport]) {
    let output = serde_json::json!({
        "file": file.display().to_string(),
        "moves": reports,
        "summary": {
            "moves": reports.len(),
            "unconnected": reports.iter().map(|r| r.unconnected.len()).sum::<usize>(),
        }
    });
    match serde_json::to_string_pretty(&output) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn handle_connections(file: &Path, format: OutputFormat) -> i32 {
    let (_, loaded) = match load_scenario(file) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return 1;
        }
    };
    let connections = compute_connections(&loaded.circuit, &loaded.selection);
    match format {
        OutputFormat::Human => output_connections_human(&connections),
        OutputFormat::Json => match serde_json::to_string_pretty(&connections) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        },
    }
    0
}

fn output_connections_human(connections: &[ConnectionData]) {
    println!("Connections: {}\n", connections.len());
    for conn in connections {
        let direction = conn
            .preferred_direction()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {} (leaving {})", conn.anchor(), direction);
        for wire in conn.trail() {
            println!("    {}", wire);
        }
        if conn.trail_start() != conn.anchor() {
            println!("    trail starts at {}", conn.trail_start());
        }
    }
}
