//! agent-rtc entry point: CLI wiring and config-driven scenario runs.

use std::path::Path;
use std::process;

use tracing::error;
use tracing_subscriber::EnvFilter;

use agent_rtc::config::ScenarioConfig;
use agent_rtc::forecast::{ForecastTable, SyntheticProfile};
use agent_rtc::runner::run_scenario;
use agent_rtc::telemetry::write_telemetry_to_path;

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    forecast_path: Option<String>,
    steps_override: Option<usize>,
    seed_override: Option<u64>,
    model_out: Option<String>,
}

fn print_help() {
    eprintln!("agent-rtc: per-agent real-time dispatch model builder");
    eprintln!();
    eprintln!("Usage: agent-rtc [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!(
        "  --preset <name>          Use a built-in preset ({})",
        ScenarioConfig::PRESETS.join(", ")
    );
    eprintln!("  --forecast <path>        Read forecasts from a wide CSV");
    eprintln!("  --steps <n>              Override number of steps");
    eprintln!("  --seed <u64>             Override random seed of synthetic forecasts");
    eprintln!("  --model-out <path>       Export registered variables to CSV");
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the household preset is used.");
    eprintln!("Without --forecast, synthetic profiles are generated from the seed.");
    eprintln!("Log verbosity follows RUST_LOG (default: info).");
}

fn next_value(args: &[String], i: &mut usize, flag: &str, what: &str) -> String {
    *i += 1;
    if *i >= args.len() {
        eprintln!("error: {flag} requires a {what} argument");
        process::exit(1);
    }
    args[*i].clone()
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        forecast_path: None,
        steps_override: None,
        seed_override: None,
        model_out: None,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => {
                cli.scenario_path = Some(next_value(&args, &mut i, "--scenario", "path"));
            }
            "--preset" => cli.preset = Some(next_value(&args, &mut i, "--preset", "name")),
            "--forecast" => {
                cli.forecast_path = Some(next_value(&args, &mut i, "--forecast", "path"));
            }
            "--model-out" => {
                cli.model_out = Some(next_value(&args, &mut i, "--model-out", "path"));
            }
            "--steps" => {
                let raw = next_value(&args, &mut i, "--steps", "count");
                if let Ok(n) = raw.parse::<usize>() {
                    cli.steps_override = Some(n);
                } else {
                    eprintln!("error: --steps value \"{raw}\" is not a valid count");
                    process::exit(1);
                }
            }
            "--seed" => {
                let raw = next_value(&args, &mut i, "--seed", "u64");
                if let Ok(s) = raw.parse::<u64>() {
                    cli.seed_override = Some(s);
                } else {
                    eprintln!("error: --seed value \"{raw}\" is not a valid u64");
                    process::exit(1);
                }
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = parse_args();

    // Load config: --scenario takes priority, then --preset, then household default
    let mut scenario = if let Some(ref path) = cli.scenario_path {
        match ScenarioConfig::from_toml_file(Path::new(path)) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else if let Some(ref name) = cli.preset {
        match ScenarioConfig::from_preset(name) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("{e}");
                process::exit(1);
            }
        }
    } else {
        ScenarioConfig::household()
    };

    if let Some(steps) = cli.steps_override {
        scenario.simulation.steps = steps;
    }
    if let Some(seed) = cli.seed_override {
        scenario.simulation.seed = seed;
    }

    let errors = scenario.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }

    let forecast = match cli.forecast_path {
        Some(ref path) => match ForecastTable::from_path(Path::new(path)) {
            Ok(table) => table,
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(1);
            }
        },
        None => SyntheticProfile::new(scenario.simulation.step_seconds, scenario.simulation.seed)
            .table_for(&scenario.agents, scenario.simulation.steps),
    };

    let result = run_scenario(&scenario, &forecast);

    for failure in &result.failures {
        error!(
            agent = %failure.agent_id,
            asset = failure.asset_id.as_deref().unwrap_or("-"),
            step = failure.step,
            "{}",
            failure.kind()
        );
    }

    println!("{}", result.summary);

    if let Some(ref path) = cli.model_out {
        if let Err(e) = write_telemetry_to_path(Path::new(path), &result.telemetry) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Model telemetry written to {path}");
    }
}
