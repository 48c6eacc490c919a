//! DRLC client simulator entry point: CLI wiring and scenario execution.

use std::path::Path;
use std::process;

use drlc_client::config::ScenarioConfig;
use drlc_client::io::export::export_csv;
use drlc_client::sim::engine::Engine;

/// Parsed CLI arguments.
struct CliArgs {
    scenario_path: Option<String>,
    preset: Option<String>,
    seed_override: Option<u64>,
    reports_out: Option<String>,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
}

fn print_help() {
    eprintln!("drlc-client: Demand Response and Load Control client simulator");
    eprintln!();
    eprintln!("Usage: drlc-client [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --scenario <path>        Load scenario from TOML config file");
    eprintln!(
        "  --preset <name>          Use a built-in preset ({})",
        ScenarioConfig::PRESETS.join(", ")
    );
    eprintln!("  --seed <u64>             Override random seed");
    eprintln!("  --reports-out <path>     Export the report log to CSV");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Start REST API server after the run");
        eprintln!("  --port <u16>             API server port (default: 3000)");
    }
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("If no --scenario or --preset is given, the baseline preset is used.");
    eprintln!("Log verbosity follows RUST_LOG (default: info).");
}

fn next_value(args: &[String], i: &mut usize, flag: &str, what: &str) -> String {
    *i += 1;
    match args.get(*i) {
        Some(v) => v.clone(),
        None => {
            eprintln!("error: {flag} requires {what} argument");
            process::exit(1);
        }
    }
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        scenario_path: None,
        preset: None,
        seed_override: None,
        reports_out: None,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: 3000,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--scenario" => cli.scenario_path = Some(next_value(&args, &mut i, "--scenario", "a path")),
            "--preset" => cli.preset = Some(next_value(&args, &mut i, "--preset", "a name")),
            "--seed" => {
                let v = next_value(&args, &mut i, "--seed", "a u64");
                match v.parse::<u64>() {
                    Ok(s) => cli.seed_override = Some(s),
                    Err(_) => {
                        eprintln!("error: --seed value \"{v}\" is not a valid u64");
                        process::exit(1);
                    }
                }
            }
            "--reports-out" => {
                cli.reports_out = Some(next_value(&args, &mut i, "--reports-out", "a path"));
            }
            #[cfg(feature = "api")]
            "--serve" => {
                cli.serve = true;
            }
            #[cfg(feature = "api")]
            "--port" => {
                let v = next_value(&args, &mut i, "--port", "a u16");
                match v.parse::<u16>() {
                    Ok(p) => cli.port = p,
                    Err(_) => {
                        eprintln!("error: --port value \"{v}\" is not a valid u16");
                        process::exit(1);
                    }
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
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = parse_args();

    // --scenario takes priority, then --preset, then baseline
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
        ScenarioConfig::baseline()
    };

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

    let mut engine = Engine::from_config(&scenario);
    let records = engine.run();
    let summary = engine.summary(&records);

    for r in &records {
        println!("{r}");
    }
    println!("\n{summary}");

    if let Some(ref path) = cli.reports_out {
        if let Err(e) = export_csv(&records, Path::new(path)) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Reports written to {path}");
    }

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        let state = Arc::new(drlc_client::api::AppState {
            start_time: scenario.simulation.start_time,
            seconds: scenario.simulation.seconds,
            summary,
            records,
        });
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        });
        if let Err(e) = rt.block_on(drlc_client::api::serve(state, addr)) {
            eprintln!("error: API server failed: {e}");
            process::exit(1);
        }
    }
}
