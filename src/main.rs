use cesm_h2p::{
    config::{build_cli, Config, Scenario},
    pipeline::Pipeline,
};
use clap::ArgMatches;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() {
    let matches = build_cli().get_matches();

    let log_level = matches
        .get_one::<String>("loglevel")
        .map(String::as_str)
        .unwrap_or("info");
    let log_file = matches.get_one::<String>("log-file").map(Path::new);
    if let Err(e) = init_logging(log_level, log_file) {
        eprintln!("Logging error: {}", e);
        std::process::exit(1);
    }

    match matches.subcommand() {
        Some(("process", sub_matches)) => {
            if let Err(e) = run_process(sub_matches) {
                error!("Processing error: {}", e);
                eprintln!("Processing error: {}", e);
                std::process::exit(1);
            }
        }
        Some(("cases", _)) => print_cases(),
        _ => {
            eprintln!("Please specify a subcommand. Use --help for more information.");
            std::process::exit(1);
        }
    }
}

/// Install the global subscriber; `RUST_LOG` overrides `--loglevel`
fn init_logging(level: &str, log_file: Option<&Path>) -> Result<(), String> {
    let level = match level {
        "critical" => "error",
        "warning" => "warn",
        other => other,
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| format!("Failed to open log file '{}': {}", path.display(), e))?;
            registry
                .with(
                    fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false)
                        .with_target(true)
                        .with_line_number(true),
                )
                .init();
        }
        None => {
            registry
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_line_number(true),
                )
                .init();
        }
    }
    Ok(())
}

fn run_process(matches: &ArgMatches) -> Result<(), String> {
    let config = Config::from_matches(matches)?;

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .build_global()
        .map_err(|e| format!("Failed to configure thread pool: {}", e))?;
    info!("Using {} worker threads", config.num_threads);

    std::fs::create_dir_all(&config.output_dir).map_err(|e| {
        format!(
            "Failed to create output directory '{}': {}",
            config.output_dir.display(),
            e
        )
    })?;

    let pipeline = Pipeline::new(config).map_err(|e| e.to_string())?;
    let written = pipeline.run().map_err(|e| e.to_string())?;

    for path in &written {
        info!("Wrote {}", path.display());
    }
    Ok(())
}

fn print_cases() {
    println!("{:<8} {:>6} {:>6}", "CASE", "START", "END");
    for scenario in Scenario::ALL {
        let (start, end) = scenario.year_range();
        println!("{:<8} {:>6} {:>6}", scenario.name(), start, end);
    }
}
