use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{Level, LevelFilter, Metadata, Record};
use tactical_engine::driver::run_scenario_file;

/// Minimal stderr logger. The library never forces a backend on its
/// consumers; this binary is the only place one gets installed.
struct StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

#[derive(Parser)]
#[command(name = "run_scenario")]
#[command(about = "Runs a tactical battle scenario file to completion and emits its event log")]
struct Cli {
    /// Path to the scenario JSON file
    scenario: PathBuf,

    /// Write the result JSON to this path instead of stdout
    #[arg(short, long)]
    out: Option<PathBuf>,
}

fn main() -> ExitCode {
    log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Info)).ok();
    let cli = Cli::parse();

    let result = match run_scenario_file(&cli.scenario) {
        Ok(result) => result,
        Err(err) => {
            log::error!("failed to run scenario {}: {err}", cli.scenario.display());
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let rendered = match serde_json::to_string_pretty(&result) {
        Ok(rendered) => rendered,
        Err(err) => {
            eprintln!("error: failed to serialize result: {err}");
            return ExitCode::FAILURE;
        }
    };

    match cli.out {
        Some(out_path) => {
            if let Some(parent) = out_path.parent() {
                if let Err(err) = fs::create_dir_all(parent) {
                    eprintln!("error: failed to create output directory: {err}");
                    return ExitCode::FAILURE;
                }
            }
            if let Err(err) = fs::write(&out_path, format!("{rendered}\n")) {
                eprintln!("error: failed to write {}: {err}", out_path.display());
                return ExitCode::FAILURE;
            }
            println!("Wrote {}", out_path.display());
        }
        None => println!("{rendered}"),
    }

    ExitCode::SUCCESS
}
