//! rma-invoke
//!
//! Runs a single function call against a file ledger, the way a host would
//! invoke it inside one transaction.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use rmaledger::{Dispatcher, EngineConfig, FileLedger, Invocation, LedgerConfig};

/// Invoker configuration
struct Config {
    /// Ledger directory
    data_dir: PathBuf,
    /// Optional engine configuration file (JSON)
    config_file: Option<PathBuf>,
    /// Skip fsync on every write
    no_sync: bool,
    /// Function name
    function: String,
    /// Positional arguments
    args: Vec<String>,
}

fn usage() {
    println!("rma-invoke - run one RMA ledger function");
    println!();
    println!("USAGE:");
    println!("    rma-invoke [OPTIONS] <FUNCTION> [ARGS]...");
    println!();
    println!("OPTIONS:");
    println!("    -d, --data-dir <DIR>      Ledger directory [default: ./rma.ledger]");
    println!("    -c, --config <FILE>       Engine configuration (JSON)");
    println!("        --no-sync             Do not fsync after each write");
    println!("    -h, --help                Print help information");
    println!();
    println!("FUNCTIONS:");
    for f in rmaledger::Function::ALL {
        println!("    {f}");
    }
}

fn parse_args() -> Result<Config, String> {
    let mut args = std::env::args().skip(1);
    let mut data_dir = PathBuf::from("./rma.ledger");
    let mut config_file = None;
    let mut no_sync = false;

    let function = loop {
        let Some(arg) = args.next() else {
            return Err("missing function name".to_string());
        };
        match arg.as_str() {
            "--data-dir" | "-d" => {
                data_dir = args
                    .next()
                    .map(PathBuf::from)
                    .ok_or("--data-dir requires a value")?;
            }
            "--config" | "-c" => {
                config_file = Some(
                    args.next()
                        .map(PathBuf::from)
                        .ok_or("--config requires a value")?,
                );
            }
            "--no-sync" => no_sync = true,
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => return Err(format!("unknown argument: {flag}")),
            _ => break arg,
        }
    };

    Ok(Config {
        data_dir,
        config_file,
        no_sync,
        function,
        args: args.collect(),
    })
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match parse_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("run with --help for usage");
            return ExitCode::from(2);
        }
    };

    let engine_config = match &config.config_file {
        Some(path) => EngineConfig::from_json_file(path),
        None => Ok(EngineConfig::default()),
    };
    let engine_config = match engine_config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    let ledger_config = LedgerConfig {
        sync_on_write: !config.no_sync,
        ..LedgerConfig::default()
    };
    let ledger = match FileLedger::open(&config.data_dir, Some(ledger_config)) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("error: cannot open ledger at {}: {e}", config.data_dir.display());
            return ExitCode::FAILURE;
        }
    };

    let dispatcher = match Dispatcher::new(Arc::new(ledger), engine_config) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    let invocation = Invocation::new(config.function, config.args);
    let response = dispatcher.handle(&invocation);

    if let Some(payload) = &response.payload {
        println!("{}", String::from_utf8_lossy(payload));
    }
    if response.is_ok() {
        return ExitCode::SUCCESS;
    }

    match serde_json::to_string(&response) {
        Ok(json) => eprintln!("{json}"),
        Err(_) => eprintln!("error ({}): {}", response.status, response.message),
    }
    ExitCode::FAILURE
}
