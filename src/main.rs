//!
//! dendrite server binary
//! ----------------------
//! Command-line entry point for the dendrite file API server. Supports
//! configuration via a TOML file, DENDRITE_* environment variables and CLI
//! flags, in that order of precedence.

use anyhow::Result;
use std::env;
use tracing::info;

use dendrite::{config, logging, server};

const DEFAULT_CONFIG_PATH: &str = "/etc/dendrite/dendrite.conf";

fn parse_string_arg(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn parse_port_arg(args: &[String], flag: &str) -> Option<u16> {
    parse_string_arg(args, flag).and_then(|v| v.parse::<u16>().ok())
}

fn collect_string_args(args: &[String], flag: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            out.push(args[i + 1].clone());
            i += 1;
        }
        i += 1;
    }
    out
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn print_usage() {
    println!(
        "dendrite API server\n\nUSAGE:\n  dendrite run [OPTIONS]\n\nOPTIONS:\n  --config PATH       Path to config file (env: DENDRITE_CONFIG, default {DEFAULT_CONFIG_PATH})\n  --listen ADDR       Listen address (env: DENDRITE_MAIN_LISTEN, default {listen})\n  --port N            Port to listen on (env: DENDRITE_MAIN_PORT, default {port})\n  --log-level L       Log level: debug, info, warn, error (env: DENDRITE_LOG_LEVEL)\n  --log-file PATH     Log file path, or '-' for stdout (env: DENDRITE_LOG_FILE)\n  --log-format F      Log format: text or json (env: DENDRITE_LOG_FORMAT)\n  --file-root V:S     File roots as /virtual:/source mapping (repeatable or comma-separated)\n  --config-check      Validate configuration and exit\n",
        listen = config::DEFAULT_LISTEN,
        port = config::DEFAULT_PORT,
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        print_usage();
        return Ok(());
    }
    if !args.iter().skip(1).any(|a| a == "run") {
        print_usage();
        return Ok(());
    }

    let cfg_path = parse_string_arg(&args, "--config")
        .or_else(|| env::var("DENDRITE_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let overrides = config::Overrides {
        listen: parse_string_arg(&args, "--listen"),
        port: parse_port_arg(&args, "--port"),
        log_level: parse_string_arg(&args, "--log-level"),
        log_file: parse_string_arg(&args, "--log-file"),
        log_format: parse_string_arg(&args, "--log-format"),
        file_roots: collect_string_args(&args, "--file-root"),
    };

    let cfg = config::load(&cfg_path, &overrides)?;

    if has_flag(&args, "--config-check") {
        println!("Config OK: {} (file roots: {})", cfg_path, cfg.file_roots.len());
        return Ok(());
    }

    let _log_guard = logging::init(&cfg.log)?;
    info!(
        "dendrite server started, listen={}, port={}, file_roots={}",
        cfg.main.listen,
        cfg.main.port,
        cfg.file_roots.len()
    );

    server::run(&cfg).await
}
