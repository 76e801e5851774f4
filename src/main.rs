//! gaud-bridge -- offline Messages <-> chat-completions translation.
//!
//! Reads a captured payload from a file (or stdin with `-`), runs it through
//! the translators and prints the result:
//!   - `request`   Messages request  -> upstream chat request
//!   - `response`  upstream response -> Messages response
//!   - `replay`    upstream SSE body -> framed Messages stream events
//!   - `config`    effective configuration

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use futures::StreamExt;

use gaud_bridge::config::Config;
use gaud_bridge::gateway::translate_stream;
use gaud_bridge::logging::init_tracing;
use gaud_bridge::messages::MessagesRequest;
use gaud_bridge::providers::transform::{sse, translate_request, translate_response};
use gaud_bridge::providers::types::ChatResponse;
use gaud_bridge::providers::RecordStream;

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

enum Command {
    Request(String),
    Response(String),
    Replay(String),
    ShowConfig,
}

struct CliArgs {
    config_path: PathBuf,
    model: Option<String>,
    command: Command,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = PathBuf::from("gaud-bridge.toml");
    let mut model = None;
    let mut command = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => config_path = PathBuf::from(require_value(&mut args, "--config")),
            "--model" | "-m" => model = Some(require_value(&mut args, "--model")),
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("gaud-bridge {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "request" => command = Some(Command::Request(require_value(&mut args, "request"))),
            "response" => command = Some(Command::Response(require_value(&mut args, "response"))),
            "replay" => command = Some(Command::Replay(require_value(&mut args, "replay"))),
            "config" => command = Some(Command::ShowConfig),
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Run with --help for usage information.");
                std::process::exit(1);
            }
        }
    }

    let Some(command) = command else {
        print_usage();
        std::process::exit(1);
    };

    CliArgs {
        config_path,
        model,
        command,
    }
}

fn require_value(args: &mut impl Iterator<Item = String>, flag: &str) -> String {
    args.next().unwrap_or_else(|| {
        eprintln!("Error: {flag} requires an argument");
        std::process::exit(1);
    })
}

fn print_usage() {
    println!(
        "\
gaud-bridge {version} -- Messages <-> chat-completions translation

USAGE:
    gaud-bridge [OPTIONS] <COMMAND>

COMMANDS:
    request <FILE|->     Translate a Messages request into an upstream chat request
    response <FILE|->    Translate an upstream chat response into a Messages response
    replay <FILE|->      Replay a captured upstream SSE body as Messages stream events
    config               Print the effective configuration

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: gaud-bridge.toml]
    -m, --model <NAME>     Requested model reported when the upstream omits one
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    GAUD_BRIDGE_CONFIG     Alternative to --config flag
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    let cli = parse_args();

    let config_path = std::env::var("GAUD_BRIDGE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or(cli.config_path);
    let config = Config::load(&config_path)?;
    init_tracing(&config.logging);

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting gaud-bridge"
    );

    let model = cli.model.unwrap_or_default();
    match cli.command {
        Command::Request(source) => run_request(&config, &source),
        Command::Response(source) => run_response(&source, &model),
        Command::Replay(source) => {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to build Tokio runtime")?
                .block_on(run_replay(&source, model))
        }
        Command::ShowConfig => show_config(&config, &config_path),
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn run_request(config: &Config, source: &str) -> anyhow::Result<()> {
    let mut request: MessagesRequest = serde_json::from_str(&read_input(source)?)
        .context("Input is not a valid Messages request")?;
    if request.max_tokens.is_none() {
        request.max_tokens = Some(config.translator.default_max_tokens);
    }

    let translated = translate_request(&request, &config.translator)?;
    println!("{}", serde_json::to_string_pretty(&translated)?);
    Ok(())
}

fn run_response(source: &str, model: &str) -> anyhow::Result<()> {
    let response: ChatResponse = serde_json::from_str(&read_input(source)?)
        .context("Input is not a valid chat completion response")?;

    let translated = translate_response(response, model)?;
    println!("{}", serde_json::to_string_pretty(&translated)?);
    Ok(())
}

async fn run_replay(source: &str, model: String) -> anyhow::Result<()> {
    let records = sse::parse_body(&read_input(source)?);
    tracing::debug!(records = records.len(), "Decoded upstream SSE body");

    let records: RecordStream = Box::pin(futures::stream::iter(records.into_iter().map(Ok)));
    let mut events = translate_stream(records, model);
    while let Some(event) = events.next().await {
        print!("{}", event.to_sse_frame()?);
    }
    Ok(())
}

fn show_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(config)?);

    let mut overrides: Vec<_> = config.env_overrides.all().iter().collect();
    if !overrides.is_empty() {
        overrides.sort();
        println!();
        println!("# Overridden by environment:");
        for (key, var) in overrides {
            println!("#   {key} <- {var}");
        }
    }
    Ok(())
}

fn read_input(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read {source}"))
    }
}
