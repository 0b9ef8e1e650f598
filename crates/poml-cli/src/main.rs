//! `poml`: compile a POML document from the command line.
//!
//! ```text
//! poml prompt.poml --format openai_chat --var topic=ownership -o request.json
//! cat prompt.poml | poml - --no-chat
//! ```
//!
//! Logging goes to stderr. `-v`/`-vv` raise the level; `RUST_LOG` overrides
//! the filter entirely.

mod args;

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Parser;
use poml::{process, Markup, OutputDestination, OutputFormat, ProcessOptions, Syntax};
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "poml", version, about = "Compile POML markup into prompts and chat payloads")]
struct Cli {
    /// Markup file, or `-` to read standard input.
    file: PathBuf,

    /// Output format.
    #[arg(short, long, default_value = "raw", value_parser = args::parse_format)]
    format: OutputFormat,

    /// Bind a variable (`NAME=VALUE`, VALUE parsed as JSON when possible).
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = args::parse_var)]
    vars: Vec<(String, Value)>,

    /// JSON or YAML file of variables. `--var` entries take precedence.
    #[arg(short, long, value_name = "FILE")]
    context: Option<PathBuf>,

    /// JSON stylesheet file.
    #[arg(short, long, value_name = "FILE")]
    stylesheet: Option<PathBuf>,

    /// Render chat elements as text instead of messages.
    #[arg(long)]
    no_chat: bool,

    /// Default syntax (`markdown` or `xml`).
    #[arg(long, value_parser = args::parse_syntax)]
    syntax: Option<Syntax>,

    /// Write the payload here instead of stdout.
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// More log output on stderr (`-v` info, `-vv` debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    run(cli)
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "poml=warn",
        1 => "poml=info",
        _ => "poml=debug",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let options = options(&cli)?;
    let markup = if cli.file.as_os_str() == "-" {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("failed to read markup from stdin")?;
        Markup::Source(source)
    } else {
        Markup::File(cli.file.clone())
    };

    let payload = process(markup, options)?;
    debug!(format = %cli.format, "compiled document");
    OutputDestination::from_arg(cli.output.as_deref()).write_text(&payload.to_string())?;
    Ok(())
}

fn options(cli: &Cli) -> Result<ProcessOptions> {
    let mut variables = match &cli.context {
        Some(path) => args::load_context(path)?,
        None => Default::default(),
    };
    for (name, value) in &cli.vars {
        variables.insert(name.clone(), value.clone());
    }

    let mut options = ProcessOptions::new()
        .format(cli.format)
        .variables(variables)
        .chat(!cli.no_chat);
    if let Some(syntax) = cli.syntax {
        options = options.syntax(syntax);
    }
    if let Some(path) = &cli.stylesheet {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read stylesheet {}", path.display()))?;
        options = options.stylesheet_json(&json);
    }
    Ok(options)
}
