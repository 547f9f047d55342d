//! Command-line front end: read or increment counters without a browser.
//!
//! Run with:
//! ```bash
//! cargo run --features cli -- --site-id s1 --api-base-url https://count.example get views likes
//! cargo run --features cli -- --site-id s1 --api-base-url https://count.example inc views likes:3
//! ```

use clap::{Parser, Subcommand};
use marku::config::Config;
use marku::page::memory::{MemoryElement, MemoryPage};
use marku::increment::parse_increment;
use marku::page::{ReadState, WriteState, INCREMENT_ATTR, READ_MARKER, WRITE_MARKER};
use marku::transport::http::HttpTransport;
use marku::{BatchOutcome, Marku};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "marku", version, about = "Read or increment page counters in one batch")]
struct Cli {
    /// Site identifier issued by the backend
    #[arg(long, env = "MARKU_SITE_ID")]
    site_id: String,

    /// Base URL of the counter API
    #[arg(long, env = "MARKU_API_BASE_URL")]
    api_base_url: String,

    /// URL of the page the counters belong to
    #[arg(long)]
    page: Option<String>,

    /// Send the page path without its query string
    #[arg(long)]
    no_query: bool,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// Print engine statistics as JSON after the run
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the current count of each key
    Get {
        /// Counter keys
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Increment each key, optionally by `KEY:N`
    Inc {
        /// Counter keys, each optionally followed by `:N`
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "State")]
    state: String,
}

fn read_row(key: &str, element: &MemoryElement) -> Row {
    Row {
        key: key.to_string(),
        value: element.text(),
        state: ReadState::of(element)
            .map(|s| s.class().to_string())
            .unwrap_or_default(),
    }
}

fn write_row(key: &str, element: &MemoryElement) -> Row {
    Row {
        key: key.to_string(),
        value: parse_increment(element).to_string(),
        state: WriteState::of(element)
            .map(|s| s.class().to_string())
            .unwrap_or_default(),
    }
}

fn split_increment(arg: &str) -> (&str, Option<&str>) {
    match arg.rsplit_once(':') {
        Some((key, n)) if !key.is_empty() => (key, Some(n)),
        _ => (arg, None),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let page = match cli.page.as_deref() {
        Some(url) => match MemoryPage::with_location(url) {
            Ok(page) => page,
            Err(err) => {
                eprintln!("invalid --page url: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => MemoryPage::new(),
    };
    let page = Arc::new(page);

    let timeout = Duration::from_secs(cli.timeout);
    let transport = match HttpTransport::with_timeout(timeout) {
        Ok(transport) => transport,
        Err(err) => {
            eprintln!("cannot create http client: {err}");
            return ExitCode::FAILURE;
        }
    };
    let config = Config::new(cli.site_id, cli.api_base_url).with_include_query(!cli.no_query);
    let marku = Marku::new(page.clone(), Arc::new(transport))
        .with_config(config)
        .with_timeout(timeout);

    let (outcome, rows) = match &cli.command {
        Command::Get { keys } => {
            let elements: Vec<_> = keys
                .iter()
                .map(|key| (key, page.append(MemoryElement::new().with_attr(READ_MARKER, key))))
                .collect();
            let outcome = marku.load_counters().await;
            let rows: Vec<Row> = elements
                .iter()
                .map(|(key, element)| read_row(key, element))
                .collect();
            (outcome, rows)
        }
        Command::Inc { keys } => {
            let elements: Vec<_> = keys
                .iter()
                .map(|arg| {
                    let (key, increment) = split_increment(arg);
                    let mut element = MemoryElement::new().with_attr(WRITE_MARKER, key);
                    if let Some(n) = increment {
                        element = element.with_attr(INCREMENT_ATTR, n);
                    }
                    (key, page.append(element))
                })
                .collect();
            let outcome = marku.process_set_counters().await;
            let rows: Vec<Row> = elements
                .iter()
                .map(|(key, element)| write_row(key, element))
                .collect();
            (outcome, rows)
        }
    };

    println!("{}", Table::new(&rows).with(Style::rounded()));

    if cli.json {
        match marku.stats().to_json(true) {
            Ok(json) => println!("{json}"),
            Err(err) => eprintln!("cannot serialize statistics: {err}"),
        }
    }

    match outcome {
        BatchOutcome::Failed { reason, .. } => {
            eprintln!("batch failed: {reason}");
            ExitCode::FAILURE
        }
        _ => ExitCode::SUCCESS,
    }
}
