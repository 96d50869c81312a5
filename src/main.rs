// Looks up article titles on CrossRef, then the journal's quartile history on SCImago,
// and reports the quartile at the publication year next to the latest one.

// Copyright 2025 Servus Altissimi (Pseudonym)

// Permission is hereby granted, free of charge, to any person obtaining a copy of this software and associated documentation files (the "Software"), to deal in the Software without restriction, including without limitation the rights to use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of the Software, and to permit persons to whom the Software is furnished to do so, subject to the following conditions:
// The above copyright notice and this permission notice shall be included in all copies or substantial portions of the Software.
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

mod batch;
mod config;
mod lookup;
mod metadata;
mod ranking;
mod record;
mod resolve;
mod scrape;
mod throttle;
mod web;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::batch::{BatchDriver, SheetFormat};
use crate::config::{Config, DEFAULT_MIN_DELAY_MS, DEFAULT_TIMEOUT_SECS, DEFAULT_WORKERS};
use crate::lookup::{Lookup, LookupResult};
use crate::metadata::CrossRefClient;
use crate::ranking::ScimagoClient;
use crate::throttle::Throttle;

// CL arguments for config
#[derive(Parser, Debug)]
#[command(author, version, about = "Journal quartile lookup for article titles (CrossRef + SCImago)", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    #[arg(long, global = true, env = "QUARTILE_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,

    #[arg(long, global = true, env = "QUARTILE_MIN_DELAY_MS", default_value_t = DEFAULT_MIN_DELAY_MS)]
    min_delay_ms: u64,

    #[arg(long, global = true, env = "QUARTILE_MAILTO")]
    mailto: Option<String>,

    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up a single article title
    Lookup {
        title: String,

        /// Print the full result as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Process a spreadsheet (CSV or Excel) with one title per row in the first column
    Batch {
        input: PathBuf,

        /// Output file; .xlsx writes a workbook, anything else CSV (default: same format as the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
    },
    /// Run the web interface
    Serve {
        #[arg(short, long, default_value_t = 6601)]
        port: u16,

        #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
    },
}

impl Args {
    fn config(&self) -> Config {
        let workers = match self.command {
            Command::Batch { workers, .. } | Command::Serve { workers, .. } => workers,
            Command::Lookup { .. } => DEFAULT_WORKERS,
        };
        Config {
            timeout_secs: self.timeout_secs,
            min_delay_ms: self.min_delay_ms,
            mailto: self.mailto.clone(),
            workers,
        }
    }
}

fn build_lookup(config: &Config) -> Result<Lookup> {
    let throttle = Arc::new(Throttle::new(Duration::from_millis(config.min_delay_ms)));
    let metadata = CrossRefClient::new(config).context("building CrossRef client")?;
    let ranking = ScimagoClient::new(config, throttle).context("building SCImago client")?;
    Ok(Lookup::new(Arc::new(metadata), Arc::new(ranking)))
}

fn print_report(result: &LookupResult) {
    let or_missing = |v: Option<String>| v.unwrap_or_else(|| batch::NOT_FOUND.to_string());
    let metadata = &result.metadata;

    println!("{}", "=".repeat(64));
    println!("{}", result.title);
    println!("{}", "=".repeat(64));
    println!("Journal:          {}", or_missing(metadata.journal.clone()));
    println!("ISSN:             {}", or_missing(metadata.issn.clone()));
    println!("Publication year: {}", or_missing(metadata.year.map(|y| y.to_string())));
    println!(
        "Latest quartile:  {}",
        or_missing(result.latest.as_ref().map(|r| format!("{} ({}, {})", r.quartile, r.year, r.category)))
    );
    println!("SCImago:          {}", or_missing(result.source_url().map(str::to_string)));

    if result.year_matches.is_empty() {
        println!("\nNo quartile history found ({:?})", result.status);
    } else {
        println!("\nCategories:");
        for m in &result.year_matches {
            println!("   {:<50} {}", m.category, batch::describe_match(m, metadata.year));
        }
    }
    println!("{}\n", "=".repeat(64));
}

async fn run_batch(config: &Config, input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let input_format = SheetFormat::from_path(&input);
    let bytes = std::fs::read(&input).with_context(|| format!("reading {}", input.display()))?;
    let titles = batch::read_titles_from(input_format, &bytes)?;

    let output = output.unwrap_or_else(|| {
        PathBuf::from(format!(
            "quartile_results_{}.{}",
            chrono::Local::now().format("%Y%m%d_%H%M%S"),
            input_format.extension()
        ))
    });

    // First Ctrl-C stops new titles, a second one abandons those in flight.
    let cancel = CancellationToken::new();
    let abort = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        let abort = abort.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("Interrupted, finishing rows in progress (Ctrl-C again to abandon them)");
            cancel.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted again, abandoning rows in progress");
                abort.cancel();
            }
        }
    });

    let driver = BatchDriver::new(build_lookup(config)?, config.workers);
    let report = driver.run_abortable(titles, &cancel, &abort).await;

    let encoded = batch::encode_rows(SheetFormat::from_path(&output), &report.rows)?;
    std::fs::write(&output, encoded).with_context(|| format!("writing {}", output.display()))?;

    println!("\n{}", "=".repeat(64));
    println!("Results");
    println!("{}", "=".repeat(64));
    println!("Titles processed: {}/{}", report.processed, report.total);
    println!("Rows written:     {}", report.rows.len());
    if report.cancelled() {
        println!("Cancelled before the end of the input");
    }
    println!("Output: {}\n", output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "quartile_finder=debug" } else { "quartile_finder=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let config = args.config();
    match args.command {
        Command::Lookup { title, json } => {
            let result = build_lookup(&config)?.run(&title).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_report(&result);
            }
        }
        Command::Batch { input, output, .. } => run_batch(&config, input, output).await?,
        Command::Serve { port, .. } => web::start_web_server(port, build_lookup(&config)?, config.workers).await,
    }
    Ok(())
}
