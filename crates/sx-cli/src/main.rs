//! # sx-cli — The "Sextant" in Hand
//!
//! Minimal client for a running `sx-hub`.
//!
//! - `sx metadata [--metric M] [--limit N] [--limit-per-metric K]` prints
//!   metric metadata as a table (or raw JSON with `--json`).
//! - `sx status` prints the hub's status report.

use clap::{Parser, Subcommand};
use sx_core::MetadataResponse;
use tabled::{Table, Tabled};

const DEFAULT_HUB: &str = "http://127.0.0.1:3100";

/// 🧭 SEXTANT: read Prometheus metric metadata from a metadata hub.
#[derive(Parser)]
#[command(name = "sx", version, about, long_about = None)]
struct Cli {
    /// Hub base URL (falls back to SX_HUB_URL, then the local default).
    #[arg(long, global = true)]
    hub: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch metric metadata.
    Metadata {
        /// Only this metric (exact name).
        #[arg(long)]
        metric: Option<String>,

        /// Maximum number of entries overall.
        #[arg(long)]
        limit: Option<i64>,

        /// Maximum number of entries per metric.
        #[arg(long)]
        limit_per_metric: Option<i64>,

        /// Print the response body as-is.
        #[arg(long)]
        json: bool,
    },

    /// Report hub status as JSON.
    Status,
}

#[derive(Tabled)]
struct MetadataRow {
    #[tabled(rename = "METRIC")]
    metric: String,
    #[tabled(rename = "TYPE")]
    kind: String,
    #[tabled(rename = "UNIT")]
    unit: String,
    #[tabled(rename = "HELP")]
    help: String,
}

fn main() {
    let cli = Cli::parse();
    let hub = cli
        .hub
        .or_else(|| std::env::var("SX_HUB_URL").ok())
        .unwrap_or_else(|| DEFAULT_HUB.to_string());
    let hub = hub.trim_end_matches('/');
    let client = reqwest::blocking::Client::new();

    let result = match cli.command {
        Commands::Metadata {
            metric,
            limit,
            limit_per_metric,
            json,
        } => {
            let request = metadata_request(&client, hub, metric.as_deref(), limit, limit_per_metric);
            fetch_metadata(request, json)
        }
        Commands::Status => fetch_status(&client, &format!("{}/api/status", hub)),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn metadata_request(
    client: &reqwest::blocking::Client,
    hub: &str,
    metric: Option<&str>,
    limit: Option<i64>,
    per: Option<i64>,
) -> reqwest::blocking::RequestBuilder {
    let mut params: Vec<(&str, String)> = vec![];
    if let Some(m) = metric {
        params.push(("metric", m.to_string()));
    }
    if let Some(l) = limit {
        params.push(("limit", l.to_string()));
    }
    if let Some(p) = per {
        params.push(("limit_per_metric", p.to_string()));
    }
    client
        .get(format!("{}/api/v1/metadata", hub))
        .query(&params)
}

fn fetch_metadata(
    request: reqwest::blocking::RequestBuilder,
    raw: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let resp = request.send()?;
    let status = resp.status();
    let body = resp.text()?;
    if !status.is_success() {
        return Err(format!("hub returned {}: {}", status, body.trim()).into());
    }
    if raw {
        println!("{}", body);
        return Ok(());
    }

    let doc: MetadataResponse = serde_json::from_str(&body)?;
    if doc.entry_count() == 0 {
        eprintln!("No metadata found.");
        return Ok(());
    }
    println!("{}", Table::new(table_rows(&doc)));
    eprintln!(
        "{} metrics, {} entries",
        doc.data.len(),
        doc.entry_count()
    );
    Ok(())
}

fn table_rows(doc: &MetadataResponse) -> Vec<MetadataRow> {
    doc.data
        .iter()
        .flat_map(|(metric, entries)| {
            entries.iter().map(move |e| MetadataRow {
                metric: metric.clone(),
                kind: e.kind.clone(),
                unit: e.unit.clone(),
                help: e.help.clone(),
            })
        })
        .collect()
}

fn fetch_status(
    client: &reqwest::blocking::Client,
    url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let json: serde_json::Value = client.get(url).send()?.error_for_status()?.json()?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
