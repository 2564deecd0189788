//! Chronicle operator CLI
//!
//! Records, verifies, queries and maintains a tamper-evident audit trail.
//! Output is pretty-printed JSON.  A chain that fails verification is
//! reported as a security incident and the process exits with status 2.
//!
//! Usage:
//!   chronicle record u1 LOGIN --chain c1
//!   chronicle record u1 FILE_UPLOAD --chain c1 --payload '{"size":10}'
//!   chronicle verify c1
//!   chronicle query --initiator u1 --since 2026-01-01 --limit 20
//!   chronicle query --chain _admin --target u1
//!   chronicle prune --days 365
//!   chronicle demo

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use chronicle_audit::AuditTrail;
use chronicle_contracts::{
    error::{ChronicleError, ChronicleResult},
    event::AppendRequest,
    query::AuditQuery,
    verify::VerificationResult,
};
use chronicle_core::ChronicleConfig;

const EXIT_INTEGRITY_VIOLATION: u8 = 2;

// ── CLI definition ────────────────────────────────────────────────────────────

/// Chronicle: tamper-evident, hash-chained audit trail.
#[derive(Parser)]
#[command(
    name = "chronicle",
    about = "Tamper-evident audit trail",
    long_about = "Records audit events into SHA-256 hash chains, verifies that no\n\
                  stored event was altered, removed or reordered, and answers\n\
                  filtered queries over the trail."
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Store root directory; overrides `store.root`.
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Use a throwaway in-memory store.
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Append one event.
    Record {
        initiator: String,
        event_type: String,
        /// Target chain; defaults to `chain.default_chain`.
        #[arg(long)]
        chain: Option<String>,
        /// JSON object payload.
        #[arg(long, default_value = "{}")]
        payload: String,
        /// Correlation id; generated when omitted.
        #[arg(long)]
        trace_id: Option<String>,
    },
    /// Verify one chain, or every chain when none is named.
    Verify { chain: Option<String> },
    /// List events matching the filters.
    Query {
        #[arg(long)]
        chain: Option<String>,
        #[arg(long)]
        initiator: Option<String>,
        #[arg(long)]
        event_type: Option<String>,
        /// Payload `target`, e.g. the user whose logs were cleared.
        #[arg(long)]
        target: Option<String>,
        /// Inclusive lower bound: RFC 3339 or YYYY-MM-DD.
        #[arg(long)]
        since: Option<String>,
        /// Inclusive upper bound: RFC 3339 or YYYY-MM-DD.
        #[arg(long)]
        until: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
        /// Oldest events first.
        #[arg(long)]
        oldest_first: bool,
    },
    /// Event counts by chain, type and initiator.
    Summary,
    /// Delete segments older than the retention window.
    Prune {
        /// Defaults to `retention.days`.
        #[arg(long)]
        days: Option<u32>,
    },
    /// Delete every event of a chain; audited on the admin chain.
    Clear {
        chain: String,
        #[arg(long)]
        requested_by: String,
    },
    /// Withdraw an event by appending a tombstone that references it.
    Tombstone {
        chain: String,
        sequence: u64,
        #[arg(long)]
        initiator: String,
        #[arg(long)]
        reason: String,
    },
    /// Record and verify a short reference chain in memory.
    Demo,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("chronicle error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ChronicleResult<ExitCode> {
    if let Command::Demo = cli.command {
        return Ok(if demo().await? {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(EXIT_INTEGRITY_VIOLATION)
        });
    }
    let trail = open_trail(&cli).await?;

    match cli.command {
        Command::Record {
            initiator,
            event_type,
            chain,
            payload,
            trace_id,
        } => {
            let payload: Value = serde_json::from_str(&payload).map_err(|e| {
                ChronicleError::validation(format!("--payload is not valid JSON: {}", e))
            })?;
            let chain = chain.unwrap_or_else(|| trail.default_chain().to_string());
            let mut request = AppendRequest::new(chain, initiator, event_type).with_payload(payload);
            if let Some(trace_id) = trace_id {
                request = request.with_trace_id(trace_id);
            }
            print_json(&trail.record(request).await?)?;
        }
        Command::Verify { chain } => {
            let results = match chain {
                Some(chain) => vec![trail.verify_audit_chain(&chain).await?],
                None => trail.verify_all().await?,
            };
            print_json(&results)?;
            if report_incidents(&results) {
                return Ok(ExitCode::from(EXIT_INTEGRITY_VIOLATION));
            }
        }
        Command::Query {
            chain,
            initiator,
            event_type,
            target,
            since,
            until,
            offset,
            limit,
            oldest_first,
        } => {
            let mut query = AuditQuery {
                chain_id: chain,
                initiator,
                event_type,
                target,
                offset,
                limit,
                ..AuditQuery::default()
            };
            if let Some(since) = since {
                query = query.since(parse_bound(&since, Bound::Start)?);
            }
            if let Some(until) = until {
                query = query.until(parse_bound(&until, Bound::End)?);
            }
            if oldest_first {
                query = query.oldest_first();
            }
            print_json(&trail.query_audit_events(&query).await?)?;
        }
        Command::Summary => print_json(&trail.summary().await?)?,
        Command::Prune { days } => {
            let days = days.or(trail.retention_days()).ok_or_else(|| {
                ChronicleError::validation("no --days given and retention.days is not configured")
            })?;
            print_json(&trail.prune(days).await?)?;
        }
        Command::Clear {
            chain,
            requested_by,
        } => print_json(&trail.clear(&chain, &requested_by).await?)?,
        Command::Tombstone {
            chain,
            sequence,
            initiator,
            reason,
        } => print_json(&trail.tombstone(&chain, &initiator, sequence, &reason).await?)?,
        Command::Demo => {}
    }
    Ok(ExitCode::SUCCESS)
}

async fn open_trail(cli: &Cli) -> ChronicleResult<AuditTrail> {
    let mut config = match &cli.config {
        Some(path) => ChronicleConfig::from_file(path)?,
        None => ChronicleConfig::default(),
    };
    if let Some(root) = &cli.root {
        config.store.root = root.clone();
    }
    if cli.memory {
        debug!("using in-memory store");
        return Ok(AuditTrail::in_memory(&config));
    }
    AuditTrail::from_config(&config).await
}

// ── Output ────────────────────────────────────────────────────────────────────

fn print_json<T: Serialize>(value: &T) -> ChronicleResult<()> {
    let text = serde_json::to_string_pretty(value).map_err(|e| ChronicleError::Encoding {
        reason: format!("failed to render output: {}", e),
    })?;
    println!("{}", text);
    Ok(())
}

/// Print every broken chain to stderr.  Returns true if any were found.
fn report_incidents(results: &[VerificationResult]) -> bool {
    let mut found = false;
    for result in results.iter().filter(|r| !r.valid) {
        found = true;
        eprintln!(
            "SECURITY INCIDENT: audit chain '{}' is broken at index {}: {}",
            result.chain_id,
            result
                .broken_at_index
                .map_or_else(|| "?".to_string(), |i| i.to_string()),
            result.reason.as_deref().unwrap_or("unknown")
        );
    }
    for result in results {
        for warning in &result.warnings {
            eprintln!(
                "warning: skipped {} record at {} line {}: {}",
                if warning.torn { "torn" } else { "malformed" },
                warning.segment,
                warning.line,
                warning.reason
            );
        }
    }
    found
}

// ── Date bounds ───────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// RFC 3339 instants are taken as-is; a bare date covers the whole UTC day.
fn parse_bound(text: &str, bound: Bound) -> ChronicleResult<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Ok(instant.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| {
        ChronicleError::validation(format!(
            "'{}' is neither an RFC 3339 timestamp nor a YYYY-MM-DD date",
            text
        ))
    })?;
    let time = match bound {
        Bound::Start => NaiveTime::from_hms_opt(0, 0, 0),
        Bound::End => NaiveTime::from_hms_milli_opt(23, 59, 59, 999),
    }
    .ok_or_else(|| ChronicleError::validation("invalid time of day"))?;
    Ok(date.and_time(time).and_utc())
}

// ── Demo ──────────────────────────────────────────────────────────────────────

/// Returns whether the demo chain verified.
async fn demo() -> ChronicleResult<bool> {
    print_banner();
    let trail = AuditTrail::in_memory(&ChronicleConfig::default());

    let steps = [
        ("u1", "LOGIN", json!({})),
        ("u1", "FILE_UPLOAD", json!({ "size": 10 })),
        ("admin", "LOGS_CLEARED", json!({ "target": "u1" })),
    ];
    for (initiator, event_type, payload) in steps {
        let event = trail.record_to("c1", initiator, event_type, payload).await?;
        println!(
            "  [{}] {:<13} by {:<6} hash {}… prev {}…",
            event.sequence_index,
            event.event_type,
            event.initiator,
            event.hash_prefix(),
            &event.previous_hash[..12]
        );
    }

    let tombstone = trail.tombstone("c1", "admin", 1, "uploaded by mistake").await?;
    println!(
        "  [{}] {:<13} by {:<6} hash {}…",
        tombstone.sequence_index,
        tombstone.event_type,
        tombstone.initiator,
        tombstone.hash_prefix()
    );
    println!();

    let result = trail.verify_audit_chain("c1").await?;
    println!(
        "Verification: {} ({} of {} events checked)",
        if result.valid { "VALID" } else { "BROKEN" },
        result.events_checked,
        result.total_events
    );

    let page = trail
        .query_audit_events(&AuditQuery::default().initiator("u1"))
        .await?;
    println!("Events by u1: {}", page.total);
    println!();

    Ok(!report_incidents(std::slice::from_ref(&result)))
}

fn print_banner() {
    println!();
    println!("Chronicle: tamper-evident audit trail");
    println!("======================================");
    println!();
    println!("Each event stores the SHA-256 hash of the one before it:");
    println!("  [1] canonical JSON of every field except the hash is hashed");
    println!("  [2] the hash is written durably before the append returns");
    println!("  [3] verification recomputes every hash and link in order");
    println!();
}

// ── Tests ─────────────────────────────────────────────────────────────────────
