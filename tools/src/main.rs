//! desk-runner: headless driver for the order desk.
//!
//! Usage:
//!   desk-runner --db desk.db --data-dir ./data seed
//!   desk-runner --db desk.db ingest data/orders/sample_batch.json
//!   desk-runner --db desk.db assign-pending
//!   desk-runner --db desk.db status 17 1          (status id, or "none")
//!   desk-runner --db desk.db recall 17 2026-10-20T09:00:00Z   (or "none")
//!   desk-runner --db desk.db reassign 17 3
//!   desk-runner --db desk.db recalls [--since 2026-10-19T00:00:00Z]
//!   desk-runner --db desk.db --ipc-mode           (JSON lines on stdin)
//!
//! Every result is printed to stdout as one JSON document.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use orderdesk_core::{
    config::DeskConfig, engine::DeskEngine, ingestion::RawOrder, records::OrderRecord,
    types::Timestamp,
};
use std::env;
use std::io::{self, BufRead, Write};

const VALUE_FLAGS: [&str; 4] = ["--db", "--data-dir", "--seed", "--since"];

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Ingest {
        orders: Vec<RawOrder>,
    },
    AssignPending,
    Status {
        order_id: i64,
        status_id: Option<i64>,
    },
    Recall {
        order_id: i64,
        recall_at: Option<Timestamp>,
    },
    Reassign {
        order_id: i64,
        agent_id: i64,
    },
    DueRecalls {
        #[serde(default)]
        since: Option<Timestamp>,
    },
    Quit,
}

#[derive(serde::Serialize)]
struct RecallListing {
    now: Timestamp,
    next_watermark: Option<Timestamp>,
    due: Vec<OrderRecord>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let db = flag_value(&args, "--db").unwrap_or("desk.db");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");

    let mut config = DeskConfig::load(data_dir)?;
    config.settings.master_seed = parse_arg(&args, "--seed", config.settings.master_seed);

    let mut engine = DeskEngine::open(db, &config)?;
    log::info!(
        "desk-runner: db={db} data_dir={data_dir} seed={}",
        config.settings.master_seed
    );

    if ipc_mode {
        return run_ipc_loop(&mut engine);
    }

    let positional = positionals(&args);
    let Some((command, rest)) = positional.split_first() else {
        bail!("missing command (seed | ingest | assign-pending | status | recall | reassign | recalls)");
    };

    match (command.as_str(), rest) {
        ("seed", []) => {
            engine.store.seed_catalog(&config)?;
            print_json(&serde_json::json!({
                "agents": config.agents.len(),
                "products": config.products.len(),
                "statuses": config.statuses.len(),
            }))
        }
        ("ingest", [path]) => {
            let content =
                std::fs::read_to_string(path).with_context(|| format!("Cannot read {path}"))?;
            let orders: Vec<RawOrder> =
                serde_json::from_str(&content).with_context(|| format!("Cannot parse {path}"))?;
            print_json(&engine.ingest_orders(&orders)?)
        }
        ("assign-pending", []) => print_json(&engine.assign_pending_orders()?),
        ("status", [order_id, status_id]) => {
            let status_id = parse_optional(status_id, |s| s.parse::<i64>().ok())?;
            print_json(&engine.change_order_status(order_id.parse()?, status_id)?)
        }
        ("recall", [order_id, recall_at]) => {
            let recall_at = parse_optional(recall_at, parse_timestamp)?;
            print_json(&engine.set_manual_recall(order_id.parse()?, recall_at)?)
        }
        ("reassign", [order_id, agent_id]) => {
            engine.reassign_order(order_id.parse()?, agent_id.parse()?)?;
            print_json(&engine.store.find_order(order_id.parse()?)?)
        }
        ("recalls", []) => {
            let since = match flag_value(&args, "--since") {
                Some(s) => Some(parse_timestamp(s).context("--since must be RFC 3339")?),
                None => None,
            };
            print_json(&recall_listing(&engine, since)?)
        }
        (other, _) => bail!("unknown command or wrong arguments: {other} {rest:?}"),
    }
}

fn run_ipc_loop(engine: &mut DeskEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
                stdout.flush()?;
                continue;
            }
        };

        let reply = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Ingest { orders } => {
                engine.ingest_orders(&orders).map(serde_json::to_value)
            }
            IpcCommand::AssignPending => engine.assign_pending_orders().map(serde_json::to_value),
            IpcCommand::Status {
                order_id,
                status_id,
            } => engine
                .change_order_status(order_id, status_id)
                .map(serde_json::to_value),
            IpcCommand::Recall {
                order_id,
                recall_at,
            } => engine
                .set_manual_recall(order_id, recall_at)
                .map(serde_json::to_value),
            IpcCommand::Reassign { order_id, agent_id } => engine
                .reassign_order(order_id, agent_id)
                .map(|()| Ok(serde_json::json!({ "order_id": order_id, "agent_id": agent_id }))),
            IpcCommand::DueRecalls { since } => {
                recall_listing(engine, since).map(serde_json::to_value)
            }
        };

        // Per-request failures are reported to the caller; the loop keeps serving.
        let line = match reply {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => serde_json::json!({ "error": e.to_string() }),
            Err(e) => {
                log::warn!("request failed: {e}");
                serde_json::json!({ "error": e.to_string() })
            }
        };
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn recall_listing(
    engine: &DeskEngine,
    since: Option<Timestamp>,
) -> orderdesk_core::error::DeskResult<RecallListing> {
    let now = engine.now();
    let due = engine.list_due_recalls(since)?;
    Ok(RecallListing {
        now,
        next_watermark: orderdesk_core::recall_schedule::next_watermark(&due, since),
        due,
    })
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_timestamp(s: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// "none" means an explicit null.
fn parse_optional<T>(s: &str, parse: impl Fn(&str) -> Option<T>) -> Result<Option<T>> {
    if s.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    match parse(s) {
        Some(v) => Ok(Some(v)),
        None => bail!("cannot parse '{s}'"),
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    flag_value(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Arguments that are neither flags nor flag values.
fn positionals(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if VALUE_FLAGS.contains(&arg.as_str()) {
            iter.next();
        } else if !arg.starts_with("--") {
            out.push(arg.clone());
        }
    }
    out
}
