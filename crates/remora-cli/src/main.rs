//! `remora`: command-line client for remora control-protocol servers.
//!
//! Three subcommands: `call` issues one request, `batch` issues an ordered
//! batch, `listen` stays connected and prints events as they arrive.
//! Configuration precedence: flags > environment > config file > defaults.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::mpsc;

use remora_client::{
    CallRequest, CallResult, Client, ConnectOptions, ConnectionStatus, EventEnvelope,
    EventSubscriptions,
};

mod settings;

#[derive(Parser)]
#[command(name = "remora", version, about = "Client for remora control-protocol servers")]
struct Cli {
    /// WebSocket URL of the server, e.g. ws://127.0.0.1:4455
    #[arg(long, global = true)]
    url: Option<String>,

    /// Password, for servers that require authentication
    #[arg(long, global = true)]
    password: Option<String>,

    /// Per-call timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Emit results as JSON lines instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Issue a single request and print its result
    Call {
        /// Operation name, e.g. GetVersion
        request_type: String,

        /// Operation parameters as a JSON object
        #[arg(long)]
        data: Option<String>,
    },

    /// Issue an ordered batch of requests
    Batch {
        /// JSON array of `{"requestType": ..., "requestData": ...}` objects
        #[arg(long)]
        data: String,

        /// Stop the batch at the first failed request
        #[arg(long)]
        halt_on_failure: bool,
    },

    /// Stay connected and print every event as it arrives
    Listen {
        /// Only print events of these types (repeatable)
        #[arg(long = "event")]
        events: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    remora_core::logging::init_subscriber(&cli.log_level);

    let mut options = settings::load_options().context("loading configuration")?;
    if let Some(url) = &cli.url {
        options.url.clone_from(url);
    }
    if let Some(password) = &cli.password {
        options.password = Some(password.clone());
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        options.call_timeout_ms = timeout_ms;
    }
    // Request-only sessions have no use for event traffic.
    if !matches!(cli.command, Command::Listen { .. }) {
        options.event_subscriptions = EventSubscriptions::NONE;
    }

    let url = options.url.clone();
    let client = Client::connect(options)
        .await
        .with_context(|| format!("connecting to {url}"))?;

    let outcome = run(&cli, &client).await;
    client.close().await;
    outcome
}

async fn run(cli: &Cli, client: &Client) -> Result<()> {
    match &cli.command {
        Command::Call { request_type, data } => {
            let request_data = parse_object(data.as_deref())?;
            let result = client.call(request_type.clone(), request_data).await?;
            print_result(&result, cli.json)
        }
        Command::Batch {
            data,
            halt_on_failure,
        } => {
            let requests = parse_batch(data)?;
            let batch = client.call_batch(requests, *halt_on_failure).await?;
            for result in &batch.results {
                print_result(result, cli.json)?;
            }
            Ok(())
        }
        Command::Listen { events } => listen(client, events, cli.json).await,
    }
}

/// Parse an optional `--data` argument into a JSON object.
fn parse_object(data: Option<&str>) -> Result<Option<Value>> {
    let Some(data) = data else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(data).context("parsing --data as JSON")?;
    if !value.is_object() {
        bail!("--data must be a JSON object");
    }
    Ok(Some(value))
}

/// Parse the batch `--data` argument into requests, in order.
fn parse_batch(data: &str) -> Result<Vec<CallRequest>> {
    let value: Value = serde_json::from_str(data).context("parsing --data as JSON")?;
    let Some(entries) = value.as_array() else {
        bail!("--data must be a JSON array of request objects");
    };
    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let request_type = entry["requestType"]
                .as_str()
                .with_context(|| format!("request {i}: missing requestType"))?;
            let request_data = entry.get("requestData").filter(|d| !d.is_null()).cloned();
            Ok(CallRequest::new(request_type, request_data))
        })
        .collect()
}

fn print_result(result: &CallResult, json_mode: bool) -> Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string(result)?);
        return Ok(());
    }
    let name = result.request_type.as_deref().unwrap_or("(request)");
    let status = &result.request_status;
    if status.result {
        match &result.response_data {
            Some(data) => println!("{name} ok: {}", serde_json::to_string_pretty(data)?),
            None => println!("{name} ok"),
        }
    } else {
        let comment = status.comment.as_deref().unwrap_or("no comment");
        println!("{name} failed (code {}): {comment}", status.code);
    }
    Ok(())
}

fn print_event(event: &EventEnvelope, json_mode: bool) -> Result<()> {
    if json_mode {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match &event.event_data {
        Some(data) => println!("{}: {}", event.event_type, serde_json::to_string(data)?),
        None => println!("{}", event.event_type),
    }
    Ok(())
}

/// Print events until Ctrl-C or the connection ends.
async fn listen(client: &Client, events: &[String], json_mode: bool) -> Result<()> {
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let mut tokens = Vec::new();
    if events.is_empty() {
        let event_tx = event_tx.clone();
        tokens.push(client.on_any(Arc::new(move |event| {
            let _ = event_tx.send(event);
        })));
    } else {
        for event_type in events {
            let event_tx = event_tx.clone();
            tokens.push(client.on(
                event_type.clone(),
                Arc::new(move |event| {
                    let _ = event_tx.send(event);
                }),
            ));
        }
    }

    let (status_tx, mut status_rx) = mpsc::unbounded_channel();
    let _status_token = client.on_status(Arc::new(move |status| {
        if !matches!(status, ConnectionStatus::Identified { .. }) {
            let _ = status_tx.send(status);
        }
    }));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            status = status_rx.recv() => match status {
                Some(ConnectionStatus::ConnectionError { message }) => {
                    bail!("connection error: {message}");
                }
                Some(ConnectionStatus::Closed { code: Some(code) }) => {
                    bail!("connection closed: {code}");
                }
                Some(ConnectionStatus::Closed { code: None }) | None => return Ok(()),
                Some(ConnectionStatus::Identified { .. }) => {}
            },
            event = event_rx.recv() => match event {
                Some(event) => print_event(&event, json_mode)?,
                None => return Ok(()),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
