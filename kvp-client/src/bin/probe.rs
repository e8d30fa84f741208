//! # Pool Probe
//!
//! Purpose: Smoke-test a live backend through the pool: ping via `run`,
//! pattern-subscribe, print a few messages, then unsubscribe and shut down.
//!
//! Usage: `kvp-probe <addr> [pattern] [messages]`. Log level via `RUST_LOG`.

use std::env;
use std::time::Duration;

use anyhow::{bail, Context};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use kvp_client::{LinkOptions, Payload, PoolClient, PoolConfig, PoolEvent};

const DEFAULT_PATTERN: &str = "*";
const DEFAULT_MESSAGES: usize = 10;

struct ProbeConfig {
    addr: String,
    pattern: String,
    messages: usize,
}

impl ProbeConfig {
    fn from_args() -> anyhow::Result<Self> {
        let mut args = env::args().skip(1);
        let Some(addr) = args.next() else {
            bail!("usage: kvp-probe <addr> [pattern] [messages]");
        };
        let pattern = args.next().unwrap_or_else(|| DEFAULT_PATTERN.to_string());
        let messages = parse_usize(args.next(), DEFAULT_MESSAGES);
        Ok(ProbeConfig {
            addr,
            pattern,
            messages,
        })
    }
}

fn parse_usize(value: Option<String>, fallback: usize) -> usize {
    value.and_then(|raw| raw.parse().ok()).unwrap_or(fallback)
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kvp_client=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let probe = ProbeConfig::from_args()?;

    let options = LinkOptions::new(probe.addr.clone()).with_connect_timeout(Some(Duration::from_secs(3)));
    let client = PoolClient::connect(PoolConfig::default(), options)
        .await
        .with_context(|| format!("failed to connect to {}", probe.addr))?;

    let status = client.ping().await.context("PING failed")?;
    println!("{} answered {}", probe.addr, status);

    let mut events = client.events();
    client
        .subscribe(&[probe.pattern.as_str()])
        .await
        .with_context(|| format!("PSUBSCRIBE {} failed", probe.pattern))?;
    println!("waiting for {} message(s) on {}", probe.messages, probe.pattern);

    let mut received = 0;
    while received < probe.messages {
        match events.recv().await {
            Ok(PoolEvent::Message(message)) => {
                received += 1;
                match &message.data {
                    Payload::Text(text) => println!("[{}] {}", message.topic, text),
                    Payload::Binary(bytes) => println!("[{}] <{} bytes>", message.topic, bytes.len()),
                }
            }
            Ok(PoolEvent::Error { id, error }) => eprintln!("{} failed: {}", id, error),
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => eprintln!("skipped {} events", skipped),
            Err(RecvError::Closed) => break,
        }
    }

    client.unsubscribe(&[probe.pattern.as_str()]).await?;
    let stats = client.stats();
    println!("pool size {} ({} idle)", stats.size, stats.idle);
    client.shutdown().await;
    Ok(())
}
