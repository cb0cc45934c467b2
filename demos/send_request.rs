//! Submit one transaction batch to a running hub and print what comes back.
//!
//! ```text
//! cargo run --example send_request -- --addr 127.0.0.1:8080 --chain 1234 --listen 10s
//! ```

use std::time::Duration;

use clap::Parser;
use shared_publisher::client::PeerClient;
use shared_publisher::protocol::{Message, PayloadKind, TransactionRequest, DEFAULT_MAX_MESSAGE_SIZE};

#[derive(Debug, Parser)]
struct Args {
    /// Hub address.
    #[arg(long, default_value = "127.0.0.1:8080")]
    addr: String,

    /// Sender id to put in the envelope; defaults to a timestamped name.
    #[arg(long)]
    sender: Option<String>,

    /// Chain id as hex, with or without `0x`.
    #[arg(long, default_value = "1234")]
    chain: String,

    /// How long to wait for forwarded batches from other peers.
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    listen: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let chain_id = hex::decode(args.chain.trim_start_matches("0x"))?;
    let sender = args
        .sender
        .unwrap_or_else(|| format!("rust-sequencer-{}", chrono::Utc::now().timestamp()));

    println!("Connecting to {}...", args.addr);
    let mut client = PeerClient::connect(args.addr.as_str(), DEFAULT_MAX_MESSAGE_SIZE).await?;
    println!("Connected from {}", client.local_addr());

    let batch = Message::xt_request(
        sender.clone(),
        vec![TransactionRequest::new(
            chain_id,
            vec![vec![0x01, 0x02, 0x03, 0x04, 0x05], vec![0x06, 0x07, 0x08, 0x09, 0x0a]],
        )],
    );
    client.send(&batch).await?;
    println!("Sent xT request as {sender}");

    let deadline = tokio::time::Instant::now() + args.listen;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match client.recv_timeout(remaining).await? {
            Some(msg) => match msg.kind() {
                PayloadKind::XtRequest(req) => {
                    let chains: Vec<String> =
                        req.transactions.iter().map(|tx| tx.chain_label()).collect();
                    println!("Received xT request from {}: chains {:?}", msg.sender_id, chains);
                }
                PayloadKind::Unrecognized => println!("Received unrecognized message from {}", msg.sender_id),
            },
            None => break,
        }
    }

    client.close().await;
    println!("Done");
    Ok(())
}
