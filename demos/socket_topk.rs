//! Live "trending items" over a TCP socket.
//!
//! This demo shows how to:
//! - Accept newline-delimited item ids on `127.0.0.1:9999`
//! - Count them in 60s windows sliding every 5s
//! - Log the top 5 items of every window as it closes
//! - Flush every open window on Ctrl-C and print the metrics
//!
//! Run with `RUST_LOG=info cargo run --example socket_topk`, then feed it:
//!
//! ```text
//! printf 'item-1\nitem-2\nitem-1\nitem-3,4\n' | nc 127.0.0.1 9999
//! ```

use ironrank::*;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::TcpListener;

const ADDR: &str = "127.0.0.1:9999";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AggregatorConfig::sliding(60_000, 5_000).with_top_k(5);
    let aggregator = Arc::new(Aggregator::new(config, Arc::new(LogSink))?);
    aggregator.start().await?;

    let listener = TcpListener::bind(ADDR).await?;
    log::info!("Listening on {ADDR}; send one item id per line, Ctrl-C to stop");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let source = LineSource::new(Arc::clone(&aggregator));
                tokio::spawn(async move {
                    match source.run(BufReader::new(stream)).await {
                        Ok(report) => log::info!(
                            "{peer} disconnected: {} line(s), {} accepted, {} rejected",
                            report.lines,
                            report.accepted,
                            report.rejected
                        ),
                        Err(err) => log::warn!("{peer} read failed: {err}"),
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let report = aggregator.stop().await;
    println!("Flushed {} window(s) on shutdown", report.closed);
    aggregator.metrics_collector().print();
    Ok(())
}
