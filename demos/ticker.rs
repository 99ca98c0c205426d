use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use topic_bridge::{
    BrokerConfig, InMemoryBroker, JsonSerializer, PubSub, TopicBufferFullMode, TopicConfig,
    TracingDiagnostics,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const TICKS: u64 = 20;

#[derive(Serialize, Deserialize, Debug, Clone)]
struct Quote {
    symbol: String,
    price_cents: u64,
    sequence: u64,
}

#[tokio::main]
async fn main() -> topic_bridge::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let broker = InMemoryBroker::new(BrokerConfig {
        name: "ticker".to_string(),
        max_subscriptions: 16,
    })?;

    let pubsub: Arc<PubSub<Quote>> = Arc::new(PubSub::new(
        Arc::new(broker.clone()),
        Arc::new(JsonSerializer),
        Arc::new(TracingDiagnostics),
        TopicConfig {
            buffer_capacity: 4,
            full_mode: TopicBufferFullMode::DropOldest,
            topic_prefix: Some("market.".to_string()),
        },
    )?);

    // A fast reader sees every quote, a slow one only the freshest ones.
    let mut fast = pubsub.subscribe("ACME").await?;
    let mut slow = pubsub.subscribe("ACME").await?;

    let fast_reader = tokio::spawn(async move {
        let mut seen = 0;
        while let Some(quote) = fast.recv().await {
            info!("fast reader: {} @ {}", quote.symbol, quote.price_cents);
            seen += 1;
        }
        seen
    });

    let slow_reader = tokio::spawn(async move {
        let mut seen = Vec::new();
        while let Some(quote) = slow.recv().await {
            seen.push(quote.sequence);
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        seen
    });

    for sequence in 0..TICKS {
        let quote = Quote {
            symbol: "ACME".to_string(),
            price_cents: 10_000 + sequence * 7 % 113,
            sequence,
        };
        pubsub.send("ACME", quote).await?;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    pubsub.complete("ACME").await?;

    match (fast_reader.await, slow_reader.await) {
        (Ok(fast_count), Ok(slow_seen)) => {
            info!("fast reader received {} quotes", fast_count);
            info!("slow reader received sequences {:?}", slow_seen);
        }
        (fast, slow) => warn!("reader task failed: {:?} / {:?}", fast.err(), slow.err()),
    }

    let stats = broker.stats();
    info!(
        "broker published {} messages, {} subscriptions still open",
        stats.messages_published, stats.active_subscriptions
    );
    Ok(())
}
