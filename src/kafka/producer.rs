//! Producing half of the bus client.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as RdProducer};
use rdkafka::message::OwnedHeaders;
use rdkafka::util::Timeout;
use rdkafka::ClientConfig;
use serde::{Deserialize, Serialize};

use crate::components::Lifecycle;
use crate::context::Context;
use crate::error::BoxError;
use crate::logger::Log;

use super::{KafkaError, Message};

const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub brokers: Vec<String>,
    /// Default topic for messages that do not name one.
    pub topic: String,
}

impl ProducerConfig {
    pub fn validate(&self) -> Result<(), KafkaError> {
        if self.brokers.is_empty() {
            return Err(KafkaError::NoBrokers);
        }
        if self.topic.is_empty() {
            return Err(KafkaError::NoTopic);
        }
        Ok(())
    }
}

/// Kafka producer. Safe for concurrent use; `start` is a no-op and `stop`
/// flushes then closes (idempotent).
pub struct Producer {
    client: FutureProducer,
    topic: String,
    log: Arc<dyn Log>,
    closed: AtomicBool,
}

impl Producer {
    pub fn new(cfg: ProducerConfig, log: Arc<dyn Log>) -> Result<Self, KafkaError> {
        cfg.validate()?;

        let client: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", cfg.brokers.join(","))
            .create()?;

        Ok(Self {
            client,
            topic: cfg.topic,
            log,
            closed: AtomicBool::new(false),
        })
    }

    /// Sends every message and waits for the deliveries; returns the first
    /// delivery error, if any.
    pub async fn produce(&self, ctx: &Context, messages: &[Message]) -> Result<(), BoxError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Box::new(KafkaError::ProducerClosed));
        }
        if messages.is_empty() {
            return Ok(());
        }

        let begin = Instant::now();
        let deliveries = messages.iter().map(|msg| {
            let topic = msg.topic.as_deref().unwrap_or(&self.topic);
            let mut record: FutureRecord<'_, Vec<u8>, Vec<u8>> =
                FutureRecord::to(topic).payload(&msg.value);
            if let Some(key) = &msg.key {
                record = record.key(key);
            }
            if let Some(partition) = msg.partition {
                record = record.partition(partition);
            }
            if !msg.headers.is_empty() {
                let mut headers = OwnedHeaders::new();
                for h in &msg.headers {
                    headers = headers.insert(rdkafka::message::Header {
                        key: &h.key,
                        value: Some(&h.value),
                    });
                }
                record = record.headers(headers);
            }
            self.client.send(record, Timeout::Never)
        });

        let results = futures::future::join_all(deliveries).await;
        let latency = begin.elapsed();

        for result in results {
            if let Err((err, _record)) = result {
                self.log.error(
                    ctx,
                    "produce failed",
                    &[
                        ("count", &messages.len()),
                        ("latency", &latency),
                        ("err", &err),
                    ],
                );
                return Err(Box::new(KafkaError::Client(err)));
            }
        }

        self.log.debug(
            ctx,
            "messages produced",
            &[("count", &messages.len()), ("latency", &latency)],
        );
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for Producer {
    /// The producer is ready as soon as it is constructed.
    async fn start(&self, ctx: Context) -> Result<(), BoxError> {
        self.log.debug(&ctx, "producer ready", &[]);
        Ok(())
    }

    /// Flushes outstanding deliveries and marks the producer closed.
    /// Idempotent; later `produce` calls fail with the closed sentinel.
    async fn stop(&self, ctx: Context) -> Result<(), BoxError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let client = self.client.clone();
        let flush = tokio::task::spawn_blocking(move || client.flush(Timeout::After(FLUSH_TIMEOUT)));

        tokio::select! {
            _ = ctx.cancelled() => {
                self.log.warn(&ctx, "producer flush interrupted", &[]);
            }
            flushed = flush => {
                if let Ok(Err(err)) = flushed {
                    self.log.error(&ctx, "producer flush failed", &[("err", &err)]);
                }
            }
        }

        self.log.info(&ctx, "producer stopped", &[]);
        Ok(())
    }
}
