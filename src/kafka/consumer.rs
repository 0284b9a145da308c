//! Consuming half of the bus client.
//!
//! `start` spawns a single polling task: receive a record, run the handler
//! (errors are logged, the loop continues), store the record's offset so
//! the periodic commit covers everything processed. `stop` cancels the
//! task, waits up to the stop context's deadline, commits what is stored
//! and leaves the group.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rdkafka::consumer::{
    BaseConsumer, CommitMode, Consumer as RdConsumer, ConsumerContext, Rebalance, StreamConsumer,
};
use rdkafka::error::KafkaError as ClientError;
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::message::{BorrowedMessage, Headers as RdHeaders};
use rdkafka::{ClientConfig, ClientContext, Message as RdMessage};
use serde::{Deserialize, Serialize};

use crate::components::Lifecycle;
use crate::context::{Context, ContextError};
use crate::error::BoxError;
use crate::logger::Log;

use super::{Handler, Header, KafkaError, Message, StartOffset};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    pub start_offset: StartOffset,
    /// Broker default when zero.
    pub fetch_min_bytes: u32,
    /// Broker default when zero.
    #[serde(with = "crate::config::duration")]
    pub fetch_max_wait: Duration,
}

impl ConsumerConfig {
    pub fn validate(&self) -> Result<(), KafkaError> {
        if self.brokers.is_empty() {
            return Err(KafkaError::NoBrokers);
        }
        if self.topic.is_empty() {
            return Err(KafkaError::NoTopic);
        }
        if self.group_id.is_empty() {
            return Err(KafkaError::NoGroupId);
        }
        Ok(())
    }
}

/// Rebalance hooks: commit stored offsets on revocation, log-only on loss.
struct RebalanceContext {
    log: Arc<dyn Log>,
    group_id: String,
    ctx: Context,
}

impl ClientContext for RebalanceContext {}

impl ConsumerContext for RebalanceContext {
    fn pre_rebalance(&self, consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        match rebalance {
            Rebalance::Revoke(partitions) => {
                self.log.info(
                    &self.ctx,
                    "partitions revoked",
                    &[
                        ("partitions", &partitions.count()),
                        ("group_id", &self.group_id),
                    ],
                );
                if let Err(err) = consumer.commit_consumer_state(CommitMode::Sync) {
                    if !is_no_offset(&err) {
                        self.log
                            .error(&self.ctx, "failed to commit on revoke", &[("err", &err)]);
                    }
                }
            }
            Rebalance::Assign(partitions) => {
                self.log.info(
                    &self.ctx,
                    "partitions assigned",
                    &[
                        ("partitions", &partitions.count()),
                        ("group_id", &self.group_id),
                    ],
                );
            }
            Rebalance::Error(err) => {
                // Partitions are lost; committing would fence another owner.
                self.log.warn(
                    &self.ctx,
                    "partitions lost",
                    &[("err", &err), ("group_id", &self.group_id)],
                );
            }
        }
    }
}

fn is_no_offset(err: &ClientError) -> bool {
    matches!(
        err,
        ClientError::ConsumerCommit(RDKafkaErrorCode::NoOffset)
    )
}

struct Running {
    cancel: Context,
    join: tokio::task::JoinHandle<()>,
}

/// Kafka consumer group member.
pub struct Consumer {
    client: Arc<StreamConsumer<RebalanceContext>>,
    handler: Handler,
    log: Arc<dyn Log>,
    topic: String,
    group_id: String,
    running: Mutex<Option<Running>>,
}

impl Consumer {
    pub fn new(cfg: ConsumerConfig, handler: Handler, log: Arc<dyn Log>) -> Result<Self, KafkaError> {
        cfg.validate()?;

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", cfg.brokers.join(","))
            .set("group.id", cfg.group_id.as_str())
            .set("enable.auto.offset.store", "false")
            .set(
                "auto.offset.reset",
                match cfg.start_offset {
                    StartOffset::Earliest => "earliest",
                    StartOffset::Latest => "latest",
                },
            );
        if cfg.fetch_min_bytes > 0 {
            client_config.set("fetch.min.bytes", cfg.fetch_min_bytes.to_string());
        }
        if !cfg.fetch_max_wait.is_zero() {
            client_config.set("fetch.wait.max.ms", cfg.fetch_max_wait.as_millis().to_string());
        }

        let rebalance_ctx = RebalanceContext {
            log: Arc::clone(&log),
            group_id: cfg.group_id.clone(),
            ctx: Context::background(),
        };
        let client: StreamConsumer<RebalanceContext> =
            client_config.create_with_context(rebalance_ctx)?;
        client.subscribe(&[cfg.topic.as_str()])?;

        Ok(Self {
            client: Arc::new(client),
            handler,
            log,
            topic: cfg.topic,
            group_id: cfg.group_id,
            running: Mutex::new(None),
        })
    }

    fn take_running(&self) -> Option<Running> {
        let mut guard = match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.take()
    }

    async fn run_loop(
        client: Arc<StreamConsumer<RebalanceContext>>,
        handler: Handler,
        log: Arc<dyn Log>,
        ctx: Context,
    ) {
        log.info(&ctx, "consumer loop started", &[]);

        loop {
            let received = tokio::select! {
                _ = ctx.cancelled() => {
                    log.info(&ctx, "consumer loop exiting", &[]);
                    return;
                }
                received = client.recv() => received,
            };

            let record = match received {
                Ok(record) => record,
                Err(err) => {
                    // Fetch errors are retriable; keep polling.
                    log.error(&ctx, "fetch error", &[("err", &err)]);
                    continue;
                }
            };

            let begin = Instant::now();
            let outcome = handler(ctx.clone(), detach(&record)).await;
            let latency = begin.elapsed();

            if let Err(err) = outcome {
                log.error(
                    &ctx,
                    "handler failed",
                    &[
                        ("topic", &record.topic()),
                        ("partition", &record.partition()),
                        ("offset", &record.offset()),
                        ("latency", &latency),
                        ("err", &err),
                    ],
                );
            } else {
                log.debug(
                    &ctx,
                    "message processed",
                    &[
                        ("topic", &record.topic()),
                        ("partition", &record.partition()),
                        ("offset", &record.offset()),
                        ("latency", &latency),
                    ],
                );
            }

            if let Err(err) =
                client.store_offset(record.topic(), record.partition(), record.offset())
            {
                log.error(
                    &ctx,
                    "failed to store offset",
                    &[
                        ("topic", &record.topic()),
                        ("partition", &record.partition()),
                        ("err", &err),
                    ],
                );
            }
        }
    }
}

/// Copies a borrowed record out of the fetch buffer.
fn detach(record: &BorrowedMessage<'_>) -> Message {
    let headers = record
        .headers()
        .map(|hs| {
            hs.iter()
                .map(|h| Header {
                    key: h.key.to_string(),
                    value: h.value.map(<[u8]>::to_vec).unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    Message {
        key: record.key().map(<[u8]>::to_vec),
        value: record.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        headers,
        topic: Some(record.topic().to_string()),
        partition: Some(record.partition()),
    }
}

#[async_trait]
impl Lifecycle for Consumer {
    /// Spawns the polling task. Returns immediately.
    async fn start(&self, ctx: Context) -> Result<(), BoxError> {
        let mut guard = match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.is_some() {
            return Err(Box::new(KafkaError::AlreadyStarted));
        }

        self.log.info(
            &ctx,
            "starting consumer",
            &[("topic", &self.topic), ("group_id", &self.group_id)],
        );

        let cancel = Context::background();
        let join = tokio::spawn(Self::run_loop(
            Arc::clone(&self.client),
            Arc::clone(&self.handler),
            Arc::clone(&self.log),
            cancel.child(),
        ));

        *guard = Some(Running { cancel, join });
        Ok(())
    }

    /// Cancels the polling task, waits up to the stop deadline, commits
    /// stored offsets and leaves the group. Idempotent.
    async fn stop(&self, ctx: Context) -> Result<(), BoxError> {
        let running = match self.take_running() {
            Some(running) => running,
            None => return Ok(()),
        };

        self.log.info(&ctx, "stopping consumer", &[]);
        running.cancel.cancel();

        let mut join = running.join;
        let timed_out = tokio::select! {
            _ = ctx.cancelled() => true,
            _ = &mut join => false,
        };
        if timed_out {
            self.log.warn(&ctx, "consumer stop timeout", &[]);
            join.abort();
            return Err(Box::new(ctx.error().unwrap_or(ContextError::Canceled)));
        }

        if let Err(err) = self.client.commit_consumer_state(CommitMode::Sync) {
            if !is_no_offset(&err) {
                self.log
                    .error(&ctx, "failed to commit on stop", &[("err", &err)]);
            }
        }
        self.client.unsubscribe();

        self.log.info(&ctx, "consumer stopped", &[]);
        Ok(())
    }
}
