//! # Kafka producer and consumer components.
//!
//! Thin lifecycle-bearing wrappers over [`rdkafka`]: a [`Producer`] whose
//! `start` is a no-op, and a [`Consumer`] that runs a single polling task
//! feeding a user [`Handler`].
//!
//! Enabled via the `kafka` feature.

mod consumer;
mod producer;

pub use consumer::{Consumer, ConsumerConfig};
pub use producer::{Producer, ProducerConfig};

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::Context;
use crate::error::BoxError;

/// A message flowing through the bus, on either half.
#[derive(Debug, Clone, Default)]
pub struct Message {
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub headers: Vec<Header>,
    /// Overrides the producer's default topic when set.
    pub topic: Option<String>,
    pub partition: Option<i32>,
}

/// Message header key-value pair.
#[derive(Debug, Clone)]
pub struct Header {
    pub key: String,
    pub value: Vec<u8>,
}

/// Initial offset for a consumer group with no committed position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOffset {
    Earliest,
    #[default]
    Latest,
}

/// Processes one consumed message. Errors are logged but do not stop the
/// polling loop.
pub type Handler = Arc<dyn Fn(Context, Message) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// Boxes a closure into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(Context, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Arc::new(move |ctx, msg| Box::pin(f(ctx, msg)))
}

/// Errors raised by the kafka components.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum KafkaError {
    #[error("no brokers configured")]
    NoBrokers,

    #[error("empty topic")]
    NoTopic,

    #[error("empty group id")]
    NoGroupId,

    #[error("producer closed")]
    ProducerClosed,

    #[error("consumer already started")]
    AlreadyStarted,

    #[error(transparent)]
    Client(#[from] rdkafka::error::KafkaError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_offset_serde_names() {
        let earliest: StartOffset = serde_yaml::from_str("earliest").unwrap();
        assert_eq!(earliest, StartOffset::Earliest);
        let latest: StartOffset = serde_yaml::from_str("latest").unwrap();
        assert_eq!(latest, StartOffset::Latest);
        assert_eq!(StartOffset::default(), StartOffset::Latest);
    }
}
