//! Runnable example wiring the whole toolkit together: layered config,
//! tracing logger, postgres pool, kafka consumer echoing into a producer,
//! all supervised until SIGINT/SIGTERM.
//!
//! ```text
//! cargo run --bin appvisor-demo --features "postgres kafka"
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use appvisor::config::{Scanner, Source};
use appvisor::kafka::{self, Consumer, Producer};
use appvisor::logger::{self, TracingLog};
use appvisor::pg::Db;
use appvisor::{BoxError, Component, Context, SupervisorBuilder};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Conf {
    logger: logger::Config,
    db: appvisor::pg::Config,
    messages_consumer: kafka::ConsumerConfig,
    messages_producer: kafka::ProducerConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("appvisor-demo: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), BoxError> {
    let conf: Conf = Scanner::new()
        .with(Source::defaults(&Conf::default()))
        .with(Source::env("APP"))
        .with(Source::yaml_file("config.yaml"))
        .scan()?;

    logger::init(&conf.logger)?;
    let log = Arc::new(TracingLog);

    let db = Arc::new(Db::new(conf.db, log.clone())?);

    let producer = Arc::new(Producer::new(conf.messages_producer, log.clone())?);

    let echo = producer.clone();
    let consumer = Consumer::new(
        conf.messages_consumer,
        kafka::handler(move |ctx: Context, msg: kafka::Message| {
            let producer = echo.clone();
            async move {
                let reply = kafka::Message {
                    key: msg.key.clone(),
                    value: msg.value.clone(),
                    ..Default::default()
                };
                producer.produce(&ctx, &[reply]).await
            }
        }),
        log.clone(),
    )?;

    let app = SupervisorBuilder::new()
        .with_name("appvisor-demo")
        .with_logger(log)
        .with_components(vec![
            Component::new("db", db),
            Component::new("producer", producer),
            Component::new("consumer", Arc::new(consumer)),
        ])
        .build()?;

    app.run(Context::background()).await?;
    Ok(())
}
