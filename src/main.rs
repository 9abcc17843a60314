#![allow(clippy::result_large_err)]

use anyhow::Context;
use restq::client::{AgeingClient, HttpClientPool};
use restq::codec::Message;
use restq::config::ServiceConfig;
use restq::consumer::Consumer;
use restq::producer::ProxyProducer;
use restq::telemetry;
use std::sync::Arc;

enum CliCommand {
    Run,
    Check,
    Help,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise telemetry")?;

    let command = parse_cli_args()?;
    if matches!(command, CliCommand::Help) {
        print_help();
        return Ok(());
    }

    let config = ServiceConfig::load().context("failed to load configuration")?;
    config
        .consumer
        .validate()
        .context("invalid consumer configuration")?;
    if let Some(producer) = &config.producer {
        producer
            .validate()
            .context("invalid producer configuration")?;
    }

    let pool = HttpClientPool::new(config.http.clone()).context("failed to build HTTP client")?;

    match command {
        CliCommand::Check => run_check(config, pool).await,
        CliCommand::Run => run_consumer(config, pool).await,
        CliCommand::Help => Ok(()),
    }
}

fn parse_cli_args() -> anyhow::Result<CliCommand> {
    let mut args = std::env::args().skip(1);
    let Some(first) = args.next() else {
        return Ok(CliCommand::Run);
    };
    if let Some(extra) = args.next() {
        anyhow::bail!("unexpected argument `{extra}`");
    }

    match first.as_str() {
        "--check" => Ok(CliCommand::Check),
        "-h" | "--help" => Ok(CliCommand::Help),
        other => anyhow::bail!("unrecognised argument `{other}`"),
    }
}

fn print_help() {
    println!(
        "\
Usage: restq [OPTIONS]

Consumes the configured topic through the REST proxy and logs every message.
Configuration is read from config/local.* and RESTQ__* environment variables.

Options:
      --check    Probe proxy connectivity for the consumer and producer, then exit
  -h, --help     Print this help message
"
    );
}

async fn run_check(config: ServiceConfig, pool: HttpClientPool) -> anyhow::Result<()> {
    let consumer = Consumer::new(config.consumer, |_message: Message| async {}, pool.clone());
    let status = consumer
        .check_connectivity()
        .await
        .context("consumer proxy check failed")?;
    println!("consumer: {status}");

    if let Some(producer) = config.producer {
        let producer = ProxyProducer::new(producer, pool);
        let status = producer
            .check_connectivity()
            .await
            .context("producer proxy check failed")?;
        println!("producer: {status}");
    }
    Ok(())
}

async fn run_consumer(config: ServiceConfig, pool: HttpClientPool) -> anyhow::Result<()> {
    let handler = |message: Message| async move {
        tracing::info!(
            target: "restq::app",
            event = "message_received",
            headers = ?message.headers,
            body_bytes = message.body.len()
        );
    };

    let consumer = match config.http.ageing_interval {
        Some(max_age) => Consumer::with_ageing(
            config.consumer,
            handler,
            AgeingClient::new(pool, max_age),
        ),
        None => Consumer::new(config.consumer, handler, pool),
    };
    let consumer = Arc::new(consumer);

    let running = Arc::clone(&consumer);
    let streams = tokio::spawn(async move { running.start().await });

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!(target: "restq::app", event = "shutdown_requested");
    consumer.stop();

    streams
        .await
        .context("consumer task panicked")?
        .context("consumer runtime error")
}
