//! Command-line interface for kafka-tail
//!
//! ```bash
//! RUST_LOG=kafka_tail_source=debug kafka-tail run --config kafka-tail.yaml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kafka_tail::{spawn_json_lines_sink, AgentConfig};
use kafka_tail_source::{KafkaTopicManager, TargetSyncer, TopicManager};
use tokio::sync::mpsc;

/// Entries buffered between the targets and stdout.
const SINK_CAPACITY: usize = 1024;

#[derive(Parser)]
#[command(name = "kafka-tail")]
#[command(about = "Tail dynamically discovered Kafka topics as labeled JSON lines")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Consume every matching topic until interrupted
    Run {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Validate the configuration without connecting to Kafka
    Check {
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Print the topics currently matched by each scrape config
    Topics {
        #[command(flatten)]
        config: ConfigArgs,
    },
}

#[derive(clap::Args)]
struct ConfigArgs {
    /// Path to the YAML configuration file
    #[arg(long, env = "KAFKA_TAIL_CONFIG")]
    config: PathBuf,
}

impl ConfigArgs {
    fn load(&self) -> anyhow::Result<AgentConfig> {
        AgentConfig::from_file(&self.config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run_syncers(config.load()?).await,
        Commands::Check { config } => {
            let configs = config.load()?.check()?;
            for scrape in &configs {
                println!("{}: ok", scrape.job_name);
            }
            Ok(())
        }
        Commands::Topics { config } => print_topics(config.load()?).await,
    }
}

async fn run_syncers(config: AgentConfig) -> anyhow::Result<()> {
    let configs = config.check()?;
    let (entries_tx, entries_rx) = mpsc::channel(SINK_CAPACITY);
    let sink = spawn_json_lines_sink(entries_rx);

    let mut syncers = Vec::with_capacity(configs.len());
    for scrape in configs {
        let job_name = scrape.job_name.clone();
        let syncer = TargetSyncer::new(scrape, Arc::new(entries_tx.clone()))
            .with_context(|| format!("Failed to start Kafka target for '{job_name}'"))?;
        tracing::info!("started Kafka target for job {}", job_name);
        syncers.push(syncer);
    }
    drop(entries_tx);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("shutting down");

    for syncer in &syncers {
        syncer.stop().await?;
    }
    // The syncers own the remaining senders; dropping them lets the sink drain.
    drop(syncers);
    let written = sink.await.context("Sink task panicked")??;
    tracing::info!("wrote {} entries", written);
    Ok(())
}

async fn print_topics(config: AgentConfig) -> anyhow::Result<()> {
    for mut scrape in config.check()? {
        let kafka = scrape.validate()?;
        let manager = KafkaTopicManager::new(&kafka.client_config()?, &kafka.topics)?;
        let topics = manager
            .topics()
            .await
            .with_context(|| format!("Failed to list topics for '{}'", scrape.job_name))?;
        manager.close().await?;
        println!("{}:", scrape.job_name);
        for topic in topics {
            println!("  {topic}");
        }
    }
    Ok(())
}
