use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pgmq_core::EngineConfig;
use pgmq_engine::{AddOptions, HandlerDescriptor, Publisher, WorkerEngine};
use pgmq_postgres::PostgresStore;
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "pgmq-cli", version, about = "CLI for the pgmq worker engine")]
struct Cli {
    /// Postgres connection string (pgmq extension required)
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a job
    Enqueue {
        #[arg(long, default_value = "emails")]
        queue: String,

        /// Job name, e.g. welcome-msg
        #[arg(long)]
        job: String,

        /// JSON data string, e.g. '{"to":"a@b.c"}'
        #[arg(long)]
        json: String,

        /// Seconds to delay first delivery
        #[arg(long, default_value_t = 0)]
        delay: i32,
    },

    /// Run a worker with the demo handlers
    Worker {
        #[arg(long, default_value = "emails")]
        queue: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pgmq_cli=info,pgmq_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    pgmq_engine::metrics::init_metrics();

    let cli = Cli::parse();
    let store = Arc::new(PostgresStore::connect(&cli.database_url).await?);
    store.init().await?;

    match cli.command {
        Commands::Enqueue {
            queue,
            job,
            json,
            delay,
        } => {
            let data: Value = serde_json::from_str(&json).context("invalid JSON data")?;

            let publisher = Publisher::new(store.clone());
            publisher.declare(&queue).await?;
            let id = publisher
                .add(
                    &queue,
                    &job,
                    data,
                    AddOptions {
                        delay_seconds: delay,
                        ..AddOptions::default()
                    },
                )
                .await?;
            println!("{id}");
        }

        Commands::Worker { queue } => {
            let mut engine = WorkerEngine::new(
                store,
                demo_handlers(&queue),
                EngineConfig::from_env(),
            )?;
            engine.start().await?;

            tokio::signal::ctrl_c().await?;
            tracing::info!("shutdown signal received");
            engine.shutdown().await;
        }
    }

    Ok(())
}

/// Demo handlers: one that always succeeds and one that fails until its
/// third read, to exercise the retry path.
fn demo_handlers(queue: &str) -> Vec<HandlerDescriptor> {
    vec![
        HandlerDescriptor::new(queue, "welcome-msg", |msg| async move {
            tracing::info!(msg_id = msg.id, data = %msg.payload.data, "received welcome-msg");
            Ok(())
        }),
        HandlerDescriptor::new(queue, "flaky-msg", |msg| async move {
            if msg.read_count < 3 {
                anyhow::bail!("simulated failure on read {}", msg.read_count);
            }
            tracing::info!(msg_id = msg.id, "flaky-msg succeeded after retries");
            Ok(())
        }),
    ]
}
