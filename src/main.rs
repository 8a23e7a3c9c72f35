//! delayq - Redis-backed delay queue service
//!
//! `serve` runs the scanner pool against Redis; the remaining subcommands
//! are one-shot producer/consumer/operator operations against the same
//! queue. The HTTP/RPC front-end is a separate process; `--bind-address`
//! is carried for it but never bound here.

use clap::{Parser, Subcommand};
use console::style;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use delayq::config::{
    DEFAULT_BIND_ADDRESS, DEFAULT_BUCKET_METHOD, DEFAULT_BUCKET_NAME, DEFAULT_BUCKET_SIZE,
    DEFAULT_QUEUE_BLOCK_TIMEOUT, DEFAULT_QUEUE_NAME, DEFAULT_REDIS_CONNECT_TIMEOUT_MS,
    DEFAULT_REDIS_DB, DEFAULT_REDIS_HOST, DEFAULT_REDIS_MAX_ACTIVE, DEFAULT_REDIS_MAX_IDLE,
    DEFAULT_REDIS_READ_TIMEOUT_MS, DEFAULT_REDIS_WRITE_TIMEOUT_MS,
};
use delayq::{unix_now, Config, DelayQueue, Job, RedisConfig};

/// Redis-backed delay queue with sharded time buckets and TTR redelivery
#[derive(Parser, Debug, Clone)]
#[command(
    name = "delayq",
    version,
    about = "Redis-backed delay queue with sharded time buckets and TTR redelivery",
    after_help = "EXAMPLES:\n    \
        # Run the scanner pool against a local Redis\n    \
        delayq serve --redis-host 127.0.0.1:6379\n\n    \
        # Schedule a job for 30 seconds from now\n    \
        delayq push order-17 orders --delay 30 --ttr 60 --body '{}'\n\n    \
        # Consume, then acknowledge\n    \
        delayq pop orders\n    \
        delayq remove order-17\n\n    \
        # Inspect bucket and topic depths\n    \
        delayq status orders emails"
)]
struct CliArgs {
    /// Subcommand to run
    #[command(subcommand)]
    command: Command,

    /// Front-end listener address (consumed by the RPC front-end)
    #[arg(long, env = "HOST", default_value = DEFAULT_BIND_ADDRESS, global = true)]
    bind_address: String,

    /// Number of bucket shards
    #[arg(long, env = "BUCKET_SIZE", default_value_t = DEFAULT_BUCKET_SIZE, global = true)]
    bucket_size: usize,

    /// Bucket key pattern, %d replaced by the ordinal
    #[arg(long, env = "BUCKET_NAME", default_value = DEFAULT_BUCKET_NAME, global = true)]
    bucket_name: String,

    /// Bucket routing: 0 = stable hash, anything else = round-robin
    #[arg(long, env = "BUCKET_METHOD", default_value_t = DEFAULT_BUCKET_METHOD, global = true)]
    bucket_method: u32,

    /// Ready-list key pattern, %s replaced by the topic
    #[arg(long, env = "QUEUE_NAME", default_value = DEFAULT_QUEUE_NAME, global = true)]
    queue_name: String,

    /// Seconds a blocking pop waits
    #[arg(long, env = "QUEUE_BLOCK_TIMEOUT", default_value_t = DEFAULT_QUEUE_BLOCK_TIMEOUT, global = true)]
    queue_block_timeout: u64,

    /// Redis host:port
    #[arg(long, env = "REDIS_HOST", default_value = DEFAULT_REDIS_HOST, global = true)]
    redis_host: String,

    /// Redis database index
    #[arg(long, env = "REDIS_DB", default_value_t = DEFAULT_REDIS_DB, global = true)]
    redis_db: i64,

    /// Redis password (empty = no auth)
    #[arg(long, env = "REDIS_PASSWORD", default_value = "", hide_env_values = true, global = true)]
    redis_password: String,

    /// Idle connections the pool keeps warm
    #[arg(long, env = "REDIS_IDLE", default_value_t = DEFAULT_REDIS_MAX_IDLE, global = true)]
    redis_max_idle: u32,

    /// Pool cap on open connections (0 = unlimited)
    #[arg(long, env = "REDIS_ACTIVE", default_value_t = DEFAULT_REDIS_MAX_ACTIVE, global = true)]
    redis_max_active: u32,

    /// Redis connect timeout in milliseconds
    #[arg(long, env = "REDIS_TIMEOUT", default_value_t = DEFAULT_REDIS_CONNECT_TIMEOUT_MS, global = true)]
    redis_connect_timeout: u64,

    /// Redis read deadline in milliseconds; must exceed the block timeout
    #[arg(long, env = "REDIS_READ_TIMEOUT", default_value_t = DEFAULT_REDIS_READ_TIMEOUT_MS, global = true)]
    redis_read_timeout: u64,

    /// Redis write deadline in milliseconds
    #[arg(long, env = "REDIS_WRITE_TIMEOUT", default_value_t = DEFAULT_REDIS_WRITE_TIMEOUT_MS, global = true)]
    redis_write_timeout: u64,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Run the bucket scanners until interrupted
    Serve,

    /// Schedule a job
    Push {
        /// Job id, unique within the service
        #[arg(value_name = "ID")]
        id: String,

        /// Topic the job is delivered on
        #[arg(value_name = "TOPIC")]
        topic: String,

        /// Seconds from now until the job becomes deliverable
        #[arg(long, default_value_t = 0, value_name = "SECS")]
        delay: u64,

        /// Seconds the consumer has to acknowledge before redelivery
        #[arg(long, default_value_t = 60, value_name = "SECS")]
        ttr: i64,

        /// Opaque payload carried with the job
        #[arg(long, default_value = "", value_name = "DATA")]
        body: String,
    },

    /// Block for the next deliverable job on the given topics
    Pop {
        /// Topics to consume, first non-empty wins
        #[arg(value_name = "TOPIC", required = true)]
        topics: Vec<String>,
    },

    /// Acknowledge (delete) a job
    Remove {
        /// Job id
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Show a job without touching any index
    Get {
        /// Job id
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Show bucket and ready-queue depths
    Status {
        /// Topics whose ready depth to include
        #[arg(value_name = "TOPIC")]
        topics: Vec<String>,

        /// Output format (text, json)
        #[arg(long, default_value = "text", value_name = "FORMAT")]
        format: String,
    },
}

impl CliArgs {
    fn to_config(&self) -> Config {
        Config {
            bind_address: self.bind_address.clone(),
            bucket_size: self.bucket_size,
            bucket_name: self.bucket_name.clone(),
            bucket_method: self.bucket_method,
            queue_name: self.queue_name.clone(),
            queue_block_timeout: self.queue_block_timeout,
            redis: RedisConfig {
                host: self.redis_host.clone(),
                db: self.redis_db,
                password: self.redis_password.clone(),
                max_idle: self.redis_max_idle,
                max_active: self.redis_max_active,
                connect_timeout_ms: self.redis_connect_timeout,
                read_timeout_ms: self.redis_read_timeout,
                write_timeout_ms: self.redis_write_timeout,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("delayq=info".parse().unwrap()),
        )
        .init();

    let args = CliArgs::parse();
    let config = args.to_config();

    match args.command {
        Command::Serve => run_serve(config).await?,
        Command::Push {
            ref id,
            ref topic,
            delay,
            ttr,
            ref body,
        } => run_push(config, id, topic, delay, ttr, body).await?,
        Command::Pop { ref topics } => run_pop(config, topics).await?,
        Command::Remove { ref id } => run_remove(config, id).await?,
        Command::Get { ref id } => run_get(config, id).await?,
        Command::Status {
            ref topics,
            ref format,
        } => run_status(config, topics, format).await?,
    }

    Ok(())
}

async fn run_serve(config: Config) -> anyhow::Result<()> {
    let queue = DelayQueue::connect(config).await?;

    println!(
        "{} {} buckets, {} routing, redis {}",
        style("[delayq]").cyan().bold(),
        style(queue.config().bucket_size).yellow(),
        if queue.config().bucket_method == 0 {
            style("hash").green()
        } else {
            style("round-robin").green()
        },
        style(&queue.config().redis.host).dim(),
    );
    println!(
        "  Front-end bind address (external): {}",
        style(&queue.config().bind_address).dim()
    );

    // Handle Ctrl+C
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    ctrlc::set_handler(move || {
        if shutdown_clone.load(Ordering::Relaxed) {
            eprintln!("\nForce shutdown!");
            std::process::exit(130);
        }
        eprintln!("\nShutting down gracefully... (press Ctrl+C again to force)");
        shutdown_clone.store(true, Ordering::SeqCst);
    })?;

    queue.start_scanners().await;
    tracing::info!("scanners running");

    while !shutdown.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    queue.shutdown().await;
    println!("{} stopped", style("[delayq]").cyan().bold());
    Ok(())
}

async fn run_push(
    config: Config,
    id: &str,
    topic: &str,
    delay: u64,
    ttr: i64,
    body: &str,
) -> anyhow::Result<()> {
    let queue = DelayQueue::connect(config).await?;

    let due = unix_now() + delay as i64;
    let job = Job::new(id, topic, due, ttr, body);
    queue.push(job).await?;

    println!(
        "{} job {} on {} due at {}",
        style("Pushed:").green().bold(),
        style(id).yellow(),
        style(topic).cyan(),
        due
    );
    Ok(())
}

async fn run_pop(config: Config, topics: &[String]) -> anyhow::Result<()> {
    let queue = DelayQueue::connect(config).await?;

    match queue.pop(topics).await? {
        Some(job) => {
            println!("{}", serde_json::to_string_pretty(&job)?);
            eprintln!(
                "{} acknowledge with 'delayq remove {}' within {}s",
                style("Reserved:").yellow().bold(),
                job.id,
                job.ttr
            );
        }
        None => {
            println!(
                "{} no job within {}s",
                style("Timed out:").dim(),
                queue.config().queue_block_timeout
            );
        }
    }
    Ok(())
}

async fn run_remove(config: Config, id: &str) -> anyhow::Result<()> {
    let queue = DelayQueue::connect(config).await?;
    queue.remove(id).await?;
    println!("{} job {}", style("Removed:").green().bold(), style(id).yellow());
    Ok(())
}

async fn run_get(config: Config, id: &str) -> anyhow::Result<()> {
    let queue = DelayQueue::connect(config).await?;
    match queue.get(id).await? {
        Some(job) => println!("{}", serde_json::to_string_pretty(&job)?),
        None => println!("{} job {}", style("Not found:").red().bold(), id),
    }
    Ok(())
}

async fn run_status(config: Config, topics: &[String], format: &str) -> anyhow::Result<()> {
    let queue = DelayQueue::connect(config).await?;
    let depths = queue.depths(topics).await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&depths)?);
        return Ok(());
    }

    println!("{}", style("delayq status").cyan().bold());
    println!("{}", "=".repeat(40));
    println!();

    println!("{}", style("Buckets").yellow().bold());
    for (bucket, depth) in &depths.buckets {
        println!(
            "  {:<24} {}",
            bucket,
            if *depth > 0 {
                style(depth).cyan()
            } else {
                style(depth).dim()
            }
        );
    }
    println!();

    if !depths.topics.is_empty() {
        println!("{}", style("Ready queues").yellow().bold());
        for (topic, depth) in &depths.topics {
            println!(
                "  {:<24} {}",
                topic,
                if *depth > 0 {
                    style(depth).green()
                } else {
                    style(depth).dim()
                }
            );
        }
        println!();
    }

    Ok(())
}
