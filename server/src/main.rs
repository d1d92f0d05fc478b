use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use tq_core::domain::settings::AppConfig;

/// Chunked audio transcription job server.
#[derive(Parser)]
#[command(name = "transcribe-queue", version)]
struct Cli {
    /// JSON config file. Missing keys use defaults.
    #[arg(long, env = "TQ_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address (overrides config and TQ_BIND).
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Per-job working directory root.
    #[arg(long)]
    work_root: Option<PathBuf>,

    /// Maximum concurrent segment transcriptions per job.
    #[arg(long)]
    parallelism: Option<usize>,

    /// Thread hint passed to each engine invocation.
    #[arg(long)]
    threads: Option<usize>,

    /// Segment length threshold in seconds.
    #[arg(long)]
    max_segment_secs: Option<f64>,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(bind) = self.bind {
            config.server.bind = bind;
        }
        if let Some(root) = &self.work_root {
            config.pipeline.work_root = root.clone();
        }
        if let Some(p) = self.parallelism {
            config.pipeline.max_parallel_segments = p;
        }
        if let Some(t) = self.threads {
            config.pipeline.engine_threads = t;
        }
        if let Some(secs) = self.max_segment_secs {
            config.pipeline.max_segment_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    transcribe_queue::run(config).await?;
    Ok(())
}
