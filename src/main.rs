//! Train a SAC summarization agent on a chaptered article.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use burn::backend::ndarray::NdArrayDevice;
use burn::backend::{Autodiff, NdArray};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sumrl::algo::SacAgent;
use sumrl::config::TrainConfig;
use sumrl::env::{split_segments, ArticleEnv};
use sumrl::memory::ReplayBuffer;
use sumrl::metrics::{ConsoleLogger, CsvLogger, MultiLogger};
use sumrl::nn::{SeqCriticConfig, SeqPolicyConfig};
use sumrl::text::CharTokenizer;
use sumrl::trainer::{preview, Trainer};

type Backend = Autodiff<NdArray>;

/// Train a SAC agent to iteratively summarize an article's chapters.
#[derive(Parser)]
#[command(name = "sumrl", version, about)]
struct Cli {
    /// Path to a JSON configuration file (uses defaults if not provided).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Article to train on.
    #[arg(long, default_value = "data/sample_article.txt")]
    article: PathBuf,

    /// Directory for CSV metrics and the saved agent snapshot.
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,

    /// Maximum number of transitions stored in the replay buffer.
    #[arg(long)]
    replay_capacity: Option<usize>,

    /// Number of training rounds.
    #[arg(long)]
    rounds: Option<usize>,

    /// SAC updates after each round. Defaults to one update per chapter.
    #[arg(long)]
    post_round_updates: Option<usize>,

    /// Limit the number of chapters processed per round, for quick smoke
    /// tests on large articles.
    #[arg(long)]
    max_chapters: Option<usize>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config from {}", path.display()))?;
            serde_json::from_str::<TrainConfig>(&text)
                .with_context(|| format!("failed to parse config from {}", path.display()))?
        }
        None => TrainConfig::default(),
    };
    if let Some(capacity) = cli.replay_capacity {
        config.schedule.replay_capacity = capacity;
    }
    if let Some(rounds) = cli.rounds {
        config.schedule.rounds = rounds;
    }
    if let Some(updates) = cli.post_round_updates {
        config.schedule.updates_per_round = updates;
    }

    let article = std::fs::read_to_string(&cli.article)
        .with_context(|| format!("failed to read article from {}", cli.article.display()))?;
    let mut chapters = split_segments(&article);
    if let Some(limit) = cli.max_chapters {
        if limit == 0 {
            bail!("--max-chapters must be positive when provided");
        }
        chapters.truncate(limit);
    }
    if chapters.is_empty() {
        bail!("no chapters found in {}", cli.article.display());
    }

    let (length, article_preview) = preview(&article, 40, 40);
    tracing::info!(chars = length, preview = %article_preview, "loaded article");
    for (idx, chapter) in chapters.iter().enumerate() {
        let (chars, chapter_preview) = preview(chapter, 30, 30);
        tracing::info!(chapter = idx + 1, chars, preview = %chapter_preview, "chapter");
    }

    let device = NdArrayDevice::default();
    let tokenizer = CharTokenizer::new(&chapters);
    let longest = chapters.iter().map(|c| c.chars().count()).max().unwrap_or(0);
    let max_summary_length = config.summary_length_budget(longest);

    let policy = SeqPolicyConfig::new(
        tokenizer.vocab_size(),
        max_summary_length,
        tokenizer.bos_id(),
        tokenizer.eos_id(),
    )
    .with_embedding_dim(config.network.embedding_dim)
    .with_hidden_dim(config.network.hidden_dim)
    .init::<Backend>(&device);
    let critic_config = SeqCriticConfig::new(tokenizer.vocab_size())
        .with_embedding_dim(config.network.embedding_dim)
        .with_hidden_dim(config.network.hidden_dim);
    let q1 = critic_config.init::<Backend>(&device);
    let q2 = critic_config.init::<Backend>(&device);

    let env = ArticleEnv::new(
        chapters,
        tokenizer.allowed_chars().clone(),
        Default::default(),
    )?;
    let agent = SacAgent::new(
        policy,
        q1,
        q2,
        ReplayBuffer::new(config.schedule.replay_capacity)?,
        tokenizer,
        config.agent_config(),
        device,
    )?;

    let logger = MultiLogger::new()
        .add(ConsoleLogger)
        .add(CsvLogger::new(&cli.out_dir)?);
    let mut trainer = Trainer::new(agent, env, config.trainer_config(), Box::new(logger));

    tracing::info!(
        rounds = config.schedule.rounds,
        updates_per_round = config.schedule.updates_per_round,
        replay_capacity = config.schedule.replay_capacity,
        max_summary_length,
        "starting training"
    );
    trainer.run()?;

    tracing::info!("final iterative summary (deterministic policy output):");
    for line in trainer.render_summary()? {
        tracing::info!("  {line}");
    }

    let snapshot_dir = cli.out_dir.join("agent");
    trainer.agent().save(&snapshot_dir)?;
    tracing::info!(path = %snapshot_dir.display(), "saved agent snapshot");
    Ok(())
}
