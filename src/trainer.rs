//! Round-based training loop
//!
//! A round walks the environment through every chapter once: the agent acts
//! on each observation, the resulting transition is buffered, and per-step
//! quality metrics are logged. After the round a burst of off-policy updates
//! runs against the replay buffer.

use anyhow::Result;

use crate::algo::sac::{SacAgent, SacCriticModel, SacPolicyModel, UpdateMetrics};
use crate::env::{ArticleEnv, Observation};
use crate::metrics::{MetricsLogger, RoundSnapshot, StepSnapshot, UpdateSnapshot};
use crate::reward;
use burn::tensor::backend::AutodiffBackend;

/// Configuration for the [`Trainer`].
#[derive(Debug, Clone, Copy)]
pub struct TrainerConfig {
    /// Number of training rounds.
    pub rounds: usize,
    /// Off-policy updates after each round. Zero means one update per
    /// chapter, matching the round's step count.
    pub updates_per_round: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            rounds: 1,
            updates_per_round: 0,
        }
    }
}

/// Drives rollouts and post-round updates for the summarization agent.
pub struct Trainer<B, P, C>
where
    B: AutodiffBackend,
    P: SacPolicyModel<B>,
    C: SacCriticModel<B>,
{
    agent: SacAgent<B, P, C>,
    env: ArticleEnv,
    config: TrainerConfig,
    logger: Box<dyn MetricsLogger>,
    global_step: usize,
}

impl<B, P, C> Trainer<B, P, C>
where
    B: AutodiffBackend,
    P: SacPolicyModel<B>,
    C: SacCriticModel<B>,
{
    pub fn new(
        agent: SacAgent<B, P, C>,
        env: ArticleEnv,
        config: TrainerConfig,
        logger: Box<dyn MetricsLogger>,
    ) -> Self {
        Self {
            agent,
            env,
            config,
            logger,
            global_step: 0,
        }
    }

    pub fn agent(&self) -> &SacAgent<B, P, C> {
        &self.agent
    }

    /// Effective number of post-round updates.
    fn updates_per_round(&self) -> usize {
        if self.config.updates_per_round > 0 {
            self.config.updates_per_round
        } else {
            self.env.segment_count()
        }
    }

    /// Run all configured rounds.
    pub fn run(&mut self) -> Result<()> {
        for round_index in 1..=self.config.rounds.max(1) {
            self.run_round(round_index)?;
        }
        self.logger.flush();
        Ok(())
    }

    /// One traversal of all chapters followed by a burst of updates.
    pub fn run_round(&mut self, round_index: usize) -> Result<RoundSnapshot> {
        let mut observation = self.env.reset();
        let steps = self.env.segment_count();
        tracing::info!(round = round_index, steps, "training round start");

        let mut total_reward = 0.0f32;
        for step in 1..=steps {
            let previous_summary_length = observation.previous_summary.chars().count();

            let action = self.agent.act(&observation, false)?;
            let transition = self.env.step(&action);
            total_reward += transition.reward;
            self.global_step += 1;

            if let Some(report) = self.env.last_report() {
                let snapshot = StepSnapshot::from_report(
                    round_index,
                    step,
                    self.global_step,
                    previous_summary_length,
                    &report,
                );
                self.logger.log_step(&snapshot);
            }

            observation = transition.next_state.clone();
            self.agent.record(transition);
        }

        let round = RoundSnapshot {
            round: round_index,
            steps,
            total_reward,
            average_reward: if steps > 0 {
                total_reward / steps as f32
            } else {
                0.0
            },
        };
        self.logger.log_round(&round);

        self.post_round_updates(round_index)?;
        Ok(round)
    }

    /// Run the post-round update burst, logging each update and the burst's
    /// averages. Returns the averaged metrics, or `None` when the buffer is
    /// still below one batch.
    fn post_round_updates(&mut self, round_index: usize) -> Result<Option<UpdateMetrics>> {
        let updates = self.updates_per_round();
        if updates == 0 || self.agent.buffer_len() < self.agent.config().batch_size {
            return Ok(None);
        }

        tracing::info!(round = round_index, updates, "post-round updates");
        let mut collected = Vec::with_capacity(updates);
        for update in 1..=updates {
            let metrics = self.agent.update()?;
            self.logger.log_update(&UpdateSnapshot {
                round: round_index,
                update,
                policy_loss: metrics.policy_loss,
                q1_loss: metrics.q1_loss,
                q2_loss: metrics.q2_loss,
                mean_reward: metrics.mean_reward,
            });
            collected.push(metrics);
        }

        let averages = mean_update_metrics(&collected);
        tracing::info!(
            round = round_index,
            policy_loss = averages.policy_loss,
            q1_loss = averages.q1_loss,
            q2_loss = averages.q2_loss,
            mean_reward = averages.mean_reward,
            "post-round update averages"
        );
        Ok(Some(averages))
    }

    /// Render the deterministic iterative summary, one line per chapter.
    ///
    /// Greedy rollout outside the environment: the running summary feeds each
    /// next observation exactly as during training, but nothing is buffered.
    pub fn render_summary(&self) -> Result<Vec<String>> {
        let mut lines = vec!["Iteration 00 | chars=0000 | <empty>".to_string()];
        let mut aggregated = String::new();

        for (idx, chapter) in self.env.chapters().iter().enumerate() {
            let observation = Observation {
                previous_summary: aggregated.clone(),
                chapter_text: chapter.clone(),
                step_index: idx + 1,
            };
            let action = self.agent.act(&observation, true)?;
            aggregated = action.text.clone();

            let report = reward::analyze(
                &action.text,
                chapter,
                self.env.allowed_chars(),
                self.env.weights(),
            );
            let (length, preview) = preview(&action.text, 32, 32);
            lines.push(format!(
                "Iteration {:02} | chars={:04} sim≈{:.2} coverage≈{:.2} novelty≈{:.2} garbled≈{:.2} | {}",
                idx + 1,
                length,
                report.similarity,
                report.coverage_ratio,
                report.novelty_ratio,
                report.garbled_ratio,
                preview,
            ));
        }
        Ok(lines)
    }
}

/// Element-wise mean of a burst of update metrics.
fn mean_update_metrics(metrics: &[UpdateMetrics]) -> UpdateMetrics {
    if metrics.is_empty() {
        return UpdateMetrics::default();
    }
    let count = metrics.len() as f32;
    UpdateMetrics {
        policy_loss: metrics.iter().map(|m| m.policy_loss).sum::<f32>() / count,
        q1_loss: metrics.iter().map(|m| m.q1_loss).sum::<f32>() / count,
        q2_loss: metrics.iter().map(|m| m.q2_loss).sum::<f32>() / count,
        mean_reward: metrics.iter().map(|m| m.mean_reward).sum::<f32>() / count,
    }
}

/// Length of `text` in characters plus an elided preview.
pub fn preview(text: &str, head: usize, tail: usize) -> (usize, String) {
    let chars: Vec<char> = text.chars().collect();
    let length = chars.len();
    let rendered = if length <= head + tail {
        text.to_string()
    } else {
        let front: String = chars[..head].iter().collect();
        let back: String = chars[length - tail..].iter().collect();
        format!("{front}...{back}")
    };
    (length, rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::ndarray::NdArrayDevice;
    use burn::backend::{Autodiff, NdArray};
    use std::collections::HashSet;

    use crate::algo::sac::AgentConfig;
    use crate::memory::ReplayBuffer;
    use crate::metrics::ConsoleLogger;
    use crate::nn::{SeqCritic, SeqCriticConfig, SeqPolicy, SeqPolicyConfig};
    use crate::reward::QualityWeights;
    use crate::text::CharTokenizer;

    type TestBackend = Autodiff<NdArray>;

    fn trainer(
        chapters: &[&str],
        config: TrainerConfig,
    ) -> Trainer<TestBackend, SeqPolicy<TestBackend>, SeqCritic<TestBackend>> {
        let device = NdArrayDevice::default();
        let chapters: Vec<String> = chapters.iter().map(|s| s.to_string()).collect();
        let tokenizer = CharTokenizer::new(&chapters);
        let vocab = tokenizer.vocab_size();

        let policy = SeqPolicyConfig::new(vocab, 8, tokenizer.bos_id(), tokenizer.eos_id())
            .with_embedding_dim(8)
            .with_hidden_dim(12)
            .init(&device);
        let critic = |device: &NdArrayDevice| {
            SeqCriticConfig::new(vocab)
                .with_embedding_dim(8)
                .with_hidden_dim(12)
                .init(device)
        };

        let allowed: HashSet<char> = tokenizer.allowed_chars().clone();
        let env = ArticleEnv::new(chapters, allowed, QualityWeights::default()).unwrap();
        let agent = SacAgent::new(
            policy,
            critic(&device),
            critic(&device),
            ReplayBuffer::new(16).unwrap(),
            tokenizer,
            AgentConfig {
                batch_size: 2,
                ..AgentConfig::default()
            },
            device,
        )
        .unwrap();

        Trainer::new(agent, env, config, Box::new(ConsoleLogger))
    }

    #[test]
    fn round_buffers_one_transition_per_chapter() {
        let mut trainer = trainer(
            &["first chapter", "second chapter", "third chapter"],
            TrainerConfig {
                rounds: 1,
                updates_per_round: 1,
            },
        );

        let round = trainer.run_round(1).unwrap();
        assert_eq!(round.steps, 3);
        assert_eq!(trainer.agent.buffer_len(), 3);
        assert!(round.total_reward.is_finite());
        assert!((round.average_reward - round.total_reward / 3.0).abs() < 1e-6);
    }

    #[test]
    fn zero_updates_per_round_defaults_to_step_count() {
        let trainer = trainer(
            &["one", "two"],
            TrainerConfig {
                rounds: 1,
                updates_per_round: 0,
            },
        );
        assert_eq!(trainer.updates_per_round(), 2);
    }

    #[test]
    fn render_summary_yields_one_line_per_chapter() {
        let trainer = trainer(
            &["alpha beta", "gamma delta"],
            TrainerConfig::default(),
        );

        let lines = trainer.render_summary().unwrap();
        // Baseline line plus one per chapter.
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("Iteration 00"));
        assert!(lines[2].contains("Iteration 02"));
    }

    #[test]
    fn global_step_is_monotonic_across_rounds() {
        let mut trainer = trainer(
            &["one", "two"],
            TrainerConfig {
                rounds: 2,
                updates_per_round: 1,
            },
        );
        trainer.run().unwrap();
        assert_eq!(trainer.global_step, 4);
    }

    #[test]
    fn update_burst_reports_elementwise_averages() {
        let metrics = [
            crate::algo::UpdateMetrics {
                policy_loss: 1.0,
                q1_loss: 2.0,
                q2_loss: 4.0,
                mean_reward: 0.2,
            },
            crate::algo::UpdateMetrics {
                policy_loss: 3.0,
                q1_loss: 6.0,
                q2_loss: 0.0,
                mean_reward: 0.6,
            },
        ];
        let averages = mean_update_metrics(&metrics);
        assert!((averages.policy_loss - 2.0).abs() < 1e-6);
        assert!((averages.q1_loss - 4.0).abs() < 1e-6);
        assert!((averages.q2_loss - 2.0).abs() < 1e-6);
        assert!((averages.mean_reward - 0.4).abs() < 1e-6);
    }

    #[test]
    fn update_burst_is_gated_on_a_full_batch() {
        let mut trainer = trainer(
            &["first chapter", "second chapter"],
            TrainerConfig {
                rounds: 1,
                updates_per_round: 2,
            },
        );

        // Empty buffer: no burst, no averages.
        assert!(trainer.post_round_updates(1).unwrap().is_none());

        trainer.run_round(1).unwrap();
        let averages = trainer.post_round_updates(1).unwrap().unwrap();
        assert!(averages.policy_loss.is_finite());
        assert!(averages.q1_loss.is_finite());
        assert!(averages.mean_reward.is_finite());
    }

    #[test]
    fn preview_elides_long_text() {
        let (len, short) = preview("short", 10, 10);
        assert_eq!((len, short.as_str()), (5, "short"));

        let long: String = "x".repeat(50);
        let (len, elided) = preview(&long, 10, 10);
        assert_eq!(len, 50);
        assert_eq!(elided.len(), 23);
        assert!(elided.contains("..."));
    }
}
