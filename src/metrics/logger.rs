//! Logging backends for training metrics.
//!
//! The trainer emits three kinds of records: per-step quality metrics,
//! per-round aggregates, and per-update losses. Loggers decide where they go.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::reward::QualityReport;

/// Per-step metrics for one environment interaction.
#[derive(Debug, Clone)]
pub struct StepSnapshot {
    /// Training round (one traversal of all chapters).
    pub round: usize,
    /// 1-based step within the round.
    pub step: usize,
    /// Monotonic step counter across rounds.
    pub global_step: usize,
    pub reward: f32,
    /// Length of the accumulated summary before this step.
    pub previous_summary_length: usize,
    pub chapter_length: usize,
    pub summary_length: usize,
    pub length_ratio: f32,
    pub similarity: f32,
    pub coverage_ratio: f32,
    pub novelty_ratio: f32,
    pub garbled_ratio: f32,
    /// The unweighted garbling term entering the reward; equals
    /// `garbled_ratio`. The penalty weight is applied only in the reward sum.
    pub garbled_penalty: f32,
    pub unk_char_ratio: f32,
    pub disallowed_char_ratio: f32,
    pub control_char_ratio: f32,
}

impl StepSnapshot {
    pub fn from_report(
        round: usize,
        step: usize,
        global_step: usize,
        previous_summary_length: usize,
        report: &QualityReport,
    ) -> Self {
        Self {
            round,
            step,
            global_step,
            reward: report.reward,
            previous_summary_length,
            chapter_length: report.chapter_length,
            summary_length: report.summary_length,
            length_ratio: report.length_ratio,
            similarity: report.similarity,
            coverage_ratio: report.coverage_ratio,
            novelty_ratio: report.novelty_ratio,
            garbled_ratio: report.garbled_ratio,
            garbled_penalty: report.garbled_ratio,
            unk_char_ratio: report.unk_char_ratio,
            disallowed_char_ratio: report.disallowed_char_ratio,
            control_char_ratio: report.control_char_ratio,
        }
    }
}

/// Per-round aggregate metrics.
#[derive(Debug, Clone, Copy)]
pub struct RoundSnapshot {
    pub round: usize,
    /// Environment steps taken in the round.
    pub steps: usize,
    pub total_reward: f32,
    pub average_reward: f32,
}

/// Losses from one agent update.
#[derive(Debug, Clone, Copy)]
pub struct UpdateSnapshot {
    pub round: usize,
    /// 1-based index within the round's post-round update burst.
    pub update: usize,
    pub policy_loss: f32,
    pub q1_loss: f32,
    pub q2_loss: f32,
    pub mean_reward: f32,
}

/// Logger trait for different logging backends.
pub trait MetricsLogger {
    fn log_step(&mut self, snapshot: &StepSnapshot);

    fn log_round(&mut self, snapshot: &RoundSnapshot);

    fn log_update(&mut self, snapshot: &UpdateSnapshot);

    /// Flush any buffered output.
    fn flush(&mut self);
}

/// Structured-log backend built on `tracing`.
pub struct ConsoleLogger;

impl MetricsLogger for ConsoleLogger {
    fn log_step(&mut self, snapshot: &StepSnapshot) {
        tracing::info!(
            round = snapshot.round,
            step = snapshot.step,
            global_step = snapshot.global_step,
            reward = snapshot.reward,
            similarity = snapshot.similarity,
            coverage = snapshot.coverage_ratio,
            novelty = snapshot.novelty_ratio,
            garbled = snapshot.garbled_ratio,
            summary_length = snapshot.summary_length,
            "step"
        );
    }

    fn log_round(&mut self, snapshot: &RoundSnapshot) {
        tracing::info!(
            round = snapshot.round,
            steps = snapshot.steps,
            total_reward = snapshot.total_reward,
            average_reward = snapshot.average_reward,
            "round complete"
        );
    }

    fn log_update(&mut self, snapshot: &UpdateSnapshot) {
        tracing::info!(
            round = snapshot.round,
            update = snapshot.update,
            policy_loss = snapshot.policy_loss,
            q1_loss = snapshot.q1_loss,
            q2_loss = snapshot.q2_loss,
            mean_reward = snapshot.mean_reward,
            "agent update"
        );
    }

    fn flush(&mut self) {}
}

const STEP_CSV_HEADER: &str = "round,step,global_step,reward,previous_summary_length,\
chapter_length,summary_length,length_ratio,similarity,coverage_ratio,novelty_ratio,\
garbled_ratio,garbled_penalty,unk_char_ratio,disallowed_char_ratio,control_char_ratio";

const ROUND_CSV_HEADER: &str = "round,steps,total_reward,average_reward";

/// CSV file logger for offline analysis.
///
/// Writes step metrics to `step_metrics.csv` and round aggregates to
/// `round_metrics.csv` under the given directory. Update losses only go to
/// structured logs.
pub struct CsvLogger {
    step_writer: BufWriter<File>,
    round_writer: BufWriter<File>,
}

impl CsvLogger {
    pub fn new(out_dir: impl AsRef<Path>) -> Result<Self> {
        let out_dir = out_dir.as_ref();
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("failed to create {}", out_dir.display()))?;

        let mut step_writer = BufWriter::new(
            File::create(out_dir.join("step_metrics.csv")).context("failed to create step csv")?,
        );
        let mut round_writer = BufWriter::new(
            File::create(out_dir.join("round_metrics.csv"))
                .context("failed to create round csv")?,
        );
        writeln!(step_writer, "{STEP_CSV_HEADER}")?;
        writeln!(round_writer, "{ROUND_CSV_HEADER}")?;

        Ok(Self {
            step_writer,
            round_writer,
        })
    }
}

impl MetricsLogger for CsvLogger {
    fn log_step(&mut self, snapshot: &StepSnapshot) {
        let _ = writeln!(
            self.step_writer,
            "{},{},{},{:.4},{},{},{},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4},{:.4}",
            snapshot.round,
            snapshot.step,
            snapshot.global_step,
            snapshot.reward,
            snapshot.previous_summary_length,
            snapshot.chapter_length,
            snapshot.summary_length,
            snapshot.length_ratio,
            snapshot.similarity,
            snapshot.coverage_ratio,
            snapshot.novelty_ratio,
            snapshot.garbled_ratio,
            snapshot.garbled_penalty,
            snapshot.unk_char_ratio,
            snapshot.disallowed_char_ratio,
            snapshot.control_char_ratio,
        );
    }

    fn log_round(&mut self, snapshot: &RoundSnapshot) {
        let _ = writeln!(
            self.round_writer,
            "{},{},{:.4},{:.4}",
            snapshot.round, snapshot.steps, snapshot.total_reward, snapshot.average_reward,
        );
    }

    fn log_update(&mut self, _snapshot: &UpdateSnapshot) {}

    fn flush(&mut self) {
        let _ = self.step_writer.flush();
        let _ = self.round_writer.flush();
    }
}

impl Drop for CsvLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Multi-logger that fans out to multiple backends.
#[derive(Default)]
pub struct MultiLogger {
    loggers: Vec<Box<dyn MetricsLogger>>,
}

impl MultiLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<L: MetricsLogger + 'static>(mut self, logger: L) -> Self {
        self.loggers.push(Box::new(logger));
        self
    }
}

impl MetricsLogger for MultiLogger {
    fn log_step(&mut self, snapshot: &StepSnapshot) {
        for logger in &mut self.loggers {
            logger.log_step(snapshot);
        }
    }

    fn log_round(&mut self, snapshot: &RoundSnapshot) {
        for logger in &mut self.loggers {
            logger.log_round(snapshot);
        }
    }

    fn log_update(&mut self, snapshot: &UpdateSnapshot) {
        for logger in &mut self.loggers {
            logger.log_update(snapshot);
        }
    }

    fn flush(&mut self) {
        for logger in &mut self.loggers {
            logger.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(round: usize, step: usize) -> StepSnapshot {
        StepSnapshot::from_report(round, step, step, 0, &QualityReport::default())
    }

    #[test]
    fn garbled_penalty_mirrors_the_unweighted_ratio() {
        let report = QualityReport {
            garbled_ratio: 0.25,
            ..QualityReport::default()
        };
        let snapshot = StepSnapshot::from_report(1, 1, 1, 0, &report);
        assert_eq!(snapshot.garbled_penalty, report.garbled_ratio);
    }

    #[test]
    fn csv_logger_writes_headers_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = CsvLogger::new(dir.path()).unwrap();

        logger.log_step(&step(1, 1));
        logger.log_round(&RoundSnapshot {
            round: 1,
            steps: 1,
            total_reward: 0.5,
            average_reward: 0.5,
        });
        logger.flush();

        let steps = std::fs::read_to_string(dir.path().join("step_metrics.csv")).unwrap();
        let mut lines = steps.lines();
        assert!(lines.next().unwrap().starts_with("round,step,global_step,reward"));
        assert!(lines.next().unwrap().starts_with("1,1,1,"));

        let rounds = std::fs::read_to_string(dir.path().join("round_metrics.csv")).unwrap();
        assert_eq!(rounds.lines().count(), 2);
        assert!(rounds.contains("1,1,0.5000,0.5000"));
    }

    #[test]
    fn multi_logger_fans_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut multi = MultiLogger::new()
            .add(ConsoleLogger)
            .add(CsvLogger::new(dir.path()).unwrap());

        multi.log_step(&step(1, 1));
        multi.flush();

        let steps = std::fs::read_to_string(dir.path().join("step_metrics.csv")).unwrap();
        assert_eq!(steps.lines().count(), 2);
    }
}
