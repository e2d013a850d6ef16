//! Chapter-sequencing environment emitting text observations

use std::collections::HashSet;

use anyhow::{ensure, Result};

use crate::env::{Action, Observation, Transition};
use crate::reward::{self, QualityReport, QualityWeights};

/// Separator between chapters in prepared article files.
pub const SEGMENT_SEPARATOR: &str = "[----------------------------------------------------->";

/// Split an article into chapter segments.
///
/// Uses the explicit segment separator when present, otherwise falls back to
/// blank-line paragraphs. Empty segments are dropped.
pub fn split_segments(text: &str) -> Vec<String> {
    let raw: Vec<&str> = if text.contains(SEGMENT_SEPARATOR) {
        text.split(SEGMENT_SEPARATOR).collect()
    } else {
        text.split("\n\n").collect()
    };
    raw.iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Environment that walks through an article's chapters, scoring each
/// generated summary against the current chapter.
///
/// Each round is one traversal of all chapters. The accumulated summary is
/// *replaced* by each step's action text rather than appended; the policy is
/// expected to rewrite its running summary every step. Stepping after the
/// final chapter is caller error; the trainer resets between rounds.
#[derive(Debug, Clone)]
pub struct ArticleEnv {
    chapters: Vec<String>,
    cursor: usize,
    current_summary: String,
    last_report: Option<QualityReport>,
    allowed_chars: HashSet<char>,
    weights: QualityWeights,
}

impl ArticleEnv {
    pub fn new(
        chapters: Vec<String>,
        allowed_chars: HashSet<char>,
        weights: QualityWeights,
    ) -> Result<Self> {
        ensure!(
            !chapters.is_empty(),
            "the environment requires at least one chapter"
        );
        Ok(Self {
            chapters,
            cursor: 0,
            current_summary: String::new(),
            last_report: None,
            allowed_chars,
            weights,
        })
    }

    /// Number of steps in one round.
    pub fn segment_count(&self) -> usize {
        self.chapters.len()
    }

    pub fn chapters(&self) -> &[String] {
        &self.chapters
    }

    /// Rewind to the first chapter and clear the accumulated summary.
    pub fn reset(&mut self) -> Observation {
        self.cursor = 0;
        self.current_summary.clear();
        self.last_report = None;
        Observation {
            previous_summary: String::new(),
            chapter_text: self.chapters[0].clone(),
            step_index: 1,
        }
    }

    /// Score the action against the current chapter and advance the cursor.
    pub fn step(&mut self, action: &Action) -> Transition {
        let state = Observation {
            previous_summary: self.current_summary.clone(),
            chapter_text: self.chapters[self.cursor].clone(),
            step_index: self.cursor + 1,
        };

        let report = reward::analyze(
            &action.text,
            &state.chapter_text,
            &self.allowed_chars,
            &self.weights,
        );
        self.last_report = Some(report);

        self.current_summary = action.text.clone();
        self.cursor += 1;
        let done = self.cursor >= self.chapters.len();

        let next_state = Observation {
            previous_summary: self.current_summary.clone(),
            chapter_text: if done {
                String::new()
            } else {
                self.chapters[self.cursor].clone()
            },
            step_index: self.cursor + 1,
        };

        Transition {
            state,
            action: action.clone(),
            reward: report.reward,
            next_state,
            done,
        }
    }

    /// Quality metrics from the most recent step.
    pub fn last_report(&self) -> Option<QualityReport> {
        self.last_report
    }

    pub fn weights(&self) -> &QualityWeights {
        &self.weights
    }

    pub fn allowed_chars(&self) -> &HashSet<char> {
        &self.allowed_chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(chapters: &[&str]) -> ArticleEnv {
        let allowed: HashSet<char> = chapters.iter().flat_map(|c| c.chars()).collect();
        ArticleEnv::new(
            chapters.iter().map(|s| s.to_string()).collect(),
            allowed,
            QualityWeights::default(),
        )
        .unwrap()
    }

    fn action(text: &str) -> Action {
        Action {
            token_ids: vec![1, 2],
            text: text.to_string(),
            length: text.chars().count(),
        }
    }

    #[test]
    fn rejects_empty_chapter_list() {
        assert!(ArticleEnv::new(
            Vec::new(),
            HashSet::new(),
            QualityWeights::default()
        )
        .is_err());
    }

    #[test]
    fn reset_returns_first_chapter() {
        let mut env = env(&["one", "two"]);
        let obs = env.reset();
        assert_eq!(obs.chapter_text, "one");
        assert_eq!(obs.step_index, 1);
        assert!(obs.previous_summary.is_empty());
    }

    #[test]
    fn summary_is_replaced_not_appended() {
        let mut env = env(&["one", "two", "three"]);
        env.reset();
        env.step(&action("first"));
        let transition = env.step(&action("second"));

        assert_eq!(transition.state.previous_summary, "first");
        assert_eq!(transition.next_state.previous_summary, "second");
    }

    #[test]
    fn terminal_transition_has_empty_next_chapter() {
        let mut env = env(&["one", "two"]);
        env.reset();
        let t1 = env.step(&action("a"));
        assert!(!t1.done);
        assert_eq!(t1.next_state.chapter_text, "two");

        let t2 = env.step(&action("b"));
        assert!(t2.done);
        assert!(t2.next_state.chapter_text.is_empty());
    }

    #[test]
    fn reward_scored_against_current_chapter() {
        let mut env = env(&["abcabc", "zzz"]);
        env.reset();
        let transition = env.step(&action("abc"));
        let report = env.last_report().unwrap();

        assert!((report.coverage_ratio - 0.5).abs() < 1e-6);
        assert!((transition.reward - report.reward).abs() < 1e-6);
    }

    #[test]
    fn reset_clears_state_between_rounds() {
        let mut env = env(&["one", "two"]);
        env.reset();
        env.step(&action("a"));
        env.step(&action("b"));

        let obs = env.reset();
        assert!(obs.previous_summary.is_empty());
        assert_eq!(obs.chapter_text, "one");
        assert!(env.last_report().is_none());
    }

    #[test]
    fn split_on_separator_and_blank_lines() {
        let with_sep = format!("alpha{SEGMENT_SEPARATOR}beta{SEGMENT_SEPARATOR}  ");
        assert_eq!(split_segments(&with_sep), vec!["alpha", "beta"]);

        let plain = "alpha\n\nbeta\n\n\n\ngamma";
        assert_eq!(split_segments(plain), vec!["alpha", "beta", "gamma"]);
    }
}
