//! Summary quality analysis and reward computation
//!
//! The reward model is a pure function from (generated summary, source
//! chapter) to a scalar reward plus auxiliary quality metrics. It combines a
//! character-level alignment between the two texts with a garbled-content
//! check against the tokenizer's allowed character set.

use std::collections::{HashMap, HashSet};

/// Control characters that are legitimate in generated prose.
const CONTROL_CHAR_WHITELIST: [char; 3] = ['\n', '\r', '\t'];

/// Placeholder emitted by the tokenizer for characters outside its vocabulary.
const UNK_MARKER: &str = "<unk>";

/// Weights combining the individual quality metrics into a scalar reward.
///
/// `reward = similarity·w_sim + coverage·w_cov + novelty·w_nov − garbled·w_garbled`
#[derive(Debug, Clone, Copy)]
pub struct QualityWeights {
    pub similarity: f32,
    pub coverage: f32,
    pub novelty: f32,
    pub garbled: f32,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            similarity: 0.6,
            coverage: 0.3,
            novelty: 0.1,
            garbled: 0.5,
        }
    }
}

/// Per-step quality metrics for one generated summary.
///
/// All ratio fields lie in `[0, 1]`. The per-rule garbling ratios
/// (`unk_char_ratio`, `disallowed_char_ratio`, `control_char_ratio`) may
/// overlap on the same characters, so they need not sum to `garbled_ratio`,
/// which counts the union of flagged positions.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityReport {
    pub summary_length: usize,
    pub chapter_length: usize,
    pub length_ratio: f32,
    pub similarity: f32,
    pub coverage_ratio: f32,
    pub copy_ratio: f32,
    pub novelty_ratio: f32,
    pub garbled_ratio: f32,
    pub unk_char_ratio: f32,
    pub disallowed_char_ratio: f32,
    pub control_char_ratio: f32,
    pub reward: f32,
}

/// Analyze a generated summary against its source chapter.
///
/// `allowed_chars` is the tokenizer's character set; any character outside it
/// counts as disallowed. Deterministic: identical inputs always produce
/// identical reports.
pub fn analyze(
    summary: &str,
    chapter: &str,
    allowed_chars: &HashSet<char>,
    weights: &QualityWeights,
) -> QualityReport {
    let summary_chars: Vec<char> = summary.chars().collect();
    let chapter_chars: Vec<char> = chapter.chars().collect();
    let summary_length = summary_chars.len();
    let chapter_length = chapter_chars.len();

    let blocks = matching_blocks(&summary_chars, &chapter_chars);
    let matched: usize = blocks.iter().map(|b| b.size).sum();
    let longest_block = blocks.iter().map(|b| b.size).max().unwrap_or(0);

    let total = summary_length + chapter_length;
    let similarity = if total == 0 {
        1.0
    } else {
        2.0 * matched as f32 / total as f32
    };
    let coverage_ratio = if chapter_length == 0 {
        0.0
    } else {
        matched as f32 / chapter_length as f32
    };
    let copy_ratio = if summary_length == 0 {
        0.0
    } else {
        longest_block as f32 / summary_length as f32
    };
    // An empty summary copies nothing, so it is not "novel" either.
    let novelty_ratio = if summary_length == 0 {
        0.0
    } else {
        (1.0 - copy_ratio).max(0.0)
    };

    let garbling = garbled_statistics(&summary_chars, allowed_chars);

    let reward = weights.similarity * similarity
        + weights.coverage * coverage_ratio
        + weights.novelty * novelty_ratio
        - weights.garbled * garbling.garbled_ratio;

    QualityReport {
        summary_length,
        chapter_length,
        length_ratio: if chapter_length == 0 {
            0.0
        } else {
            summary_length as f32 / chapter_length as f32
        },
        similarity,
        coverage_ratio,
        copy_ratio,
        novelty_ratio,
        garbled_ratio: garbling.garbled_ratio,
        unk_char_ratio: garbling.unk_char_ratio,
        disallowed_char_ratio: garbling.disallowed_char_ratio,
        control_char_ratio: garbling.control_char_ratio,
        reward,
    }
}

struct GarbledStats {
    garbled_ratio: f32,
    unk_char_ratio: f32,
    disallowed_char_ratio: f32,
    control_char_ratio: f32,
}

/// Flag invalid characters in the summary.
///
/// A position is garbled when any rule flags it: outside the allowed set,
/// a non-whitelisted control character, or part of an `<unk>` marker. The
/// union of flags defines `garbled_ratio`; the per-rule counters are reported
/// independently and may double-count positions.
fn garbled_statistics(summary: &[char], allowed_chars: &HashSet<char>) -> GarbledStats {
    let total = summary.len();
    if total == 0 {
        return GarbledStats {
            garbled_ratio: 0.0,
            unk_char_ratio: 0.0,
            disallowed_char_ratio: 0.0,
            control_char_ratio: 0.0,
        };
    }

    let mut invalid = vec![false; total];
    let mut disallowed = 0usize;
    let mut control = 0usize;

    for (idx, &ch) in summary.iter().enumerate() {
        let is_control = ch.is_control() && !CONTROL_CHAR_WHITELIST.contains(&ch);
        if !allowed_chars.contains(&ch) {
            disallowed += 1;
            invalid[idx] = true;
        }
        if is_control {
            control += 1;
            invalid[idx] = true;
        }
    }

    let marker: Vec<char> = UNK_MARKER.chars().collect();
    let mut unk_instances = 0usize;
    let mut start = 0usize;
    while start + marker.len() <= total {
        if summary[start..start + marker.len()] == marker[..] {
            unk_instances += 1;
            for flag in invalid.iter_mut().skip(start).take(marker.len()) {
                *flag = true;
            }
            start += marker.len();
        } else {
            start += 1;
        }
    }

    let garbled = invalid.iter().filter(|f| **f).count();
    GarbledStats {
        garbled_ratio: garbled as f32 / total as f32,
        unk_char_ratio: (unk_instances * marker.len()) as f32 / total as f32,
        disallowed_char_ratio: disallowed as f32 / total as f32,
        control_char_ratio: control as f32 / total as f32,
    }
}

/// One aligned block between the summary and the chapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchBlock {
    /// Start index in the summary.
    pub a: usize,
    /// Start index in the chapter.
    pub b: usize,
    /// Number of aligned characters.
    pub size: usize,
}

/// Compute the non-overlapping matching blocks between `a` and `b`.
///
/// Recursive longest-match decomposition: find the longest common substring,
/// then repeat on the pieces to its left and right. Ties prefer the earliest
/// position in `a`, then in `b`, so repeated source text matches its first
/// occurrence.
pub fn matching_blocks(a: &[char], b: &[char]) -> Vec<MatchBlock> {
    // Index of each character's positions in `b`.
    let mut b_index: HashMap<char, Vec<usize>> = HashMap::new();
    for (j, &ch) in b.iter().enumerate() {
        b_index.entry(ch).or_default().push(j);
    }

    let mut blocks = Vec::new();
    let mut queue = vec![(0usize, a.len(), 0usize, b.len())];
    while let Some((alo, ahi, blo, bhi)) = queue.pop() {
        let m = longest_match(a, &b_index, alo, ahi, blo, bhi);
        if m.size > 0 {
            if alo < m.a && blo < m.b {
                queue.push((alo, m.a, blo, m.b));
            }
            if m.a + m.size < ahi && m.b + m.size < bhi {
                queue.push((m.a + m.size, ahi, m.b + m.size, bhi));
            }
            blocks.push(m);
        }
    }

    // Merge adjacent blocks so block sizes reflect contiguous runs.
    blocks.sort_by_key(|m| (m.a, m.b));
    let mut merged: Vec<MatchBlock> = Vec::with_capacity(blocks.len());
    for block in blocks {
        match merged.last_mut() {
            Some(last) if last.a + last.size == block.a && last.b + last.size == block.b => {
                last.size += block.size;
            }
            _ => merged.push(block),
        }
    }
    merged
}

/// Longest common substring of `a[alo..ahi]` and `b[blo..bhi]`.
fn longest_match(
    a: &[char],
    b_index: &HashMap<char, Vec<usize>>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> MatchBlock {
    let mut best = MatchBlock {
        a: alo,
        b: blo,
        size: 0,
    };
    // j2len[j] = length of the longest match ending at a[i], b[j].
    let mut j2len: HashMap<usize, usize> = HashMap::new();
    for (i, &ch) in a.iter().enumerate().take(ahi).skip(alo) {
        let mut new_j2len: HashMap<usize, usize> = HashMap::new();
        if let Some(positions) = b_index.get(&ch) {
            for &j in positions {
                if j < blo {
                    continue;
                }
                if j >= bhi {
                    break;
                }
                let k = if j > 0 {
                    j2len.get(&(j - 1)).copied().unwrap_or(0) + 1
                } else {
                    1
                };
                new_j2len.insert(j, k);
                if k > best.size {
                    best = MatchBlock {
                        a: i + 1 - k,
                        b: j + 1 - k,
                        size: k,
                    };
                }
            }
        }
        j2len = new_j2len;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn charset(text: &str) -> HashSet<char> {
        text.chars().collect()
    }

    #[test]
    fn partial_copy_scenario() {
        let allowed = charset("abcabc");
        let report = analyze("abc", "abcabc", &allowed, &QualityWeights::default());

        // One contiguous block of 3 characters matched against the first
        // occurrence in the chapter.
        assert!((report.coverage_ratio - 0.5).abs() < 1e-6);
        assert!((report.copy_ratio - 1.0).abs() < 1e-6);
        assert!((report.novelty_ratio - 0.0).abs() < 1e-6);
        assert!((report.similarity - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn empty_summary_yields_zero_ratios() {
        let allowed = charset("hello world");
        let report = analyze("", "hello world", &allowed, &QualityWeights::default());

        assert_eq!(report.coverage_ratio, 0.0);
        assert_eq!(report.novelty_ratio, 0.0);
        assert_eq!(report.garbled_ratio, 0.0);
        assert_eq!(report.reward, 0.0);
    }

    #[test]
    fn empty_chapter_forces_zero_coverage() {
        let allowed = charset("xyz");
        let report = analyze("xyz", "", &allowed, &QualityWeights::default());

        assert_eq!(report.coverage_ratio, 0.0);
        assert_eq!(report.similarity, 0.0);
    }

    #[test]
    fn determinism() {
        let allowed = charset("the quick brown fox");
        let a = analyze(
            "quick fox",
            "the quick brown fox",
            &allowed,
            &QualityWeights::default(),
        );
        let b = analyze(
            "quick fox",
            "the quick brown fox",
            &allowed,
            &QualityWeights::default(),
        );
        assert_eq!(a.similarity, b.similarity);
        assert_eq!(a.coverage_ratio, b.coverage_ratio);
        assert_eq!(a.reward, b.reward);
    }

    #[test]
    fn ratios_stay_in_unit_interval() {
        let allowed = charset("abcdef ");
        let cases = [
            ("", ""),
            ("abc", "def"),
            ("a\u{0000}b", "ab"),
            ("<unk><unk>", "abcdef"),
            ("fedcba", "abcdef"),
        ];
        for (summary, chapter) in cases {
            let r = analyze(summary, chapter, &allowed, &QualityWeights::default());
            for value in [
                r.similarity,
                r.coverage_ratio,
                r.novelty_ratio,
                r.garbled_ratio,
            ] {
                assert!((0.0..=1.0).contains(&value), "{summary:?} vs {chapter:?}");
            }
        }
    }

    #[test]
    fn garbled_union_counts_overlap_once() {
        // `\u{0007}` is both a control character and outside the allowed set;
        // it must only be counted once in the union.
        let allowed = charset("ab");
        let report = analyze("a\u{0007}b", "ab", &allowed, &QualityWeights::default());

        assert!((report.garbled_ratio - 1.0 / 3.0).abs() < 1e-6);
        assert!((report.disallowed_char_ratio - 1.0 / 3.0).abs() < 1e-6);
        assert!((report.control_char_ratio - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn unk_marker_positions_are_flagged() {
        let mut allowed = charset("abk<un>");
        allowed.extend("abcdefghijklmnopqrstuvwxyz".chars());
        let report = analyze("ab<unk>ab", "abab", &allowed, &QualityWeights::default());

        // 5 of 9 characters belong to the marker.
        assert!((report.unk_char_ratio - 5.0 / 9.0).abs() < 1e-6);
        assert!(report.garbled_ratio >= report.unk_char_ratio - 1e-6);
    }

    #[test]
    fn matching_blocks_prefers_first_occurrence() {
        let a: Vec<char> = "abc".chars().collect();
        let b: Vec<char> = "abcabc".chars().collect();
        let blocks = matching_blocks(&a, &b);
        assert_eq!(blocks, vec![MatchBlock { a: 0, b: 0, size: 3 }]);
    }

    #[test]
    fn matching_blocks_merges_adjacent_runs() {
        let a: Vec<char> = "abxcd".chars().collect();
        let b: Vec<char> = "abcd".chars().collect();
        let blocks = matching_blocks(&a, &b);
        let total: usize = blocks.iter().map(|m| m.size).sum();
        assert_eq!(total, 4);
        assert_eq!(blocks.len(), 2);
    }
}
