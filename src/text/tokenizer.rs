//! Character-level tokenizer shared by the policy and critic networks

use std::collections::{HashMap, HashSet};

use anyhow::{ensure, Result};
use burn::prelude::*;
use burn::tensor::TensorData;

use crate::env::Observation;

/// Character-level tokenizer with reserved control tokens.
///
/// The vocabulary is `[<pad>, <bos>, <eos>, <sep>, <unk>]` followed by the
/// sorted set of characters seen in the corpus. Padding always maps to id 0
/// so the networks can mask it.
#[derive(Debug, Clone)]
pub struct CharTokenizer {
    vocab: Vec<String>,
    stoi: HashMap<char, usize>,
    itos: HashMap<usize, char>,
    allowed_chars: HashSet<char>,
}

pub const PAD: &str = "<pad>";
pub const BOS: &str = "<bos>";
pub const EOS: &str = "<eos>";
pub const SEP: &str = "<sep>";
pub const UNK: &str = "<unk>";

impl CharTokenizer {
    /// Build a vocabulary from the given corpus texts.
    pub fn new<S: AsRef<str>>(texts: &[S]) -> Self {
        let mut charset: Vec<char> = texts
            .iter()
            .flat_map(|t| t.as_ref().chars())
            .collect::<HashSet<char>>()
            .into_iter()
            .collect();
        charset.sort_unstable();

        let mut vocab: Vec<String> = [PAD, BOS, EOS, SEP, UNK]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let special_count = vocab.len();
        vocab.extend(charset.iter().map(|c| c.to_string()));

        let mut stoi = HashMap::new();
        let mut itos = HashMap::new();
        for (offset, &ch) in charset.iter().enumerate() {
            stoi.insert(ch, special_count + offset);
            itos.insert(special_count + offset, ch);
        }

        Self {
            vocab,
            stoi,
            itos,
            allowed_chars: charset.into_iter().collect(),
        }
    }

    pub fn pad_id(&self) -> usize {
        0
    }

    pub fn bos_id(&self) -> usize {
        1
    }

    pub fn eos_id(&self) -> usize {
        2
    }

    pub fn sep_id(&self) -> usize {
        3
    }

    pub fn unk_id(&self) -> usize {
        4
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Characters the reward model treats as valid output.
    pub fn allowed_chars(&self) -> &HashSet<char> {
        &self.allowed_chars
    }

    fn encode_chars<'a>(&'a self, text: &'a str) -> impl Iterator<Item = usize> + 'a {
        text.chars()
            .map(|ch| self.stoi.get(&ch).copied().unwrap_or(self.unk_id()))
    }

    /// Encode an observation as `<bos> summary <sep> chapter <eos>`.
    pub fn encode_observation(&self, observation: &Observation) -> Vec<usize> {
        let mut tokens = vec![self.bos_id()];
        tokens.extend(self.encode_chars(&observation.previous_summary));
        tokens.push(self.sep_id());
        tokens.extend(self.encode_chars(&observation.chapter_text));
        tokens.push(self.eos_id());
        tokens
    }

    /// Encode action text as `<bos> text <eos>`.
    pub fn encode_action_text(&self, text: &str) -> Vec<usize> {
        let mut tokens = vec![self.bos_id()];
        tokens.extend(self.encode_chars(text));
        tokens.push(self.eos_id());
        tokens
    }

    /// Decode token ids to text, truncating at the first end-of-sequence
    /// token and skipping structural tokens. Unknown tokens decode to the
    /// literal `<unk>` marker so downstream quality checks can count them.
    pub fn decode(&self, token_ids: &[usize]) -> String {
        let mut decoded = String::new();
        for &id in token_ids {
            if id == self.eos_id() {
                break;
            }
            if id == self.bos_id() || id == self.pad_id() || id == self.sep_id() {
                continue;
            }
            if id == self.unk_id() {
                decoded.push_str(UNK);
            } else if let Some(&ch) = self.itos.get(&id) {
                decoded.push(ch);
            }
        }
        decoded
    }

    /// Pad a batch of sequences into `(tokens, lengths)` integer tensors.
    ///
    /// A batch operation requires at least one sequence.
    pub fn batch_encode<B: Backend>(
        &self,
        sequences: &[Vec<usize>],
        device: &B::Device,
    ) -> Result<(Tensor<B, 2, Int>, Tensor<B, 1, Int>)> {
        ensure!(
            !sequences.is_empty(),
            "cannot encode an empty batch of sequences"
        );
        let max_length = sequences.iter().map(Vec::len).max().unwrap_or(0).max(1);
        let rows = sequences.len();

        let mut flat = vec![self.pad_id() as i64; rows * max_length];
        let mut lengths = Vec::with_capacity(rows);
        for (row, seq) in sequences.iter().enumerate() {
            for (col, &id) in seq.iter().enumerate() {
                flat[row * max_length + col] = id as i64;
            }
            lengths.push(seq.len().max(1) as i64);
        }

        let tokens = Tensor::from_data(TensorData::new(flat, [rows, max_length]), device);
        let lengths = Tensor::from_data(TensorData::new(lengths, [rows]), device);
        Ok((tokens, lengths))
    }
}
