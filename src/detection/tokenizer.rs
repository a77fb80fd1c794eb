use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::Path;

const CLS: &str = "[CLS]";
const SEP: &str = "[SEP]";
const UNK: &str = "[UNK]";
const PHRASE_SEPARATOR: &str = ".";

/// Longest word WordPiece will try to split before giving up with [UNK].
const MAX_CHARS_PER_WORD: usize = 100;

/// Tokenized detection prompt.
///
/// `phrase_index[i]` names the vocabulary phrase that produced token `i`;
/// special tokens and separators map to `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPrompt {
    pub input_ids: Vec<i64>,
    pub phrase_index: Vec<Option<usize>>,
}

impl EncodedPrompt {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}

/// Lowercasing BERT WordPiece tokenizer, enough to build Grounding DINO prompts.
///
/// Only ASCII punctuation splits words, and accents are kept rather than
/// stripped. Labels with accented letters or non-ASCII punctuation can
/// therefore tokenize differently from the reference BERT-uncased tokenizer,
/// usually ending up as `[UNK]`.
#[derive(Debug, Clone)]
pub struct WordPieceTokenizer {
    vocab: HashMap<String, i64>,
    cls_id: i64,
    sep_id: i64,
    unk_id: i64,
    separator_id: i64,
}

impl WordPieceTokenizer {
    /// Load a `vocab.txt` (one token per line, id = line number).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Loading tokenizer vocabulary from {}", path.display());

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read vocabulary from {}", path.display()))?;
        Self::from_tokens(text.lines())
    }

    pub fn from_tokens<I, S>(tokens: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let vocab: HashMap<String, i64> = tokens
            .into_iter()
            .enumerate()
            .map(|(id, token)| (token.as_ref().trim_end().to_string(), id as i64))
            .collect();

        let lookup = |token: &str| {
            vocab
                .get(token)
                .copied()
                .with_context(|| format!("vocabulary has no {token} token"))
        };

        Ok(Self {
            cls_id: lookup(CLS)?,
            sep_id: lookup(SEP)?,
            unk_id: lookup(UNK)?,
            separator_id: lookup(PHRASE_SEPARATOR)?,
            vocab,
        })
    }

    /// Encode phrases as `[CLS] p1 . p2 . ... pn . [SEP]`, capped at `max_len`.
    pub fn encode_prompt(&self, phrases: &[String], max_len: usize) -> Result<EncodedPrompt> {
        let mut input_ids = vec![self.cls_id];
        let mut phrase_index = vec![None];

        for (index, phrase) in phrases.iter().enumerate() {
            let pieces = self.tokenize(phrase);
            if pieces.is_empty() {
                bail!("label phrase {:?} produced no tokens", phrase);
            }
            phrase_index.extend(std::iter::repeat(Some(index)).take(pieces.len()));
            input_ids.extend(pieces);

            input_ids.push(self.separator_id);
            phrase_index.push(None);
        }

        input_ids.push(self.sep_id);
        phrase_index.push(None);

        if input_ids.len() > max_len {
            bail!(
                "prompt is {} tokens, model accepts at most {}",
                input_ids.len(),
                max_len
            );
        }

        Ok(EncodedPrompt {
            input_ids,
            phrase_index,
        })
    }

    /// Token ids for free text: lowercase, split on whitespace and
    /// punctuation, then greedy longest-match WordPiece.
    pub fn tokenize(&self, text: &str) -> Vec<i64> {
        basic_split(&text.to_lowercase())
            .iter()
            .flat_map(|word| self.word_pieces(word))
            .collect()
    }

    fn word_pieces(&self, word: &str) -> Vec<i64> {
        let chars: Vec<char> = word.chars().collect();
        if chars.len() > MAX_CHARS_PER_WORD {
            return vec![self.unk_id];
        }

        let mut pieces = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let mut end = chars.len();
            let mut found = None;
            while start < end {
                let mut candidate: String = chars[start..end].iter().collect();
                if start > 0 {
                    candidate.insert_str(0, "##");
                }
                if let Some(&id) = self.vocab.get(&candidate) {
                    found = Some(id);
                    break;
                }
                end -= 1;
            }
            match found {
                Some(id) => pieces.push(id),
                None => return vec![self.unk_id],
            }
            start = end;
        }
        pieces
    }
}

/// Whitespace split with every ASCII punctuation character as its own word.
fn basic_split(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    for chunk in text.split_whitespace() {
        let mut current = String::new();
        for c in chunk.chars() {
            if c.is_ascii_punctuation() {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
                words.push(c.to_string());
            } else {
                current.push(c);
            }
        }
        if !current.is_empty() {
            words.push(current);
        }
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenizer() -> WordPieceTokenizer {
        WordPieceTokenizer::from_tokens([
            "[PAD]", "[UNK]", "[CLS]", "[SEP]", ".", "-", "shirt", "t", "jean", "##s", "coat",
            "hood", "##ie",
        ])
        .unwrap()
    }

    #[test]
    fn requires_special_tokens() {
        assert!(WordPieceTokenizer::from_tokens(["[CLS]", "[SEP]", "."]).is_err());
    }

    #[test]
    fn splits_punctuation_and_subwords() {
        let tok = tokenizer();
        assert_eq!(tok.tokenize("T-Shirt"), vec![7, 5, 6]);
        assert_eq!(tok.tokenize("jeans"), vec![8, 9]);
        assert_eq!(tok.tokenize("hoodie"), vec![11, 12]);
        assert_eq!(tok.tokenize("scarf"), vec![1]);
    }

    #[test]
    fn accents_and_unicode_punctuation_are_not_normalized() {
        let tok = tokenizer();
        // no accent folding: "coát" is not "coat"
        assert_eq!(tok.tokenize("Coát"), vec![1]);
        // an en dash stays inside the word
        assert_eq!(tok.tokenize("t\u{2013}shirt"), vec![1]);
        assert_eq!(tok.tokenize("t-shirt"), vec![7, 5, 6]);
    }

    #[test]
    fn prompt_tracks_phrase_ownership() {
        let tok = tokenizer();
        let phrases = vec!["coat".to_string(), "jeans".to_string()];
        let prompt = tok.encode_prompt(&phrases, 256).unwrap();

        assert_eq!(prompt.input_ids, vec![2, 10, 4, 8, 9, 4, 3]);
        assert_eq!(
            prompt.phrase_index,
            vec![None, Some(0), None, Some(1), Some(1), None, None]
        );
    }

    #[test]
    fn prompt_respects_max_length() {
        let tok = tokenizer();
        let phrases = vec!["coat".to_string(); 10];
        assert!(tok.encode_prompt(&phrases, 8).is_err());
    }

    #[test]
    fn blank_phrase_is_rejected() {
        let tok = tokenizer();
        assert!(tok.encode_prompt(&["  ".to_string()], 256).is_err());
    }
}
