//! Propositional conflict matching
//!
//! A lightweight matcher for the two conflict shapes the engines act on:
//!
//! - **Negation**: `"parse returns None"` vs `"parse does not return None"`
//! - **Conflicting value**: `"function X returns A"` vs `"function X returns B"`
//!
//! Propositions are lowercased, contractions expanded, trailing punctuation
//! dropped, negation markers removed (tracking polarity) and words crudely
//! stemmed so `returns`/`return` compare equal.

/// Kind of conflict found between two propositions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// Same core statement with opposite polarity
    Negation,
    /// Same subject and predicate, different value
    ConflictingValue {
        /// Value asserted by the first proposition
        left: String,
        /// Value asserted by the second proposition
        right: String,
    },
}

/// A proposition reduced to comparable form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Stemmed tokens with negation markers removed
    pub tokens: Vec<String>,
    /// Whether an odd number of negations was removed
    pub negated: bool,
}

impl Normalized {
    /// Tokens joined by single spaces
    pub fn core(&self) -> String {
        self.tokens.join(" ")
    }
}

const AUXILIARIES: [&str; 3] = ["do", "does", "did"];
const COPULAS: [&str; 12] = [
    "return", "is", "are", "equal", "throw", "raise", "contain", "call", "use", "yield", "==", "=",
];

fn expand_contractions(text: &str) -> String {
    text.replace("can't", "can not")
        .replace("cannot", "can not")
        .replace("won't", "will not")
        .replace("n't", " not")
}

fn stem(word: &str) -> String {
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        word[..word.len() - 1].to_string()
    } else {
        word.to_string()
    }
}

/// Reduce a proposition to tokens and polarity
pub fn normalize(text: &str) -> Normalized {
    let lowered = expand_contractions(&text.to_lowercase());
    let raw: Vec<&str> = lowered
        .split_whitespace()
        .map(|w| w.trim_end_matches(['.', ',', ';', '!', '?']))
        .filter(|w| !w.is_empty())
        .collect();

    let mut tokens = Vec::with_capacity(raw.len());
    let mut negated = false;
    let mut i = 0;
    while i < raw.len() {
        let word = raw[i];
        let next = raw.get(i + 1).copied();
        if AUXILIARIES.contains(&word) && next == Some("not") {
            negated = !negated;
            i += 2;
            continue;
        }
        if word == "no" && next == Some("longer") {
            negated = !negated;
            i += 2;
            continue;
        }
        if word == "not" || word == "never" {
            negated = !negated;
            i += 1;
            continue;
        }
        tokens.push(stem(word));
        i += 1;
    }

    Normalized { tokens, negated }
}

fn split_on_copula(tokens: &[String]) -> Option<(String, &str, String)> {
    let position = tokens
        .iter()
        .position(|t| COPULAS.contains(&t.as_str()))?;
    if position == 0 || position + 1 >= tokens.len() {
        return None;
    }
    Some((
        tokens[..position].join(" "),
        tokens[position].as_str(),
        tokens[position + 1..].join(" "),
    ))
}

/// Decide whether two propositions conflict
///
/// Identical propositions never conflict; a negated proposition only
/// conflicts with its positive counterpart, not with other values.
pub fn conflict(a: &str, b: &str) -> Option<Conflict> {
    let left = normalize(a);
    let right = normalize(b);

    if left.tokens.is_empty() || right.tokens.is_empty() {
        return None;
    }

    if left.tokens == right.tokens {
        return (left.negated != right.negated).then_some(Conflict::Negation);
    }

    if left.negated || right.negated {
        return None;
    }

    let (head_a, copula_a, value_a) = split_on_copula(&left.tokens)?;
    let (head_b, copula_b, value_b) = split_on_copula(&right.tokens)?;
    if head_a == head_b && copula_a == copula_b && value_a != value_b {
        return Some(Conflict::ConflictingValue {
            left: value_a,
            right: value_b,
        });
    }
    None
}
