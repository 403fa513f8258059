//! Hand-maintained corrections for fragments the table extraction splits or merges wrongly.
//!
//! The tables live in a YAML file so that new corrections do not touch the tokenizer. The
//! built-in table is `lexicon.yml` next to this module; a replacement can be loaded from disk.

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

static BUILTIN: &str = include_str!("lexicon.yml");

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pattern {
    Exact(String),
    Prefix(String),
}

impl Pattern {
    fn matches(&self, fragment: &str) -> bool {
        match self {
            Pattern::Exact(exact) => fragment == exact,
            Pattern::Prefix(prefix) => fragment.starts_with(prefix.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SplitRule {
    pattern: Pattern,
    /// Character offsets, strictly ascending.
    at: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct RawSplitRule {
    exact: Option<String>,
    prefix: Option<String>,
    at: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct RawLexicon {
    #[serde(default)]
    split: Vec<RawSplitRule>,
    #[serde(default)]
    shrink: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lexicon {
    split: Vec<SplitRule>,
    /// Longest runs first, so that the greedy match prefers them.
    shrink: Vec<Vec<String>>,
}

impl Lexicon {
    pub fn builtin() -> Result<Self> {
        Self::from_yaml(BUILTIN).context("parsing built-in lexicon")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let yaml = fs::read_to_string(path)
            .with_context(|| format!("reading lexicon {}", path.display()))?;
        Self::from_yaml(&yaml).with_context(|| format!("parsing lexicon {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: RawLexicon = serde_yaml::from_str(yaml)?;
        let mut split = Vec::with_capacity(raw.split.len());
        for rule in raw.split {
            let pattern = match (rule.exact, rule.prefix) {
                (Some(exact), None) => Pattern::Exact(exact),
                (None, Some(prefix)) => Pattern::Prefix(prefix),
                _ => bail!("split rule needs exactly one of `exact` and `prefix`"),
            };
            if rule.at.is_empty() || rule.at.windows(2).any(|pair| pair[0] >= pair[1]) {
                bail!("split offsets of {pattern:?} must be ascending and non-empty");
            }
            split.push(SplitRule {
                pattern,
                at: rule.at,
            });
        }
        let mut shrink = raw.shrink;
        if let Some(run) = shrink.iter().find(|run| run.len() < 2) {
            bail!("shrink run {run:?} must have at least two fragments");
        }
        shrink.sort_by(|a, b| b.len().cmp(&a.len()));
        Ok(Self { split, shrink })
    }

    /// Cut a fragment at the offsets of the first matching split rule.
    pub fn split(&self, fragment: String) -> Vec<String> {
        let Some(rule) = self
            .split
            .iter()
            .find(|rule| rule.pattern.matches(&fragment))
        else {
            return vec![fragment];
        };
        let chars: Vec<char> = fragment.chars().collect();
        let mut pieces = Vec::with_capacity(rule.at.len() + 1);
        let mut start = 0;
        for &offset in &rule.at {
            let end = offset.min(chars.len());
            pieces.push(chars[start..end].iter().collect());
            start = end;
        }
        pieces.push(chars[start..].iter().collect());
        pieces
    }

    /// Glue known runs of fragments back together, scanning left to right.
    pub fn shrink(&self, fragments: Vec<String>) -> Vec<String> {
        if self.shrink.is_empty() {
            return fragments;
        }
        let mut shrunk = Vec::with_capacity(fragments.len());
        let mut i = 0;
        while i < fragments.len() {
            let rest = &fragments[i..];
            match self.shrink.iter().find(|run| rest.starts_with(run)) {
                Some(run) => {
                    shrunk.push(run.concat());
                    i += run.len();
                }
                None => {
                    shrunk.push(fragments[i].clone());
                    i += 1;
                }
            }
        }
        shrunk
    }
}
