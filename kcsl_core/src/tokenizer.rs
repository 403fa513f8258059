//! Splits the text of one table cell into menu items.
//!
//! A cell is normalized first and then fed through an ordered chain of passes. Every pass
//! maps one fragment to any number of fragments:
//!
//! 1. de-kerning: glue sub-lines of single glyphs back into words
//! 2. whitespace removal
//! 3. heading split: cut after `献立` or after a `…料理(…)` dish category
//! 4. lexicon split: known glued items from [`Lexicon`]
//! 5. empty removal
//!
//! Finally known runs of fragments are merged again with [`Lexicon::shrink`].

use encoding_rs::SHIFT_JIS;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_general_category::{get_general_category, GeneralCategory};

use crate::lexicon::Lexicon;

static HEADING_MARKER: &str = "献立";
static DISH_CATEGORY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.*料理(?:[(（][^()（）]*[)）])?").expect("valid dish category regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    DeKerning,
    RemoveWhitespace,
    SplitHeading,
    SplitLexicon,
    RemoveEmpty,
}

static PASSES: [Pass; 5] = [
    Pass::DeKerning,
    Pass::RemoveWhitespace,
    Pass::SplitHeading,
    Pass::SplitLexicon,
    Pass::RemoveEmpty,
];

/// Cell level clean-up shared by the tokenizer and the assembler.
///
/// The enclosing circle is replaced by a white circle, characters outside the Shift_JIS
/// repertoire are dropped and spaces are removed. Line breaks are kept.
pub fn normalize_cell(raw: &str) -> String {
    let replaced = raw.replace('\u{20dd}', "\u{25cb}");
    let mut bytes = Vec::with_capacity(replaced.len());
    let mut buffer = [0; 4];
    for c in replaced.chars() {
        let (encoded, _, unmappable) = SHIFT_JIS.encode(c.encode_utf8(&mut buffer));
        if !unmappable {
            bytes.extend_from_slice(&encoded);
        }
    }
    let (decoded, _) = SHIFT_JIS.decode_without_bom_handling(&bytes);
    decoded
        .chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '\r' | '\u{3000}'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Remove every kind of whitespace, line breaks included.
pub fn collapse_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

#[derive(Debug, Clone, Copy)]
pub struct CellTokenizer<'l> {
    lexicon: &'l Lexicon,
}

impl<'l> CellTokenizer<'l> {
    pub fn new(lexicon: &'l Lexicon) -> Self {
        Self { lexicon }
    }

    /// Lazily run all passes over a cell, leaving out its first `skip_lines` sub-lines.
    ///
    /// Every call starts from scratch, so the sequence can be walked again.
    pub fn fragments(
        &self,
        cell: &str,
        skip_lines: usize,
    ) -> Box<dyn Iterator<Item = String> + 'l> {
        let normalized = normalize_cell(cell);
        let body = normalized
            .split('\n')
            .skip(skip_lines)
            .collect::<Vec<_>>()
            .join("\n");
        let lexicon = self.lexicon;
        let start: Box<dyn Iterator<Item = String> + 'l> = Box::new(std::iter::once(body));
        PASSES.iter().fold(start, |fragments, &pass| {
            Box::new(fragments.flat_map(move |fragment| apply(lexicon, pass, fragment)))
        })
    }

    /// All fragments of a cell with the shrink corrections applied.
    pub fn tokenize(&self, cell: &str, skip_lines: usize) -> Vec<String> {
        self.lexicon.shrink(self.fragments(cell, skip_lines).collect())
    }
}

fn apply(lexicon: &Lexicon, pass: Pass, fragment: String) -> Vec<String> {
    match pass {
        Pass::DeKerning => de_kerning(&fragment),
        Pass::RemoveWhitespace => vec![collapse_whitespace(&fragment)],
        Pass::SplitHeading => split_heading(fragment),
        Pass::SplitLexicon => lexicon.split(fragment),
        Pass::RemoveEmpty if fragment.is_empty() => vec![],
        Pass::RemoveEmpty => vec![fragment],
    }
}

fn is_other_symbol(c: char) -> bool {
    get_general_category(c) == GeneralCategory::OtherSymbol
}

/// Narrow columns are laid out with one glyph per sub-line, e.g. `ご\nは\nん`.
///
/// Single glyph sub-lines are collected into one word. A sub-line made of a symbol such as
/// `○` and at most one more glyph starts a new word. Any other sub-line ends the current
/// word and stands on its own.
fn de_kerning(cell: &str) -> Vec<String> {
    let mut fragments = vec![];
    let mut word = String::new();
    for line in cell.split('\n') {
        let mut chars = line.chars();
        let first = chars.next();
        let rest = chars.as_str();
        if first.is_some() && rest.is_empty() {
            word.push_str(line);
        } else if first.is_some_and(is_other_symbol) && rest.trim_start().chars().count() <= 1 {
            if !word.is_empty() {
                fragments.push(std::mem::take(&mut word));
            }
            word.push_str(line);
        } else {
            if !word.is_empty() {
                fragments.push(std::mem::take(&mut word));
            }
            fragments.push(line.to_string());
        }
    }
    if !word.is_empty() {
        fragments.push(word);
    }
    fragments
}

fn split_heading(fragment: String) -> Vec<String> {
    let at = match fragment.find(HEADING_MARKER) {
        Some(index) => index + HEADING_MARKER.len(),
        None => match DISH_CATEGORY.find(&fragment) {
            Some(found) => found.end(),
            None => return vec![fragment],
        },
    };
    let (heading, rest) = fragment.split_at(at);
    vec![heading.to_string(), rest.to_string()]
}
