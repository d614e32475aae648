// src/matching/signature.rs - Name signatures bridging Devanagari and Latin spellings

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use rphonetic::{DoubleMetaphone, Encoder};
use std::collections::HashSet;

use crate::matching::transliterate::transliterate_devanagari;
use crate::models::matching::NameSignature;

/// Devanagari graphemes that voters and data-entry operators use interchangeably.
/// Applied before romanization; the nukta rows must precede the bare nukta.
const DEVANAGARI_FOLDS: [(&str, &str); 24] = [
    ("\u{0902}", "n"), // anusvara
    ("\u{0901}", "n"), // chandrabindu
    ("\u{0903}", "h"), // visarga
    ("व", "ब"),
    ("श", "स"),
    ("ष", "स"),
    ("ण", "न"),
    ("\u{0922}\u{093C}", "ड"),
    ("\u{095D}", "ड"),
    ("ढ", "ड"),
    ("\u{0921}\u{093C}", "ड"),
    ("\u{095C}", "ड"),
    ("ऱ", "र"),
    ("\u{0915}\u{093C}", "क"),
    ("\u{0958}", "क"),
    ("\u{0916}\u{093C}", "ख"),
    ("\u{0959}", "ख"),
    ("\u{0917}\u{093C}", "ग"),
    ("\u{095A}", "ग"),
    ("\u{091C}\u{093C}", "ज"),
    ("\u{095B}", "ज"),
    ("\u{092B}\u{093C}", "फ"),
    ("\u{095E}", "फ"),
    ("\u{093C}", ""),
];

/// The Latin spellings of the same confusions.
const LATIN_FOLDS: [(&str, &str); 4] = [("ph", "f"), ("v", "b"), ("w", "b"), ("z", "j")];

/// Honorific, caste and common surname tokens dropped from the end of a
/// multi-word name when building the sort key.
const TRAILING_NAME_SUFFIXES: [&str; 38] = [
    "कुमार", "कुमारी", "देवी", "सिंह", "प्रसाद", "यादव", "पाल", "शर्मा", "वर्मा", "गुप्ता",
    "राजपूत", "खान", "अली", "बेगम", "श्री", "श्रीमती", "कुँवर", "बाबू", "लाल",
    "kumar", "kumari", "devi", "singh", "prasad", "yadav", "pal", "sharma", "verma", "gupta",
    "rajput", "khan", "ali", "begum", "shri", "shrimati", "kunwar", "babu", "lal",
];

/// Vowel spellings folded onto one representative before `a` is dropped.
const SORT_KEY_VOWEL_FOLDS: [(&str, &str); 9] = [
    ("aa", "a"),
    ("ai", "a"),
    ("au", "a"),
    ("ee", "i"),
    ("ii", "i"),
    ("oo", "u"),
    ("uu", "u"),
    ("e", "a"),
    ("o", "a"),
];

static NASAL_G_FOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"n\s*g").expect("valid regex"));
static NASAL_H_FOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"n\s*h").expect("valid regex"));
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static SKELETON_VOWELS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[aeiouy]").expect("valid regex"));

static SUFFIX_KEYS: Lazy<HashSet<String>> = Lazy::new(|| {
    TRAILING_NAME_SUFFIXES
        .iter()
        .map(|suffix| fold_vowels(&romanize(suffix)))
        .filter(|key| !key.is_empty())
        .collect()
});

/// Builds the comparison signature of a raw name. Total over all inputs: an
/// empty or blank name yields the all-empty signature.
pub fn generate_signature(name: &str) -> NameSignature {
    let normalized = name.trim().to_lowercase();
    if normalized.is_empty() {
        return NameSignature::default();
    }

    let latin = romanize(&normalized);
    let skeleton = SKELETON_VOWELS.replace_all(&latin, "").into_owned();
    let phonetic_code = primary_metaphone(&latin);
    let sort_key = sort_key_for(&normalized);

    NameSignature {
        latin,
        skeleton,
        phonetic_code,
        sort_key,
    }
}

/// Folds, transliterates and cleans an already lowercased name into its Latin
/// transcription.
pub fn romanize(normalized: &str) -> String {
    let mut folded = normalized.to_string();
    for (pattern, replacement) in &DEVANAGARI_FOLDS {
        folded = folded.replace(pattern, replacement);
    }

    let mut latin = match transliterate_devanagari(&folded) {
        Ok(latin) => latin,
        Err(e) => {
            debug!("Transliteration fallback for '{}': {}", normalized, e);
            folded
        }
    };
    for (pattern, replacement) in &LATIN_FOLDS {
        latin = latin.replace(pattern, replacement);
    }

    clean_artifacts(&latin)
}

fn clean_artifacts(latin: &str) -> String {
    let cleaned: String = latin
        .chars()
        .filter_map(|c| match c {
            '~' | 'M' => Some('n'),
            'H' => Some('h'),
            '.' | '|' => None,
            other => Some(other),
        })
        .collect();
    let cleaned = NASAL_G_FOLD.replace_all(&cleaned, "ng");
    let cleaned = NASAL_H_FOLD.replace_all(&cleaned, "nh");
    WHITESPACE_RUN.replace_all(cleaned.trim(), " ").into_owned()
}

/// Primary Double Metaphone code over the ASCII letters of the Latin form.
fn primary_metaphone(latin: &str) -> String {
    let encodable: String = latin
        .chars()
        .filter(|c| c.is_ascii_alphabetic() || *c == ' ')
        .collect();
    let encodable = encodable.trim();
    if encodable.is_empty() {
        return String::new();
    }

    match std::panic::catch_unwind(|| DoubleMetaphone::default().encode(encodable)) {
        Ok(code) => code,
        Err(_) => {
            log::warn!("DoubleMetaphone panicked on input: {:?}", encodable);
            String::new()
        }
    }
}

/// Aggressive normalization used to order records so likely duplicates sit
/// next to each other. Trailing suffix tokens are removed only from
/// multi-word names, at most two of them, never from the interior.
pub fn sort_key_for(normalized: &str) -> String {
    let mut words: Vec<&str> = normalized.split_whitespace().collect();
    for _ in 0..2 {
        match words.last() {
            Some(last) if words.len() > 1 && is_name_suffix(last) => {
                words.pop();
            }
            _ => break,
        }
    }
    fold_vowels(&romanize(&words.join(" ")))
}

fn is_name_suffix(word: &str) -> bool {
    SUFFIX_KEYS.contains(&fold_vowels(&romanize(word)))
}

fn fold_vowels(latin: &str) -> String {
    let mut folded = latin.to_string();
    for (pattern, replacement) in &SORT_KEY_VOWEL_FOLDS {
        folded = folded.replace(pattern, replacement);
    }
    folded
        .chars()
        .filter(|c| *c != 'a' && c.is_alphanumeric())
        .collect()
}
