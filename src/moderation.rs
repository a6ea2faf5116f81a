//! Static word-list and spam heuristics applied to forum submissions.
//!
//! Spam heuristics run first; the first hit rejects the text. Otherwise each
//! whitespace token is lowercased, stripped to letters and looked up in the
//! profanity set, skipping a small allow-list of clinical vocabulary. Tokens
//! that only match after undoing one level of leetspeak are flagged too.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

const PROFANITY: &[&str] = &[
    "fuck", "fucker", "fucking", "fucked", "motherfucker", "shit", "shitty", "bullshit",
    "bitch", "bitches", "cunt", "asshole", "bastard", "dick", "dickhead", "pussy", "whore",
    "slut", "fag", "faggot", "nigger", "nigga", "retard", "retarded", "cock", "cocksucker",
    "twat", "wanker", "prick", "douche", "douchebag", "jackass", "dumbass", "piss",
];

/// Medical vocabulary the forum discusses openly. Never flagged.
const CLINICAL_ALLOW: &[&str] = &[
    "vagina", "vaginal", "penis", "penile", "breast", "breasts", "anus", "anal", "rectum",
    "rectal", "vulva", "clitoris", "testicle", "testicles", "scrotum", "sex", "sexual",
    "sexuality", "menstruation", "menstrual", "period", "ovary", "ovaries", "uterus",
    "cervix", "cervical", "erection", "ejaculation", "orgasm", "condom", "contraception",
    "std", "sti", "hiv", "aids", "pregnancy", "abortion", "libido", "nipple", "nipples",
    "genital", "genitals", "masturbation", "intercourse", "semen", "sperm", "urine",
];

const SPAM_PHRASES: &str = concat!(
    r"buy now|click here|free money|limited offer|act now|earn money|work from home|",
    r"100% free|make money fast|crypto giveaway|casino|viagra|cheap meds",
);

/// Characters repeated this many times in a row read as keyboard spam.
const REPEAT_RUN: usize = 10;
const MAX_LINKS: usize = 2;

static PROFANITY_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| PROFANITY.iter().copied().collect());
static ALLOW_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| CLINICAL_ALLOW.iter().copied().collect());

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("url regex"));
static CAPS_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z]{4,}(?:[\s!?.,]+[A-Z]{4,}){4,}\b").expect("caps regex"));
static PHRASE_THEN_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)(?:{SPAM_PHRASES}).{{0,80}}(?:https?://|www\.)"))
        .expect("phrase regex")
});
static LINK_THEN_PHRASE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)(?:https?://|www\.)\S*.{{0,80}}(?:{SPAM_PHRASES})"))
        .expect("phrase regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModerationResult {
    pub is_allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flagged_words: Option<Vec<String>>,
}

impl ModerationResult {
    pub fn allowed() -> Self {
        Self { is_allowed: true, reason: None, flagged_words: None }
    }

    pub fn rejected(reason: impl Into<String>, flagged: Vec<String>) -> Self {
        Self {
            is_allowed: false,
            reason: Some(reason.into()),
            flagged_words: if flagged.is_empty() { None } else { Some(flagged) },
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ContentModerator;

impl ContentModerator {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, text: &str) -> ModerationResult {
        if let Some(reason) = spam_reason(text) {
            let reason = format!("Content appears to be spam: {reason}");
            return ModerationResult::rejected(reason, Vec::new());
        }
        let flagged = self.flagged_words(text);
        if flagged.is_empty() {
            ModerationResult::allowed()
        } else {
            ModerationResult::rejected("Content contains inappropriate language", flagged)
        }
    }

    /// Profanity hits, each reported once in first-seen order.
    pub fn flagged_words(&self, text: &str) -> Vec<String> {
        let mut flagged: Vec<String> = Vec::new();
        for raw in text.split_whitespace() {
            let lower = raw.to_lowercase();
            let letters = letters_only(&lower);
            if letters.is_empty() || ALLOW_SET.contains(letters.as_str()) {
                continue;
            }
            let hit = if PROFANITY_SET.contains(letters.as_str()) {
                Some(letters)
            } else {
                let core = lower.trim_matches(|c: char| !c.is_alphanumeric() && !is_leet_symbol(c));
                // "sh1t!" must also be tried without its sentence punctuation
                [core, core.trim_end_matches(|c: char| !c.is_alphanumeric())]
                    .into_iter()
                    .map(|t| letters_only(&undo_leet(t)))
                    .find(|d| is_profane(d))
            };
            if let Some(word) = hit {
                if !flagged.contains(&word) {
                    flagged.push(word);
                }
            }
        }
        flagged
    }
}

fn letters_only(s: &str) -> String {
    s.chars().filter(|c| c.is_alphabetic()).collect()
}

fn is_profane(word: &str) -> bool {
    !ALLOW_SET.contains(word) && PROFANITY_SET.contains(word)
}

fn is_leet_symbol(c: char) -> bool {
    matches!(c, '@' | '!' | '$')
}

fn undo_leet(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '4' | '@' => 'a',
            '8' => 'b',
            '3' => 'e',
            '9' => 'g',
            '1' | '!' => 'i',
            '0' => 'o',
            '5' | '$' => 's',
            '7' => 't',
            other => other,
        })
        .collect()
}

fn longest_repeat(text: &str) -> usize {
    let mut best = 0;
    let mut run = 0;
    let mut prev = None;
    for c in text.chars() {
        if Some(c) == prev && !c.is_whitespace() {
            run += 1;
        } else {
            run = 1;
            prev = Some(c);
        }
        best = best.max(run);
    }
    best
}

fn spam_reason(text: &str) -> Option<&'static str> {
    // the regex crate has no backreferences, so repeated runs are scanned by hand
    if longest_repeat(text) >= REPEAT_RUN {
        return Some("repeated characters");
    }
    if URL_RE.find_iter(text).count() > MAX_LINKS {
        return Some("too many links");
    }
    if CAPS_RUN_RE.is_match(text) {
        return Some("excessive capitals");
    }
    if PHRASE_THEN_LINK_RE.is_match(text) || LINK_THEN_PHRASE_RE.is_match(text) {
        return Some("promotional link");
    }
    None
}
