//! Pattern library.
//!
//! Everything the parser and the reinforcer match against lives here as data:
//! the tag grammar, the near-miss pattern, and the ordered phrase tables used to
//! infer pump activity from narration. Control flow never hard-codes a phrase.

use regex::{Regex, RegexBuilder};
use std::sync::OnceLock;

/// Both tag grammars in one alternation so a single left-to-right scan yields
/// matches in order of appearance.
///
/// Groups: 1 = device, 2 = on/off, 3 = pulse seconds.
const TAG_PATTERN: &str =
    r"\[\s*(pump|vibe|tens)(?:\s+(on|off)|\s*:\s*pulse\s*:\s*(\d+))\s*\]";

/// A bracket opening on a device keyword. Anything this finds that is not
/// also a full tag is a near-miss worth logging.
const NEAR_MISS_PATTERN: &str = r"\[\s*(?:pump|vibe|tens)\b[^\[\]]{0,40}\]?";

/// Explicit pump activation already present in the text.
const EXPLICIT_PUMP_PATTERN: &str = r"\[\s*pump(?:\s+on|\s*:\s*pulse\s*:\s*\d+)\s*\]";

const WHITESPACE_RUN_PATTERN: &str = r"\s{2,}";

/// Narration that implies the pump is running. Ordered: the first match wins
/// and is reported as the trigger phrase.
pub const PUMP_ACTIVITY_PHRASES: &[&str] = &[
    // Starting the pump
    r"\b(?:pump|compressor|motor)\s+(?:begins?|starts?|kicks?\s+(?:on|in)|whirs?|hums?|roars?)\b(?:\s+to\s+(?:hum|whir|run|work|life))?",
    r"\b(?:turns?|switch(?:es)?|flips?|flicks?)\s+(?:on\s+)?the\s+pump(?:\s+on)?\b",
    r"\bpump\s+(?:is\s+)?(?:now\s+)?(?:running|on|active|working)\b",
    // Air and flow
    r"\bair\s+(?:rushes|rushing|flows?|flowing|pours?|pouring|floods?|flooding|streams?|streaming)\b",
    r"\b(?:more|increas(?:e|es|ing)|rising)\s+(?:air|pressure|flow)\b",
    r"\bpressure\s+(?:builds?|building|rises?|rising|increases?|increasing|mounts?|mounting)\b",
    r"\b(?:inflat(?:e|es|ing)|pump(?:s|ing)?\s+(?:you\s+)?(?:up|full))\b",
    // Filling and hissing
    r"\b(?:hiss(?:es|ing)?)\b[^.!?]{0,40}\b(?:air|valve|tube|hose)\b",
    r"\b(?:fill(?:s|ing)?\s+(?:you\s+)?(?:up|with\s+air))\b",
    r"\b(?:swell(?:s|ing)?|expand(?:s|ing)?|stretch(?:es|ing)?)\s+(?:further|more|bigger|tighter)\b",
    // Control-panel interaction
    r"\b(?:press(?:es)?|push(?:es)?|hits?|taps?)\s+(?:the\s+)?(?:button|switch|dial|control|lever)\b",
    r"\b(?:turns?|twists?|cranks?)\s+(?:up\s+)?the\s+(?:dial|knob|valve|pressure)\b",
    r"\b(?:opens?)\s+the\s+valve\b",
    // Rhythm
    r"\b(?:puls(?:e|es|ing))\b",
    r"\b(?:throb(?:s|bing)?)\b",
    r"\bburst(?:s)?\s+of\s+air\b",
    r"\brhythmic(?:al(?:ly)?)?\b",
];

/// Phrases that turn an inferred activation into a pulse.
pub const PULSE_PHRASES: &[&str] = &[
    r"\bpuls(?:e|es|ed|ing)\b",
    r"\bthrob(?:s|bed|bing)?\b",
    r"\bbursts?\s+of\s+air\b",
    r"\brhythmic(?:al(?:ly)?)?\b",
    r"\bwaves?\s+of\s+(?:air|pressure)\b",
    r"\bin\s+(?:short\s+)?bursts\b",
];

fn case_insensitive(pattern: &str) -> Regex {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => re,
        // Patterns are compile-time constants covered by unit tests.
        Err(e) => panic!("invalid built-in pattern {pattern:?}: {e}"),
    }
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| case_insensitive(p)).collect()
}

pub fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| case_insensitive(TAG_PATTERN))
}

pub fn near_miss_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| case_insensitive(NEAR_MISS_PATTERN))
}

pub fn explicit_pump_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| case_insensitive(EXPLICIT_PUMP_PATTERN))
}

pub fn whitespace_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| case_insensitive(WHITESPACE_RUN_PATTERN))
}

pub fn pump_activity_regexes() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| compile_all(PUMP_ACTIVITY_PHRASES))
}

pub fn pulse_regexes() -> &'static [Regex] {
    static RES: OnceLock<Vec<Regex>> = OnceLock::new();
    RES.get_or_init(|| compile_all(PULSE_PHRASES))
}
