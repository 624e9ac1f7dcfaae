use std::collections::HashSet;
use tracing::{debug, warn};

use super::directive::{Action, DeviceKind, Directive};
use super::patterns::{near_miss_regex, tag_regex, whitespace_run_regex};

const NEAR_MISS_CONTEXT_CHARS: usize = 40;

/// Extract every device tag from `text`, in order of appearance.
///
/// No de-duplication happens here; later tags overriding earlier ones is the
/// engine's decision. Malformed tags are logged and skipped.
pub fn parse(text: &str) -> Vec<Directive> {
    let mut directives = Vec::new();

    for caps in tag_regex().captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };

        let Some(device) = caps.get(1).and_then(|m| DeviceKind::from_keyword(m.as_str())) else {
            continue;
        };

        let directive = if let Some(state) = caps.get(2) {
            let action = if state.as_str().eq_ignore_ascii_case("on") {
                Action::On
            } else {
                Action::Off
            };
            Directive {
                device,
                action,
                duration: None,
                raw_match: whole.as_str().to_string(),
            }
        } else {
            let digits = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
            let duration = match digits.parse::<u64>() {
                Ok(secs) => Some(secs),
                Err(_) => {
                    warn!("Pulse duration '{}' out of range, falling back to default", digits);
                    None
                }
            };
            Directive {
                device,
                action: Action::Pulse,
                duration,
                raw_match: whole.as_str().to_string(),
            }
        };

        debug!("Parsed directive {:?}", directive);
        directives.push(directive);
    }

    for miss in near_misses(text) {
        warn!(
            "Possible malformed device tag {:?} near: {:?}",
            miss.fragment, miss.context
        );
    }
    directives
}

/// Remove all tags and tidy whitespace for display.
///
/// Removal repeats until no tag remains so that text like `[pu[pump on]mp on]`
/// cannot leave a freshly-formed tag behind; this keeps the function
/// idempotent.
pub fn strip(text: &str) -> String {
    let mut current = text.to_string();
    loop {
        let next = tag_regex().replace_all(&current, "");
        if next.len() == current.len() {
            break;
        }
        current = next.into_owned();
    }
    whitespace_run_regex()
        .replace_all(&current, " ")
        .trim()
        .to_string()
}

/// Bracketed text that looks like a device tag but is not one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NearMiss<'a> {
    pub fragment: &'a str,
    /// Up to 40 bytes either side of the fragment.
    pub context: &'a str,
}

pub fn near_misses(text: &str) -> Vec<NearMiss<'_>> {
    let tag_starts: HashSet<usize> = tag_regex().find_iter(text).map(|m| m.start()).collect();
    near_miss_regex()
        .find_iter(text)
        .filter(|m| !tag_starts.contains(&m.start()))
        .map(|m| NearMiss {
            fragment: m.as_str(),
            context: context_window(text, m.start(), m.end(), NEAR_MISS_CONTEXT_CHARS),
        })
        .collect()
}

/// Slice of `text` around `[start, end)` widened by `radius` bytes, snapped
/// to char boundaries.
fn context_window(text: &str, start: usize, end: usize, radius: usize) -> &str {
    let mut lo = start.saturating_sub(radius);
    while !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = (end + radius).min(text.len());
    while !text.is_char_boundary(hi) {
        hi += 1;
    }
    &text[lo..hi]
}
