//! Progress-display annotation
//!
//! Progress bars show the latest value of selected keys. Keys are selected
//! with shell-style globs (`*`, `?`, `[seq]`, `[!seq]`); the default pattern
//! hides "private" keys that start with `_` (system samples and the like).

use std::collections::BTreeMap;

use super::Run;
use crate::value::Value;

/// Pattern matching every key that does not start with `_`
pub const DEFAULT_PATTERN: &str = "[!_]*";

/// Consumer of latest-value postfixes (a progress bar, a status line)
pub trait ProgressSink {
    /// Replace the displayed postfix
    fn set_postfix(&mut self, postfix: &BTreeMap<String, Value>);
}

impl Run {
    /// Latest value of every tracked key matching any of `patterns`.
    #[must_use]
    pub fn latest_matching(&self, patterns: &[&str], ignore_case: bool) -> BTreeMap<String, Value> {
        self.merged_latest()
            .iter()
            .filter(|(key, _)| patterns.iter().any(|p| fnmatch(key, p, ignore_case)))
            .map(|(key, (_, value))| (key.clone(), value.clone()))
            .collect()
    }

    /// Push the latest matching values to a progress display.
    pub fn annotate(&self, sink: &mut impl ProgressSink, patterns: &[&str], ignore_case: bool) {
        sink.set_postfix(&self.latest_matching(patterns, ignore_case));
    }
}

/// Shell-style glob match of `name` against `pattern`.
#[must_use]
pub fn fnmatch(name: &str, pattern: &str, ignore_case: bool) -> bool {
    let (name, pattern): (Vec<char>, Vec<char>) = if ignore_case {
        (name.to_lowercase().chars().collect(), pattern.to_lowercase().chars().collect())
    } else {
        (name.chars().collect(), pattern.chars().collect())
    };

    let (mut n, mut p) = (0, 0);
    // position of the last `*` and the name index it currently absorbs up to
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    backtrack = Some((p, n));
                    p += 1;
                    continue;
                }
                '?' => {
                    n += 1;
                    p += 1;
                    continue;
                }
                '[' => match match_class(&pattern[p..], name[n]) {
                    Some((true, used)) => {
                        n += 1;
                        p += used;
                        continue;
                    }
                    Some((false, _)) => {}
                    None if name[n] == '[' => {
                        n += 1;
                        p += 1;
                        continue;
                    }
                    None => {}
                },
                c if c == name[n] => {
                    n += 1;
                    p += 1;
                    continue;
                }
                _ => {}
            }
        }
        match backtrack {
            Some((star, absorbed)) => {
                p = star + 1;
                n = absorbed + 1;
                backtrack = Some((star, absorbed + 1));
            }
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Match `c` against the class at the start of `pattern` (`[...]`).
///
/// Returns `(matched, chars consumed)`, or `None` when the class is unclosed
/// and `[` must be taken literally.
fn match_class(pattern: &[char], c: char) -> Option<(bool, usize)> {
    let mut i = 1;
    let negate = pattern.get(i) == Some(&'!');
    if negate {
        i += 1;
    }
    let first = i;
    let mut matched = false;
    loop {
        let lo = *pattern.get(i)?;
        if lo == ']' && i > first {
            return Some((matched != negate, i + 1));
        }
        match (pattern.get(i + 1), pattern.get(i + 2)) {
            (Some('-'), Some(&hi)) if hi != ']' => {
                matched |= lo <= c && c <= hi;
                i += 3;
            }
            _ => {
                matched |= lo == c;
                i += 1;
            }
        }
    }
}
