//! Shell-style globs over host names
//!
//! Supports `*`, `?`, character classes (`[abc]`, `[a-z]`, `[!abc]`,
//! `[^abc]`) and `\` escapes. Patterns are anchored: they must match the
//! whole name.

use crate::error::GlobError;
use regex::Regex;
use std::fmt;

/// A compiled glob pattern
#[derive(Debug, Clone)]
pub struct Glob {
    pattern: String,
    regex: Regex,
}

impl Glob {
    pub fn new(pattern: &str) -> Result<Self, GlobError> {
        let error = |reason: &str| GlobError {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(error("pattern is empty"));
        }

        let mut source = String::from("^");
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                '\\' => {
                    let escaped = chars.next().ok_or_else(|| error("trailing backslash"))?;
                    source.push_str(&regex::escape(&escaped.to_string()));
                }
                '[' => {
                    source.push('[');
                    if matches!(chars.peek(), Some('!' | '^')) {
                        chars.next();
                        source.push('^');
                    }
                    // A `]` right after the opening bracket is literal
                    if chars.peek() == Some(&']') {
                        chars.next();
                        source.push_str("\\]");
                    }
                    let mut closed = false;
                    for member in chars.by_ref() {
                        match member {
                            ']' => {
                                closed = true;
                                break;
                            }
                            '-' => source.push('-'),
                            '\\' | '[' | '^' | '&' | '~' => {
                                source.push('\\');
                                source.push(member);
                            }
                            other => source.push(other),
                        }
                    }
                    if !closed {
                        return Err(error("unclosed character class"));
                    }
                    source.push(']');
                }
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }
        source.push('$');

        let regex = Regex::new(&source).map_err(|e| error(&e.to_string()))?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    /// Whether a string contains glob metacharacters
    pub fn is_glob(text: &str) -> bool {
        text.contains(['*', '?', '['])
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

impl PartialEq for Glob {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for Glob {}

impl fmt::Display for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}
