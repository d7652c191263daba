use common::{Error, Result};
use regex::Regex;

/// A path glob relative to a storage root.
///
/// `*` and `?` match within one path segment; `**` matches any number of
/// segments. Everything else is literal.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    pattern: String,
    prefix: String,
    regex: Regex,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim_start_matches('/');
        if pattern.is_empty() {
            return Err(Error::InvalidInput("Input pattern is empty".to_string()));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            prefix: literal_prefix(pattern),
            regex: Regex::new(&glob_to_regex(pattern))?,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Leading whole segments without wildcards, e.g. `song_data/A` for
    /// `song_data/A/*/x.json`. Listing can start here.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Tests a path relative to the same root as the pattern.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

fn is_wild(c: char) -> bool {
    matches!(c, '*' | '?')
}

fn literal_prefix(pattern: &str) -> String {
    let segments: Vec<&str> = pattern.split('/').collect();
    let literal: Vec<&str> = segments[..segments.len() - 1]
        .iter()
        .take_while(|s| !s.contains(is_wild))
        .copied()
        .collect();
    literal.join("/")
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    // `**/` also matches zero directories.
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    out
}
