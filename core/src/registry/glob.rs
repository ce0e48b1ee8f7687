//! Segment glob matching for dead-URL patterns
//!
//! Both the pattern and the candidate are split on `/` into segments and
//! compared left to right:
//!
//! - a literal segment must equal the candidate segment exactly;
//! - `*` consumes exactly one (non-empty) segment;
//! - `**` consumes zero or more contiguous segments. Every split point is
//!   tried in turn, so literal segments after `**` still get a chance to
//!   line up (`a/**/archive/*.tar.gz` matches `a/x/y/archive/v1.tar.gz`);
//! - a segment mixing `*` with literal characters (`*.tar.gz`) matches
//!   within that one segment, `*` standing for any run of characters.
//!
//! A dead-URL pattern names a location, and everything beneath that
//! location is dead too: [`matches_path`] accepts a candidate when the
//! pattern matches it whole or matches a leading run of its segments, so
//! `github.com/substack/querystring/*` covers
//! `github.com/substack/querystring/archive/0.2.0-ie8.tar.gz` while
//! `github.com/*/repo` still rejects `github.com/user/org/repo`.
//!
//! Inputs are a handful of segments, so the plain backtracking search
//! terminates quickly without memoization.

/// Match a pattern against a candidate or any leading part of it.
pub fn matches_path(pattern: &[&str], candidate: &[&str]) -> bool {
    (0..=candidate.len())
        .rev()
        .any(|end| segments_match(pattern, &candidate[..end]))
}

/// Match pre-split pattern segments against pre-split candidate segments.
pub fn segments_match(pattern: &[&str], candidate: &[&str]) -> bool {
    match pattern.split_first() {
        None => candidate.is_empty(),
        Some((&"**", rest)) => {
            (0..=candidate.len()).any(|skip| segments_match(rest, &candidate[skip..]))
        }
        Some((head, rest)) => match candidate.split_first() {
            None => false,
            Some((segment, remaining)) => {
                segment_matches(head, segment) && segments_match(rest, remaining)
            }
        },
    }
}

/// Match a single segment. `*` alone matches any segment; embedded `*`
/// matches any (possibly empty) run of characters.
pub fn segment_matches(pattern: &str, segment: &str) -> bool {
    if pattern == "*" {
        return !segment.is_empty();
    }
    if !pattern.contains('*') {
        return pattern == segment;
    }
    wildcard_chars(pattern.as_bytes(), segment.as_bytes())
}

fn wildcard_chars(pattern: &[u8], text: &[u8]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some((b'*', rest)) => (0..=text.len()).any(|skip| wildcard_chars(rest, &text[skip..])),
        Some((byte, rest)) => match text.split_first() {
            Some((head, remaining)) if head == byte => wildcard_chars(rest, remaining),
            _ => false,
        },
    }
}
