//! URL scope decisions: glob allow/exclude lists and sitemap detection.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::error::CrawlError;

static SITEMAP_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"sitemap[^/]*\.xml$").expect("valid sitemap regex"));

/// Whether the URL points at a sitemap file (`/sitemap.xml`,
/// `/sitemap_index.xml`, `/post-sitemap.xml`, ...).
pub fn is_sitemap(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => SITEMAP_PATH.is_match(parsed.path()),
        Err(_) => false,
    }
}

/// Compile a glob pattern into an anchored regex over the full URL string.
///
/// `**` crosses `/`, `*` and `?` stay within one segment, `{a,b}` is an
/// alternation and `[...]` a character class. Everything else is literal.
pub fn compile_glob(pattern: &str) -> Result<Regex, CrawlError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut brace_depth = 0usize;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' if chars.get(i + 1) == Some(&'*') => {
                i += 1;
                if chars.get(i + 1) == Some(&'/') {
                    i += 1;
                    out.push_str("(?:.*/)?");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '{' => {
                brace_depth += 1;
                out.push_str("(?:");
            }
            ',' if brace_depth > 0 => out.push('|'),
            '}' if brace_depth > 0 => {
                brace_depth -= 1;
                out.push(')');
            }
            '[' => match class_end(&chars, i) {
                Some(end) => {
                    out.push('[');
                    let mut j = i + 1;
                    if matches!(chars.get(j), Some('!') | Some('^')) {
                        out.push('^');
                        j += 1;
                    }
                    for &inner in &chars[j..end] {
                        if matches!(inner, '\\' | '[' | '&' | '~') {
                            out.push('\\');
                        }
                        out.push(inner);
                    }
                    out.push(']');
                    i = end;
                }
                None => out.push_str(r"\["),
            },
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
        i += 1;
    }

    if brace_depth > 0 {
        return Err(CrawlError::ConfigValidation(format!(
            "glob pattern '{pattern}' has an unclosed '{{'"
        )));
    }

    out.push('$');
    Regex::new(&out)
        .map_err(|e| CrawlError::ConfigValidation(format!("invalid glob pattern '{pattern}': {e}")))
}

/// Index of the `]` closing the class opened at `start`, if any.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut j = start + 1;
    if matches!(chars.get(j), Some('!') | Some('^')) {
        j += 1;
    }
    // A `]` right after the opener is part of the class.
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    (j..chars.len()).find(|&k| chars[k] == ']')
}

/// Compiled allow/exclude lists for one crawl run.
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    allow: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl UrlMatcher {
    pub fn new<S: AsRef<str>>(match_patterns: &[S], exclude: &[S]) -> Result<Self, CrawlError> {
        let compile = |patterns: &[S]| {
            patterns
                .iter()
                .map(AsRef::as_ref)
                .filter(|p| !p.trim().is_empty())
                .map(compile_glob)
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            allow: compile(match_patterns)?,
            exclude: compile(exclude)?,
        })
    }

    /// True iff `url` matches at least one allow pattern and no exclude pattern.
    pub fn is_allowed(&self, url: &str) -> bool {
        self.allow.iter().any(|re| re.is_match(url)) && !self.exclude.iter().any(|re| re.is_match(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(allow: &[&str], exclude: &[&str]) -> UrlMatcher {
        UrlMatcher::new(allow, exclude).unwrap()
    }

    #[test]
    fn sitemap_regex_compiles() {
        assert!(SITEMAP_PATH.is_match("/sitemap.xml"));
    }

    #[test]
    fn detects_sitemaps_by_path() {
        assert!(is_sitemap("https://example.com/sitemap.xml"));
        assert!(is_sitemap("https://example.com/sitemap_index.xml"));
        assert!(is_sitemap("https://example.com/blog/post-sitemap.xml"));
        assert!(is_sitemap("https://example.com/sitemap-1.xml?lang=en"));
        assert!(!is_sitemap("https://example.com/docs/sitemap"));
        assert!(!is_sitemap("https://example.com/feed.xml"));
        assert!(!is_sitemap("https://sitemap.example.com/page.xml"));
        assert!(!is_sitemap("not a url"));
    }

    #[test]
    fn double_star_crosses_segments() {
        let m = matcher(&["https://example.com/docs/**"], &[]);
        assert!(m.is_allowed("https://example.com/docs/guide"));
        assert!(m.is_allowed("https://example.com/docs/a/b/c"));
        assert!(!m.is_allowed("https://example.com/blog/post"));
        assert!(!m.is_allowed("https://other.com/docs/guide"));
    }

    #[test]
    fn single_star_stays_in_segment() {
        let m = matcher(&["https://example.com/docs/*"], &[]);
        assert!(m.is_allowed("https://example.com/docs/guide"));
        assert!(!m.is_allowed("https://example.com/docs/a/b"));
    }

    #[test]
    fn exclude_wins_over_match() {
        let m = matcher(&["https://example.com/docs/**"], &["**/archive/**"]);
        assert!(!m.is_allowed("https://example.com/docs/archive/x"));
        assert!(m.is_allowed("https://example.com/docs/guide"));
        assert!(m.is_allowed("https://example.com/docs/archived-notes"));
    }

    #[test]
    fn empty_exclude_excludes_nothing() {
        let m = matcher(&["https://example.com/**"], &[]);
        assert!(m.is_allowed("https://example.com/anything/at/all"));
    }

    #[test]
    fn any_allow_pattern_suffices() {
        let m = matcher(&["https://a.test/**", "https://b.test/**"], &[]);
        assert!(m.is_allowed("https://a.test/x"));
        assert!(m.is_allowed("https://b.test/y"));
        assert!(!m.is_allowed("https://c.test/z"));
    }

    #[test]
    fn matching_is_case_sensitive_and_literal() {
        let m = matcher(&["https://example.com/Docs/**"], &[]);
        assert!(m.is_allowed("https://example.com/Docs/page"));
        assert!(!m.is_allowed("https://example.com/docs/page"));

        // `.` and `?` in the query are not regex metacharacters here.
        let m = matcher(&["https://example.com/page.html"], &[]);
        assert!(!m.is_allowed("https://example.com/pageXhtml"));
    }

    #[test]
    fn braces_and_classes() {
        let m = matcher(&["https://example.com/{docs,guides}/**"], &[]);
        assert!(m.is_allowed("https://example.com/docs/a"));
        assert!(m.is_allowed("https://example.com/guides/b"));
        assert!(!m.is_allowed("https://example.com/blog/c"));

        let m = matcher(&["https://example.com/v[0-9]/*"], &["https://example.com/v[!12]/*"]);
        assert!(m.is_allowed("https://example.com/v1/page"));
        assert!(!m.is_allowed("https://example.com/v3/page"));
    }

    #[test]
    fn question_mark_matches_one_segment_char() {
        let m = matcher(&["https://example.com/p?"], &[]);
        assert!(m.is_allowed("https://example.com/p1"));
        assert!(!m.is_allowed("https://example.com/p/"));
        assert!(!m.is_allowed("https://example.com/p12"));
    }

    #[test]
    fn unclosed_brace_is_rejected() {
        let err = compile_glob("https://example.com/{a,b").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn unclosed_bracket_is_literal() {
        let m = matcher(&["https://example.com/[draft"], &[]);
        assert!(m.is_allowed("https://example.com/[draft"));
    }
}
