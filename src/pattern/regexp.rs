// Regular-expression patterns, always anchored at the start of the path.

use std::borrow::Cow;

use regex::Regex;

use super::{CompileError, Pattern};
use crate::context::UrlParams;

// Characters that end the literal prefix of a regex source.
const META: &[char] = &[
    '\\', '.', '+', '*', '?', '(', ')', '|', '[', ']', '{', '}', '^', '$', '#', ' ',
];

/// A compiled left-anchored regular expression.
///
/// Named groups bind under their name. Every unnamed group binds under `"$N"`,
/// where `N` is the group's index among *all* groups in opening order, named ones
/// included. A group that did not take part in the match binds `""`.
///
/// The match has to start at the beginning of the path, but only has to cover
/// the whole path if the expression ends in `$`.
///
/// ```
/// use rttp_web::pattern::{Pattern, RegexPattern};
///
/// let pattern = RegexPattern::parse(r"/(?P<user>\w+)/(\d+)").unwrap();
/// let params = pattern.matches("/carl/42/rest").unwrap();
/// assert_eq!(params.get("user"), Some("carl"));
/// assert_eq!(params.get("$2"), Some("42"));
/// ```
#[derive(Debug, Clone)]
pub struct RegexPattern {
    regex: Regex,
    // Binding name per group index; index 0 (the whole match) is never bound.
    names: Vec<String>,
    prefix: String,
}

impl RegexPattern {
    /// Compile `source`, wrapping it as `^(?:source)` unless it already starts with `^`.
    ///
    /// # Errors
    ///
    /// [`CompileError::InvalidRegex`] when the expression does not parse.
    pub fn parse(source: &str) -> Result<Self, CompileError> {
        let anchored = anchor(source);
        let regex = Regex::new(&anchored).map_err(|source_err| CompileError::InvalidRegex {
            pattern: source.to_owned(),
            source: source_err,
        })?;
        Ok(Self::with_regex(regex, literal_prefix(source)))
    }

    /// Use an already compiled expression as is.
    ///
    /// The expression is never recompiled, so options set through
    /// `regex::RegexBuilder` keep applying. An unanchored expression still only
    /// matches at the start of the path. No literal prefix is derived: the source
    /// text alone doesn't say whether builder flags such as case-insensitivity
    /// change what it matches.
    pub fn from_regex(regex: Regex) -> Self {
        Self::with_regex(regex, String::new())
    }

    fn with_regex(regex: Regex, prefix: String) -> Self {
        let names = regex
            .capture_names()
            .enumerate()
            .map(|(i, name)| match name {
                Some(name) => name.to_owned(),
                None => format!("${i}"),
            })
            .collect();

        Self {
            regex,
            names,
            prefix,
        }
    }

    /// The expression matched against paths.
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }
}

impl Pattern for RegexPattern {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn matches(&self, path: &str) -> Option<UrlParams> {
        let captures = self.regex.captures(path)?;
        // Leftmost-first search finds a match at 0 whenever one exists. `(?m)^` and
        // unanchored pre-built expressions can match later; those don't count.
        if captures.get(0)?.start() != 0 {
            return None;
        }

        let mut params = UrlParams::new();
        for (i, name) in self.names.iter().enumerate().skip(1) {
            let value = captures.get(i).map_or("", |m| m.as_str());
            params.insert(name.as_str(), value);
        }
        Some(params)
    }
}

fn anchor(source: &str) -> Cow<'_, str> {
    if source.starts_with('^') {
        Cow::Borrowed(source)
    } else {
        Cow::Owned(format!("^(?:{source})"))
    }
}

// Literal text every match must start with. Conservative: alternation anywhere
// gives up, and a literal followed by an optional quantifier drops its last char.
fn literal_prefix(source: &str) -> String {
    if source.contains('|') {
        return String::new();
    }
    let body = source.strip_prefix('^').unwrap_or(source);
    let end = body.find(META).unwrap_or(body.len());
    let mut prefix = body[..end].to_owned();
    if matches!(body[end..].chars().next(), Some('?' | '*' | '{')) {
        prefix.pop();
    }
    prefix
}

#[cfg(test)]
mod tests {
    use regex::RegexBuilder;

    use super::*;

    #[test]
    fn unanchored_source_is_anchored() {
        let pattern = RegexPattern::parse("/files/(.+)").unwrap();
        assert_eq!(pattern.as_str(), "^(?:/files/(.+))");
        assert!(pattern.matches("/files/a.txt").is_some());
        assert!(pattern.matches("/x/files/a.txt").is_none());
    }

    #[test]
    fn anchoring_preserves_alternation() {
        let pattern = RegexPattern::parse("/a|/b").unwrap();
        assert!(pattern.matches("/b/c").is_some());
        assert!(pattern.matches("/c/b").is_none());
    }

    #[test]
    fn unanchored_behaves_like_manually_anchored() {
        let sources = [r"/u/(?P<name>\w+)", r"/(\d+)-(\d+)", r"/static/.*\.css", r"(?i)/Admin"];
        let paths = [
            "/u/carl", "/u/carl/x", "/x/u/carl", "/12-34", "/a/12-34", "/static/site.css",
            "/ADMIN", "/admin/users", "/",
        ];
        for source in sources {
            let implicit = RegexPattern::parse(source).unwrap();
            let explicit = RegexPattern::parse(&format!("^{source}")).unwrap();
            for path in paths {
                assert_eq!(
                    implicit.matches(path),
                    explicit.matches(path),
                    "source {source} path {path}"
                );
            }
        }
    }

    #[test]
    fn match_need_not_consume_whole_path() {
        let open = RegexPattern::parse("^/ip/(?P<ip>[0-9.]+)").unwrap();
        assert_eq!(open.matches("/ip/1.2.3.4/extra").unwrap().get("ip"), Some("1.2.3.4"));

        let closed = RegexPattern::parse("^/ip/(?P<ip>[0-9.]+)$").unwrap();
        assert!(closed.matches("/ip/1.2.3.4/extra").is_none());
    }

    #[test]
    fn positional_names_count_named_groups() {
        let pattern = RegexPattern::parse(r"^/(?P<kind>\w+)/(\d+)/(\w+)$").unwrap();
        let params = pattern.matches("/post/42/edit").unwrap();
        assert_eq!(params.get("kind"), Some("post"));
        assert_eq!(params.get("$2"), Some("42"));
        assert_eq!(params.get("$3"), Some("edit"));
        assert_eq!(params.get("$1"), None);
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn non_capturing_groups_are_not_numbered() {
        let pattern = RegexPattern::parse(r"^/(?:v1|v2)/(\w+)").unwrap();
        let params = pattern.matches("/v2/users").unwrap();
        assert_eq!(params.get("$1"), Some("users"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn unmatched_optional_group_binds_empty() {
        let pattern = RegexPattern::parse(r"^/feed(\.json)?$").unwrap();
        assert_eq!(pattern.matches("/feed").unwrap().get("$1"), Some(""));
        assert_eq!(pattern.matches("/feed.json").unwrap().get("$1"), Some(".json"));
    }

    #[test]
    fn multiline_anchor_cannot_match_mid_path() {
        let pattern = RegexPattern::parse("(?m)^abc").unwrap();
        assert!(pattern.matches("x\nabc").is_none());
        assert!(pattern.matches("abc").is_some());
    }

    #[test]
    fn from_regex_reuses_anchored_expression() {
        let re = Regex::new(r"^/hello/(?P<name>\w+)$").unwrap();
        let pattern = RegexPattern::from_regex(re);
        assert_eq!(pattern.as_str(), r"^/hello/(?P<name>\w+)$");
        assert_eq!(pattern.matches("/hello/carl").unwrap().get("name"), Some("carl"));
    }

    #[test]
    fn from_regex_keeps_builder_flags() {
        let re = RegexBuilder::new("/admin/(\\w+)")
            .case_insensitive(true)
            .build()
            .unwrap();
        let pattern = RegexPattern::from_regex(re);
        assert_eq!(pattern.prefix(), "");
        assert_eq!(pattern.matches("/ADMIN/Users").unwrap().get("$1"), Some("Users"));
        assert!(pattern.matches("/x/admin/users").is_none());

        let anchored = RegexBuilder::new("^/api/users")
            .case_insensitive(true)
            .build()
            .unwrap();
        let pattern = RegexPattern::from_regex(anchored);
        assert_eq!(pattern.prefix(), "");
        assert!(pattern.matches("/API/Users").is_some());
    }

    #[test]
    fn literal_prefix_extraction() {
        assert_eq!(literal_prefix(r"^/ip/(?P<ip>\d+)"), "/ip/");
        assert_eq!(literal_prefix(r"/static/.*"), "/static/");
        assert_eq!(literal_prefix(r"^/colou?r"), "/colo");
        assert_eq!(literal_prefix(r"^/a|/b"), "");
        assert_eq!(literal_prefix(r"(?i)/admin"), "");
        assert_eq!(literal_prefix(r"^/exact$"), "/exact");
    }

    #[test]
    fn invalid_source_reports_original_text() {
        match RegexPattern::parse("/(") {
            Err(CompileError::InvalidRegex { pattern, .. }) => assert_eq!(pattern, "/("),
            other => panic!("expected InvalidRegex, got {other:?}"),
        }
    }
}
