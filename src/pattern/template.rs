// Sinatra-style path templates: `/literal/:capture` with an optional `/*` tail.

use super::{CompileError, Pattern, WILDCARD_KEY};
use crate::context::UrlParams;

// One `/`-separated piece of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture(String),
}

impl Segment {
    // Check one path segment, binding it if this is a capture.
    fn bind(&self, part: &str, params: &mut UrlParams) -> Option<()> {
        match self {
            Segment::Literal(literal) => (literal == part).then_some(()),
            // Captures never bind the empty string, so "/:name" does not match "/".
            Segment::Capture(_) if part.is_empty() => None,
            Segment::Capture(name) => {
                params.insert(name.as_str(), part);
                Some(())
            }
        }
    }
}

/// A compiled path template.
///
/// Segments are compared byte for byte, with no case folding and no trailing-slash
/// normalization, so `/users` and `/users/` are different routes. A template ending
/// in `/*` matches any path extending its fixed part past a `/`, binding that tail
/// (leading `/` included) to `"*"`.
///
/// ```
/// use rttp_web::pattern::{Pattern, TemplatePattern};
///
/// let pattern = TemplatePattern::parse("/u/:name/*").unwrap();
/// assert_eq!(pattern.matches("/u/carl/").unwrap().get("*"), Some("/"));
/// assert!(pattern.matches("/u/carl").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct TemplatePattern {
    raw: String,
    segments: Vec<Segment>,
    wildcard: bool,
    prefix: String,
}

impl TemplatePattern {
    /// Parse `template`. The empty template is the root path `/`.
    ///
    /// # Errors
    ///
    /// [`CompileError::InvalidPatternSpec`] when a capture segment has no name.
    pub fn parse(template: &str) -> Result<Self, CompileError> {
        let (fixed, wildcard) = match template.strip_suffix("/*") {
            Some(fixed) => (fixed, true),
            None if template.is_empty() => ("/", false),
            None => (template, false),
        };

        let segments = fixed
            .split('/')
            .map(|part| match part.strip_prefix(':') {
                Some("") => Err(CompileError::InvalidPatternSpec(format!(
                    "empty capture name in template {template:?}"
                ))),
                Some(name) => Ok(Segment::Capture(name.to_owned())),
                None => Ok(Segment::Literal(part.to_owned())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let prefix = literal_prefix(&segments, wildcard);

        Ok(Self {
            raw: template.to_owned(),
            segments,
            wildcard,
            prefix,
        })
    }

    /// The template this pattern was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `true` for `/*` templates.
    pub fn is_prefix(&self) -> bool {
        self.wildcard
    }
}

// Leading literal segments, each followed by the `/` that must come after it.
fn literal_prefix(segments: &[Segment], wildcard: bool) -> String {
    let mut prefix = String::new();
    for (i, segment) in segments.iter().enumerate() {
        let Segment::Literal(literal) = segment else {
            break;
        };
        prefix.push_str(literal);
        if i + 1 < segments.len() || wildcard {
            prefix.push('/');
        }
    }
    prefix
}

impl Pattern for TemplatePattern {
    fn prefix(&self) -> &str {
        &self.prefix
    }

    fn matches(&self, path: &str) -> Option<UrlParams> {
        let mut params = UrlParams::new();

        if self.wildcard {
            let mut parts = path.splitn(self.segments.len() + 1, '/');
            for segment in &self.segments {
                segment.bind(parts.next()?, &mut params)?;
            }
            // Only present when a `/` follows the fixed part.
            let tail = parts.next()?;
            params.insert(WILDCARD_KEY, format!("/{tail}"));
        } else {
            if path.bytes().filter(|&b| b == b'/').count() + 1 != self.segments.len() {
                return None;
            }
            for (segment, part) in self.segments.iter().zip(path.split('/')) {
                segment.bind(part, &mut params)?;
            }
        }

        Some(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(template: &str) -> TemplatePattern {
        TemplatePattern::parse(template).unwrap()
    }

    #[test]
    fn parse_classifies_segments() {
        let pat = parse("/users/:id/posts/:post_id");
        assert!(!pat.is_prefix());
        assert_eq!(
            pat.segments,
            vec![
                Segment::Literal(String::new()),
                Segment::Literal("users".into()),
                Segment::Capture("id".into()),
                Segment::Literal("posts".into()),
                Segment::Capture("post_id".into()),
            ]
        );
    }

    #[test]
    fn parse_rejects_empty_capture_name() {
        assert!(matches!(
            TemplatePattern::parse("/users/:"),
            Err(CompileError::InvalidPatternSpec(_))
        ));
    }

    #[test]
    fn prefix_stops_at_first_capture() {
        assert_eq!(parse("/users").prefix(), "/users");
        assert_eq!(parse("/users/:id").prefix(), "/users/");
        assert_eq!(parse("/u/:name/*").prefix(), "/u/");
        assert_eq!(parse("/static/*").prefix(), "/static/");
        assert_eq!(parse("/*").prefix(), "/");
        assert_eq!(parse("/").prefix(), "/");
    }

    #[test]
    fn literal_match_is_exact() {
        let pat = parse("/users");
        assert!(pat.matches("/users").is_some());
        assert!(pat.matches("/users/").is_none());
        assert!(pat.matches("/Users").is_none());
        assert!(pat.matches("/posts").is_none());
    }

    #[test]
    fn empty_template_matches_only_root() {
        let pat = parse("");
        assert!(pat.matches("/").unwrap().is_empty());
        assert!(pat.matches("").is_none());
        assert!(pat.matches("/a").is_none());
    }

    #[test]
    fn capture_binds_whole_segment() {
        let pat = parse("/users/:id/posts/:post_id");
        let params = pat.matches("/users/7/posts/file.json").unwrap();
        assert_eq!(params.get("id"), Some("7"));
        assert_eq!(params.get("post_id"), Some("file.json"));
    }

    #[test]
    fn segment_count_must_agree() {
        let pat = parse("/users/:id");
        assert!(pat.matches("/users").is_none());
        assert!(pat.matches("/users/42/extra").is_none());
        assert!(pat.matches("/users/42/").is_none());
    }

    #[test]
    fn capture_rejects_empty_segment() {
        let pat = parse("/:name");
        assert!(pat.matches("/").is_none());
        assert_eq!(pat.matches("/carl").unwrap().get("name"), Some("carl"));
    }

    #[test]
    fn duplicate_names_last_write_wins() {
        let pat = parse("/:x/:x");
        let params = pat.matches("/a/b").unwrap();
        assert_eq!(params.get("x"), Some("b"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn wildcard_binds_tail_with_separator() {
        let pat = parse("/u/:name/*");
        let params = pat.matches("/u/carl/").unwrap();
        assert_eq!(params.get("name"), Some("carl"));
        assert_eq!(params.get("*"), Some("/"));

        let params = pat.matches("/u/carl/projects/123").unwrap();
        assert_eq!(params.get("name"), Some("carl"));
        assert_eq!(params.get("*"), Some("/projects/123"));
    }

    #[test]
    fn wildcard_requires_separator_after_prefix() {
        let pat = parse("/u/:name/*");
        assert!(pat.matches("/u/carl").is_none());
        assert!(pat.matches("/u/").is_none());
        assert!(pat.matches("/v/carl/x").is_none());
    }

    #[test]
    fn root_wildcard_matches_everything_under_root() {
        let pat = parse("/*");
        assert_eq!(pat.matches("/").unwrap().get("*"), Some("/"));
        assert_eq!(pat.matches("/a/b").unwrap().get("*"), Some("/a/b"));
        assert!(pat.matches("").is_none());
    }

    #[test]
    fn as_str_keeps_original_template() {
        assert_eq!(parse("/files/*").as_str(), "/files/*");
    }
}
