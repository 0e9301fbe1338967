//! Route patterns: compile pattern specs into matchers that bind URL variables.
//!
//! Every accepted spec compiles to an `Arc<dyn Pattern>`:
//!
//! | Spec                            | Example                 | Matches `"/u/carl/repos"` as           |
//! |---------------------------------|-------------------------|----------------------------------------|
//! | template                        | `/u/:name/repos`        | `name → "carl"`                        |
//! | prefix template                 | `/u/:name/*`            | `name → "carl"`, `* → "/repos"`        |
//! | regular expression              | `^/u/(?P<name>[a-z]+)`  | `name → "carl"`                        |
//! | [`Pattern`] implementation      | anything                | whatever it decides                    |
//!
//! Compilation happens once, at route registration; a compiled pattern is immutable
//! and can be matched from any number of tasks at once.

use std::{any::Any, fmt, sync::Arc};

use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::context::UrlParams;

mod regexp;
mod template;

pub use regexp::RegexPattern;
pub use template::TemplatePattern;

/// Key bound to the unmatched tail of a prefix (`/*`) template.
pub const WILDCARD_KEY: &str = "*";

/// Errors raised while compiling a route pattern.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("invalid pattern spec: {0}")]
    InvalidPatternSpec(String),

    #[error("invalid regex pattern {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled route matcher.
///
/// Implement this to plug a custom matcher into the router; pass it as
/// [`PatternSpec::Custom`] and it is used as-is.
pub trait Pattern: Send + Sync + fmt::Debug {
    /// A literal every matching path starts with.
    ///
    /// The router skips the pattern without calling [`matches`](Self::matches) when
    /// the path lacks this prefix. The empty string is always a correct answer.
    fn prefix(&self) -> &str {
        ""
    }

    /// Match `path`, returning the bound variables, or `None` if it does not match.
    fn matches(&self, path: &str) -> Option<UrlParams>;
}

/// Everything that can be turned into a [`Pattern`].
pub enum PatternSpec {
    /// A `/literal/:capture` template, optionally ending in `/*`.
    Template(String),
    /// A compiled regular expression, used as is. It only matches at the start of a path.
    Regex(Regex),
    /// Regular-expression source, parsed at compile time.
    RegexSource(String),
    /// A ready-made matcher, used unchanged.
    Custom(Arc<dyn Pattern>),
    /// A type-erased spec, resolved by [`PatternSpec::from_any`].
    Dynamic(Box<dyn Any + Send + Sync>),
}

impl PatternSpec {
    /// Resolve a type-erased spec.
    ///
    /// Accepts `String`, `&'static str`, [`Regex`], `Arc<dyn Pattern>` and
    /// `PatternSpec` itself.
    ///
    /// # Errors
    ///
    /// [`CompileError::InvalidPatternSpec`] for any other type.
    pub fn from_any(value: Box<dyn Any + Send + Sync>) -> Result<Self, CompileError> {
        let value = match value.downcast::<String>() {
            Ok(template) => return Ok(Self::Template(*template)),
            Err(value) => value,
        };
        let value = match value.downcast::<&'static str>() {
            Ok(template) => return Ok(Self::Template((*template).to_owned())),
            Err(value) => value,
        };
        let value = match value.downcast::<Regex>() {
            Ok(regex) => return Ok(Self::Regex(*regex)),
            Err(value) => value,
        };
        let value = match value.downcast::<Arc<dyn Pattern>>() {
            Ok(pattern) => return Ok(Self::Custom(*pattern)),
            Err(value) => value,
        };
        match value.downcast::<PatternSpec>() {
            Ok(spec) if !matches!(*spec, PatternSpec::Dynamic(_)) => Ok(*spec),
            Ok(_) => Err(CompileError::InvalidPatternSpec(
                "nested dynamic pattern spec".to_owned(),
            )),
            Err(value) => Err(CompileError::InvalidPatternSpec(format!(
                "unsupported pattern spec type {:?}",
                (*value).type_id()
            ))),
        }
    }
}

impl fmt::Debug for PatternSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(t) => f.debug_tuple("Template").field(t).finish(),
            Self::Regex(re) => f.debug_tuple("Regex").field(&re.as_str()).finish(),
            Self::RegexSource(s) => f.debug_tuple("RegexSource").field(s).finish(),
            Self::Custom(p) => f.debug_tuple("Custom").field(p).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

impl From<&str> for PatternSpec {
    fn from(template: &str) -> Self {
        Self::Template(template.to_owned())
    }
}

impl From<String> for PatternSpec {
    fn from(template: String) -> Self {
        Self::Template(template)
    }
}

impl From<Regex> for PatternSpec {
    fn from(regex: Regex) -> Self {
        Self::Regex(regex)
    }
}

impl From<Arc<dyn Pattern>> for PatternSpec {
    fn from(pattern: Arc<dyn Pattern>) -> Self {
        Self::Custom(pattern)
    }
}

/// Compile a pattern spec.
///
/// # Errors
///
/// - [`CompileError::InvalidPatternSpec`]: unsupported spec type, or a template
///   capture segment with an empty name (`"/users/:"`).
/// - [`CompileError::InvalidRegex`]: the regular expression does not parse.
///
/// # Examples
///
/// ```
/// use rttp_web::pattern::compile;
///
/// let pattern = compile("/hello/:name").unwrap();
/// let params = pattern.matches("/hello/carl").unwrap();
/// assert_eq!(params.get("name"), Some("carl"));
/// assert!(pattern.matches("/hello/carl/extra").is_none());
/// ```
pub fn compile(spec: impl Into<PatternSpec>) -> Result<Arc<dyn Pattern>, CompileError> {
    let spec = match spec.into() {
        PatternSpec::Dynamic(value) => PatternSpec::from_any(value)?,
        spec => spec,
    };

    let pattern: Arc<dyn Pattern> = match spec {
        PatternSpec::Template(template) => Arc::new(TemplatePattern::parse(&template)?),
        PatternSpec::Regex(regex) => Arc::new(RegexPattern::from_regex(regex)),
        PatternSpec::RegexSource(source) => Arc::new(RegexPattern::parse(&source)?),
        PatternSpec::Custom(pattern) => pattern,
        PatternSpec::Dynamic(_) => {
            return Err(CompileError::InvalidPatternSpec(
                "nested dynamic pattern spec".to_owned(),
            ));
        }
    };

    debug!(pattern = ?pattern, prefix = pattern.prefix(), "compiled route pattern");
    Ok(pattern)
}
