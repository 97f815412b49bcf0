//! Taint source, sink, and sanitizer matchers.
//!
//! Sources and sinks are configuration, not derived from the code under
//! analysis: each is a pattern over callee/attribute texts plus a kind
//! category. The built-in tables cover the Python and JavaScript web
//! stacks the fixture corpus exercises; user configuration replaces or
//! extends them.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{HoundError, Result};

// =============================================================================
// Matching
// =============================================================================

/// Matching strategy for a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrategy {
    /// Exact string match
    Exact,
    /// Input starts with the pattern
    Prefix,
    /// Input ends with the pattern
    Suffix,
    /// Pattern appears anywhere in the input
    Contains,
    /// Regex match
    Regex,
}

/// A compiled pattern matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Matcher {
    /// The pattern text
    pub pattern: String,
    /// How the pattern is applied
    pub strategy: MatchStrategy,
    /// Compiled regex for the Regex strategy
    #[serde(skip)]
    compiled: Option<Regex>,
}

impl Matcher {
    #[must_use]
    pub fn exact(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            strategy: MatchStrategy::Exact,
            compiled: None,
        }
    }

    #[must_use]
    pub fn prefix(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            strategy: MatchStrategy::Prefix,
            compiled: None,
        }
    }

    #[must_use]
    pub fn suffix(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            strategy: MatchStrategy::Suffix,
            compiled: None,
        }
    }

    #[must_use]
    pub fn contains(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            strategy: MatchStrategy::Contains,
            compiled: None,
        }
    }

    /// Create a regex matcher, failing on an invalid pattern.
    pub fn regex(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let compiled = Regex::new(&pattern)
            .map_err(|e| HoundError::Config(format!("invalid matcher regex `{pattern}`: {e}")))?;
        Ok(Self {
            pattern,
            strategy: MatchStrategy::Regex,
            compiled: Some(compiled),
        })
    }

    /// Compile the regex after deserialization. No-op for non-regex
    /// strategies; fails fast so malformed config is a startup error.
    pub fn compile(&mut self) -> Result<()> {
        if self.strategy == MatchStrategy::Regex && self.compiled.is_none() {
            self.compiled = Some(Regex::new(&self.pattern).map_err(|e| {
                HoundError::Config(format!("invalid matcher regex `{}`: {e}", self.pattern))
            })?);
        }
        Ok(())
    }

    /// Check whether an input matches this pattern.
    #[must_use]
    pub fn matches(&self, input: &str) -> bool {
        match self.strategy {
            MatchStrategy::Exact => input == self.pattern,
            MatchStrategy::Prefix => input.starts_with(&self.pattern),
            MatchStrategy::Suffix => input.ends_with(&self.pattern),
            MatchStrategy::Contains => input.contains(&self.pattern),
            MatchStrategy::Regex => self
                .compiled
                .as_ref()
                .is_some_and(|r| r.is_match(input)),
        }
    }
}

// =============================================================================
// Specs
// =============================================================================

/// A taint source: a program point where untrusted data enters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    #[serde(flatten)]
    pub matcher: Matcher,
    /// Category of the entering data (`user-input`, `environment`, ...)
    pub kind: String,
}

impl SourceSpec {
    #[must_use]
    pub fn new(matcher: Matcher, kind: impl Into<String>) -> Self {
        Self {
            matcher,
            kind: kind.into(),
        }
    }
}

/// A taint sink: a program point where tainted data constitutes a
/// vulnerability, mapped to the rule it violates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSpec {
    #[serde(flatten)]
    pub matcher: Matcher,
    /// Sink category (`sql-exec`, `shell-exec`, ...)
    pub kind: String,
    /// Rule id emitted when tainted data reaches this sink
    pub rule: String,
    /// Restrict to one argument position. SQL executors are dangerous in
    /// the query argument only: `execute(sql, params)` with tainted
    /// bind-params is the parameterized fix, not the bug.
    #[serde(default)]
    pub arg: Option<usize>,
}

impl SinkSpec {
    #[must_use]
    pub fn new(matcher: Matcher, kind: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            matcher,
            kind: kind.into(),
            rule: rule.into(),
            arg: None,
        }
    }

    /// Restrict the sink to a single argument position.
    #[must_use]
    pub fn at_arg(mut self, index: usize) -> Self {
        self.arg = Some(index);
        self
    }
}

/// A sanitizer: a call that stops taint propagation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanitizerSpec {
    #[serde(flatten)]
    pub matcher: Matcher,
}

impl SanitizerSpec {
    #[must_use]
    pub fn new(matcher: Matcher) -> Self {
        Self { matcher }
    }
}

// =============================================================================
// Built-in tables
// =============================================================================

/// Built-in taint sources for the Python and JavaScript web stacks.
#[must_use]
pub fn builtin_sources() -> Vec<SourceSpec> {
    vec![
        // Flask / generic request objects
        SourceSpec::new(Matcher::prefix("request.args"), "user-input"),
        SourceSpec::new(Matcher::prefix("request.form"), "user-input"),
        SourceSpec::new(Matcher::prefix("request.json"), "user-input"),
        SourceSpec::new(Matcher::prefix("request.data"), "user-input"),
        SourceSpec::new(Matcher::prefix("request.values"), "user-input"),
        SourceSpec::new(Matcher::prefix("request.headers"), "http-header"),
        SourceSpec::new(Matcher::prefix("request.cookies"), "cookie"),
        // Django
        SourceSpec::new(Matcher::prefix("request.GET"), "user-input"),
        SourceSpec::new(Matcher::prefix("request.POST"), "user-input"),
        SourceSpec::new(Matcher::prefix("request.body"), "user-input"),
        // FastAPI parameter bindings (matched against parameter exprs)
        SourceSpec::new(Matcher::prefix("Query("), "user-input"),
        SourceSpec::new(Matcher::prefix("Body("), "user-input"),
        SourceSpec::new(Matcher::prefix("Form("), "user-input"),
        SourceSpec::new(Matcher::prefix("Header("), "http-header"),
        SourceSpec::new(Matcher::prefix("Cookie("), "cookie"),
        // Standard library
        SourceSpec::new(Matcher::exact("input"), "stdin"),
        SourceSpec::new(Matcher::prefix("sys.stdin"), "stdin"),
        SourceSpec::new(Matcher::exact("sys.argv"), "process-args"),
        SourceSpec::new(Matcher::prefix("os.environ"), "environment"),
        SourceSpec::new(Matcher::exact("os.getenv"), "environment"),
        // Express / Node
        SourceSpec::new(Matcher::prefix("req.body"), "user-input"),
        SourceSpec::new(Matcher::prefix("req.query"), "user-input"),
        SourceSpec::new(Matcher::prefix("req.params"), "user-input"),
        SourceSpec::new(Matcher::prefix("req.headers"), "http-header"),
        SourceSpec::new(Matcher::prefix("process.env"), "environment"),
        SourceSpec::new(Matcher::exact("process.argv"), "process-args"),
    ]
}

/// Built-in taint sinks with their rule mappings.
#[must_use]
pub fn builtin_sinks() -> Vec<SinkSpec> {
    vec![
        // SQL execution
        SinkSpec::new(Matcher::suffix(".execute"), "sql-exec", "sql-injection").at_arg(0),
        SinkSpec::new(Matcher::suffix(".executemany"), "sql-exec", "sql-injection").at_arg(0),
        SinkSpec::new(Matcher::suffix(".executescript"), "sql-exec", "sql-injection"),
        SinkSpec::new(Matcher::suffix(".raw"), "sql-exec", "sql-injection"),
        SinkSpec::new(Matcher::suffix("db.query"), "sql-exec", "sql-injection"),
        // Shell execution
        SinkSpec::new(Matcher::prefix("os.system"), "shell-exec", "command-injection"),
        SinkSpec::new(Matcher::prefix("os.popen"), "shell-exec", "command-injection"),
        SinkSpec::new(Matcher::prefix("subprocess."), "shell-exec", "command-injection"),
        SinkSpec::new(Matcher::exact("child_process.exec"), "shell-exec", "command-injection"),
        // Code evaluation
        SinkSpec::new(Matcher::exact("eval"), "code-eval", "code-injection"),
        SinkSpec::new(Matcher::exact("exec"), "code-eval", "code-injection"),
        SinkSpec::new(Matcher::exact("compile"), "code-eval", "code-injection"),
        // Deserialization
        SinkSpec::new(Matcher::exact("pickle.loads"), "deserialize", "unsafe-deserialization"),
        SinkSpec::new(Matcher::exact("pickle.load"), "deserialize", "unsafe-deserialization"),
        SinkSpec::new(Matcher::exact("yaml.load"), "deserialize", "unsafe-deserialization"),
        SinkSpec::new(Matcher::exact("marshal.loads"), "deserialize", "unsafe-deserialization"),
        // Outbound requests with attacker-controlled URLs
        SinkSpec::new(Matcher::prefix("requests.get"), "url-fetch", "ssrf"),
        SinkSpec::new(Matcher::prefix("requests.post"), "url-fetch", "ssrf"),
        SinkSpec::new(Matcher::prefix("urllib.request.urlopen"), "url-fetch", "ssrf"),
        SinkSpec::new(Matcher::exact("fetch"), "url-fetch", "ssrf"),
        SinkSpec::new(Matcher::prefix("axios."), "url-fetch", "ssrf"),
        // Filesystem paths
        SinkSpec::new(Matcher::exact("open"), "path-open", "path-traversal"),
        SinkSpec::new(Matcher::prefix("os.remove"), "path-open", "path-traversal"),
        SinkSpec::new(Matcher::prefix("shutil."), "path-open", "path-traversal"),
        SinkSpec::new(Matcher::prefix("fs.readFile"), "path-open", "path-traversal"),
        // Template rendering / markup
        SinkSpec::new(Matcher::suffix("Template"), "template-render", "template-injection"),
        SinkSpec::new(Matcher::suffix(".render_template_string"), "template-render", "template-injection"),
        SinkSpec::new(Matcher::suffix(".innerHTML"), "html-render", "xss"),
        SinkSpec::new(Matcher::suffix("document.write"), "html-render", "xss"),
    ]
}

/// Built-in sanitizers that stop propagation.
#[must_use]
pub fn builtin_sanitizers() -> Vec<SanitizerSpec> {
    vec![
        SanitizerSpec::new(Matcher::suffix("escape")),
        SanitizerSpec::new(Matcher::suffix(".quote")),
        SanitizerSpec::new(Matcher::exact("shlex.quote")),
        SanitizerSpec::new(Matcher::exact("html.escape")),
        SanitizerSpec::new(Matcher::exact("int")),
        SanitizerSpec::new(Matcher::exact("float")),
        SanitizerSpec::new(Matcher::exact("bool")),
        SanitizerSpec::new(Matcher::exact("parseInt")),
        SanitizerSpec::new(Matcher::exact("encodeURIComponent")),
    ]
}
