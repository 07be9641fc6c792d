//! Path pattern matching.
//!
//! # Responsibilities
//! - Parse patterns made of literal and `{name}` segments
//! - Match a request path segment by segment, binding parameters
//! - Rank two matching patterns by specificity
//!
//! # Design Decisions
//! - Segment counts must be equal: `/test/{p}` matches neither `/test` nor `/test/a/b`
//! - An empty path segment never binds a parameter
//! - Path matching is case-sensitive
//! - No regex to guarantee O(n) matching

use std::cmp::Ordering;
use std::fmt;

/// One segment of a route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Parameters bound while matching a path, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(Vec<(String, String)>);

impl PathParams {
    /// Value bound to `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Error for a malformed pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternError {
    pub pattern: String,
    pub message: &'static str,
}

impl fmt::Display for PatternError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid route pattern '{}': {}", self.pattern, self.message)
    }
}

impl std::error::Error for PatternError {}

/// A compiled path pattern such as `/test/{param}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

fn is_brace(c: char) -> bool {
    c == '{' || c == '}'
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.strip_prefix('/').unwrap_or(path).split('/')
}

impl RoutePattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let error = |message| PatternError {
            pattern: pattern.to_string(),
            message,
        };
        if !pattern.starts_with('/') {
            return Err(error("must start with '/'"));
        }

        let mut segments = Vec::new();
        for part in split_path(pattern) {
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(name) if name.is_empty() => return Err(error("empty parameter name")),
                Some(name) if name.contains(is_brace) => {
                    return Err(error("nested braces in parameter"))
                }
                Some(name) => {
                    let duplicate = segments
                        .iter()
                        .any(|s| matches!(s, Segment::Param(existing) if existing == name));
                    if duplicate {
                        return Err(error("duplicate parameter name"));
                    }
                    Segment::Param(name.to_string())
                }
                None if part.contains(is_brace) => {
                    return Err(error("parameters must span a whole segment"))
                }
                None => Segment::Literal(part.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Match `path`, returning the bound parameters.
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let mut params = Vec::new();
        let mut parts = split_path(path);

        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => params.push((name.clone(), part.to_string())),
            }
        }
        if parts.next().is_some() {
            return None;
        }
        Some(PathParams(params))
    }

    /// Order two patterns by specificity: at the first position where one
    /// has a literal and the other a parameter, the literal wins.
    pub fn specificity(&self, other: &Self) -> Ordering {
        for (mine, theirs) in self.segments.iter().zip(&other.segments) {
            match (mine, theirs) {
                (Segment::Literal(_), Segment::Param(_)) => return Ordering::Greater,
                (Segment::Param(_), Segment::Literal(_)) => return Ordering::Less,
                _ => {}
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_binds_exact_segment() {
        let pattern = RoutePattern::parse("/test/{param}").unwrap();
        let params = pattern.matches("/test/World").unwrap();
        assert_eq!(params.get("param"), Some("World"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn segment_count_must_match() {
        let pattern = RoutePattern::parse("/test/{param}").unwrap();
        assert!(pattern.matches("/test/xyz").is_some());
        assert!(pattern.matches("/test").is_none());
        assert!(pattern.matches("/test/xyz/extra").is_none());
        assert!(pattern.matches("/test/").is_none());
    }

    #[test]
    fn literals_are_case_sensitive() {
        let pattern = RoutePattern::parse("/api/users").unwrap();
        assert!(pattern.matches("/api/users").is_some());
        assert!(pattern.matches("/API/users").is_none());
    }

    #[test]
    fn root_pattern() {
        let root = RoutePattern::parse("/").unwrap();
        assert!(root.matches("/").is_some());
        assert!(root.matches("/a").is_none());
    }

    #[test]
    fn literal_outranks_param() {
        let literal = RoutePattern::parse("/users/me").unwrap();
        let param = RoutePattern::parse("/users/{id}").unwrap();
        assert_eq!(literal.specificity(&param), Ordering::Greater);
        assert_eq!(param.specificity(&literal), Ordering::Less);

        let other = RoutePattern::parse("/users/{name}").unwrap();
        assert_eq!(param.specificity(&other), Ordering::Equal);
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        for bad in ["test", "/a/{}", "/a/{x}{y}", "/a/pre{x}", "/{x}/{x}"] {
            assert!(RoutePattern::parse(bad).is_err(), "{bad} should be rejected");
        }
    }
}
