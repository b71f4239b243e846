//! Textual element paths: `ax://system/...`, `ax://focused/...`, `app://<id>/...`.

use crate::element::{ATTR_DESCRIPTION, ATTR_IDENTIFIER, ATTR_ROLE, ATTR_TITLE, ATTR_VALUE};
use crate::errors::AutomationError;
use crate::snapshot::ElementSnapshot;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub const WILDCARD_ROLE: &str = "*";

/// Where resolution starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RootSelector {
    SystemWide,
    FocusedApplication,
    /// Bundle id, localized name, or pid
    Application(String),
}

impl fmt::Display for RootSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RootSelector::SystemWide => f.write_str("ax://system"),
            RootSelector::FocusedApplication => f.write_str("ax://focused"),
            RootSelector::Application(id) => write!(f, "app://{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchOp {
    Equals,
    Contains,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Predicate {
    /// Always the full `AX…` name
    pub attribute: String,
    pub op: MatchOp,
    pub value: String,
}

impl Predicate {
    pub fn equals(attribute: &str, value: impl Into<String>) -> Self {
        Self {
            attribute: normalize_attribute(attribute),
            op: MatchOp::Equals,
            value: value.into(),
        }
    }

    pub fn contains(attribute: &str, value: impl Into<String>) -> Self {
        Self {
            attribute: normalize_attribute(attribute),
            op: MatchOp::Contains,
            value: value.into(),
        }
    }

    pub fn matches(&self, actual: Option<&str>) -> bool {
        match (self.op, actual) {
            (_, None) => false,
            (MatchOp::Equals, Some(v)) => v == self.value,
            (MatchOp::Contains, Some(v)) => v.to_lowercase().contains(&self.value.to_lowercase()),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            MatchOp::Equals => "=",
            MatchOp::Contains => "~=",
        };
        write!(f, "[@{}{}\"{}\"]", self.attribute, op, escape(&self.value))
    }
}

/// One hierarchical step: a role matcher, attribute predicates and an optional index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    pub role: String,
    pub predicates: Vec<Predicate>,
    pub index: Option<usize>,
}

impl Segment {
    pub fn role(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            predicates: Vec::new(),
            index: None,
        }
    }

    pub fn any() -> Self {
        Self::role(WILDCARD_ROLE)
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.with_predicate(Predicate::equals(ATTR_TITLE, title))
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    pub fn matches_role(&self, role: &str) -> bool {
        if self.role == WILDCARD_ROLE || self.role == role {
            return true;
        }
        let want = self.role.strip_prefix("AX").unwrap_or(&self.role);
        let have = role.strip_prefix("AX").unwrap_or(role);
        want.eq_ignore_ascii_case(have)
    }

    /// Role plus every predicate; `lookup` returns an attribute's textual value.
    pub fn matches<F>(&self, role: &str, lookup: F) -> bool
    where
        F: Fn(&str) -> Option<String>,
    {
        self.matches_role(role)
            && self
                .predicates
                .iter()
                .all(|p| p.matches(lookup(&p.attribute).as_deref()))
    }

    pub fn matches_snapshot(&self, node: &ElementSnapshot) -> bool {
        self.matches(&node.role, |name| node.lookup(name))
    }

    /// Nodes among `candidates` this segment selects, before the index is applied.
    pub fn filter_snapshots<'a>(
        &self,
        candidates: &'a [Arc<ElementSnapshot>],
    ) -> Vec<&'a Arc<ElementSnapshot>> {
        candidates
            .iter()
            .filter(|c| self.matches_snapshot(c))
            .collect()
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.role)?;
        for predicate in &self.predicates {
            write!(f, "{predicate}")?;
        }
        if let Some(index) = self.index {
            write!(f, "[{index}]")?;
        }
        Ok(())
    }
}

/// An immutable path query. Its `Display` form is canonical and doubles as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementPath {
    root: RootSelector,
    segments: Vec<Segment>,
}

impl ElementPath {
    pub fn new(root: RootSelector, segments: Vec<Segment>) -> Self {
        Self { root, segments }
    }

    pub fn parse(input: &str) -> Result<Self, AutomationError> {
        PathParser::new(input).parse()
    }

    pub fn root(&self) -> &RootSelector {
        &self.root
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn child(&self, segment: Segment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self {
            root: self.root.clone(),
            segments,
        }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            root: self.root.clone(),
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn cache_key(&self) -> String {
        self.to_string()
    }

    /// Shortest path from the snapshot root to `node`; at each level adds the role, then a
    /// title predicate, then an index until the node is the only match among its siblings.
    pub fn for_snapshot(root: RootSelector, node: &Arc<ElementSnapshot>) -> Self {
        let chain = node.path_from_root();
        let mut segments = Vec::with_capacity(chain.len().saturating_sub(1));
        for pair in chain.windows(2) {
            let (parent, current) = (&pair[0], &pair[1]);
            segments.push(unique_segment(&parent.children, current));
        }
        Self { root, segments }
    }
}

fn unique_segment(siblings: &[Arc<ElementSnapshot>], node: &Arc<ElementSnapshot>) -> Segment {
    let mut segment = Segment::role(node.role.clone());
    if segment.filter_snapshots(siblings).len() == 1 {
        return segment;
    }
    if let Some(title) = node.title.as_deref().filter(|t| !t.is_empty()) {
        segment = segment.with_title(title);
        if segment.filter_snapshots(siblings).len() == 1 {
            return segment;
        }
    }
    let position = segment
        .filter_snapshots(siblings)
        .iter()
        .position(|s| Arc::ptr_eq(s, node))
        .unwrap_or(0);
    segment.with_index(position)
}

impl fmt::Display for ElementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for ElementPath {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for ElementPath {
    type Error = AutomationError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl Serialize for ElementPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ElementPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ElementPath::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// `title` → `AXTitle`, `id` → `AXIdentifier`; names already carrying `AX` are kept.
pub fn normalize_attribute(name: &str) -> String {
    if name.starts_with("AX") {
        return name.to_string();
    }
    match name.to_ascii_lowercase().as_str() {
        "title" => ATTR_TITLE.to_string(),
        "value" => ATTR_VALUE.to_string(),
        "description" | "desc" => ATTR_DESCRIPTION.to_string(),
        "identifier" | "id" => ATTR_IDENTIFIER.to_string(),
        "role" => ATTR_ROLE.to_string(),
        _ => {
            let mut chars = name.chars();
            match chars.next() {
                Some(first) => format!("AX{}{}", first.to_ascii_uppercase(), chars.as_str()),
                None => String::new(),
            }
        }
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

struct PathParser<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> PathParser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn error(&self, message: impl fmt::Display) -> AutomationError {
        AutomationError::InvalidPath(format!("{message} in `{}`", self.input))
    }

    fn parse(mut self) -> Result<ElementPath, AutomationError> {
        let trimmed = self.input.trim();
        let (root, rest) = if let Some(rest) = trimmed.strip_prefix("ax://") {
            let (selector, rest) = split_root(rest);
            let root = match selector {
                "system" => RootSelector::SystemWide,
                "focused" => RootSelector::FocusedApplication,
                other => return Err(self.error(format!("unknown root selector `{other}`"))),
            };
            (root, rest)
        } else if let Some(rest) = trimmed.strip_prefix("app://") {
            let (id, rest) = split_root(rest);
            if id.trim().is_empty() {
                return Err(self.error("missing application id"));
            }
            (RootSelector::Application(id.trim().to_string()), rest)
        } else {
            return Err(self.error("expected `ax://` or `app://` scheme"));
        };

        self.chars = rest.char_indices().peekable();
        let segments = self.parse_segments(rest)?;
        Ok(ElementPath { root, segments })
    }

    fn parse_segments(&mut self, rest: &str) -> Result<Vec<Segment>, AutomationError> {
        let mut segments = Vec::new();
        loop {
            // Skip the separator; a trailing slash is allowed.
            match self.chars.peek().copied() {
                None => break,
                Some((_, '/')) => {
                    self.chars.next();
                    if self.chars.peek().is_none() {
                        break;
                    }
                }
                Some((_, c)) => return Err(self.error(format!("unexpected `{c}`"))),
            }
            segments.push(self.parse_segment(rest)?);
        }
        Ok(segments)
    }

    fn parse_segment(&mut self, rest: &str) -> Result<Segment, AutomationError> {
        let start = self.chars.peek().map(|(i, _)| *i).unwrap_or(rest.len());
        let mut end = start;
        while let Some(&(i, c)) = self.chars.peek() {
            if c == '[' || c == '/' {
                break;
            }
            end = i + c.len_utf8();
            self.chars.next();
        }
        let role = rest[start..end].trim();
        if role.is_empty() {
            return Err(self.error("empty segment role"));
        }
        if role != WILDCARD_ROLE && !role.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(self.error(format!("invalid role `{role}`")));
        }

        let mut segment = Segment::role(role);
        while let Some(&(_, '[')) = self.chars.peek() {
            self.chars.next();
            match self.chars.peek().copied() {
                Some((_, '@')) => {
                    self.chars.next();
                    segment.predicates.push(self.parse_predicate(rest)?);
                }
                Some((_, c)) if c.is_ascii_digit() => {
                    if segment.index.is_some() {
                        return Err(self.error("segment has more than one index"));
                    }
                    segment.index = Some(self.parse_index()?);
                }
                _ => return Err(self.error("expected `@attr` or an index after `[`")),
            }
        }
        Ok(segment)
    }

    fn parse_predicate(&mut self, rest: &str) -> Result<Predicate, AutomationError> {
        let start = self.chars.peek().map(|(i, _)| *i).unwrap_or(rest.len());
        let mut end = start;
        while let Some(&(i, c)) = self.chars.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            end = i + 1;
            self.chars.next();
        }
        let name = &rest[start..end];
        if name.is_empty() {
            return Err(self.error("empty attribute name"));
        }

        let op = match self.chars.next() {
            Some((_, '=')) => MatchOp::Equals,
            Some((_, '~')) => match self.chars.next() {
                Some((_, '=')) => MatchOp::Contains,
                _ => return Err(self.error("expected `=` after `~`")),
            },
            _ => return Err(self.error(format!("expected `=` or `~=` after `@{name}`"))),
        };

        if !matches!(self.chars.next(), Some((_, '"'))) {
            return Err(self.error("attribute value must be quoted"));
        }
        let mut value = String::new();
        loop {
            match self.chars.next() {
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, c @ ('"' | '\\'))) => value.push(c),
                    Some((_, c)) => return Err(self.error(format!("invalid escape `\\{c}`"))),
                    None => return Err(self.error("unterminated escape")),
                },
                Some((_, '"')) => break,
                Some((_, c)) => value.push(c),
                None => return Err(self.error("unterminated attribute value")),
            }
        }
        self.expect_close()?;

        Ok(Predicate {
            attribute: normalize_attribute(name),
            op,
            value,
        })
    }

    fn parse_index(&mut self) -> Result<usize, AutomationError> {
        let mut digits = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            digits.push(c);
            self.chars.next();
        }
        self.expect_close()?;
        digits
            .parse::<usize>()
            .map_err(|e| self.error(format!("invalid index `{digits}`: {e}")))
    }

    fn expect_close(&mut self) -> Result<(), AutomationError> {
        match self.chars.next() {
            Some((_, ']')) => Ok(()),
            _ => Err(self.error("expected `]`")),
        }
    }
}

/// Split `"<root>/<rest>"` at the first slash; `rest` keeps its leading slash.
fn split_root(s: &str) -> (&str, &str) {
    match s.find('/') {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}
