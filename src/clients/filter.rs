//! Client listing filters.
//!
//! Values are compared case-insensitively and may contain `*` wildcards,
//! so `Col*` works as a prefix match.

use crate::clients::client_session::ClientSession;
use log::warn;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagsOperator {
    And,
    #[default]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// A value pattern: exact (case-insensitive) or wildcard.
#[derive(Debug, Clone)]
pub struct ValuePattern {
    raw: String,
    regex: Option<Regex>,
}

impl ValuePattern {
    pub fn new<S: Into<String>>(raw: S) -> Self {
        let raw = raw.into();
        let regex = if raw.contains('*') {
            let pattern = format!("(?i)^{}$", regex::escape(&raw).replace(r"\*", ".*?"));
            match Regex::new(&pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("Falling back to exact match for pattern {:?}: {}", raw, e);
                    None
                }
            }
        } else {
            None
        };
        Self { raw, regex }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self.regex {
            Some(ref re) => re.is_match(value),
            None => self.raw.eq_ignore_ascii_case(value),
        }
    }
}

/// `key:value` label expression, e.g. `city:Cologne` or `city:Col*`.
#[derive(Debug, Clone)]
pub struct LabelMatcher {
    key: String,
    value: ValuePattern,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidLabelExpression(pub String);

impl fmt::Display for InvalidLabelExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "label filter must look like key:value, got {:?}", self.0)
    }
}

impl std::error::Error for InvalidLabelExpression {}

impl FromStr for LabelMatcher {
    type Err = InvalidLabelExpression;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once(':')
            .ok_or_else(|| InvalidLabelExpression(s.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(InvalidLabelExpression(s.to_string()));
        }
        Ok(Self {
            key: key.to_string(),
            value: ValuePattern::new(value.trim()),
        })
    }
}

impl LabelMatcher {
    fn matches(&self, session: &ClientSession) -> bool {
        session
            .labels
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case(&self.key) && self.value.matches(v))
    }
}

/// Criteria for [`ClientSessionRegistry::list`](crate::clients::ClientSessionRegistry::list).
///
/// Empty criteria match everything; all set criteria must match.
#[derive(Debug, Clone, Default)]
pub struct ClientFilter {
    pub tags: Vec<ValuePattern>,
    pub tags_operator: TagsOperator,
    pub connection: Option<ConnectionState>,
    pub labels: Vec<LabelMatcher>,
    pub client_auth_id: Option<String>,
}

impl ClientFilter {
    pub fn with_tags<I, S>(mut self, tags: I, operator: TagsOperator) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(ValuePattern::new).collect();
        self.tags_operator = operator;
        self
    }

    pub fn with_connection(mut self, state: ConnectionState) -> Self {
        self.connection = Some(state);
        self
    }

    pub fn with_label(mut self, label: LabelMatcher) -> Self {
        self.labels.push(label);
        self
    }

    pub fn matches(&self, session: &ClientSession) -> bool {
        match self.connection {
            Some(ConnectionState::Connected) if !session.is_connected() => return false,
            Some(ConnectionState::Disconnected) if session.is_connected() => return false,
            _ => {}
        }
        if let Some(ref auth_id) = self.client_auth_id {
            if &session.client_auth_id != auth_id {
                return false;
            }
        }
        if !self.tags.is_empty() {
            let has = |p: &ValuePattern| session.tags.iter().any(|t| p.matches(t));
            let ok = match self.tags_operator {
                TagsOperator::And => self.tags.iter().all(has),
                TagsOperator::Or => self.tags.iter().any(has),
            };
            if !ok {
                return false;
            }
        }
        self.labels.iter().all(|l| l.matches(session))
    }
}
