//! # Pattern Query Module
//!
//! Single-triple pattern matching with variable binding.
//!
//! - Any term may be a variable: `?` (anonymous) or `?name`
//! - Anonymous variables bind under their position name
//!   (`subject`, `predicate`, `object`)
//! - A variable repeated across positions must bind the same value
//! - One pattern per query: no joins, no inference
//!
//! Index selection lives here (`Pattern::strategy`); the fact store owns the
//! indices and feeds candidates back through `Pattern::bind`.

use crate::primitives::VARIABLE_MARKER;
use crate::{FactgraphError, Predicate, Ref};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const SUBJECT: &str = "subject";
const PREDICATE: &str = "predicate";
const OBJECT: &str = "object";

/// One position of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term<T> {
    /// Must match exactly.
    Bound(T),
    /// Binds whatever matches. `None` is the anonymous `?`.
    Var(Option<String>),
}

impl<T> Term<T> {
    /// The bound value, if any.
    #[must_use]
    pub fn bound(&self) -> Option<&T> {
        match self {
            Self::Bound(v) => Some(v),
            Self::Var(_) => None,
        }
    }

    #[must_use]
    pub fn is_var(&self) -> bool {
        matches!(self, Self::Var(_))
    }

    /// The key under which this term binds, if it is a variable.
    fn binding_key<'a>(&'a self, position: &'a str) -> Option<&'a str> {
        match self {
            Self::Bound(_) => None,
            Self::Var(Some(name)) => Some(name),
            Self::Var(None) => Some(position),
        }
    }
}

/// Parse the variable part of a raw term. Returns `None` for a non-variable.
fn parse_var(raw: &str) -> Result<Option<Option<String>>, FactgraphError> {
    let Some(name) = raw.strip_prefix(VARIABLE_MARKER) else {
        return Ok(None);
    };
    if name.is_empty() {
        return Ok(Some(None));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(FactgraphError::InvalidPattern(raw.to_string()));
    }
    Ok(Some(Some(name.to_string())))
}

impl Term<Ref> {
    /// Parse a subject/object term: a variable or a `namespace:id` reference.
    pub fn parse_ref(raw: &str) -> Result<Self, FactgraphError> {
        match parse_var(raw)? {
            Some(var) => Ok(Self::Var(var)),
            None => Ref::parse(raw).map(Self::Bound),
        }
    }
}

impl Term<Predicate> {
    /// Parse a predicate term: a variable or a predicate.
    pub fn parse_predicate(raw: &str) -> Result<Self, FactgraphError> {
        match parse_var(raw)? {
            Some(var) => Ok(Self::Var(var)),
            None => Predicate::new(raw).map(Self::Bound),
        }
    }
}

/// Variable bindings produced by one match.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bindings(BTreeMap<String, String>);

impl Bindings {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Bind `key` to `value`, rejecting a conflicting earlier binding.
    fn bind(&mut self, key: &str, value: String) -> bool {
        match self.0.get(key) {
            Some(existing) => *existing == value,
            None => {
                self.0.insert(key.to_string(), value);
                true
            }
        }
    }
}

impl fmt::Display for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", k, v)?;
        }
        f.write_str("}")
    }
}

/// Which index resolves a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// All three bound: zero or one match.
    Exists,
    /// Subject bound: forward index, then filter.
    BySubject,
    /// Object bound, subject free: inverse index, then filter.
    ByObject,
    /// Only the predicate bound: linear scan.
    ByPredicate,
    /// Nothing bound: every fact.
    FullScan,
}

/// A single triple pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub subject: Term<Ref>,
    pub predicate: Term<Predicate>,
    pub object: Term<Ref>,
}

impl Pattern {
    /// Parse three raw terms. A malformed bound term is a validation error.
    pub fn parse(subject: &str, predicate: &str, object: &str) -> Result<Self, FactgraphError> {
        Ok(Self {
            subject: Term::parse_ref(subject)?,
            predicate: Term::parse_predicate(predicate)?,
            object: Term::parse_ref(object)?,
        })
    }

    #[must_use]
    pub fn strategy(&self) -> Strategy {
        match (&self.subject, &self.predicate, &self.object) {
            (Term::Bound(_), Term::Bound(_), Term::Bound(_)) => Strategy::Exists,
            (Term::Bound(_), _, _) => Strategy::BySubject,
            (Term::Var(_), _, Term::Bound(_)) => Strategy::ByObject,
            (Term::Var(_), Term::Bound(_), Term::Var(_)) => Strategy::ByPredicate,
            (Term::Var(_), Term::Var(_), Term::Var(_)) => Strategy::FullScan,
        }
    }

    /// Match one candidate fact. Returns the bindings, or `None` when a bound
    /// term differs or a repeated variable would bind two different values.
    #[must_use]
    pub fn bind(&self, subject: &Ref, predicate: &Predicate, object: &Ref) -> Option<Bindings> {
        if self.subject.bound().is_some_and(|s| s != subject)
            || self.predicate.bound().is_some_and(|p| p != predicate)
            || self.object.bound().is_some_and(|o| o != object)
        {
            return None;
        }

        let mut bindings = Bindings::default();
        if let Some(key) = self.subject.binding_key(SUBJECT)
            && !bindings.bind(key, subject.to_string())
        {
            return None;
        }
        if let Some(key) = self.predicate.binding_key(PREDICATE)
            && !bindings.bind(key, predicate.to_string())
        {
            return None;
        }
        if let Some(key) = self.object.binding_key(OBJECT)
            && !bindings.bind(key, object.to_string())
        {
            return None;
        }
        Some(bindings)
    }
}

// =============================================================================
// TESTS
// =============================================================================
