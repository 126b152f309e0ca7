//! Filters and partial updates over JSON documents

use serde_json::Value;

use super::{Document, StoreError, StoreResult};

/// Predicate on a single (dotted) field
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// JSON equality. `Null` also matches an absent field.
    Eq(Value),
    /// Numeric strictly-greater-than
    Gt(f64),
}

/// Conjunction of field conditions. The empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<(String, Condition)>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorthand for a single equality clause
    pub fn by(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().eq(path, value)
    }

    pub fn eq(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((path.into(), Condition::Eq(value.into())));
        self
    }

    pub fn gt(mut self, path: impl Into<String>, value: impl Into<f64>) -> Self {
        self.clauses.push((path.into(), Condition::Gt(value.into())));
        self
    }

    pub fn clauses(&self) -> &[(String, Condition)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|(path, cond)| {
            let field = lookup(doc, path);
            match cond {
                Condition::Eq(Value::Null) => field.map_or(true, Value::is_null),
                Condition::Eq(expected) => field == Some(expected),
                Condition::Gt(bound) => field
                    .and_then(Value::as_f64)
                    .map_or(false, |v| v > *bound),
            }
        })
    }

    /// Seed document for an upsert: every non-null equality clause
    pub fn seed(&self) -> Document {
        let mut doc = Document::new();
        for (path, cond) in &self.clauses {
            if let Condition::Eq(value) = cond {
                if !value.is_null() {
                    set_path(&mut doc, path, value.clone());
                }
            }
        }
        doc
    }
}

/// `$set` / `$inc` style partial update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    set: Vec<(String, Value)>,
    inc: Vec<(String, i64)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.push((path.into(), value.into()));
        self
    }

    pub fn inc(mut self, path: impl Into<String>, by: i64) -> Self {
        self.inc.push((path.into(), by));
        self
    }

    pub fn sets(&self) -> &[(String, Value)] {
        &self.set
    }

    pub fn incs(&self) -> &[(String, i64)] {
        &self.inc
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.inc.is_empty()
    }

    /// Apply in place. Sets run before increments.
    pub fn apply(&self, doc: &mut Document) -> StoreResult<()> {
        for (path, value) in &self.set {
            set_path(doc, path, value.clone());
        }
        for (path, by) in &self.inc {
            let current = match lookup(doc, path) {
                None | Some(Value::Null) => 0,
                Some(v) => v.as_i64().ok_or_else(|| {
                    StoreError::InvalidQuery(format!("cannot increment non-integer field '{}'", path))
                })?,
            };
            set_path(doc, path, Value::from(current + by));
        }
        Ok(())
    }
}

pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn set_path(doc: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !entry.is_object() {
                *entry = Value::Object(Document::new());
            }
            if let Value::Object(inner) = entry {
                set_path(inner, rest, value);
            }
        }
    }
}
