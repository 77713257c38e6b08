//! Element paths of the form `base-config/trust-anchors/certificates[@src='user']`.

use super::{Element, XmlError};
use std::fmt;

/// One step of an [`ElementPath`]: a child name with an optional attribute predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    name: String,
    predicate: Option<(String, String)>,
}

impl Step {
    /// Step matching any child with this name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            predicate: None,
        }
    }

    /// Step matching a child with this name whose attribute equals `value`
    pub fn with_attr(name: impl Into<String>, attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            predicate: Some((attr.into(), value.into())),
        }
    }

    /// Element name this step selects
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `element` is selected by this step
    pub fn matches(&self, element: &Element) -> bool {
        if element.name() != self.name {
            return false;
        }
        match &self.predicate {
            None => true,
            Some((attr, value)) => element.attr(attr).is_some_and(|v| v == value.as_str()),
        }
    }

    /// Fresh element satisfying this step (predicate becomes an attribute)
    pub fn to_element(&self) -> Element {
        let element = Element::new(&self.name);
        match &self.predicate {
            Some((attr, value)) => element.with_attr(attr, value),
            None => element,
        }
    }

    fn parse(raw: &str) -> Result<Self, XmlError> {
        let invalid = || XmlError::InvalidPath(raw.to_string());
        let Some((name, rest)) = raw.split_once('[') else {
            if raw.is_empty() || raw.contains([']', '@', '=']) {
                return Err(invalid());
            }
            return Ok(Self::named(raw));
        };
        let inner = rest.strip_suffix(']').ok_or_else(invalid)?;
        let (attr, value) = inner
            .strip_prefix('@')
            .and_then(|p| p.split_once('='))
            .ok_or_else(invalid)?;
        let value = value
            .strip_prefix('\'')
            .and_then(|v| v.strip_suffix('\''))
            .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
            .ok_or_else(invalid)?;
        if name.is_empty() || attr.is_empty() {
            return Err(invalid());
        }
        Ok(Self::with_attr(name, attr, value))
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.predicate {
            Some((attr, value)) => write!(f, "{}[@{}='{}']", self.name, attr, value),
            None => f.write_str(&self.name),
        }
    }
}

/// Relative path from an element to one of its descendants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementPath {
    steps: Vec<Step>,
}

impl ElementPath {
    /// Parse a `/`-separated path; each step is `name` or `name[@attr='value']`
    pub fn parse(path: &str) -> Result<Self, XmlError> {
        let steps = path
            .split('/')
            .map(Step::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { steps })
    }

    /// Steps in order from the context element downwards
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

impl From<Vec<Step>> for ElementPath {
    fn from(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}

impl fmt::Display for ElementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            write!(f, "{step}")?;
        }
        Ok(())
    }
}
