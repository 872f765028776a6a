//! Input requirements - ordered `name → (concept, multiplicity)` contracts

use std::sync::Arc;

use serde::Serialize;

use crate::concept::Concept;

use super::multiplicity::Multiplicity;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputRequirement {
    pub concept: Arc<Concept>,
    pub multiplicity: Option<Multiplicity>,
}

impl InputRequirement {
    pub fn new(concept: Arc<Concept>) -> Self {
        Self {
            concept,
            multiplicity: None,
        }
    }

    pub fn with_multiplicity(mut self, multiplicity: Option<Multiplicity>) -> Self {
        self.multiplicity = multiplicity;
        self
    }

    pub fn is_multiple(&self) -> bool {
        self.multiplicity.is_some_and(|m| m.is_multiple())
    }
}

/// Declared inputs of a pipe, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PipeInputs {
    entries: Vec<(String, InputRequirement)>,
}

impl PipeInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a requirement, keeping the first position
    pub fn insert(&mut self, name: impl Into<String>, requirement: InputRequirement) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = requirement,
            None => self.entries.push((name, requirement)),
        }
    }

    /// Add only when absent
    pub fn insert_if_absent(&mut self, name: &str, requirement: &InputRequirement) {
        if !self.contains(name) {
            self.entries.push((name.to_string(), requirement.clone()));
        }
    }

    pub fn get(&self, name: &str) -> Option<&InputRequirement> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn remove(&mut self, name: &str) -> Option<InputRequirement> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &InputRequirement)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, InputRequirement)> for PipeInputs {
    fn from_iter<T: IntoIterator<Item = (String, InputRequirement)>>(iter: T) -> Self {
        let mut inputs = Self::new();
        for (name, requirement) in iter {
            inputs.insert(name, requirement);
        }
        inputs
    }
}
