//! Employee roster loading.
//!
//! The roster is read once from a JSON document of the form
//! `{"employees": [...]}`. Any malformed record fails the whole load.

mod employee;

pub use employee::Employee;

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct RosterDocument {
    employees: Vec<Employee>,
}

/// Ordered, immutable collection of employees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    employees: Vec<Employee>,
}

impl Roster {
    /// Build a roster from already-typed records, applying load-time validation.
    pub fn new(employees: Vec<Employee>) -> Result<Self> {
        if employees.is_empty() {
            return Err(Error::DataLoad("roster contains no employees".into()));
        }

        let mut seen = HashSet::with_capacity(employees.len());
        for (position, emp) in employees.iter().enumerate() {
            if !seen.insert(emp.id) {
                return Err(Error::DataLoad(format!(
                    "duplicate employee id {} at position {}",
                    emp.id, position
                )));
            }
            if emp.name.trim().is_empty() {
                return Err(Error::DataLoad(format!(
                    "employee id {} has a blank name",
                    emp.id
                )));
            }
        }

        Ok(Self { employees })
    }

    /// Load a roster from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Reading roster");

        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::DataLoad(format!("cannot read {}: {}", path.display(), e))
        })?;

        let roster = Self::from_json_str(&text)
            .map_err(|e| Error::DataLoad(format!("{}: {}", path.display(), strip_prefix(&e))))?;

        info!(
            path = %path.display(),
            employees = roster.len(),
            "Roster loaded"
        );
        Ok(roster)
    }

    /// Parse a roster from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let doc: RosterDocument = serde_json::from_str(text)
            .map_err(|e| Error::DataLoad(format!("invalid roster document: {}", e)))?;
        Self::new(doc.employees)
    }

    /// Employees in roster order.
    pub fn employees(&self) -> &[Employee] {
        &self.employees
    }

    /// Employee at a roster position.
    pub fn get(&self, position: usize) -> Option<&Employee> {
        self.employees.get(position)
    }

    pub fn len(&self) -> usize {
        self.employees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.employees.is_empty()
    }

    /// Profile texts, positionally aligned with [`Roster::employees`].
    pub fn profile_texts(&self) -> Vec<String> {
        self.employees.iter().map(Employee::profile_text).collect()
    }
}

fn strip_prefix(err: &Error) -> String {
    match err {
        Error::DataLoad(msg) => msg.clone(),
        other => other.to_string(),
    }
}
