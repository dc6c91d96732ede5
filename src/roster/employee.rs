//! Employee record

use serde::{Deserialize, Serialize};

/// A single employee profile.
///
/// Records are validated once at load time and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    /// Unique id within the roster
    pub id: u64,
    /// Display name
    pub name: String,
    /// Skills in the order they were listed
    pub skills: Vec<String>,
    /// Years of professional experience
    pub experience_years: u32,
    /// Past projects in the order they were listed
    pub projects: Vec<String>,
    /// Free-text availability (e.g. "available", "busy")
    pub availability: String,
}

impl Employee {
    /// Render the profile text that gets embedded for this employee.
    pub fn profile_text(&self) -> String {
        format!(
            "{} has {} years of experience with skills {} and worked on projects: {}",
            self.name,
            self.experience_years,
            self.skills.join(", "),
            self.projects.join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Employee {
        Employee {
            id: 1,
            name: "Alice".into(),
            skills: vec!["Python".into(), "ML".into()],
            experience_years: 5,
            projects: vec!["Recsys".into(), "Churn model".into()],
            availability: "available".into(),
        }
    }

    #[test]
    fn test_profile_text_uses_fixed_phrasing() {
        assert_eq!(
            alice().profile_text(),
            "Alice has 5 years of experience with skills Python, ML and worked on projects: Recsys, Churn model"
        );
    }

    #[test]
    fn test_profile_text_with_empty_lists() {
        let emp = Employee {
            skills: Vec::new(),
            projects: Vec::new(),
            ..alice()
        };
        assert_eq!(
            emp.profile_text(),
            "Alice has 5 years of experience with skills  and worked on projects: "
        );
    }

    #[test]
    fn test_serde_field_names() {
        let json = serde_json::to_value(alice()).unwrap();
        assert_eq!(json["experience_years"], 5);
        assert_eq!(json["skills"][1], "ML");
        assert_eq!(json["availability"], "available");
    }
}
