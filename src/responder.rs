//! Renders retrieval results as a chat reply.

use crate::roster::Employee;

/// Reply used when retrieval returns nothing.
pub const NO_MATCH_RESPONSE: &str =
    "Sorry, I couldn't find any employees matching your requirements.";

const CLOSING_LINE: &str = "Would you like more details about any of these candidates?";

/// Format matched employees, best first, as a human-readable summary.
pub fn format(matches: &[Employee], query: &str) -> String {
    if matches.is_empty() {
        return NO_MATCH_RESPONSE.to_string();
    }

    let noun = if matches.len() == 1 {
        "candidate"
    } else {
        "candidates"
    };
    let mut out = format!(
        "Based on your query '{}', I found {} suitable {}:\n\n",
        query,
        matches.len(),
        noun
    );

    for emp in matches {
        out.push_str(&format!(
            "**{}**:\n- Experience: {} years\n- Skills: {}\n- Past Projects: {}\n- Availability: {}\n\n",
            emp.name,
            emp.experience_years,
            emp.skills.join(", "),
            emp.projects.join(", "),
            capitalize_first(&emp.availability)
        ));
    }

    out.push_str(CLOSING_LINE);
    out
}

/// Upper-case the first character and leave the rest untouched.
pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
