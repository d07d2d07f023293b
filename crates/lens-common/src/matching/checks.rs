use lazy_static::lazy_static;
use regex::Regex;

use crate::schema::{ParsedPayload, Requirement, RequirementKind};

lazy_static! {
    static ref NUMBER_RE: Regex = Regex::new(r"(\d+(?:\.\d+)?)").unwrap();
    // "4 years", "4+ yrs", "3.5 years"
    static ref YEARS_RE: Regex = Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*\+?\s*(?:years?|yrs?)").unwrap();
}

#[derive(Debug, Clone)]
pub struct CheckResult {
    pub value: String,
    pub kind: RequirementKind,
    pub required: bool,
    pub met: bool,
    pub detail: String,
}

fn first_number(text: &str) -> Option<f64> {
    NUMBER_RE
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

/// Largest years figure mentioned anywhere in the experience section.
pub fn max_experience_years(payload: &ParsedPayload) -> Option<f64> {
    payload
        .experience
        .iter()
        .flat_map(|line| YEARS_RE.captures_iter(line))
        .filter_map(|caps| caps[1].parse::<f64>().ok())
        .fold(None, |acc: Option<f64>, years| {
            Some(acc.map_or(years, |current| current.max(years)))
        })
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn check_skill(value: &str, payload: &ParsedPayload) -> (bool, String) {
    let in_skills = payload.skills.iter().any(|s| contains_ci(s, value));
    let in_text = payload
        .experience
        .iter()
        .chain(payload.education.iter())
        .any(|line| contains_ci(line, value));

    if in_skills {
        (true, format!("skill '{value}' listed"))
    } else if in_text {
        (true, format!("skill '{value}' mentioned in experience"))
    } else {
        (false, format!("skill '{value}' not found"))
    }
}

fn check_experience(value: &str, payload: &ParsedPayload, full_text: &str) -> (bool, String) {
    let Some(needed) = first_number(value) else {
        // No years figure to compare against; fall back to text containment.
        let met = contains_ci(full_text, value);
        return (met, format!("experience '{value}' checked as text"));
    };

    match max_experience_years(payload) {
        Some(actual) if actual >= needed => (
            true,
            format!("{actual:.0} years stated, {needed:.0} needed"),
        ),
        Some(actual) => (
            false,
            format!("{actual:.0} years stated, {needed:.0} needed"),
        ),
        None => (false, "no years figure stated".to_string()),
    }
}

/// Evaluate one requirement against a parsed payload. `full_text` is the
/// caller-computed `payload.full_text()`, shared across checks.
pub fn check_requirement(
    requirement: &Requirement,
    payload: &ParsedPayload,
    full_text: &str,
) -> CheckResult {
    let value = requirement.value.as_str();
    let (met, detail) = match requirement.kind {
        RequirementKind::Skill => check_skill(value, payload),
        RequirementKind::Experience => check_experience(value, payload, full_text),
        RequirementKind::Education => {
            let met = payload.education.iter().any(|line| contains_ci(line, value));
            (met, format!("education '{value}'"))
        }
        RequirementKind::Location => {
            let met = payload
                .location
                .as_deref()
                .map(|loc| contains_ci(loc, value))
                .unwrap_or(false)
                || contains_ci(full_text, value);
            (met, format!("location '{value}'"))
        }
        RequirementKind::Keyword => {
            let met = contains_ci(full_text, value);
            (met, format!("keyword '{value}'"))
        }
    };

    CheckResult {
        value: requirement.value.clone(),
        kind: requirement.kind,
        required: requirement.required,
        met,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn requirement(kind: RequirementKind, value: &str, required: bool) -> Requirement {
        Requirement {
            id: Uuid::new_v4().to_string(),
            group_id: "g1".into(),
            kind,
            value: value.into(),
            required,
        }
    }

    fn payload() -> ParsedPayload {
        ParsedPayload {
            name: Some("Jordan Reyes".into()),
            location: Some("Austin, TX".into()),
            skills: vec!["Python".into(), "SQL".into()],
            experience: vec![
                "Data Engineer at Acme, 4 years".into(),
                "Analyst at Initech, 2 years".into(),
            ],
            education: vec!["BSc Computer Science".into()],
            ..ParsedPayload::default()
        }
    }

    #[test]
    fn skill_check_is_case_insensitive() {
        let payload = payload();
        let full_text = payload.full_text();

        let met = check_requirement(
            &requirement(RequirementKind::Skill, "python", true),
            &payload,
            &full_text,
        );
        assert!(met.met);

        let unmet = check_requirement(
            &requirement(RequirementKind::Skill, "Kubernetes", true),
            &payload,
            &full_text,
        );
        assert!(!unmet.met);
    }

    #[test]
    fn skill_mentioned_only_in_experience_still_counts() {
        let payload = ParsedPayload {
            skills: vec!["SQL".into()],
            experience: vec!["Built Terraform pipelines".into()],
            ..ParsedPayload::default()
        };
        let full_text = payload.full_text();

        let result = check_requirement(
            &requirement(RequirementKind::Skill, "Terraform", true),
            &payload,
            &full_text,
        );
        assert!(result.met);
        assert!(result.detail.contains("mentioned in experience"));
    }

    #[test]
    fn experience_compares_against_max_years() {
        let payload = payload();
        let full_text = payload.full_text();

        assert_eq!(max_experience_years(&payload), Some(4.0));

        let met = check_requirement(
            &requirement(RequirementKind::Experience, "3 years engineering", true),
            &payload,
            &full_text,
        );
        assert!(met.met);

        let unmet = check_requirement(
            &requirement(RequirementKind::Experience, "5 years engineering", true),
            &payload,
            &full_text,
        );
        assert!(!unmet.met);
    }

    #[test]
    fn experience_without_number_falls_back_to_text() {
        let payload = payload();
        let full_text = payload.full_text();

        let result = check_requirement(
            &requirement(RequirementKind::Experience, "data engineer", true),
            &payload,
            &full_text,
        );
        assert!(result.met);
    }

    #[test]
    fn location_matches_location_field_or_text() {
        let payload = payload();
        let full_text = payload.full_text();

        let result = check_requirement(
            &requirement(RequirementKind::Location, "Austin", false),
            &payload,
            &full_text,
        );
        assert!(result.met);
    }

    #[test]
    fn keyword_searches_the_whole_document() {
        let payload = payload();
        let full_text = payload.full_text();

        let result = check_requirement(
            &requirement(RequirementKind::Keyword, "Initech", false),
            &payload,
            &full_text,
        );
        assert!(result.met);
    }
}
