use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

use super::{ExtractionError, Extractor, ProgressFn, PROGRESS_PARSING};
use crate::schema::ParsedPayload;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").unwrap();
    // International-ish phone: optional +country, separators, 7+ digits total.
    static ref PHONE_RE: Regex =
        Regex::new(r"\+?\d[\d\s().\-]{6,}\d").unwrap();
    static ref LOCATION_LINE_RE: Regex =
        Regex::new(r"(?i)^(?:location|address|based in)\s*[:\-]\s*(.+)$").unwrap();
    static ref BULLET_RE: Regex = Regex::new(r"^[\s]*[-*•·o]\s+").unwrap();
    static ref MD_HEADING_RE: Regex = Regex::new(r"^#{1,6}\s+").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Skills,
    Experience,
    Education,
    Projects,
    Awards,
    Certifications,
    Languages,
    Publications,
    Volunteer,
}

fn section_for_heading(line: &str) -> Option<Section> {
    let normalized = line.to_lowercase();
    let normalized = normalized.trim_matches(|c: char| !c.is_alphanumeric() && c != ' ');
    let normalized = normalized.trim();

    // Section headings are short; a sentence mentioning "skills" is not one.
    if normalized.len() > 40 {
        return None;
    }

    let table: [(&[&str], Section); 9] = [
        (&["skills", "technical skills", "core skills"], Section::Skills),
        (
            &["experience", "work experience", "employment", "work history"],
            Section::Experience,
        ),
        (&["education", "academic background"], Section::Education),
        (&["projects", "personal projects"], Section::Projects),
        (&["awards", "honors", "achievements"], Section::Awards),
        (&["certifications", "certificates", "licenses"], Section::Certifications),
        (&["languages"], Section::Languages),
        (&["publications"], Section::Publications),
        (&["volunteer", "volunteering", "community"], Section::Volunteer),
    ];

    for (headings, section) in table {
        if headings.iter().any(|h| *h == normalized) {
            return Some(section);
        }
    }
    None
}

fn looks_like_name(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.len() > 60 {
        return false;
    }
    if trimmed.contains('@') || trimmed.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    let words = trimmed.split_whitespace().count();
    (1..=4).contains(&words)
}

/// Parse a plain-text or markdown resume into structured sections.
///
/// Heuristics recovered from real resume layouts: the first plausible line is
/// the name, contact data is regex-scanned anywhere, and everything else is
/// bucketed under the most recent section heading. Skills split on commas.
pub fn parse_resume_text(text: &str) -> ParsedPayload {
    let mut payload = ParsedPayload::default();
    let mut current: Option<Section> = None;

    payload.email = EMAIL_RE.find(text).map(|m| m.as_str().to_string());
    payload.phone = PHONE_RE
        .find(text)
        .map(|m| m.as_str().trim().to_string())
        .filter(|p| p.chars().filter(|c| c.is_ascii_digit()).count() >= 7);

    for raw in text.lines() {
        let stripped = MD_HEADING_RE.replace(raw, "");
        let line = BULLET_RE.replace(&stripped, "");
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(section) = section_for_heading(line) {
            current = Some(section);
            continue;
        }

        if let Some(caps) = LOCATION_LINE_RE.captures(line) {
            if payload.location.is_none() {
                payload.location = Some(caps[1].trim().to_string());
            }
            continue;
        }

        if payload.name.is_none() && current.is_none() && looks_like_name(line) {
            payload.name = Some(line.to_string());
            continue;
        }

        match current {
            Some(Section::Skills) => {
                for skill in line.split(&[',', ';', '|'][..]) {
                    let skill = skill.trim();
                    if !skill.is_empty() {
                        payload.skills.push(skill.to_string());
                    }
                }
            }
            Some(Section::Experience) => payload.experience.push(line.to_string()),
            Some(Section::Education) => payload.education.push(line.to_string()),
            Some(Section::Projects) => payload.projects.push(line.to_string()),
            Some(Section::Awards) => payload.awards.push(line.to_string()),
            Some(Section::Certifications) => payload.certifications.push(line.to_string()),
            Some(Section::Languages) => payload.languages.push(line.to_string()),
            Some(Section::Publications) => payload.publications.push(line.to_string()),
            Some(Section::Volunteer) => payload.volunteer.push(line.to_string()),
            None => {}
        }
    }

    payload
}

fn is_supported(mime_type: &str) -> bool {
    let essence = mime_type.split(';').next().unwrap_or("").trim();
    matches!(essence, "text/plain" | "text/markdown")
}

/// Deterministic extractor for text resumes. Binary formats go through a
/// different worker behind the same trait.
#[derive(Default)]
pub struct RuleBasedExtractor;

impl RuleBasedExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Extractor for RuleBasedExtractor {
    async fn extract(
        &self,
        bytes: &[u8],
        mime_type: &str,
        progress: &ProgressFn<'_>,
    ) -> Result<ParsedPayload, ExtractionError> {
        if !is_supported(mime_type) {
            return Err(ExtractionError::UnsupportedType(mime_type.to_string()));
        }

        let text = std::str::from_utf8(bytes).map_err(|_| ExtractionError::InvalidEncoding)?;
        if text.trim().is_empty() {
            return Err(ExtractionError::EmptyDocument);
        }

        progress(PROGRESS_PARSING);
        Ok(parse_resume_text(text))
    }
}
