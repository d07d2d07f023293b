use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Document lifecycle. Forward-only: uploading -> processing -> {completed, failed}.
/// `Failed` is terminal; recovery is a fresh upload under a new document id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploading => "uploading",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "uploading" => Some(DocumentStatus::Uploading),
            "processing" => Some(DocumentStatus::Processing),
            "completed" => Some(DocumentStatus::Completed),
            "failed" => Some(DocumentStatus::Failed),
            _ => None,
        }
    }

    /// Legal forward transitions. No skips, no backward moves, terminal states stay.
    pub fn can_advance_to(&self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, next),
            (Uploading, Processing) | (Uploading, Failed) | (Processing, Completed) | (Processing, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }
}

/// Rating bucket. Orthogonal to the document lifecycle; never written into
/// the status field. Ordered best-first, so `A < B`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Bucket {
    A,
    B,
    C,
    D,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::A => "A",
            Bucket::B => "B",
            Bucket::C => "C",
            Bucket::D => "D",
        }
    }

    /// Lowercase filter token used by list endpoints, e.g. `bucket-a`.
    pub fn filter_code(&self) -> &'static str {
        match self {
            Bucket::A => "bucket-a",
            Bucket::B => "bucket-b",
            Bucket::C => "bucket-c",
            Bucket::D => "bucket-d",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "A" | "a" | "bucket-a" => Some(Bucket::A),
            "B" | "b" | "bucket-b" => Some(Bucket::B),
            "C" | "c" | "bucket-c" => Some(Bucket::C),
            "D" | "d" | "bucket-d" => Some(Bucket::D),
            _ => None,
        }
    }
}

fn is_default<T: Default + PartialEq>(value: &T) -> bool {
    value == &T::default()
}

/// Structured extraction result. Written once by the extraction worker,
/// read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedPayload {
    #[serde(default, skip_serializing_if = "is_default")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub location: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: Vec<String>,
    #[serde(default)]
    pub education: Vec<String>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub projects: Vec<String>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub awards: Vec<String>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub certifications: Vec<String>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub languages: Vec<String>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub publications: Vec<String>,
    #[serde(default, skip_serializing_if = "is_default")]
    pub volunteer: Vec<String>,
}

impl ParsedPayload {
    /// Flattened lowercase text of every section, for keyword/location checks.
    pub fn full_text(&self) -> String {
        let mut out = String::new();
        for part in [&self.name, &self.email, &self.phone, &self.location] {
            if let Some(value) = part {
                out.push_str(value);
                out.push('\n');
            }
        }
        for section in [
            &self.skills,
            &self.experience,
            &self.education,
            &self.projects,
            &self.awards,
            &self.certifications,
            &self.languages,
            &self.publications,
            &self.volunteer,
        ] {
            for line in section {
                out.push_str(line);
                out.push('\n');
            }
        }
        out.to_lowercase()
    }

    /// Whether the payload carries enough to be matched against requirements.
    pub fn has_substance(&self) -> bool {
        !self.skills.is_empty() || !self.experience.is_empty() || !self.education.is_empty()
    }
}

/// Registry row for one uploaded resume file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub status: DocumentStatus,
    pub progress: u8,
    pub project_id: String,
    pub owner: String,
    pub uploaded_at: DateTime<Utc>,
    pub storage_path: Option<String>,
    pub storage_url: Option<String>,
    pub error: Option<String>,
    pub parsed: Option<ParsedPayload>,
}

impl Document {
    pub fn new(name: &str, size: u64, mime_type: &str, project_id: &str, owner: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            size,
            mime_type: mime_type.to_string(),
            status: DocumentStatus::Uploading,
            progress: 0,
            project_id: project_id.to_string(),
            owner: owner.to_string(),
            uploaded_at: Utc::now(),
            storage_path: None,
            storage_url: None,
            error: None,
            parsed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub document_count: i64,
}

impl Project {
    pub fn new(name: &str, owner: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            owner: owner.to_string(),
            created_at: now,
            updated_at: now,
            document_count: 0,
        }
    }
}

/// Globally defined role; not owned by a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub key_skills: Vec<String>,
    #[serde(default)]
    pub qualifications: Vec<String>,
}

impl Position {
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: description.to_string(),
            key_skills: vec![],
            qualifications: vec![],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementKind {
    Skill,
    Experience,
    Education,
    Location,
    Keyword,
}

impl RequirementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequirementKind::Skill => "skill",
            RequirementKind::Experience => "experience",
            RequirementKind::Education => "education",
            RequirementKind::Location => "location",
            RequirementKind::Keyword => "keyword",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "skill" => Some(RequirementKind::Skill),
            "experience" => Some(RequirementKind::Experience),
            "education" => Some(RequirementKind::Education),
            "location" => Some(RequirementKind::Location),
            "keyword" => Some(RequirementKind::Keyword),
            _ => None,
        }
    }
}

/// Named set of matching criteria for a (project, position) pair. At most one
/// enabled group per (owner, project, position) is the working set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementGroup {
    pub id: String,
    pub name: String,
    pub project_id: String,
    pub position_id: Option<String>,
    pub owner: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RequirementGroup {
    pub fn new(name: &str, project_id: &str, position_id: Option<&str>, owner: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            project_id: project_id.to_string(),
            position_id: position_id.map(str::to_string),
            owner: owner.to_string(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub group_id: String,
    pub kind: RequirementKind,
    pub value: String,
    pub required: bool,
}

/// At most one per document; re-rating overwrites in place keeping the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub id: String,
    pub document_id: String,
    pub project_id: String,
    pub category: Bucket,
    pub rationale: String,
    pub rated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_never_skip_or_move_backward() {
        use DocumentStatus::*;
        let all = [Uploading, Processing, Completed, Failed];

        assert!(Uploading.can_advance_to(Processing));
        assert!(Uploading.can_advance_to(Failed));
        assert!(Processing.can_advance_to(Completed));
        assert!(Processing.can_advance_to(Failed));

        // Skipping processing is not allowed.
        assert!(!Uploading.can_advance_to(Completed));

        // Terminal states go nowhere.
        for next in all {
            assert!(!Completed.can_advance_to(next));
            assert!(!Failed.can_advance_to(next));
        }

        // Backward moves are never allowed.
        assert!(!Processing.can_advance_to(Uploading));
        assert!(!Completed.can_advance_to(Processing));
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            DocumentStatus::Uploading,
            DocumentStatus::Processing,
            DocumentStatus::Completed,
            DocumentStatus::Failed,
        ] {
            assert_eq!(DocumentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DocumentStatus::parse("bucket-a"), None);
    }

    #[test]
    fn bucket_filter_codes_are_lowercase_prefixed() {
        assert_eq!(Bucket::A.filter_code(), "bucket-a");
        assert_eq!(Bucket::parse("bucket-c"), Some(Bucket::C));
        assert_eq!(Bucket::parse("B"), Some(Bucket::B));
        assert_eq!(Bucket::parse("e"), None);
    }

    #[test]
    fn payload_substance_requires_one_core_section() {
        let mut payload = ParsedPayload::default();
        assert!(!payload.has_substance());

        payload.skills.push("Rust".into());
        assert!(payload.has_substance());
    }

    #[test]
    fn full_text_lowercases_every_section() {
        let payload = ParsedPayload {
            name: Some("Ada Lovelace".into()),
            skills: vec!["Python".into()],
            education: vec!["MSc Mathematics".into()],
            ..ParsedPayload::default()
        };

        let text = payload.full_text();
        assert!(text.contains("ada lovelace"));
        assert!(text.contains("python"));
        assert!(text.contains("msc mathematics"));
    }
}
