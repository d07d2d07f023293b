use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{info, instrument};
use uuid::Uuid;

use super::checks::{check_requirement, CheckResult};
use crate::registry::{Registry, RegistryError};
use crate::schema::{Bucket, DocumentStatus, ParsedPayload, Rating, Requirement};
use crate::sync::{ChangeEvent, EventBus, Op};

const REQUIRED_WEIGHT: f64 = 0.75;
const OPTIONAL_WEIGHT: f64 = 0.25;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("document not found: {0}")]
    DocumentNotFound(String),
    #[error("document has not finished processing or carries no usable payload")]
    PayloadIncomplete,
    #[error("no requirements configured for this project")]
    NoRequirements,
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Result of evaluating one payload against one requirement set.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub score: f64,
    pub category: Bucket,
    pub rationale: String,
    pub checks: Vec<CheckResult>,
}

fn ratio(checks: &[CheckResult], required: bool) -> f64 {
    let relevant: Vec<_> = checks.iter().filter(|c| c.required == required).collect();
    if relevant.is_empty() {
        // An empty side imposes nothing, so it counts as fully met.
        return 1.0;
    }
    relevant.iter().filter(|c| c.met).count() as f64 / relevant.len() as f64
}

fn bucket_for(score: f64) -> Bucket {
    if score >= 0.90 {
        Bucket::A
    } else if score >= 0.65 {
        Bucket::B
    } else if score >= 0.35 {
        Bucket::C
    } else {
        Bucket::D
    }
}

fn build_rationale(checks: &[CheckResult], score: f64) -> String {
    let required_total = checks.iter().filter(|c| c.required).count();
    let required_met = checks.iter().filter(|c| c.required && c.met).count();
    let optional_total = checks.iter().filter(|c| !c.required).count();
    let optional_met = checks.iter().filter(|c| !c.required && c.met).count();

    let mut parts = vec![format!(
        "Met {required_met} of {required_total} required and {optional_met} of {optional_total} optional requirements (score {score:.2})."
    )];

    let met: Vec<&str> = checks
        .iter()
        .filter(|c| c.met)
        .map(|c| c.value.as_str())
        .collect();
    if !met.is_empty() {
        parts.push(format!("Met: {}.", met.join(", ")));
    }

    let unmet: Vec<&str> = checks
        .iter()
        .filter(|c| !c.met)
        .map(|c| c.value.as_str())
        .collect();
    if !unmet.is_empty() {
        parts.push(format!("Unmet: {}.", unmet.join(", ")));
    }

    parts.join(" ")
}

/// Pure evaluation step. Deterministic for a given payload and requirement
/// order, so the same inputs always land in the same bucket.
pub fn evaluate(payload: &ParsedPayload, requirements: &[Requirement]) -> MatchOutcome {
    let full_text = payload.full_text();
    let checks: Vec<CheckResult> = requirements
        .iter()
        .map(|requirement| check_requirement(requirement, payload, &full_text))
        .collect();

    let score = REQUIRED_WEIGHT * ratio(&checks, true) + OPTIONAL_WEIGHT * ratio(&checks, false);
    let category = bucket_for(score);
    let rationale = build_rationale(&checks, score);

    MatchOutcome {
        score,
        category,
        rationale,
        checks,
    }
}

/// Deterministic rating engine. Re-rating overwrites in place keeping the
/// original rating id; concurrent duplicate calls for one document coalesce
/// into a single registry write.
pub struct MatchingEngine {
    registry: Arc<dyn Registry>,
    bus: Arc<EventBus>,
    inflight: Mutex<HashSet<String>>,
    finished: Notify,
}

impl MatchingEngine {
    pub fn new(registry: Arc<dyn Registry>, bus: Arc<EventBus>) -> Self {
        Self {
            registry,
            bus,
            inflight: Mutex::new(HashSet::new()),
            finished: Notify::new(),
        }
    }

    #[instrument(skip(self))]
    pub async fn rate(
        &self,
        document_id: &str,
        position_id: Option<&str>,
    ) -> Result<Rating, MatchError> {
        loop {
            let notified = self.finished.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inflight = self.inflight.lock().unwrap();
                if inflight.insert(document_id.to_string()) {
                    break;
                }
            }

            // Another caller is already rating this document; wait for it
            // and reuse its result.
            notified.await;
            if let Some(rating) = self.registry.get_rating(document_id).await? {
                return Ok(rating);
            }
        }

        let result = self.rate_inner(document_id, position_id).await;

        self.inflight.lock().unwrap().remove(document_id);
        self.finished.notify_waiters();

        result
    }

    async fn rate_inner(
        &self,
        document_id: &str,
        position_id: Option<&str>,
    ) -> Result<Rating, MatchError> {
        let document = self
            .registry
            .get_document(document_id)
            .await?
            .ok_or_else(|| MatchError::DocumentNotFound(document_id.to_string()))?;

        if document.status != DocumentStatus::Completed {
            return Err(MatchError::PayloadIncomplete);
        }
        let payload = document
            .parsed
            .as_ref()
            .filter(|p| p.has_substance())
            .ok_or(MatchError::PayloadIncomplete)?;

        let groups = self
            .registry
            .list_enabled_groups(&document.owner, &document.project_id, position_id)
            .await?;
        let mut requirements = Vec::new();
        for group in &groups {
            requirements.extend(self.registry.list_requirements(&group.id).await?);
        }
        if requirements.is_empty() {
            return Err(MatchError::NoRequirements);
        }

        let outcome = evaluate(payload, &requirements);

        let prior = self.registry.get_rating(document_id).await?;
        let op = if prior.is_some() { Op::Update } else { Op::Insert };
        let rating = Rating {
            id: prior
                .map(|p| p.id)
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            document_id: document_id.to_string(),
            project_id: document.project_id.clone(),
            category: outcome.category,
            rationale: outcome.rationale,
            rated_at: Utc::now(),
        };
        self.registry.upsert_rating(&rating).await?;
        self.bus
            .publish(ChangeEvent::rating(op, &rating, &document.owner));

        info!(
            document_id,
            category = rating.category.as_str(),
            score = outcome.score,
            "document rated"
        );
        Ok(rating)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use crate::schema::{Document, Project, RequirementGroup, RequirementKind};

    fn requirement(group_id: &str, kind: RequirementKind, value: &str, required: bool) -> Requirement {
        Requirement {
            id: Uuid::new_v4().to_string(),
            group_id: group_id.into(),
            kind,
            value: value.into(),
            required,
        }
    }

    fn payload(skills: &[&str]) -> ParsedPayload {
        ParsedPayload {
            name: Some("Jordan Reyes".into()),
            skills: skills.iter().map(|s| s.to_string()).collect(),
            experience: vec!["Engineer, 4 years".into()],
            ..ParsedPayload::default()
        }
    }

    async fn seed(
        registry: &MemoryRegistry,
        skills: &[&str],
        status: DocumentStatus,
    ) -> (Project, Document, RequirementGroup) {
        let project = Project::new("p", "alice");
        registry.insert_project(&project).await.unwrap();

        let mut document = Document::new("resume.txt", 10, "text/plain", &project.id, "alice");
        document.status = status;
        if status == DocumentStatus::Completed {
            document.progress = 100;
            document.parsed = Some(payload(skills));
        }
        registry.upsert_document(&document).await.unwrap();

        let group = RequirementGroup::new("Default Requirements", &project.id, None, "alice");
        registry.insert_group(&group).await.unwrap();
        (project, document, group)
    }

    fn engine(registry: &Arc<MemoryRegistry>) -> MatchingEngine {
        MatchingEngine::new(
            Arc::clone(registry) as Arc<dyn Registry>,
            Arc::new(EventBus::default()),
        )
    }

    #[test]
    fn empty_optional_side_counts_as_met() {
        let requirements = vec![requirement("g", RequirementKind::Skill, "Python", true)];
        let outcome = evaluate(&payload(&["Python"]), &requirements);
        assert_eq!(outcome.score, 1.0);
        assert_eq!(outcome.category, Bucket::A);
    }

    #[test]
    fn met_required_with_unmet_optional_is_never_d() {
        let requirements = vec![
            requirement("g", RequirementKind::Skill, "Python", true),
            requirement("g", RequirementKind::Skill, "AWS", false),
        ];
        let outcome = evaluate(&payload(&["Python", "SQL"]), &requirements);

        assert!((outcome.score - 0.75).abs() < 1e-9);
        assert_eq!(outcome.category, Bucket::B);
        assert!(outcome.rationale.contains("Met 1 of 1 required"));
        assert!(outcome.rationale.contains("Unmet: AWS."));
    }

    #[test]
    fn removing_an_unmet_required_requirement_never_worsens_the_bucket() {
        let with_unmet = vec![
            requirement("g", RequirementKind::Skill, "Python", true),
            requirement("g", RequirementKind::Skill, "Kubernetes", true),
        ];
        let without = vec![requirement("g", RequirementKind::Skill, "Python", true)];

        let payload = payload(&["Python"]);
        let before = evaluate(&payload, &with_unmet);
        let after = evaluate(&payload, &without);

        assert!(after.score >= before.score);
        assert!(after.category <= before.category);
    }

    #[test]
    fn buckets_are_monotonic_in_score() {
        assert_eq!(bucket_for(0.95), Bucket::A);
        assert_eq!(bucket_for(0.90), Bucket::A);
        assert_eq!(bucket_for(0.75), Bucket::B);
        assert_eq!(bucket_for(0.50), Bucket::C);
        assert_eq!(bucket_for(0.10), Bucket::D);
    }

    #[tokio::test]
    async fn rating_is_deterministic_and_keeps_its_id() {
        let registry = Arc::new(MemoryRegistry::new());
        let (_, document, group) =
            seed(&registry, &["Python", "SQL"], DocumentStatus::Completed).await;
        registry
            .insert_requirement(&requirement(&group.id, RequirementKind::Skill, "Python", true))
            .await
            .unwrap();

        let engine = engine(&registry);
        let first = engine.rate(&document.id, None).await.unwrap();
        let second = engine.rate(&document.id, None).await.unwrap();

        assert_eq!(first.category, second.category);
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn unprocessed_documents_cannot_be_rated() {
        let registry = Arc::new(MemoryRegistry::new());
        let (_, document, group) = seed(&registry, &[], DocumentStatus::Processing).await;
        registry
            .insert_requirement(&requirement(&group.id, RequirementKind::Skill, "Python", true))
            .await
            .unwrap();

        let err = engine(&registry).rate(&document.id, None).await.unwrap_err();
        assert!(matches!(err, MatchError::PayloadIncomplete));
    }

    #[tokio::test]
    async fn missing_requirements_is_a_distinct_error() {
        let registry = Arc::new(MemoryRegistry::new());
        let (_, document, _group) =
            seed(&registry, &["Python"], DocumentStatus::Completed).await;

        let err = engine(&registry).rate(&document.id, None).await.unwrap_err();
        assert!(matches!(err, MatchError::NoRequirements));
    }

    /// Forwards to a [`MemoryRegistry`] but yields on document reads, so two
    /// rate() futures polled together genuinely overlap.
    struct YieldingRegistry(Arc<MemoryRegistry>);

    #[async_trait::async_trait]
    impl Registry for YieldingRegistry {
        async fn insert_project(&self, p: &Project) -> Result<(), RegistryError> {
            self.0.insert_project(p).await
        }
        async fn get_project(
            &self,
            id: &str,
            owner: &str,
        ) -> Result<Option<Project>, RegistryError> {
            self.0.get_project(id, owner).await
        }
        async fn list_projects(&self, owner: &str) -> Result<Vec<Project>, RegistryError> {
            self.0.list_projects(owner).await
        }
        async fn adjust_document_count(&self, id: &str, d: i64) -> Result<(), RegistryError> {
            self.0.adjust_document_count(id, d).await
        }
        async fn insert_position(
            &self,
            p: &crate::schema::Position,
        ) -> Result<(), RegistryError> {
            self.0.insert_position(p).await
        }
        async fn get_position(
            &self,
            id: &str,
        ) -> Result<Option<crate::schema::Position>, RegistryError> {
            self.0.get_position(id).await
        }
        async fn list_positions(&self) -> Result<Vec<crate::schema::Position>, RegistryError> {
            self.0.list_positions().await
        }
        async fn upsert_document(&self, d: &Document) -> Result<(), RegistryError> {
            self.0.upsert_document(d).await
        }
        async fn get_document(&self, id: &str) -> Result<Option<Document>, RegistryError> {
            tokio::task::yield_now().await;
            self.0.get_document(id).await
        }
        async fn list_documents(
            &self,
            owner: &str,
            project_id: &str,
        ) -> Result<Vec<Document>, RegistryError> {
            self.0.list_documents(owner, project_id).await
        }
        async fn insert_group(&self, g: &RequirementGroup) -> Result<(), RegistryError> {
            self.0.insert_group(g).await
        }
        async fn get_group(
            &self,
            id: &str,
        ) -> Result<Option<RequirementGroup>, RegistryError> {
            self.0.get_group(id).await
        }
        async fn find_enabled_group(
            &self,
            owner: &str,
            project_id: &str,
            position_id: Option<&str>,
        ) -> Result<Option<RequirementGroup>, RegistryError> {
            self.0.find_enabled_group(owner, project_id, position_id).await
        }
        async fn list_enabled_groups(
            &self,
            owner: &str,
            project_id: &str,
            position_id: Option<&str>,
        ) -> Result<Vec<RequirementGroup>, RegistryError> {
            self.0.list_enabled_groups(owner, project_id, position_id).await
        }
        async fn insert_requirement(&self, r: &Requirement) -> Result<(), RegistryError> {
            self.0.insert_requirement(r).await
        }
        async fn delete_requirement(&self, id: &str, owner: &str) -> Result<(), RegistryError> {
            self.0.delete_requirement(id, owner).await
        }
        async fn set_requirement_required(
            &self,
            id: &str,
            owner: &str,
            required: bool,
        ) -> Result<Requirement, RegistryError> {
            self.0.set_requirement_required(id, owner, required).await
        }
        async fn list_requirements(
            &self,
            group_id: &str,
        ) -> Result<Vec<Requirement>, RegistryError> {
            self.0.list_requirements(group_id).await
        }
        async fn upsert_rating(&self, r: &Rating) -> Result<(), RegistryError> {
            self.0.upsert_rating(r).await
        }
        async fn get_rating(&self, document_id: &str) -> Result<Option<Rating>, RegistryError> {
            self.0.get_rating(document_id).await
        }
        async fn list_ratings(&self, project_id: &str) -> Result<Vec<Rating>, RegistryError> {
            self.0.list_ratings(project_id).await
        }
    }

    #[tokio::test]
    async fn concurrent_duplicate_calls_write_exactly_once() {
        let registry = Arc::new(MemoryRegistry::new());
        let (_, document, group) =
            seed(&registry, &["Python"], DocumentStatus::Completed).await;
        registry
            .insert_requirement(&requirement(&group.id, RequirementKind::Skill, "Python", true))
            .await
            .unwrap();

        let engine = MatchingEngine::new(
            Arc::new(YieldingRegistry(Arc::clone(&registry))) as Arc<dyn Registry>,
            Arc::new(EventBus::default()),
        );
        let (a, b) = tokio::join!(
            engine.rate(&document.id, None),
            engine.rate(&document.id, None)
        );

        let a = a.unwrap();
        let b = b.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.category, b.category);
        assert_eq!(registry.rating_writes(), 1);
    }
}
