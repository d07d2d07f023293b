//! Candidate view derived on demand from documents and ratings. Pure
//! functions, no storage of its own.

use serde::{Deserialize, Serialize};

use crate::schema::{Bucket, Document, DocumentStatus, Rating};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRow {
    pub document_id: String,
    pub name: String,
    pub skills: Vec<String>,
    pub bucket: Option<Bucket>,
    pub status: DocumentStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCounts {
    pub a: usize,
    pub b: usize,
    pub c: usize,
    pub d: usize,
    pub unrated: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    pub bucket: Option<Bucket>,
    pub search: Option<String>,
}

impl CandidateFilter {
    pub fn matches(&self, row: &CandidateRow) -> bool {
        if let Some(bucket) = self.bucket {
            if row.bucket != Some(bucket) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if needle.is_empty() {
                return true;
            }
            let in_name = row.name.to_lowercase().contains(&needle);
            let in_skills = row
                .skills
                .iter()
                .any(|s| s.to_lowercase().contains(&needle));
            if !in_name && !in_skills {
                return false;
            }
        }
        true
    }
}

/// A document counts as a candidate only once extraction produced a real name
/// and at least one skill, and the document is completed or already rated.
fn fully_processed(document: &Document, rated: bool) -> bool {
    let Some(parsed) = &document.parsed else {
        return false;
    };
    let has_name = parsed
        .name
        .as_deref()
        .map(|n| !n.trim().is_empty())
        .unwrap_or(false);
    has_name
        && !parsed.skills.is_empty()
        && (document.status == DocumentStatus::Completed || rated)
}

pub fn build_candidates(documents: &[Document], ratings: &[Rating]) -> Vec<CandidateRow> {
    documents
        .iter()
        .filter_map(|document| {
            let rating = ratings.iter().find(|r| r.document_id == document.id);
            if !fully_processed(document, rating.is_some()) {
                return None;
            }
            let parsed = document.parsed.as_ref()?;
            Some(CandidateRow {
                document_id: document.id.clone(),
                name: parsed.name.clone().unwrap_or_default(),
                skills: parsed.skills.clone(),
                bucket: rating.map(|r| r.category),
                status: document.status,
            })
        })
        .collect()
}

/// Counts over the eligible rows. a + b + c + d + unrated always equals total.
pub fn bucket_counts(rows: &[CandidateRow]) -> BucketCounts {
    let mut counts = BucketCounts::default();
    for row in rows {
        counts.total += 1;
        match row.bucket {
            Some(Bucket::A) => counts.a += 1,
            Some(Bucket::B) => counts.b += 1,
            Some(Bucket::C) => counts.c += 1,
            Some(Bucket::D) => counts.d += 1,
            None => counts.unrated += 1,
        }
    }
    counts
}
