use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

// ============ Collaborator Models ============

/// One result returned by the search collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub snippet: String,
}

/// Contact fields extracted from search results for one person.
///
/// Produced at the extraction boundary after validation, consumed by
/// reconciliation, then dropped. Only its summary survives in the row history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub name_hebrew: Option<String>,
    pub name_english: Option<String>,
    pub job_title: Option<String>,
    pub employer: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub topics: Option<String>,
    /// Always within 0-100.
    pub confidence_score: u8,
    pub source_urls: Vec<String>,
    pub notes: Option<String>,
}

impl ExtractionResult {
    /// Combined role value: `"<title> @ <employer>"`, or whichever half exists.
    pub fn role(&self) -> Option<String> {
        match (self.job_title.as_deref(), self.employer.as_deref()) {
            (Some(title), Some(employer)) => Some(format!("{} @ {}", title, employer)),
            (Some(title), None) => Some(title.to_string()),
            (None, Some(employer)) => Some(employer.to_string()),
            (None, None) => None,
        }
    }

    pub fn has_contact_fields(&self) -> bool {
        self.job_title.is_some()
            || self.employer.is_some()
            || self.email.is_some()
            || self.phone.is_some()
            || self.topics.is_some()
    }
}

// ============ Decision ============

/// Classification of an extraction result against the confidence threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    #[serde(rename = "AUTO-UPDATE")]
    AutoUpdate,
    #[serde(rename = "MANUAL REVIEW")]
    ManualReview,
}

impl Decision {
    /// `AutoUpdate` iff `confidence >= threshold`.
    pub fn for_confidence(confidence: u8, threshold: u8) -> Self {
        if confidence >= threshold {
            Decision::AutoUpdate
        } else {
            Decision::ManualReview
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::AutoUpdate => "AUTO-UPDATE",
            Decision::ManualReview => "MANUAL REVIEW",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "AUTO-UPDATE" => Ok(Decision::AutoUpdate),
            "MANUAL REVIEW" => Ok(Decision::ManualReview),
            other => Err(format!("unknown decision '{}'", other)),
        }
    }
}

// ============ Batch Models ============

/// Input of one batch run.
///
/// `start_row` uses sheet numbering: row 1 is the header, the first contact is row 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub start_row: usize,
    pub count: usize,
    pub threshold: u8,
}

/// What happened to a single row during a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RowOutcome {
    Updated {
        decision: Decision,
        confidence: u8,
        changes: usize,
        notes: String,
    },
    NoSearchResults,
    ExtractionFailed { reason: String },
    MissingName,
}

impl RowOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, RowOutcome::Updated { .. })
    }

    pub fn decision(&self) -> Option<Decision> {
        match self {
            RowOutcome::Updated { decision, .. } => Some(*decision),
            _ => None,
        }
    }
}

/// Per-row line of a batch report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowReport {
    pub row_number: usize,
    pub name: String,
    #[serde(flatten)]
    pub outcome: RowOutcome,
}

/// Output of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub rows_processed: usize,
    pub auto_updates: usize,
    pub manual_reviews: usize,
    pub skipped: usize,
    pub rows: Vec<RowReport>,
    pub working_table: PathBuf,
    pub backup_location: PathBuf,
}

impl BatchResult {
    pub fn from_reports(
        batch_id: Uuid,
        rows: Vec<RowReport>,
        working_table: PathBuf,
        backup_location: PathBuf,
    ) -> Self {
        let count = |decision: Decision| {
            rows.iter()
                .filter(|r| r.outcome.decision() == Some(decision))
                .count()
        };
        let auto_updates = count(Decision::AutoUpdate);
        let manual_reviews = count(Decision::ManualReview);
        let rows_processed = rows.iter().filter(|r| r.outcome.is_applied()).count();

        Self {
            batch_id,
            rows_processed,
            auto_updates,
            manual_reviews,
            skipped: rows.len() - rows_processed,
            rows,
            working_table,
            backup_location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_combines_title_and_employer() {
        let mut result = ExtractionResult {
            job_title: Some("Editor".to_string()),
            employer: Some("OutletB".to_string()),
            ..Default::default()
        };
        assert_eq!(result.role().as_deref(), Some("Editor @ OutletB"));

        result.job_title = None;
        assert_eq!(result.role().as_deref(), Some("OutletB"));

        result.employer = None;
        assert_eq!(result.role(), None);
        assert!(!result.has_contact_fields());
    }

    #[test]
    fn test_decision_strings_round_trip() {
        for decision in [Decision::AutoUpdate, Decision::ManualReview] {
            assert_eq!(decision.as_str().parse::<Decision>().unwrap(), decision);
        }
        assert_eq!(
            serde_json::to_string(&Decision::ManualReview).unwrap(),
            "\"MANUAL REVIEW\""
        );
        assert!("maybe".parse::<Decision>().is_err());
    }

    #[test]
    fn test_batch_result_counts() {
        let rows = vec![
            RowReport {
                row_number: 5,
                name: "A".into(),
                outcome: RowOutcome::Updated {
                    decision: Decision::AutoUpdate,
                    confidence: 90,
                    changes: 1,
                    notes: String::new(),
                },
            },
            RowReport {
                row_number: 6,
                name: "B".into(),
                outcome: RowOutcome::NoSearchResults,
            },
            RowReport {
                row_number: 7,
                name: "C".into(),
                outcome: RowOutcome::Updated {
                    decision: Decision::ManualReview,
                    confidence: 20,
                    changes: 0,
                    notes: String::new(),
                },
            },
        ];

        let result = BatchResult::from_reports(
            Uuid::new_v4(),
            rows,
            PathBuf::from("table.csv"),
            PathBuf::from("backup.csv"),
        );

        assert_eq!(result.rows_processed, 2);
        assert_eq!(result.auto_updates, 1);
        assert_eq!(result.manual_reviews, 1);
        assert_eq!(result.skipped, 1);
    }
}
