/// Decision and reconciliation logic shared by the batch runner, the single
/// lookup command and the HTTP API.
///
/// 1. Build the search query for a contact
/// 2. Classify the extraction result against the confidence threshold
/// 3. Diff extracted fields against the stored row
/// 4. Format and append the row history entry
use crate::models::{Decision, ExtractionResult};
use crate::table::{columns, WorkingTable};
use chrono::{DateTime, Local};
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;
use std::sync::OnceLock;

/// Separator between entries of the `search_history` column.
pub const HISTORY_SEPARATOR: &str = " || ";

/// Separator used for the `source_urls` column.
pub const SOURCE_URL_SEPARATOR: &str = "; ";

/// Builds the search query: the quoted name plus fixed context keywords.
pub fn build_search_query(full_name: &str, context: &str) -> String {
    format!("\"{}\" {}", full_name.trim(), context.trim())
}

/// Row fields touched by an auto-update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatableField {
    Role,
    Topics,
    Email,
    Mobile,
}

impl UpdatableField {
    pub const ALL: [UpdatableField; 4] = [
        UpdatableField::Role,
        UpdatableField::Topics,
        UpdatableField::Email,
        UpdatableField::Mobile,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            UpdatableField::Role => columns::ROLE,
            UpdatableField::Topics => columns::TOPICS,
            UpdatableField::Email => columns::EMAIL,
            UpdatableField::Mobile => columns::MOBILE,
        }
    }

    fn extracted(&self, result: &ExtractionResult) -> Option<String> {
        match self {
            UpdatableField::Role => result.role(),
            UpdatableField::Topics => result.topics.clone(),
            UpdatableField::Email => result.email.clone(),
            UpdatableField::Mobile => result.phone.clone(),
        }
    }

    fn same_value(&self, old: &str, new: &str) -> bool {
        match self {
            UpdatableField::Email => old.trim().eq_ignore_ascii_case(new.trim()),
            UpdatableField::Mobile => phones_match(old, new),
            UpdatableField::Role | UpdatableField::Topics => old.trim() == new.trim(),
        }
    }
}

/// Current values of one row, as far as reconciliation cares.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContactSnapshot {
    pub role: Option<String>,
    pub topics: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub search_history: Option<String>,
}

impl ContactSnapshot {
    pub fn from_table(table: &WorkingTable, row: usize) -> Self {
        let get = |column: &str| table.get(row, column).map(str::to_string);
        Self {
            role: get(columns::ROLE),
            topics: get(columns::TOPICS),
            email: get(columns::EMAIL),
            mobile: get(columns::MOBILE),
            search_history: get(columns::SEARCH_HISTORY),
        }
    }

    fn value(&self, field: UpdatableField) -> Option<&str> {
        match field {
            UpdatableField::Role => self.role.as_deref(),
            UpdatableField::Topics => self.topics.as_deref(),
            UpdatableField::Email => self.email.as_deref(),
            UpdatableField::Mobile => self.mobile.as_deref(),
        }
    }
}

/// A staged field update.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub field: UpdatableField,
    pub old: Option<String>,
    pub new: String,
}

impl FieldChange {
    /// `"<column>: '<old>' → '<new>'"`
    pub fn note(&self) -> String {
        format!(
            "{}: '{}' → '{}'",
            self.field.column(),
            self.old.as_deref().unwrap_or(""),
            self.new
        )
    }
}

/// Everything reconciliation decided for one row. Applying it is a separate step.
#[derive(Debug, Clone, PartialEq)]
pub struct RowUpdate {
    pub decision: Decision,
    pub confidence: u8,
    /// Empty unless the decision is `AutoUpdate`.
    pub changes: Vec<FieldChange>,
    pub update_notes: String,
    pub source_urls: Option<String>,
    pub timestamp: String,
    /// Full new value of the `search_history` column.
    pub search_history: String,
}

/// Compares an extraction result with the stored row and decides what to write.
pub fn reconcile(
    extracted: &ExtractionResult,
    current: &ContactSnapshot,
    threshold: u8,
    now: DateTime<Local>,
) -> RowUpdate {
    let confidence = extracted.confidence_score;
    let decision = Decision::for_confidence(confidence, threshold);

    let (changes, update_notes) = match decision {
        Decision::AutoUpdate => {
            let changes = stage_changes(extracted, current);
            let notes = if changes.is_empty() {
                format!(
                    "No changes needed. Verified: {} - {}",
                    extracted.employer.as_deref().unwrap_or("N/A"),
                    extracted.job_title.as_deref().unwrap_or("N/A")
                )
            } else {
                let notes: Vec<String> = changes.iter().map(FieldChange::note).collect();
                format!("UPDATED: {}", notes.join(" | "))
            };
            (changes, notes)
        }
        Decision::ManualReview => (Vec::new(), manual_review_notes(extracted)),
    };

    let timestamp = format_timestamp(now);
    let entry = format_history_entry(&timestamp, confidence, decision, &update_notes);
    let search_history = append_history(current.search_history.as_deref(), &entry);

    let source_urls = if extracted.source_urls.is_empty() {
        None
    } else {
        Some(extracted.source_urls.join(SOURCE_URL_SEPARATOR))
    };

    RowUpdate {
        decision,
        confidence,
        changes,
        update_notes,
        source_urls,
        timestamp,
        search_history,
    }
}

fn stage_changes(extracted: &ExtractionResult, current: &ContactSnapshot) -> Vec<FieldChange> {
    UpdatableField::ALL
        .iter()
        .filter_map(|&field| {
            let new = field.extracted(extracted)?;
            if new.trim().is_empty() {
                return None;
            }
            let old = current.value(field);
            if old.is_some_and(|old| field.same_value(old, &new)) {
                return None;
            }
            Some(FieldChange {
                field,
                old: old.map(str::to_string),
                new,
            })
        })
        .collect()
}

fn manual_review_notes(extracted: &ExtractionResult) -> String {
    let found: Vec<String> = [
        ("Employer", &extracted.employer),
        ("Title", &extracted.job_title),
        ("Email", &extracted.email),
        ("Phone", &extracted.phone),
        ("Topics", &extracted.topics),
    ]
    .iter()
    .filter_map(|(label, value)| value.as_deref().map(|v| format!("{}: {}", label, v)))
    .collect();

    if found.is_empty() {
        "Low confidence. Needs manual verification.".to_string()
    } else {
        format!(
            "Low confidence ({}%). Found: {}",
            extracted.confidence_score,
            found.join("; ")
        )
    }
}

/// Writes a reconciled update into the table. Metadata is always written;
/// contact fields only for staged changes.
pub fn apply_update(table: &mut WorkingTable, row: usize, update: &RowUpdate) {
    for change in &update.changes {
        table.set(row, change.field.column(), Some(change.new.clone()));
    }

    table.set(
        row,
        columns::CONFIDENCE_SCORE,
        Some(update.confidence.to_string()),
    );
    table.set(row, columns::LAST_UPDATED, Some(update.timestamp.clone()));
    table.set(row, columns::UPDATE_NOTES, Some(update.update_notes.clone()));
    table.set(
        row,
        columns::DECISION,
        Some(update.decision.as_str().to_string()),
    );
    table.set(row, columns::SOURCE_URLS, update.source_urls.clone());
    table.set(
        row,
        columns::SEARCH_HISTORY,
        Some(update.search_history.clone()),
    );
}

/// Local ISO-8601 timestamp with microseconds.
pub fn format_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// `"[timestamp] Confidence: C% | Decision: D | notes"`
///
/// The history separator never appears inside an entry.
pub fn format_history_entry(
    timestamp: &str,
    confidence: u8,
    decision: Decision,
    notes: &str,
) -> String {
    let mut notes = notes.to_string();
    while notes.contains(HISTORY_SEPARATOR.trim()) {
        notes = notes.replace(HISTORY_SEPARATOR.trim(), "|");
    }
    format!(
        "[{}] Confidence: {}% | Decision: {} | {}",
        timestamp, confidence, decision, notes
    )
}

/// Appends an entry; prior entries are kept byte for byte.
pub fn append_history(existing: Option<&str>, entry: &str) -> String {
    match existing {
        Some(history) if !history.trim().is_empty() => {
            format!("{}{}{}", history, HISTORY_SEPARATOR, entry)
        }
        _ => entry.to_string(),
    }
}

/// Splits a history cell into its entries, oldest first.
pub fn split_history(history: &str) -> Vec<&str> {
    history
        .split(HISTORY_SEPARATOR)
        .filter(|entry| !entry.trim().is_empty())
        .collect()
}

/// Validate email address
///
/// Checks for:
/// - Basic email format (contains @ and .)
/// - Fake/placeholder patterns (repeated digits like 9999, 1111)
/// - Minimum length requirements
/// - Valid domain structure
pub fn is_valid_email(email: &str) -> bool {
    // Basic checks
    if email.len() < 5 || !email.contains('@') || !email.contains('.') {
        return false;
    }

    // Detect fake patterns (repeated digits)
    let fake_patterns = ["999999", "111111", "000000", "123456789"];

    for pattern in &fake_patterns {
        if email.contains(pattern) {
            tracing::warn!(
                "Invalid email detected (fake pattern '{}'): {}",
                pattern,
                email
            );
            return false;
        }
    }

    // RFC 5322 simplified email regex
    // Matches: local@domain.tld
    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let email_regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
        )
        .expect("email regex is valid")
    });

    if !email_regex.is_match(email) {
        tracing::warn!("Invalid email format: {}", email);
        return false;
    }

    true
}

/// Normalizes a phone number to E.164, assuming an Israeli number when no
/// country code is given.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    match phonenumber::parse(Some(CountryId::IL), trimmed) {
        Ok(number) => Some(number.format().mode(Mode::E164).to_string()),
        Err(e) => {
            tracing::debug!("Could not parse phone '{}': {:?}", raw, e);
            None
        }
    }
}

/// True when two renderings denote the same phone number.
pub fn phones_match(a: &str, b: &str) -> bool {
    if let (Some(x), Some(y)) = (normalize_phone(a), normalize_phone(b)) {
        return x == y;
    }

    let digits = |s: &str| s.chars().filter(|c| c.is_ascii_digit()).collect::<String>();
    let (da, db) = (digits(a), digits(b));
    if da.is_empty() && db.is_empty() {
        a.trim() == b.trim()
    } else {
        da == db
    }
}
