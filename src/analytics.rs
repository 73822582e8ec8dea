//! Read-only views over the working table for the operator dashboard.

use crate::enrichment::{split_history, SOURCE_URL_SEPARATOR};
use crate::errors::AppError;
use crate::models::Decision;
use crate::table::{columns, row_index, row_number, WorkingTable};
use crate::table_storage::encode_csv;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const HISTOGRAM_BUCKETS: usize = 10;

// ============ Statistics ============

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBucket {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableStats {
    pub total: usize,
    pub processed: usize,
    pub remaining: usize,
    pub progress_pct: f64,
    pub auto_updates: usize,
    pub manual_reviews: usize,
    pub average_confidence: Option<f64>,
    pub average_auto_confidence: Option<f64>,
    pub average_manual_confidence: Option<f64>,
    pub histogram: Vec<HistogramBucket>,
    pub threshold: u8,
    pub at_or_above_threshold: usize,
}

fn decision_of(table: &WorkingTable, row: usize) -> Option<Decision> {
    table
        .get(row, columns::DECISION)
        .and_then(|raw| raw.trim().parse().ok())
}

fn average(values: &[u8]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let sum: f64 = values.iter().map(|&v| f64::from(v)).sum();
    Some(sum / values.len() as f64)
}

/// Buckets `0-9`, `10-19`, ..., `90-100`.
fn histogram(scores: &[u8]) -> Vec<HistogramBucket> {
    let mut counts = [0usize; HISTOGRAM_BUCKETS];
    for &score in scores {
        let bucket = (usize::from(score) / 10).min(HISTOGRAM_BUCKETS - 1);
        counts[bucket] += 1;
    }

    counts
        .iter()
        .enumerate()
        .map(|(i, &count)| {
            let low = i * 10;
            let high = if i == HISTOGRAM_BUCKETS - 1 { 100 } else { low + 9 };
            HistogramBucket {
                label: format!("{}-{}", low, high),
                count,
            }
        })
        .collect()
}

pub fn table_stats(table: &WorkingTable, threshold: u8) -> TableStats {
    let mut scores = Vec::new();
    let mut auto_scores = Vec::new();
    let mut manual_scores = Vec::new();
    let mut auto_updates = 0;
    let mut manual_reviews = 0;

    for row in 0..table.len() {
        let confidence = table.confidence(row);
        if let Some(c) = confidence {
            scores.push(c);
        }

        match decision_of(table, row) {
            Some(Decision::AutoUpdate) => {
                auto_updates += 1;
                auto_scores.extend(confidence);
            }
            Some(Decision::ManualReview) => {
                manual_reviews += 1;
                manual_scores.extend(confidence);
            }
            None => {}
        }
    }

    let total = table.len();
    let processed = scores.len();
    let progress_pct = if total == 0 {
        0.0
    } else {
        processed as f64 * 100.0 / total as f64
    };

    TableStats {
        total,
        processed,
        remaining: total - processed,
        progress_pct,
        auto_updates,
        manual_reviews,
        average_confidence: average(&scores),
        average_auto_confidence: average(&auto_scores),
        average_manual_confidence: average(&manual_scores),
        histogram: histogram(&scores),
        threshold,
        at_or_above_threshold: scores.iter().filter(|&&c| c >= threshold).count(),
    }
}

// ============ Review Queue ============

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewItem {
    pub row_number: usize,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub confidence: Option<u8>,
    pub update_notes: Option<String>,
    pub source_urls: Vec<String>,
    pub last_updated: Option<String>,
}

fn source_urls(table: &WorkingTable, row: usize) -> Vec<String> {
    table
        .get(row, columns::SOURCE_URLS)
        .map(|raw| {
            raw.split(SOURCE_URL_SEPARATOR.trim())
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

/// Rows waiting for an operator: decision `MANUAL REVIEW`, in table order.
pub fn review_queue(table: &WorkingTable) -> Vec<ReviewItem> {
    (0..table.len())
        .filter(|&row| decision_of(table, row) == Some(Decision::ManualReview))
        .map(|row| ReviewItem {
            row_number: row_number(row),
            first_name: owned(table.get(row, columns::FIRST_NAME)),
            last_name: owned(table.get(row, columns::LAST_NAME)),
            confidence: table.confidence(row),
            update_notes: owned(table.get(row, columns::UPDATE_NOTES)),
            source_urls: source_urls(table, row),
            last_updated: owned(table.get(row, columns::LAST_UPDATED)),
        })
        .collect()
}

// ============ Contact Filter ============

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionFilter {
    #[default]
    All,
    NotProcessed,
    AutoUpdate,
    ManualReview,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactFilter {
    #[serde(default)]
    pub decision: DecisionFilter,
    pub name: Option<String>,
    pub min_confidence: Option<u8>,
}

impl ContactFilter {
    fn matches(&self, table: &WorkingTable, row: usize, name: Option<&str>) -> bool {
        let decision_ok = match self.decision {
            DecisionFilter::All => true,
            DecisionFilter::NotProcessed => table.confidence(row).is_none(),
            DecisionFilter::AutoUpdate => decision_of(table, row) == Some(Decision::AutoUpdate),
            DecisionFilter::ManualReview => {
                decision_of(table, row) == Some(Decision::ManualReview)
            }
        };

        let name_ok = name.map_or(true, |needle| {
            [columns::FIRST_NAME, columns::LAST_NAME]
                .iter()
                .any(|column| {
                    table
                        .get(row, column)
                        .is_some_and(|v| v.to_lowercase().contains(needle))
                })
        });

        let confidence_ok = match self.min_confidence {
            None | Some(0) => true,
            Some(min) => table.confidence(row).is_some_and(|c| c >= min),
        };

        decision_ok && name_ok && confidence_ok
    }
}

/// Data indexes of the rows matching `filter`.
pub fn filter_rows(table: &WorkingTable, filter: &ContactFilter) -> Vec<usize> {
    let name = filter
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_lowercase);

    (0..table.len())
        .filter(|&row| filter.matches(table, row, name.as_deref()))
        .collect()
}

/// A row as a JSON object keyed by column name.
#[derive(Debug, Clone, Serialize)]
pub struct ContactView {
    pub row_number: usize,
    pub fields: Map<String, Value>,
}

pub fn contact_views(table: &WorkingTable, rows: &[usize]) -> Vec<ContactView> {
    rows.iter()
        .filter_map(|&row| {
            let fields = table
                .row_fields(row)?
                .into_iter()
                .map(|(column, value)| (column.to_string(), Value::String(value.to_string())))
                .collect();
            Some(ContactView {
                row_number: row_number(row),
                fields,
            })
        })
        .collect()
}

/// CSV (UTF-8 with BOM) of the given rows, all columns.
pub fn export_csv(table: &WorkingTable, rows: &[usize]) -> Result<Vec<u8>, AppError> {
    encode_csv(&table.subset(rows))
}

// ============ Change History ============

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySummary {
    pub row_number: usize,
    pub name: Option<String>,
    pub runs: usize,
    pub decision: Option<String>,
    pub confidence: Option<u8>,
    pub last_updated: Option<String>,
}

pub fn rows_with_history(table: &WorkingTable, search: Option<&str>) -> Vec<HistorySummary> {
    let needle = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    (0..table.len())
        .filter_map(|row| {
            let history = table.get(row, columns::SEARCH_HISTORY)?;
            let name = table.full_name(row);
            if let Some(needle) = &needle {
                if !name
                    .as_deref()
                    .is_some_and(|n| n.to_lowercase().contains(needle))
                {
                    return None;
                }
            }
            Some(HistorySummary {
                row_number: row_number(row),
                name,
                runs: split_history(history).len(),
                decision: owned(table.get(row, columns::DECISION)),
                confidence: table.confidence(row),
                last_updated: owned(table.get(row, columns::LAST_UPDATED)),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub run: usize,
    pub entry: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowHistory {
    pub row_number: usize,
    pub name: Option<String>,
    pub role: Option<String>,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub confidence: Option<u8>,
    pub decision: Option<String>,
    pub update_notes: Option<String>,
    pub source_urls: Vec<String>,
    pub entries: Vec<HistoryEntry>,
}

/// Full history of one row, addressed by sheet row number.
pub fn row_history(table: &WorkingTable, sheet_row: usize) -> Result<RowHistory, AppError> {
    let row = row_index(sheet_row)
        .filter(|&row| row < table.len())
        .ok_or_else(|| AppError::NotFound(format!("Row {} does not exist", sheet_row)))?;

    let entries = table
        .get(row, columns::SEARCH_HISTORY)
        .map(split_history)
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, entry)| HistoryEntry {
            run: i + 1,
            entry: entry.to_string(),
        })
        .collect();

    Ok(RowHistory {
        row_number: sheet_row,
        name: table.full_name(row),
        role: owned(table.get(row, columns::ROLE)),
        email: owned(table.get(row, columns::EMAIL)),
        mobile: owned(table.get(row, columns::MOBILE)),
        confidence: table.confidence(row),
        decision: owned(table.get(row, columns::DECISION)),
        update_notes: owned(table.get(row, columns::UPDATE_NOTES)),
        source_urls: source_urls(table, row),
        entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> WorkingTable {
        let mut table = WorkingTable::new(vec![
            columns::FIRST_NAME.to_string(),
            columns::LAST_NAME.to_string(),
        ]);
        table.ensure_metadata_columns();

        let rows: [(&str, &str, Option<&str>, Option<&str>); 4] = [
            ("Dana", "Cohen", Some("85"), Some("AUTO-UPDATE")),
            ("Avi", "Levi", Some("40"), Some("MANUAL REVIEW")),
            ("Noa", "Bar", Some("100"), Some("AUTO-UPDATE")),
            ("Yael", "Katz", None, None),
        ];
        for (i, (first, last, confidence, decision)) in rows.iter().enumerate() {
            table
                .push_row(vec![first.to_string(), last.to_string()])
                .unwrap();
            table.set(i, columns::CONFIDENCE_SCORE, confidence.map(str::to_string));
            table.set(i, columns::DECISION, decision.map(str::to_string));
        }
        table.set(
            1,
            columns::SEARCH_HISTORY,
            Some("[t1] Confidence: 30% | Decision: MANUAL REVIEW | a || [t2] Confidence: 40% | Decision: MANUAL REVIEW | b".into()),
        );
        table.set(
            1,
            columns::SOURCE_URLS,
            Some("https://a.example; https://b.example".into()),
        );
        table
    }

    #[test]
    fn test_stats() {
        let stats = table_stats(&table(), 70);

        assert_eq!(stats.total, 4);
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.remaining, 1);
        assert_eq!(stats.progress_pct, 75.0);
        assert_eq!(stats.auto_updates, 2);
        assert_eq!(stats.manual_reviews, 1);
        assert_eq!(stats.average_auto_confidence, Some(92.5));
        assert_eq!(stats.average_manual_confidence, Some(40.0));
        assert_eq!(stats.at_or_above_threshold, 2);

        assert_eq!(stats.histogram.len(), 10);
        assert_eq!(stats.histogram[4].count, 1);
        assert_eq!(stats.histogram[8].count, 1);
        assert_eq!(stats.histogram[9].label, "90-100");
        assert_eq!(stats.histogram[9].count, 1);
    }

    #[test]
    fn test_empty_table_stats() {
        let stats = table_stats(&WorkingTable::new(vec!["a".into()]), 70);
        assert_eq!(stats.progress_pct, 0.0);
        assert_eq!(stats.average_confidence, None);
    }

    #[test]
    fn test_review_queue() {
        let queue = review_queue(&table());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].row_number, 3);
        assert_eq!(queue[0].confidence, Some(40));
        assert_eq!(queue[0].source_urls.len(), 2);
    }

    #[test]
    fn test_filters() {
        let table = table();

        let not_processed = ContactFilter {
            decision: DecisionFilter::NotProcessed,
            ..Default::default()
        };
        assert_eq!(filter_rows(&table, &not_processed), vec![3]);

        let by_name = ContactFilter {
            name: Some("COHEN".into()),
            ..Default::default()
        };
        assert_eq!(filter_rows(&table, &by_name), vec![0]);

        let confident = ContactFilter {
            min_confidence: Some(80),
            ..Default::default()
        };
        assert_eq!(filter_rows(&table, &confident), vec![0, 2]);
    }

    #[test]
    fn test_history_views() {
        let table = table();

        let summaries = rows_with_history(&table, None);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].runs, 2);
        assert!(rows_with_history(&table, Some("dana")).is_empty());

        let history = row_history(&table, 3).unwrap();
        assert_eq!(history.entries.len(), 2);
        assert_eq!(history.entries[1].run, 2);
        assert!(history.entries[1].entry.starts_with("[t2]"));

        assert!(matches!(row_history(&table, 1), Err(AppError::NotFound(_))));
        assert!(matches!(row_history(&table, 99), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_export_subset() {
        let table = table();
        let bytes = export_csv(&table, &[1]).unwrap();
        let text = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("Levi"));
    }
}
