//! Journalist directory: organizations and the staff scraped from their sites.
//!
//! Page fetching happens elsewhere; this module takes page text, splits it
//! into overlapping chunks for the extraction prompt, deduplicates the people
//! found and merges them into `journalists.json`.

use crate::errors::{AppError, ResultExt};
use crate::services::{text_field, ExtractionProvider};
use chrono::{DateTime, Local};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const ORGANIZATIONS_FILE: &str = "media_organizations.json";
pub const JOURNALISTS_FILE: &str = "journalists.json";

pub const MAX_CHUNK_CHARS: usize = 25_000;
pub const CHUNK_OVERLAP_CHARS: usize = 2_000;
/// Chunks at or below this size are not worth a model call.
pub const MIN_CHUNK_CHARS: usize = 1_000;

pub const DEFAULT_SCRAPED_CONFIDENCE: u8 = 70;
const TOP_BEATS: usize = 15;

// ============ Dataset Models ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    #[serde(default)]
    pub name_english: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_hebrew: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_page_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scraping_priority: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Organization {
    /// Staff page if known, otherwise the home page.
    pub fn scrape_url(&self) -> Option<&str> {
        self.staff_page_url
            .as_deref()
            .or(self.website.as_deref())
            .filter(|url| !url.trim().is_empty())
    }

    pub fn is_active(&self) -> bool {
        self.status.as_deref() == Some("active")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrganizationsFile {
    #[serde(default)]
    pub organizations: Vec<Organization>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A person as returned by the staff extraction prompt, before stamping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScrapedJournalist {
    pub name_hebrew: Option<String>,
    pub name_english: Option<String>,
    pub job_title_hebrew: Option<String>,
    pub job_title_english: Option<String>,
    pub beat: Option<String>,
    pub email: Option<String>,
    pub profile_url: Option<String>,
}

impl ScrapedJournalist {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        Self {
            name_hebrew: text_field(map, "name_hebrew"),
            name_english: text_field(map, "name_english"),
            job_title_hebrew: text_field(map, "job_title_hebrew"),
            job_title_english: text_field(map, "job_title_english"),
            beat: text_field(map, "beat"),
            email: text_field(map, "email"),
            profile_url: text_field(map, "profile_url"),
        }
    }

    fn display_name(&self) -> Option<&str> {
        self.name_english
            .as_deref()
            .or(self.name_hebrew.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Case-insensitive dedupe key: English name, else Hebrew name.
    pub fn name_key(&self) -> Option<String> {
        self.display_name().map(str::to_lowercase)
    }
}

fn default_status() -> String {
    "active".to_string()
}

fn default_confidence() -> u8 {
    DEFAULT_SCRAPED_CONFIDENCE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalistEntry {
    pub id: String,
    #[serde(default)]
    pub name_hebrew: Option<String>,
    #[serde(default)]
    pub name_english: Option<String>,
    #[serde(default)]
    pub job_title_hebrew: Option<String>,
    #[serde(default)]
    pub job_title_english: Option<String>,
    #[serde(default)]
    pub beat: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub organization_name: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub scraped_date: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence_score: u8,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JournalistEntry {
    fn title(&self) -> Option<&str> {
        self.job_title_english
            .as_deref()
            .or(self.job_title_hebrew.as_deref())
    }

    fn has(value: &Option<String>) -> bool {
        value.as_deref().is_some_and(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryMetadata {
    #[serde(default)]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub total_journalists: usize,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalistsFile {
    #[serde(default)]
    pub metadata: DirectoryMetadata,
    #[serde(default)]
    pub journalists: Vec<JournalistEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JournalistsFile {
    /// Appends entries whose id is not present yet. Returns the added entries.
    pub fn merge_new(&mut self, entries: Vec<JournalistEntry>) -> Vec<JournalistEntry> {
        let mut known: HashSet<String> = self.journalists.iter().map(|j| j.id.clone()).collect();

        let added: Vec<JournalistEntry> = entries
            .into_iter()
            .filter(|entry| known.insert(entry.id.clone()))
            .collect();

        self.journalists.extend(added.iter().cloned());
        added
    }
}

// ============ Storage ============

/// JSON files of the directory dataset.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    data_dir: PathBuf,
}

impl DirectoryStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn organizations_path(&self) -> PathBuf {
        self.data_dir.join(ORGANIZATIONS_FILE)
    }

    pub fn journalists_path(&self) -> PathBuf {
        self.data_dir.join(JOURNALISTS_FILE)
    }

    pub fn load_organizations(&self) -> Result<OrganizationsFile, AppError> {
        read_json_or_default(&self.organizations_path())
    }

    pub fn load_journalists(&self) -> Result<JournalistsFile, AppError> {
        read_json_or_default(&self.journalists_path())
    }

    pub fn find_organization(&self, org_id: &str) -> Result<Organization, AppError> {
        self.load_organizations()?
            .organizations
            .into_iter()
            .find(|org| org.id == org_id)
            .ok_or_else(|| AppError::NotFound(format!("Organization not found: {}", org_id)))
    }

    /// Refreshes the metadata envelope and rewrites `journalists.json`.
    pub fn save_journalists(
        &self,
        data: &mut JournalistsFile,
        now: DateTime<Local>,
    ) -> Result<(), AppError> {
        data.metadata.last_updated = Some(now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string());
        data.metadata.total_journalists = data.journalists.len();

        fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("Failed to create {}", self.data_dir.display()))?;

        let path = self.journalists_path();
        let json = serde_json::to_string_pretty(data)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

        tracing::info!(
            "Saved {} journalists to {}",
            data.journalists.len(),
            path.display()
        );
        Ok(())
    }

    // Async callers go through the blocking pool.

    pub async fn load_organizations_async(&self) -> Result<OrganizationsFile, AppError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_organizations()).await?
    }

    pub async fn load_journalists_async(&self) -> Result<JournalistsFile, AppError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_journalists()).await?
    }

    pub async fn find_organization_async(&self, org_id: &str) -> Result<Organization, AppError> {
        let store = self.clone();
        let org_id = org_id.to_string();
        tokio::task::spawn_blocking(move || store.find_organization(&org_id)).await?
    }

    /// Loads, appends the entries not yet present, and saves. Returns the number
    /// added and the new total.
    pub async fn merge_and_save(
        &self,
        entries: Vec<JournalistEntry>,
        now: DateTime<Local>,
    ) -> Result<(usize, usize), AppError> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || -> Result<(usize, usize), AppError> {
            let mut data = store.load_journalists()?;
            let added = data.merge_new(entries).len();
            store.save_journalists(&mut data, now)?;
            Ok((added, data.journalists.len()))
        })
        .await?
    }
}

fn read_json_or_default<T>(path: &Path) -> Result<T, AppError>
where
    T: Default + for<'de> Deserialize<'de>,
{
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content)
            .map_err(|e| AppError::Storage(format!("Invalid JSON in {}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("{} does not exist yet, using an empty dataset", path.display());
            Ok(T::default())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

// ============ Identifiers & Chunking ============

/// `<org_id>_<slug>`: lowercase name without punctuation, whitespace runs as `-`.
pub fn generate_journalist_id(org_id: &str, name: &str) -> String {
    static NON_WORD: OnceLock<Regex> = OnceLock::new();
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();

    let non_word = NON_WORD.get_or_init(|| Regex::new(r"[^\w\s-]").expect("slug regex is valid"));
    let whitespace =
        WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

    let lowered = name.trim().to_lowercase();
    let stripped = non_word.replace_all(&lowered, "");
    let slug = whitespace.replace_all(&stripped, "-");
    format!("{}_{}", org_id, slug)
}

/// Splits page text into overlapping chunks sized for one extraction prompt.
///
/// Sizes are in characters. Text that fits in one chunk is returned whole;
/// otherwise windows of `MAX_CHUNK_CHARS` start every
/// `MAX_CHUNK_CHARS - CHUNK_OVERLAP_CHARS` characters and windows no longer
/// than `MIN_CHUNK_CHARS` are dropped.
pub fn chunk_content(content: &str) -> Vec<&str> {
    let offsets: Vec<usize> = content
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(content.len()))
        .collect();
    let total = offsets.len() - 1;

    if total <= MAX_CHUNK_CHARS {
        return vec![content];
    }

    (0..total)
        .step_by(MAX_CHUNK_CHARS - CHUNK_OVERLAP_CHARS)
        .filter_map(|start| {
            let end = (start + MAX_CHUNK_CHARS).min(total);
            (end - start > MIN_CHUNK_CHARS).then(|| &content[offsets[start]..offsets[end]])
        })
        .collect()
}

/// Drops nameless and duplicate people, then stamps the rest as directory entries.
pub fn dedupe_and_stamp(
    scraped: Vec<ScrapedJournalist>,
    organization: &Organization,
    source_url: Option<&str>,
    now: DateTime<Local>,
) -> Vec<JournalistEntry> {
    let scraped_date = now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string();
    let mut seen = HashSet::new();

    scraped
        .into_iter()
        .filter_map(|person| {
            let key = person.name_key()?;
            if !seen.insert(key) {
                return None;
            }
            let name = person.display_name().unwrap_or("unknown").to_string();

            Some(JournalistEntry {
                id: generate_journalist_id(&organization.id, &name),
                name_hebrew: person.name_hebrew,
                name_english: person.name_english,
                job_title_hebrew: person.job_title_hebrew,
                job_title_english: person.job_title_english,
                beat: person.beat,
                email: person.email,
                profile_url: person.profile_url,
                organization_id: organization.id.clone(),
                organization_name: organization.name_english.clone(),
                status: default_status(),
                scraped_date: Some(scraped_date.clone()),
                confidence_score: DEFAULT_SCRAPED_CONFIDENCE,
                verified: false,
                source_url: source_url.map(str::to_string),
                extra: Map::new(),
            })
        })
        .collect()
}

// ============ Ingest ============

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub organization_id: String,
    pub chunks: usize,
    pub failed_chunks: usize,
    pub extracted: usize,
    pub unique: usize,
    pub added: usize,
    pub total_journalists: usize,
}

/// Feeds already-fetched page text of one organization through
/// chunk, extract, dedupe, merge and save.
pub async fn ingest_page(
    store: &DirectoryStore,
    extractor: &dyn ExtractionProvider,
    org_id: &str,
    content: &str,
    source_url: Option<&str>,
    now: DateTime<Local>,
) -> Result<IngestReport, AppError> {
    let organization = store.find_organization_async(org_id).await?;

    if content.trim().is_empty() {
        return Err(AppError::BadRequest(format!(
            "No content retrieved for {}",
            organization.name_english
        )));
    }

    tracing::info!(
        "Ingesting {} characters for {} ({})",
        content.chars().count(),
        organization.name_english,
        organization.id
    );

    let chunks = chunk_content(content);
    tracing::info!("Processing {} content chunk(s)", chunks.len());

    let mut scraped = Vec::new();
    let mut failed_chunks = 0;
    for (idx, chunk) in chunks.iter().enumerate() {
        match extractor
            .extract_staff(&organization.name_english, chunk, idx, chunks.len())
            .await
        {
            Ok(people) => {
                tracing::info!("Chunk {}: found {} people", idx + 1, people.len());
                scraped.extend(people);
            }
            Err(e) => {
                failed_chunks += 1;
                tracing::warn!("Chunk {} failed: {}", idx + 1, e);
            }
        }
    }

    let extracted = scraped.len();
    let source_url = source_url.or(organization.scrape_url());
    let entries = dedupe_and_stamp(scraped, &organization, source_url, now);
    let unique = entries.len();

    let (added, total_journalists) = store.merge_and_save(entries, now).await?;

    tracing::info!(
        "{}: {} unique people, {} new, {} in directory",
        organization.name_english,
        unique,
        added,
        total_journalists
    );

    Ok(IngestReport {
        organization_id: organization.id,
        chunks: chunks.len(),
        failed_chunks,
        extracted,
        unique,
        added,
        total_journalists,
    })
}

// ============ Browsing ============

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryFilter {
    pub organization: Option<String>,
    pub name: Option<String>,
    pub beat: Option<String>,
    pub title: Option<String>,
}

fn contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(needle))
}

impl DirectoryFilter {
    pub fn apply<'a>(&self, journalists: &'a [JournalistEntry]) -> Vec<&'a JournalistEntry> {
        let lowered = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase)
        };
        let name = lowered(&self.name);
        let beat = lowered(&self.beat);
        let title = lowered(&self.title);
        let organization = self
            .organization
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        journalists
            .iter()
            .filter(|j| organization.map_or(true, |org| j.organization_name == org))
            .filter(|j| {
                name.as_deref().map_or(true, |n| {
                    contains_ci(j.name_english.as_deref(), n)
                        || contains_ci(j.name_hebrew.as_deref(), n)
                })
            })
            .filter(|j| beat.as_deref().map_or(true, |b| contains_ci(j.beat.as_deref(), b)))
            .filter(|j| title.as_deref().map_or(true, |t| contains_ci(j.title(), t)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectoryStats {
    pub total: usize,
    pub organizations: usize,
    pub verified: usize,
    pub with_email: usize,
    pub with_profile_url: usize,
    pub by_organization: Vec<NamedCount>,
    pub top_beats: Vec<NamedCount>,
    pub scrape_dates: BTreeMap<String, usize>,
    pub last_updated: Option<String>,
}

fn sorted_counts(counts: HashMap<String, usize>) -> Vec<NamedCount> {
    let mut list: Vec<NamedCount> = counts
        .into_iter()
        .map(|(name, count)| NamedCount { name, count })
        .collect();
    list.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    list
}

pub fn directory_stats(data: &JournalistsFile) -> DirectoryStats {
    let journalists = &data.journalists;

    let mut by_org: HashMap<String, usize> = HashMap::new();
    let mut beats: HashMap<String, usize> = HashMap::new();
    let mut scrape_dates: BTreeMap<String, usize> = BTreeMap::new();

    for j in journalists {
        let org = if j.organization_name.is_empty() {
            "Unknown".to_string()
        } else {
            j.organization_name.clone()
        };
        *by_org.entry(org).or_default() += 1;

        for beat in j.beat.as_deref().unwrap_or("").split(',') {
            let beat = beat.trim();
            if !beat.is_empty() {
                *beats.entry(beat.to_string()).or_default() += 1;
            }
        }

        let date = j
            .scraped_date
            .as_deref()
            .and_then(|d| d.get(..10))
            .unwrap_or("Unknown")
            .to_string();
        *scrape_dates.entry(date).or_default() += 1;
    }

    let mut top_beats = sorted_counts(beats);
    top_beats.truncate(TOP_BEATS);

    DirectoryStats {
        total: journalists.len(),
        organizations: by_org.len(),
        verified: journalists.iter().filter(|j| j.verified).count(),
        with_email: journalists
            .iter()
            .filter(|j| JournalistEntry::has(&j.email))
            .count(),
        with_profile_url: journalists
            .iter()
            .filter(|j| JournalistEntry::has(&j.profile_url))
            .count(),
        by_organization: sorted_counts(by_org),
        top_beats,
        scrape_dates,
        last_updated: data.metadata.last_updated.clone(),
    }
}

/// Organizations grouped by scraping priority. Unprioritized ones are left out.
pub fn organizations_by_priority(orgs: &[Organization]) -> BTreeMap<u8, Vec<&Organization>> {
    let mut groups: BTreeMap<u8, Vec<&Organization>> = BTreeMap::new();
    for org in orgs {
        if let Some(priority) = org.scraping_priority {
            groups.entry(priority).or_default().push(org);
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn org() -> Organization {
        serde_json::from_value(serde_json::json!({
            "id": "kan",
            "name_english": "Kan News",
            "website": "https://www.kan.org.il",
            "scraping_priority": 1,
            "status": "active",
            "type": "public broadcaster"
        }))
        .unwrap()
    }

    fn person(english: Option<&str>, hebrew: Option<&str>) -> ScrapedJournalist {
        ScrapedJournalist {
            name_english: english.map(str::to_string),
            name_hebrew: hebrew.map(str::to_string),
            ..Default::default()
        }
    }

    fn now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_journalist_id_slug() {
        assert_eq!(generate_journalist_id("kan", "Dana  Cohen"), "kan_dana-cohen");
        assert_eq!(generate_journalist_id("kan", "O'Brien, Jr."), "kan_obrien-jr");
        assert_eq!(generate_journalist_id("ynet", "דנה כהן"), "ynet_דנה-כהן");
    }

    #[test]
    fn test_short_content_is_one_chunk() {
        let content = "a".repeat(MAX_CHUNK_CHARS);
        assert_eq!(chunk_content(&content), vec![content.as_str()]);
    }

    #[test]
    fn test_long_content_chunks_overlap() {
        let content = "b".repeat(50_000);
        let chunks = chunk_content(&content);

        // windows start at 0, 23000, 46000; the last one is 4000 chars
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), MAX_CHUNK_CHARS);
        assert_eq!(chunks[1].len(), MAX_CHUNK_CHARS);
        assert_eq!(chunks[2].len(), 4_000);
    }

    #[test]
    fn test_small_tail_chunk_is_dropped() {
        let content = "c".repeat(46_500);
        let chunks = chunk_content(&content);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_chunking_respects_multibyte_chars() {
        let content = "ש".repeat(30_000);
        let chunks = chunk_content(&content);
        assert_eq!(chunks[0].chars().count(), MAX_CHUNK_CHARS);
        assert_eq!(chunks[1].chars().count(), 7_000);
    }

    #[test]
    fn test_dedupe_by_case_insensitive_name() {
        let scraped = vec![
            person(Some("Dana Cohen"), None),
            person(Some("dana cohen "), Some("דנה כהן")),
            person(None, Some("יוסי לוי")),
            person(None, None),
        ];

        let entries = dedupe_and_stamp(scraped, &org(), Some("https://kan.org.il/team"), now());

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "kan_dana-cohen");
        assert_eq!(entries[0].confidence_score, DEFAULT_SCRAPED_CONFIDENCE);
        assert!(!entries[0].verified);
        assert_eq!(entries[0].status, "active");
        assert_eq!(entries[1].id, "kan_יוסי-לוי");
        assert_eq!(entries[1].organization_name, "Kan News");
        assert_eq!(
            entries[1].source_url.as_deref(),
            Some("https://kan.org.il/team")
        );
    }

    #[test]
    fn test_merge_skips_known_ids() {
        let entries = dedupe_and_stamp(
            vec![person(Some("Dana Cohen"), None), person(Some("Avi Levi"), None)],
            &org(),
            None,
            now(),
        );
        let mut data = JournalistsFile::default();

        assert_eq!(data.merge_new(entries.clone()).len(), 2);
        assert_eq!(data.merge_new(entries).len(), 0);
        assert_eq!(data.journalists.len(), 2);
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let org = org();
        assert_eq!(org.extra.get("type").and_then(Value::as_str), Some("public broadcaster"));

        let json = serde_json::to_value(&org).unwrap();
        assert_eq!(json["type"], "public broadcaster");
    }

    #[test]
    fn test_filter_and_stats() {
        let mut entries = dedupe_and_stamp(
            vec![
                ScrapedJournalist {
                    name_english: Some("Dana Cohen".into()),
                    beat: Some("Politics, Economy".into()),
                    email: Some("dana@kan.org.il".into()),
                    job_title_english: Some("Political Correspondent".into()),
                    ..Default::default()
                },
                ScrapedJournalist {
                    name_english: Some("Avi Levi".into()),
                    beat: Some("Sports".into()),
                    ..Default::default()
                },
            ],
            &org(),
            None,
            now(),
        );
        entries[1].organization_name = "Ynet".into();
        entries[1].verified = true;

        let filter = DirectoryFilter {
            beat: Some("econ".into()),
            ..Default::default()
        };
        let found = filter.apply(&entries);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name_english.as_deref(), Some("Dana Cohen"));

        let filter = DirectoryFilter {
            title: Some("correspondent".into()),
            organization: Some("Kan News".into()),
            ..Default::default()
        };
        assert_eq!(filter.apply(&entries).len(), 1);

        let data = JournalistsFile {
            journalists: entries,
            ..Default::default()
        };
        let stats = directory_stats(&data);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.organizations, 2);
        assert_eq!(stats.verified, 1);
        assert_eq!(stats.with_email, 1);
        assert_eq!(stats.with_profile_url, 0);
        assert_eq!(stats.top_beats.len(), 3);
        assert_eq!(stats.scrape_dates.get("2026-02-01"), Some(&2));
    }

    #[test]
    fn test_priority_groups() {
        let mut second = org();
        second.id = "ynet".into();
        second.scraping_priority = Some(2);
        let mut unranked = org();
        unranked.scraping_priority = None;

        let orgs = vec![org(), second, unranked];
        let groups = organizations_by_priority(&orgs);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&1].len(), 1);
        assert_eq!(groups[&2][0].id, "ynet");
    }
}
