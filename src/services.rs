use crate::config::Config;
use crate::directory::ScrapedJournalist;
use crate::enrichment::is_valid_email;
use crate::errors::AppError;
use crate::models::{ExtractionResult, SearchResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

// ============ Collaborator Traits ============

/// Web search collaborator.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Returns up to `num_results` results. Failures are logged and come
    /// back as an empty list.
    async fn search(&self, query: &str, num_results: usize) -> Vec<SearchResult>;
}

/// Language-model extraction collaborator.
#[async_trait]
pub trait ExtractionProvider: Send + Sync {
    /// Extracts contact fields for `name` from search results.
    async fn extract_contact(
        &self,
        name: &str,
        results: &[SearchResult],
    ) -> Result<ExtractionResult, AppError>;

    /// Extracts every staff member mentioned in one chunk of a scraped page.
    async fn extract_staff(
        &self,
        organization: &str,
        chunk: &str,
        chunk_index: usize,
        chunk_count: usize,
    ) -> Result<Vec<ScrapedJournalist>, AppError>;

    fn model_name(&self) -> &str;
}

// ============ Google Custom Search ============

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleSearchResponse {
    #[serde(default)]
    items: Vec<SearchResult>,
    search_information: Option<GoogleSearchInformation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleSearchInformation {
    total_results: Option<String>,
}

#[derive(Clone)]
pub struct GoogleSearchService {
    client: Client,
    base_url: String,
    api_key: String,
    engine_id: String,
}

impl GoogleSearchService {
    pub fn new(
        base_url: String,
        api_key: String,
        engine_id: String,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::ExternalApiError(format!("Failed to create search client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url,
            api_key,
            engine_id,
        })
    }

    /// Builds the service from configuration; missing credentials disable it.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let (Some(api_key), Some(engine_id)) = (
            config.google_api_key.clone(),
            config.google_search_engine_id.clone(),
        ) else {
            return Err(AppError::ServiceUnavailable(
                "Search is disabled: GOOGLE_API_KEY and GOOGLE_SEARCH_ENGINE_ID are required"
                    .to_string(),
            ));
        };

        Self::new(
            config.google_search_url.clone(),
            api_key,
            engine_id,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Runs one query, surfacing errors instead of swallowing them.
    pub async fn try_search(
        &self,
        query: &str,
        num_results: usize,
    ) -> Result<Vec<SearchResult>, AppError> {
        let num = num_results.clamp(1, 10).to_string();

        // Build URL with proper parameter encoding
        let url = reqwest::Url::parse_with_params(
            &self.base_url,
            &[
                ("key", self.api_key.as_str()),
                ("cx", self.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ],
        )
        .map_err(|e| AppError::ExternalApiError(format!("Failed to build search URL: {}", e)))?;

        tracing::info!("Searching: {}", query);
        // Redact key from logs to prevent credential exposure
        tracing::debug!(
            "Search URL: {}?key=[REDACTED]&cx={}&num={}",
            self.base_url,
            self.engine_id,
            num
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Search request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Search API returned status {}: {}",
                status, error_text
            )));
        }

        let body: GoogleSearchResponse = response.json().await.map_err(|e| {
            AppError::MalformedResponse(format!("Failed to parse search response: {}", e))
        })?;

        if let Some(total) = body
            .search_information
            .as_ref()
            .and_then(|info| info.total_results.as_deref())
        {
            tracing::debug!("Search reports {} total results", total);
        }

        let mut results = body.items;
        results.truncate(num_results);
        tracing::info!("Found {} results", results.len());
        Ok(results)
    }
}

#[async_trait]
impl SearchProvider for GoogleSearchService {
    async fn search(&self, query: &str, num_results: usize) -> Vec<SearchResult> {
        match self.try_search(query, num_results).await {
            Ok(results) => results,
            Err(e) => {
                tracing::warn!("Search error for '{}': {}", query, e);
                Vec::new()
            }
        }
    }
}

// ============ Grok (OpenAI-compatible chat completions) ============

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

const CONTACT_SYSTEM_PROMPT: &str =
    "You are a data extraction assistant. Return only valid JSON, no other text.";

const STAFF_SYSTEM_PROMPT: &str = "You are a data extraction assistant. Return only valid JSON arrays. \
     List every person you find, without limiting the results.";

#[derive(Clone)]
pub struct GrokService {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GrokService {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        if api_key.trim().is_empty() {
            return Err(AppError::ServiceUnavailable(
                "Extraction is disabled: GROK_API_KEY is required".to_string(),
            ));
        }

        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::ExternalApiError(format!("Failed to create extraction client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let api_key = config.grok_api_key.clone().ok_or_else(|| {
            AppError::ServiceUnavailable(
                "Extraction is disabled: GROK_API_KEY is required".to_string(),
            )
        })?;

        Self::new(
            config.grok_base_url.clone(),
            api_key,
            config.grok_model.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Sends one system + user exchange and returns the assistant text.
    pub async fn chat(&self, system: &str, user: &str, max_tokens: u32) -> Result<String, AppError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.1,
            max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ExternalApiError(format!("Extraction request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Extraction API returned status {}: {}",
                status, error_text
            )));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            AppError::MalformedResponse(format!("Failed to parse completion response: {}", e))
        })?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                AppError::MalformedResponse("Completion returned no content".to_string())
            })
    }

    /// Minimal round trip used by the connectivity check.
    pub async fn ping(&self) -> Result<String, AppError> {
        self.chat("Reply with the single word OK.", "ping", 5).await
    }
}

#[async_trait]
impl ExtractionProvider for GrokService {
    async fn extract_contact(
        &self,
        name: &str,
        results: &[SearchResult],
    ) -> Result<ExtractionResult, AppError> {
        let prompt = build_contact_prompt(name, results);
        let content = self.chat(CONTACT_SYSTEM_PROMPT, &prompt, 1000).await?;
        parse_extraction_response(&content)
    }

    async fn extract_staff(
        &self,
        organization: &str,
        chunk: &str,
        chunk_index: usize,
        chunk_count: usize,
    ) -> Result<Vec<ScrapedJournalist>, AppError> {
        let prompt = build_staff_prompt(organization, chunk, chunk_index, chunk_count);
        let content = self.chat(STAFF_SYSTEM_PROMPT, &prompt, 8000).await?;
        parse_staff_response(&content)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============ Prompts ============

/// Numbered listing of search results handed to the model.
pub fn format_search_context(name: &str, results: &[SearchResult]) -> String {
    let mut context = format!("Reporter Name: {}\n\nSearch Results:\n", name);
    for (i, result) in results.iter().enumerate() {
        context.push_str(&format!(
            "\n{}. {}\n{}\nURL: {}\n",
            i + 1,
            result.title,
            result.snippet,
            result.link
        ));
    }
    context
}

pub fn build_contact_prompt(name: &str, results: &[SearchResult]) -> String {
    format!(
        r#"The following search results concern an Israeli media professional.

{context}

Extract what the results say about "{name}":
- Full name, in Hebrew and in English when available
- Current job title (Hebrew preferred)
- Current employer or organization (Hebrew preferred)
- Contact email: check author boxes, bylines, contact sections and staff listings
- Phone or mobile number: check the same places
- Professional topics or beats (Hebrew preferred)

Keep every field in Hebrew where possible, except email, phone and URLs.

Answer with a single JSON object of this shape, using null for anything not found:
{{
  "name_hebrew": "...",
  "name_english": "...",
  "job_title": "...",
  "employer": "...",
  "email": "...",
  "phone": "...",
  "topics": "...",
  "confidence_score": 0-100,
  "source_urls": ["url1", "url2"],
  "notes": "where the information was found"
}}

confidence_score guide:
- 90-100: several reliable sources agree and contact details were found
- 70-89: one reliable source with most fields and some contact details
- 50-69: partial information or uncertain sources, no contact details
- below 50: little or nothing relevant

Return the JSON object only."#,
        context = format_search_context(name, results),
        name = name
    )
}

pub fn build_staff_prompt(
    organization: &str,
    chunk: &str,
    chunk_index: usize,
    chunk_count: usize,
) -> String {
    format!(
        r#"The text below comes from a web page of the Israeli news organization "{organization}".

List every journalist, reporter, editor, anchor, columnist, correspondent or other media professional it mentions.
Author lists, bylines, staff directories, team pages and "about us" sections are the usual places.

For each person give:
- full name in Hebrew, if present
- full name in English (transliterate if needed)
- job title in Hebrew and/or English
- beat or topics covered
- email, if shown
- profile URL, if shown

PAGE CONTENT (chunk {index}/{count}):
{chunk}

Answer with a JSON array of objects shaped like:
{{
  "name_hebrew": "...",
  "name_english": "...",
  "job_title_hebrew": "...",
  "job_title_english": "...",
  "beat": "...",
  "email": "... or null",
  "profile_url": "... or null"
}}

Answer [] when nobody is mentioned. Return the JSON array only."#,
        organization = organization,
        index = chunk_index + 1,
        count = chunk_count,
        chunk = chunk
    )
}

// ============ Response Validation ============

/// Removes a surrounding Markdown code fence (with optional `json` tag).
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let inner = match rest.find("```") {
        Some(end) => &rest[..end],
        None => rest,
    };
    let inner = inner.trim_start();
    let inner = if inner.get(..4).is_some_and(|tag| tag.eq_ignore_ascii_case("json")) {
        &inner[4..]
    } else {
        inner
    };
    inner.trim()
}

/// Parses model output as JSON, falling back to the outermost `open..close` span.
fn parse_json_payload(content: &str, open: char, close: char) -> Result<Value, AppError> {
    let body = strip_code_fences(content);
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Ok(value);
    }

    let span = match (body.find(open), body.rfind(close)) {
        (Some(start), Some(end)) if end > start => &body[start..=end],
        _ => {
            return Err(AppError::MalformedResponse(format!(
                "model output is not JSON: {}",
                preview(body)
            )))
        }
    };

    serde_json::from_str(span).map_err(|e| {
        AppError::MalformedResponse(format!("model output is not JSON ({}): {}", e, preview(body)))
    })
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

/// Optional text field; blank and placeholder values count as absent.
pub(crate) fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key)? {
        Value::String(s) => clean_text(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let parts: Vec<String> = items
                .iter()
                .filter_map(|item| item.as_str().and_then(clean_text))
                .collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(", "))
            }
        }
        _ => None,
    }
}

fn clean_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let lowered = trimmed.to_lowercase();
    if trimmed.is_empty() || matches!(lowered.as_str(), "null" | "none" | "n/a") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn confidence_field(map: &Map<String, Value>) -> Result<u8, AppError> {
    let raw = map
        .get("confidence_score")
        .ok_or_else(|| AppError::MalformedResponse("confidence_score is missing".to_string()))?;

    let number = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };

    match number {
        Some(n) if n.fract() == 0.0 && (0.0..=100.0).contains(&n) => Ok(n as u8),
        _ => Err(AppError::MalformedResponse(format!(
            "confidence_score must be an integer between 0 and 100, got {}",
            raw
        ))),
    }
}

fn source_urls_field(map: &Map<String, Value>) -> Vec<String> {
    let Some(Value::Array(items)) = map.get("source_urls").or_else(|| map.get("sources_found"))
    else {
        return Vec::new();
    };

    let mut urls: Vec<String> = Vec::new();
    for item in items.iter().filter_map(Value::as_str) {
        let candidate = item.trim();
        match url::Url::parse(candidate) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
                if !urls.iter().any(|u| u == candidate) {
                    urls.push(candidate.to_string());
                }
            }
            _ => tracing::debug!("Dropping non-URL source: {}", candidate),
        }
    }
    urls
}

/// Validates a contact extraction answer against the expected schema.
pub fn parse_extraction_response(content: &str) -> Result<ExtractionResult, AppError> {
    let value = parse_json_payload(content, '{', '}')?;
    let Value::Object(map) = value else {
        return Err(AppError::MalformedResponse(
            "expected a JSON object".to_string(),
        ));
    };

    let email = text_field(&map, "email").filter(|email| {
        let valid = is_valid_email(email);
        if !valid {
            tracing::warn!("Discarding extracted email that failed validation: {}", email);
        }
        valid
    });

    Ok(ExtractionResult {
        name_hebrew: text_field(&map, "name_hebrew"),
        name_english: text_field(&map, "name_english"),
        job_title: text_field(&map, "job_title"),
        employer: text_field(&map, "employer"),
        email,
        phone: text_field(&map, "phone"),
        topics: text_field(&map, "topics"),
        confidence_score: confidence_field(&map)?,
        source_urls: source_urls_field(&map),
        notes: text_field(&map, "notes"),
    })
}

/// Validates a staff extraction answer: a JSON array of people.
pub fn parse_staff_response(content: &str) -> Result<Vec<ScrapedJournalist>, AppError> {
    let value = parse_json_payload(content, '[', ']')?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("journalists") {
            Some(Value::Array(items)) => items,
            _ => {
                return Err(AppError::MalformedResponse(
                    "expected a JSON array of people".to_string(),
                ))
            }
        },
        _ => {
            return Err(AppError::MalformedResponse(
                "expected a JSON array of people".to_string(),
            ))
        }
    };

    Ok(items
        .iter()
        .filter_map(Value::as_object)
        .map(ScrapedJournalist::from_map)
        .collect())
}
