//! Firestore REST v1 transport.
//!
//! Documents are encoded with the API's typed value envelopes
//! (`stringValue` / `integerValue` / `booleanValue`); writes go through the
//! `documents:commit` endpoint in groups of at most 500.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::models::AlumniRecord;

const CLIENT_USER_AGENT: &str = "alumni-sync/0.1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const LIST_PAGE_SIZE: u32 = 300;

/// Bounded retry for transient commit failures.
const MAX_COMMIT_ATTEMPTS: u32 = 4;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Stored field that holds the cohort index. The key predates the cohort
/// migration, so it still reads `graduation_year` on the wire.
pub const COHORT_FIELD: &str = "graduation_year";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("remote store returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

impl StoreError {
    /// Worth retrying: network-level failures, rate limiting, server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transport(_) => true,
            StoreError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            StoreError::Build(_) => false,
        }
    }
}

/// Process-scoped connection settings, passed in explicitly by the caller.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub project_id: String,
    pub collection: String,
    /// Bearer token; `None` means unauthenticated (open rules or emulator).
    pub auth_token: Option<String>,
    pub base_url: String,
}

impl StoreConfig {
    pub fn new(project_id: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            collection: collection.into(),
            auth_token: None,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// A single typed field value in the wire format.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl FieldValue {
    fn to_json(&self) -> Value {
        match self {
            // integerValue is a decimal string per the API contract
            FieldValue::Str(s) => json!({ "stringValue": s }),
            FieldValue::Int(i) => json!({ "integerValue": i.to_string() }),
            FieldValue::Bool(b) => json!({ "booleanValue": b }),
        }
    }
}

/// One operation inside a write group.
#[derive(Debug, Clone)]
pub enum Write {
    /// Create-or-replace. With `mask` set only the listed fields change and
    /// everything else on the document is preserved (merge semantics).
    Upsert {
        doc_id: String,
        fields: BTreeMap<String, FieldValue>,
        mask: Option<Vec<String>>,
    },
    Delete { doc_id: String },
}

impl Write {
    pub fn full(doc_id: String, fields: BTreeMap<String, FieldValue>) -> Self {
        Write::Upsert {
            doc_id,
            fields,
            mask: None,
        }
    }

    pub fn merge(doc_id: String, fields: BTreeMap<String, FieldValue>) -> Self {
        let mask = fields.keys().cloned().collect();
        Write::Upsert {
            doc_id,
            fields,
            mask: Some(mask),
        }
    }
}

/// The wire field map for a full record upload.
pub fn record_fields(record: &AlumniRecord) -> BTreeMap<String, FieldValue> {
    let mut fields = BTreeMap::new();
    fields.insert("name".to_string(), FieldValue::Str(record.name.clone()));
    fields.insert("phone".to_string(), FieldValue::Str(record.phone.clone()));
    fields.insert("phone2".to_string(), FieldValue::Str(record.phone2.clone()));
    fields.insert(
        COHORT_FIELD.to_string(),
        FieldValue::Int(record.graduation_cohort),
    );
    fields.insert("email".to_string(), FieldValue::Str(record.email.clone()));
    fields.insert("email2".to_string(), FieldValue::Str(record.email2.clone()));
    fields.insert(
        "company".to_string(),
        FieldValue::Str(record.company.clone()),
    );
    fields.insert(
        "job_title".to_string(),
        FieldValue::Str(record.job_title.clone()),
    );
    fields.insert(
        "department".to_string(),
        FieldValue::Str(record.department.clone()),
    );
    fields.insert(
        "address".to_string(),
        FieldValue::Str(record.address.clone()),
    );
    fields.insert(
        "address2".to_string(),
        FieldValue::Str(record.address2.clone()),
    );
    fields.insert(
        "birth_date".to_string(),
        FieldValue::Str(record.birth_date.clone()),
    );
    fields.insert(
        "school_class".to_string(),
        FieldValue::Str(record.school_class.clone()),
    );
    fields.insert(
        "hobbies".to_string(),
        FieldValue::Str(record.hobbies.clone()),
    );
    fields.insert("notes".to_string(), FieldValue::Str(record.notes.clone()));
    fields.insert("bio".to_string(), FieldValue::Str(record.bio.clone()));
    fields.insert(
        "profile_photo_url".to_string(),
        FieldValue::Str(record.profile_photo_url.clone()),
    );
    fields.insert(
        "is_verified".to_string(),
        FieldValue::Bool(record.is_verified),
    );
    fields
}

/// A document returned by the paged list endpoint.
#[derive(Debug, Clone)]
pub struct ListedDocument {
    pub doc_id: String,
    fields: Value,
}

impl ListedDocument {
    pub fn integer_field(&self, key: &str) -> Option<i64> {
        let envelope = self.fields.get(key)?;
        if let Some(raw) = envelope.get("integerValue") {
            if let Some(s) = raw.as_str() {
                return s.parse().ok();
            }
            return raw.as_i64();
        }
        None
    }
}

#[derive(Debug, Default)]
pub struct DocumentPage {
    pub documents: Vec<ListedDocument>,
    pub next_page_token: Option<String>,
}

pub struct FirestoreClient {
    http: reqwest::Client,
    config: StoreConfig,
}

impl FirestoreClient {
    pub fn new(config: StoreConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .user_agent(CLIENT_USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StoreError::Build(e.to_string()))?;
        Ok(Self { http, config })
    }

    pub fn collection(&self) -> &str {
        &self.config.collection
    }

    fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/(default)/documents",
            self.config.project_id
        )
    }

    fn doc_name(&self, doc_id: &str) -> String {
        format!(
            "{}/{}/{}",
            self.documents_root(),
            self.config.collection,
            doc_id
        )
    }

    fn write_to_json(&self, write: &Write) -> Value {
        match write {
            Write::Upsert {
                doc_id,
                fields,
                mask,
            } => {
                let encoded: serde_json::Map<String, Value> = fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                let mut out = json!({
                    "update": {
                        "name": self.doc_name(doc_id),
                        "fields": Value::Object(encoded),
                    },
                    "updateTransforms": transforms(mask.is_none()),
                });
                if let Some(paths) = mask {
                    out["updateMask"] = json!({ "fieldPaths": paths });
                }
                out
            }
            Write::Delete { doc_id } => json!({ "delete": self.doc_name(doc_id) }),
        }
    }

    /// Commits one write group atomically, retrying transient failures with
    /// exponential backoff up to a bounded attempt count.
    pub async fn commit(&self, writes: &[Write]) -> Result<(), StoreError> {
        let url = format!("{}/{}:commit", self.config.base_url, self.documents_root());
        let body = json!({
            "writes": writes.iter().map(|w| self.write_to_json(w)).collect::<Vec<_>>(),
        });

        let mut backoff = INITIAL_BACKOFF;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.post_json(&url, &body).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_transient() && attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(error = %err, attempt, "transient commit failure, backing off");
                    sleep(backoff).await;
                    backoff *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Fetches one page of the collection.
    pub async fn list_page(&self, page_token: Option<&str>) -> Result<DocumentPage, StoreError> {
        let url = format!(
            "{}/{}/{}",
            self.config.base_url,
            self.documents_root(),
            self.config.collection
        );
        let mut request = self
            .http
            .get(&url)
            .query(&[("pageSize", LIST_PAGE_SIZE.to_string())]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let start = Instant::now();
        let response = request.send().await?;
        let status = response.status();
        debug!(
            %status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "list page"
        );
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status { status, body });
        }

        let parsed: Value = response.json().await?;
        let mut page = DocumentPage {
            next_page_token: parsed
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(str::to_string),
            ..Default::default()
        };
        if let Some(documents) = parsed.get("documents").and_then(Value::as_array) {
            for doc in documents {
                let Some(name) = doc.get("name").and_then(Value::as_str) else {
                    continue;
                };
                let Some(doc_id) = name.rsplit('/').next() else {
                    continue;
                };
                page.documents.push(ListedDocument {
                    doc_id: doc_id.to_string(),
                    fields: doc.get("fields").cloned().unwrap_or(Value::Null),
                });
            }
        }
        Ok(page)
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<(), StoreError> {
        let mut request = self.http.post(url).json(body);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let start = Instant::now();
        let response = request.send().await?;
        let status = response.status();
        debug!(
            %status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "commit"
        );
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status { status, body });
        }
        Ok(())
    }
}

/// Server-assigned timestamps. Full replaces stamp both audit fields;
/// merges touch only `updated_at`.
fn transforms(full_replace: bool) -> Value {
    let mut list = Vec::new();
    if full_replace {
        list.push(json!({
            "fieldPath": "created_at",
            "setToServerValue": "REQUEST_TIME",
        }));
    }
    list.push(json!({
        "fieldPath": "updated_at",
        "setToServerValue": "REQUEST_TIME",
    }));
    Value::Array(list)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> FirestoreClient {
        FirestoreClient::new(StoreConfig::new("gnhs-alumni", "alumni"))
            .expect("client builds")
    }

    #[test]
    fn typed_envelopes_match_wire_format() {
        assert_eq!(
            FieldValue::Str("민준".to_string()).to_json(),
            json!({ "stringValue": "민준" })
        );
        assert_eq!(
            FieldValue::Int(21).to_json(),
            json!({ "integerValue": "21" })
        );
        assert_eq!(
            FieldValue::Bool(true).to_json(),
            json!({ "booleanValue": true })
        );
    }

    #[test]
    fn full_upsert_has_no_mask_and_stamps_both_timestamps() {
        let client = client();
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), FieldValue::Str("민준".to_string()));
        let write = Write::full("01012345678".to_string(), fields);

        let encoded = client.write_to_json(&write);
        assert_eq!(
            encoded["update"]["name"],
            "projects/gnhs-alumni/databases/(default)/documents/alumni/01012345678"
        );
        assert_eq!(
            encoded["update"]["fields"]["name"],
            json!({ "stringValue": "민준" })
        );
        assert!(encoded.get("updateMask").is_none());
        let transforms = encoded["updateTransforms"].as_array().unwrap();
        assert_eq!(transforms.len(), 2);
        assert_eq!(transforms[0]["fieldPath"], "created_at");
        assert_eq!(transforms[1]["fieldPath"], "updated_at");
    }

    #[test]
    fn merge_upsert_masks_exactly_the_supplied_fields() {
        let client = client();
        let mut fields = BTreeMap::new();
        fields.insert("email2".to_string(), FieldValue::Str(String::new()));
        fields.insert(
            "department".to_string(),
            FieldValue::Str("개발팀".to_string()),
        );
        let write = Write::merge("01012345678".to_string(), fields);

        let encoded = client.write_to_json(&write);
        let mask = encoded["updateMask"]["fieldPaths"].as_array().unwrap();
        let paths: Vec<&str> = mask.iter().filter_map(Value::as_str).collect();
        assert_eq!(paths, vec!["department", "email2"]);
        let transforms = encoded["updateTransforms"].as_array().unwrap();
        assert_eq!(transforms.len(), 1);
        assert_eq!(transforms[0]["fieldPath"], "updated_at");
    }

    #[test]
    fn delete_write_carries_the_document_name() {
        let client = client();
        let write = Write::Delete {
            doc_id: "01012345678".to_string(),
        };
        assert_eq!(
            client.write_to_json(&write),
            json!({
                "delete":
                    "projects/gnhs-alumni/databases/(default)/documents/alumni/01012345678"
            })
        );
    }

    #[test]
    fn record_fields_covers_the_document_shape() {
        let record = AlumniRecord {
            name: "민준".to_string(),
            phone: "010-1234-5678".to_string(),
            graduation_cohort: 21,
            is_verified: true,
            ..Default::default()
        };
        let fields = record_fields(&record);
        assert_eq!(fields.get("name"), Some(&FieldValue::Str("민준".to_string())));
        assert_eq!(fields.get(COHORT_FIELD), Some(&FieldValue::Int(21)));
        assert_eq!(fields.get("is_verified"), Some(&FieldValue::Bool(true)));
        // optional strings are present as empty, never absent
        assert_eq!(fields.get("email2"), Some(&FieldValue::Str(String::new())));
        assert_eq!(
            fields.get("profile_photo_url"),
            Some(&FieldValue::Str(String::new()))
        );
        assert_eq!(fields.len(), 18);
    }

    #[test]
    fn transient_errors_are_retryable() {
        let retryable = StoreError::Status {
            status: StatusCode::TOO_MANY_REQUESTS,
            body: String::new(),
        };
        assert!(retryable.is_transient());
        let retryable = StoreError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        };
        assert!(retryable.is_transient());

        let fatal = StoreError::Status {
            status: StatusCode::FORBIDDEN,
            body: String::new(),
        };
        assert!(!fatal.is_transient());
        let fatal = StoreError::Status {
            status: StatusCode::BAD_REQUEST,
            body: String::new(),
        };
        assert!(!fatal.is_transient());
    }

    #[test]
    fn listed_document_parses_integer_envelopes() {
        let doc = ListedDocument {
            doc_id: "01012345678".to_string(),
            fields: json!({
                "graduation_year": { "integerValue": "1995" },
                "name": { "stringValue": "민준" },
            }),
        };
        assert_eq!(doc.integer_field(COHORT_FIELD), Some(1995));
        assert_eq!(doc.integer_field("name"), None);
        assert_eq!(doc.integer_field("missing"), None);
    }
}
