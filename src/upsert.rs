use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::warn;

use crate::firestore::{record_fields, FieldValue, FirestoreClient, Write};
use crate::models::{AlumniRecord, RunStats};
use crate::normalize::{self, ContactRow};

/// The remote store rejects commits above 500 writes.
pub const MAX_GROUP_SIZE: usize = 500;

/// Where `import` records its progress between group commits.
pub const CHECKPOINT_FILE: &str = ".alumni-sync-checkpoint.json";

#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub group_size: usize,
    /// Pause between group commits, for runs that need to sit below a rate
    /// limit.
    pub pace: Option<Duration>,
    /// Accepted rows already committed by an interrupted run; they are
    /// normalized again but not re-uploaded.
    pub resume_from: usize,
    pub checkpoint: Option<PathBuf>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            group_size: MAX_GROUP_SIZE,
            pace: None,
            resume_from: 0,
            checkpoint: None,
        }
    }
}

/// A bounded group of writes. `push` hands back the full group once the
/// threshold is reached; `drain` yields the final partial group.
#[derive(Debug)]
pub struct WriteGroup {
    writes: Vec<Write>,
    capacity: usize,
}

impl WriteGroup {
    pub fn new(capacity: usize) -> Self {
        Self {
            writes: Vec::new(),
            capacity: capacity.clamp(1, MAX_GROUP_SIZE),
        }
    }

    pub fn push(&mut self, write: Write) -> Option<Vec<Write>> {
        self.writes.push(write);
        if self.writes.len() >= self.capacity {
            Some(std::mem::take(&mut self.writes))
        } else {
            None
        }
    }

    pub fn drain(&mut self) -> Option<Vec<Write>> {
        if self.writes.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.writes))
        }
    }
}

/// Progress marker written after every successful group commit so a failed
/// run can restart with `--resume` instead of re-uploading everything.
#[derive(Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub committed: usize,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn save(path: &Path, committed: usize) -> anyhow::Result<()> {
        let checkpoint = Checkpoint {
            committed,
            updated_at: Utc::now(),
        };
        let body = serde_json::to_string_pretty(&checkpoint)?;
        std::fs::write(path, body)
            .with_context(|| format!("failed to write checkpoint {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> anyhow::Result<Option<usize>> {
        if !path.exists() {
            return Ok(None);
        }
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read checkpoint {}", path.display()))?;
        let checkpoint: Checkpoint = serde_json::from_str(&body)
            .with_context(|| format!("malformed checkpoint {}", path.display()))?;
        Ok(Some(checkpoint.committed))
    }
}

/// Accumulates writes into groups and commits each group before starting
/// the next.
pub struct Uploader<'a> {
    client: &'a FirestoreClient,
    group: WriteGroup,
    pace: Option<Duration>,
    checkpoint: Option<PathBuf>,
    committed: usize,
}

impl<'a> Uploader<'a> {
    pub fn new(client: &'a FirestoreClient, options: &UploadOptions) -> Self {
        Self {
            client,
            group: WriteGroup::new(options.group_size),
            pace: options.pace,
            checkpoint: options.checkpoint.clone(),
            committed: options.resume_from,
        }
    }

    pub async fn push(&mut self, write: Write) -> anyhow::Result<()> {
        if let Some(full) = self.group.push(write) {
            self.commit_group(full).await?;
        }
        Ok(())
    }

    async fn commit_group(&mut self, group: Vec<Write>) -> anyhow::Result<()> {
        let size = group.len();
        self.client.commit(&group).await.with_context(|| {
            format!(
                "group commit failed; {} rows committed so far",
                self.committed
            )
        })?;
        self.committed += size;
        if let Some(path) = &self.checkpoint {
            Checkpoint::save(path, self.committed)?;
        }
        println!("{} rows committed...", self.committed);
        if let Some(pace) = self.pace {
            sleep(pace).await;
        }
        Ok(())
    }

    /// Commits the final partial group and returns the committed total.
    pub async fn finish(mut self) -> anyhow::Result<usize> {
        if let Some(rest) = self.group.drain() {
            self.commit_group(rest).await?;
        }
        Ok(self.committed)
    }
}

/// Full import: every accepted CSV row becomes a full-replace upsert keyed
/// by its phone digits. Bad rows are counted and dropped, never fatal.
/// The checkpoint file only survives an interrupted run; a finished import
/// removes it.
pub async fn import_csv(
    client: &FirestoreClient,
    csv_path: &Path,
    options: &UploadOptions,
) -> anyhow::Result<RunStats> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut stats = RunStats::default();
    let mut uploader = Uploader::new(client, options);
    let mut accepted = 0usize;

    for result in reader.deserialize::<ContactRow>() {
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                warn!(error = %err, "dropping unreadable row");
                stats.errored += 1;
                continue;
            }
        };
        let Some(record) = normalize::normalize_row(&row) else {
            stats.skipped += 1;
            continue;
        };
        accepted += 1;
        if accepted <= options.resume_from {
            continue;
        }
        uploader
            .push(Write::full(record.doc_id(), record_fields(&record)))
            .await?;
        stats.uploaded += 1;
    }

    uploader.finish().await?;
    if let Some(path) = &options.checkpoint {
        let _ = std::fs::remove_file(path);
    }
    Ok(stats)
}

/// Uploads pre-built records (the seed path) as full-replace upserts.
pub async fn upload_records(
    client: &FirestoreClient,
    records: &[AlumniRecord],
    options: &UploadOptions,
) -> anyhow::Result<usize> {
    let mut uploader = Uploader::new(client, options);
    for record in records {
        uploader
            .push(Write::full(record.doc_id(), record_fields(record)))
            .await?;
    }
    uploader.finish().await
}

/// The field subset a backfill run is allowed to touch.
fn backfill_fields(row: &ContactRow) -> BTreeMap<String, FieldValue> {
    let mut fields = BTreeMap::new();
    fields.insert(
        "email2".to_string(),
        FieldValue::Str(row.email2.trim().to_string()),
    );
    fields.insert(
        "department".to_string(),
        FieldValue::Str(row.org_department.trim().to_string()),
    );
    fields.insert(
        "address2".to_string(),
        FieldValue::Str(row.address2_formatted.trim().to_string()),
    );
    fields.insert(
        "notes".to_string(),
        FieldValue::Str(row.notes.trim().to_string()),
    );
    fields.insert(
        "phone2".to_string(),
        FieldValue::Str(normalize::phone_digits(&row.phone2)),
    );
    fields
}

/// Merge-mode backfill: re-reads the CSV for the supplementary fields and
/// writes only those onto documents that already exist. Store documents
/// with no matching CSV row are counted as skipped and left untouched.
pub async fn backfill_csv(
    client: &FirestoreClient,
    csv_path: &Path,
    options: &UploadOptions,
) -> anyhow::Result<RunStats> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut stats = RunStats::default();

    let mut by_phone: HashMap<String, BTreeMap<String, FieldValue>> = HashMap::new();
    for result in reader.deserialize::<ContactRow>() {
        let row = match result {
            Ok(row) => row,
            Err(err) => {
                warn!(error = %err, "dropping unreadable row");
                stats.errored += 1;
                continue;
            }
        };
        let digits = normalize::phone_digits(&row.phone1);
        if digits.starts_with("010") {
            by_phone.insert(digits, backfill_fields(&row));
        }
    }
    println!("{} records loaded from {}.", by_phone.len(), csv_path.display());

    let mut uploader = Uploader::new(client, options);
    let mut page_token: Option<String> = None;
    loop {
        let page = client
            .list_page(page_token.as_deref())
            .await
            .context("failed to list existing documents")?;
        for doc in page.documents {
            match by_phone.get(&doc.doc_id) {
                Some(fields) => {
                    uploader
                        .push(Write::merge(doc.doc_id, fields.clone()))
                        .await?;
                    stats.uploaded += 1;
                }
                None => stats.skipped += 1,
            }
        }
        page_token = page.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    uploader.finish().await?;
    Ok(stats)
}

/// Deletes every document in the collection in grouped commits.
///
/// `confirmed` must be set by the caller after an explicit confirmation;
/// library code never prompts.
pub async fn delete_all(
    client: &FirestoreClient,
    group_size: usize,
    confirmed: bool,
) -> anyhow::Result<usize> {
    if !confirmed {
        bail!(
            "refusing to delete collection '{}' without confirmation",
            client.collection()
        );
    }

    let group_size = group_size.clamp(1, MAX_GROUP_SIZE);
    let mut deleted = 0usize;
    loop {
        // deletions invalidate page tokens, so always restart from the front
        let page = client
            .list_page(None)
            .await
            .context("failed to list documents for deletion")?;
        if page.documents.is_empty() {
            break;
        }
        let writes: Vec<Write> = page
            .documents
            .into_iter()
            .map(|doc| Write::Delete { doc_id: doc.doc_id })
            .collect();
        for chunk in writes.chunks(group_size) {
            client
                .commit(chunk)
                .await
                .context("delete commit failed")?;
            deleted += chunk.len();
            println!("{deleted} documents deleted...");
        }
    }
    Ok(deleted)
}
