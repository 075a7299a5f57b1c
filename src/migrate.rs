//! In-place migration of stored graduation years to cohort indices.

use std::collections::BTreeMap;

use anyhow::Context;

use crate::firestore::{FieldValue, FirestoreClient, Write, COHORT_FIELD};
use crate::normalize::cohort_from_year;
use crate::upsert::MAX_GROUP_SIZE;

/// The replacement cohort for one stored value, if it needs rewriting.
///
/// Values already in [1,100] are left alone, as is anything that does not
/// map into range, so re-running the migration is a no-op.
fn conversion_for(stored: i64) -> Option<i64> {
    if (1..=100).contains(&stored) {
        return None;
    }
    let cohort = cohort_from_year(stored);
    (1..=100).contains(&cohort).then_some(cohort)
}

/// Walks the whole collection and rewrites calendar-year cohorts
/// (2025 -> 25, 1995 -> 95) with merge-mode updates, batched like every
/// other write path. Returns the number of documents updated.
pub async fn convert_cohorts(
    client: &FirestoreClient,
    group_size: usize,
) -> anyhow::Result<usize> {
    let group_size = group_size.clamp(1, MAX_GROUP_SIZE);
    let mut updated = 0usize;
    let mut pending: Vec<Write> = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = client
            .list_page(page_token.as_deref())
            .await
            .context("failed to list documents for cohort conversion")?;
        for doc in page.documents {
            let Some(stored) = doc.integer_field(COHORT_FIELD) else {
                continue;
            };
            let Some(cohort) = conversion_for(stored) else {
                continue;
            };
            let mut fields = BTreeMap::new();
            fields.insert(COHORT_FIELD.to_string(), FieldValue::Int(cohort));
            pending.push(Write::merge(doc.doc_id, fields));
            if pending.len() >= group_size {
                client
                    .commit(&pending)
                    .await
                    .context("cohort conversion commit failed")?;
                updated += pending.len();
                pending.clear();
                println!("{updated} documents converted...");
            }
        }
        page_token = page.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    if !pending.is_empty() {
        client
            .commit(&pending)
            .await
            .context("cohort conversion commit failed")?;
        updated += pending.len();
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calendar_years_are_rewritten() {
        assert_eq!(conversion_for(2025), Some(25));
        assert_eq!(conversion_for(2001), Some(1));
        assert_eq!(conversion_for(1995), Some(95));
    }

    #[test]
    fn cohort_indices_are_left_alone() {
        assert_eq!(conversion_for(25), None);
        assert_eq!(conversion_for(1), None);
        assert_eq!(conversion_for(100), None);
    }

    #[test]
    fn unmappable_values_are_left_alone() {
        // 2000 would map to 0, outside the valid index range
        assert_eq!(conversion_for(2000), None);
        assert_eq!(conversion_for(0), None);
        assert_eq!(conversion_for(-5), None);
        assert_eq!(conversion_for(1850), None);
    }

    #[test]
    fn rewriting_is_idempotent() {
        for year in [1970i64, 1995, 2001, 2025] {
            let once = conversion_for(year).expect("maps into range");
            assert_eq!(conversion_for(once), None, "second pass must be a no-op");
        }
    }
}
