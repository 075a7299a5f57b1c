use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::models::AlumniRecord;

/// Matches a cohort tag like "21회", "(3회)", "Z-001 ::: 95회".
static COHORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3})회").expect("cohort pattern is valid"));

/// Maximum characters kept from the notes column when deriving the bio.
const BIO_MAX_CHARS: usize = 200;

/// One row of the contacts export. The header strings are an external
/// contract; the exporter writes them exactly like this.
#[derive(Debug, Default, Deserialize)]
pub struct ContactRow {
    #[serde(rename = "First Name", default)]
    pub first_name: String,
    #[serde(rename = "Last Name", default)]
    pub last_name: String,
    #[serde(rename = "Name Suffix", default)]
    pub name_suffix: String,
    #[serde(rename = "Nickname", default)]
    pub nickname: String,
    #[serde(rename = "Labels", default)]
    pub labels: String,
    #[serde(rename = "Phone 1 - Value", default)]
    pub phone1: String,
    #[serde(rename = "Phone 2 - Value", default)]
    pub phone2: String,
    #[serde(rename = "E-mail 1 - Value", default)]
    pub email1: String,
    #[serde(rename = "E-mail 2 - Value", default)]
    pub email2: String,
    #[serde(rename = "Organization Name", default)]
    pub org_name: String,
    #[serde(rename = "Organization Title", default)]
    pub org_title: String,
    #[serde(rename = "Organization Department", default)]
    pub org_department: String,
    #[serde(rename = "Address 1 - Formatted", default)]
    pub address1_formatted: String,
    #[serde(rename = "Address 1 - City", default)]
    pub address1_city: String,
    #[serde(rename = "Address 1 - Region", default)]
    pub address1_region: String,
    #[serde(rename = "Address 2 - Formatted", default)]
    pub address2_formatted: String,
    #[serde(rename = "Birthday", default)]
    pub birthday: String,
    #[serde(rename = "Notes", default)]
    pub notes: String,
}

/// Strips a phone number down to its digits.
pub fn phone_digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Regroups a phone number into the conventional hyphenated form.
///
/// Mobile numbers (11 digits starting with 010) become `010-1234-5678`;
/// 9- and 10-digit landlines become `02-123-4567` / `031-123-4567`.
/// Anything else passes through unchanged.
pub fn clean_phone(raw: &str) -> String {
    let digits = phone_digits(raw);
    if digits.is_empty() {
        return String::new();
    }
    if digits.len() == 11 && digits.starts_with("010") {
        return format!("{}-{}-{}", &digits[..3], &digits[3..7], &digits[7..]);
    }
    if digits.len() == 9 {
        return format!("{}-{}-{}", &digits[..2], &digits[2..5], &digits[5..]);
    }
    if digits.len() == 10 {
        return format!("{}-{}-{}", &digits[..3], &digits[3..6], &digits[6..]);
    }
    raw.trim().to_string()
}

/// Pulls a cohort index out of free text. The first "N회" tag whose number
/// lands in [1,100] wins; the matched number is stored as-is, never mapped
/// to a calendar year.
pub fn extract_cohort(fields: &[&str]) -> Option<i64> {
    for field in fields {
        for caps in COHORT_RE.captures_iter(field) {
            if let Ok(value) = caps[1].parse::<i64>() {
                if (1..=100).contains(&value) {
                    return Some(value);
                }
            }
        }
    }
    None
}

/// Folds a stored cohort value into the [1,100] index form.
///
/// Values already in range stay put; calendar years collapse onto their
/// century offset (2021 -> 21, 1995 -> 95). Anything else maps to 0.
pub fn cohort_from_year(value: i64) -> i64 {
    if (1..=100).contains(&value) {
        value
    } else if value >= 2000 {
        value - 2000
    } else if value >= 1900 {
        value - 1900
    } else {
        0
    }
}

fn compose_address(formatted: &str, region: &str, city: &str) -> String {
    let formatted = formatted.trim();
    if !formatted.is_empty() {
        return formatted.to_string();
    }
    format!("{} {}", region.trim(), city.trim()).trim().to_string()
}

fn derive_bio(notes: &str, name: &str) -> String {
    let notes = notes.trim();
    if notes.is_empty() {
        format!("안녕하세요! {name}입니다.")
    } else {
        notes.chars().take(BIO_MAX_CHARS).collect()
    }
}

/// Turns one contact row into an upload candidate.
///
/// Returns `None` for rows that should be silently skipped: no name, or no
/// mobile number to key the document by.
pub fn normalize_row(row: &ContactRow) -> Option<AlumniRecord> {
    let name = format!("{}{}", row.first_name.trim(), row.last_name.trim());
    if name.is_empty() {
        return None;
    }

    let phone = clean_phone(&row.phone1);
    let digits = phone_digits(&phone);
    if digits.is_empty() || !digits.starts_with("010") {
        return None;
    }

    let cohort = extract_cohort(&[
        row.name_suffix.trim(),
        row.nickname.trim(),
        row.labels.trim(),
    ])
    .unwrap_or(0);

    let notes = row.notes.trim().to_string();
    let bio = derive_bio(&notes, &name);

    Some(AlumniRecord {
        name,
        phone,
        phone2: phone_digits(&row.phone2),
        graduation_cohort: cohort,
        email: row.email1.trim().to_string(),
        email2: row.email2.trim().to_string(),
        company: row.org_name.trim().to_string(),
        job_title: row.org_title.trim().to_string(),
        department: row.org_department.trim().to_string(),
        address: compose_address(
            &row.address1_formatted,
            &row.address1_region,
            &row.address1_city,
        ),
        address2: row.address2_formatted.trim().to_string(),
        birth_date: row.birthday.trim().to_string(),
        school_class: String::new(),
        hobbies: String::new(),
        notes,
        bio,
        profile_photo_url: String::new(),
        is_verified: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_with(first: &str, phone: &str, suffix: &str) -> ContactRow {
        ContactRow {
            first_name: first.to_string(),
            phone1: phone.to_string(),
            name_suffix: suffix.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn mobile_number_is_regrouped() {
        assert_eq!(clean_phone("01012345678"), "010-1234-5678");
        assert_eq!(clean_phone("010 1234 5678"), "010-1234-5678");
        assert_eq!(clean_phone("+010-1234-5678"), "010-1234-5678");
    }

    #[test]
    fn landline_numbers_are_regrouped() {
        assert_eq!(clean_phone("021234567"), "02-123-4567");
        assert_eq!(clean_phone("0311234567"), "031-123-4567");
    }

    #[test]
    fn unknown_pattern_passes_through() {
        assert_eq!(clean_phone(" 12345 "), "12345");
        assert_eq!(clean_phone(""), "");
    }

    #[test]
    fn empty_name_is_always_rejected() {
        let row = row_with("  ", "010-1234-5678", "21회");
        assert!(normalize_row(&row).is_none());
    }

    #[test]
    fn non_mobile_phone_is_always_rejected() {
        assert!(normalize_row(&row_with("민준", "02-123-4567", "21회")).is_none());
        assert!(normalize_row(&row_with("민준", "", "21회")).is_none());
    }

    #[test]
    fn example_row_is_accepted_with_direct_cohort() {
        let row = row_with("민준", "010-1234-5678", "21회");
        let record = normalize_row(&row).expect("row should be accepted");
        assert_eq!(record.doc_id(), "01012345678");
        assert_eq!(record.phone, "010-1234-5678");
        assert_eq!(record.graduation_cohort, 21);
        assert!(!record.is_verified);
    }

    #[test]
    fn cohort_falls_back_through_fields() {
        assert_eq!(extract_cohort(&["", "", "Z-001 ::: 95회"]), Some(95));
        assert_eq!(extract_cohort(&["(3회)", "", "21회"]), Some(3));
        assert_eq!(extract_cohort(&["동문", "", ""]), None);
    }

    #[test]
    fn out_of_range_cohort_tag_is_ignored() {
        assert_eq!(extract_cohort(&["123회"]), None);
        assert_eq!(extract_cohort(&["123회 21회"]), Some(21));
    }

    #[test]
    fn missing_cohort_defaults_to_unknown() {
        let record = normalize_row(&row_with("민준", "010-1234-5678", "")).unwrap();
        assert_eq!(record.graduation_cohort, 0);
    }

    #[test]
    fn address_prefers_formatted_field() {
        assert_eq!(compose_address("강원도 강릉시 교동 1", "강원도", "강릉시"), "강원도 강릉시 교동 1");
        assert_eq!(compose_address("", "강원도", "강릉시"), "강원도 강릉시");
        assert_eq!(compose_address("", "", "강릉시"), "강릉시");
        assert_eq!(compose_address("", "", ""), "");
    }

    #[test]
    fn bio_defaults_to_greeting() {
        assert_eq!(derive_bio("", "민준"), "안녕하세요! 민준입니다.");
    }

    #[test]
    fn bio_is_truncated_on_char_boundaries() {
        let long: String = "가".repeat(300);
        let bio = derive_bio(&long, "민준");
        assert_eq!(bio.chars().count(), 200);
    }

    #[test]
    fn cohort_from_year_maps_both_centuries() {
        assert_eq!(cohort_from_year(2025), 25);
        assert_eq!(cohort_from_year(2001), 1);
        assert_eq!(cohort_from_year(1995), 95);
        assert_eq!(cohort_from_year(1901), 1);
    }

    #[test]
    fn cohort_from_year_leaves_indices_alone() {
        for v in [1i64, 21, 50, 100] {
            assert_eq!(cohort_from_year(v), v);
        }
    }

    #[test]
    fn cohort_from_year_is_idempotent() {
        for v in (1i64..=100).chain(1900..=2100) {
            let once = cohort_from_year(v);
            assert_eq!(cohort_from_year(once), once, "not a fixed point for {v}");
        }
    }

    #[test]
    fn cohort_from_year_rejects_garbage() {
        assert_eq!(cohort_from_year(0), 0);
        assert_eq!(cohort_from_year(-3), 0);
        assert_eq!(cohort_from_year(1850), 0);
        assert_eq!(cohort_from_year(2000), 0);
    }
}
