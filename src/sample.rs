//! Sample alumni generation for seeding a fresh collection.

use chrono::NaiveDate;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::AlumniRecord;

const SURNAMES: &[&str] = &[
    "김", "이", "박", "최", "정", "강", "조", "윤", "장", "임", "한", "오", "서", "신", "권",
    "황", "안", "송", "류", "홍",
];

const GIVEN_NAMES_MALE: &[&str] = &[
    "민준", "서준", "예준", "도윤", "시우", "주원", "하준", "지호", "준서", "건우", "우진",
    "현우", "선우", "연우", "유준", "정우", "승현", "승우", "지훈", "민성",
];

const GIVEN_NAMES_FEMALE: &[&str] = &[
    "서연", "서윤", "지우", "서현", "민서", "하은", "하윤", "윤서", "지유", "채원", "지민",
    "수아", "소율", "예은", "다은", "예린", "수빈", "지원", "채은", "지안",
];

const COMPANIES: &[&str] = &[
    "삼성전자", "LG전자", "현대자동차", "SK하이닉스", "네이버", "카카오", "포스코", "한화",
    "롯데", "GS", "CJ", "신세계", "두산", "효성", "LS", "강릉시청", "강원도청", "교육청",
    "병원", "대학교", "법률사무소", "회계법인", "건설회사", "은행", "증권사", "보험사",
    "제약회사", "스타트업", "자영업", "교사", "의사", "변호사", "회계사",
];

const JOB_TITLES: &[&str] = &[
    "대표이사", "전무", "상무", "이사", "부장", "차장", "과장", "대리", "사원", "팀장",
    "실장", "본부장", "센터장", "연구원", "선임연구원", "수석연구원", "교수", "부교수",
    "조교수", "강사", "의사", "변호사", "회계사", "공무원", "프리랜서", "자영업자", "대표",
    "원장", "소장", "컨설턴트",
];

const HOBBIES: &[&str] = &[
    "등산", "독서", "운동", "여행", "사진", "음악감상", "영화감상", "요리", "낚시", "골프",
    "테니스", "수영", "자전거", "요가", "명상", "그림그리기", "악기연주", "춤", "게임",
    "프로그래밍", "원예", "봉사활동", "캠핑", "드라이브",
];

const EMAIL_DOMAINS: &[&str] = &["gmail.com", "naver.com", "daum.net", "kakao.com", "hanmail.net"];

const GANGNEUNG_DISTRICTS: &[&str] = &[
    "교동", "포남동", "홍제동", "강남동", "옥천동", "성산동", "저동", "임당동",
];

pub fn generate(count: usize, rng: &mut impl Rng) -> Vec<AlumniRecord> {
    (0..count).map(|_| generate_one(rng)).collect()
}

fn pick<'a>(pool: &[&'a str], rng: &mut impl Rng) -> &'a str {
    pool.choose(rng).copied().unwrap_or("")
}

fn generate_one(rng: &mut impl Rng) -> AlumniRecord {
    let surname = pick(SURNAMES, rng);
    let given_name = if rng.gen_bool(0.5) {
        pick(GIVEN_NAMES_MALE, rng)
    } else {
        pick(GIVEN_NAMES_FEMALE, rng)
    };
    let name = format!("{surname}{given_name}");

    // Graduating classes of 1970-1999 and 2001-2020, as cohort indices.
    let cohort: i64 = if rng.gen_bool(0.6) {
        rng.gen_range(70..=99)
    } else {
        rng.gen_range(1..=20)
    };
    let graduation_year = if cohort >= 50 { 1900 + cohort } else { 2000 + cohort };
    let birth_year = (graduation_year - 18) as i32;
    let birth_date = NaiveDate::from_ymd_opt(
        birth_year,
        rng.gen_range(1..=12),
        rng.gen_range(1..=28),
    )
    .map(|d| d.to_string())
    .unwrap_or_default();

    let phone = format!(
        "010-{:04}-{:04}",
        rng.gen_range(1000..=9999),
        rng.gen_range(1000..=9999)
    );
    let email = format!(
        "{}.{}{}@{}",
        given_name,
        surname,
        rng.gen_range(1..=99),
        pick(EMAIL_DOMAINS, rng)
    );
    let company = pick(COMPANIES, rng).to_string();
    let hobby_count = rng.gen_range(1..=3);
    let hobbies = HOBBIES
        .choose_multiple(rng, hobby_count)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    let address = format!(
        "강원도 강릉시 {} {}",
        pick(GANGNEUNG_DISTRICTS, rng),
        rng.gen_range(1..=500)
    );
    let school_class = format!("{}반 {}번", rng.gen_range(1..=12), rng.gen_range(1..=40));
    let bio = bio_template(rng, &name, cohort, &company);

    AlumniRecord {
        name,
        phone,
        graduation_cohort: cohort,
        email,
        company,
        job_title: pick(JOB_TITLES, rng).to_string(),
        address,
        birth_date,
        school_class,
        hobbies,
        bio,
        is_verified: true,
        ..Default::default()
    }
}

fn bio_template(rng: &mut impl Rng, name: &str, cohort: i64, company: &str) -> String {
    match rng.gen_range(0..5) {
        0 => format!("반갑습니다! {cohort}회 {name}입니다."),
        1 => format!("강릉고 동문 여러분 안녕하세요! {company}에서 근무하고 있습니다."),
        2 => format!("{cohort}회 졸업생 {name}입니다. 연락주세요!"),
        3 => "강릉고의 자랑스러운 동문입니다. 언제든 연락주세요!".to_string(),
        _ => "동문 여러분과 소통하고 싶습니다. 편하게 연락주세요.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_records_satisfy_import_invariants() {
        let mut rng = StdRng::seed_from_u64(7);
        for record in generate(50, &mut rng) {
            assert!(!record.name.is_empty());
            assert!(record.phone.starts_with("010-"));
            assert_eq!(record.doc_id().len(), 11);
            assert!(
                (1..=100).contains(&record.graduation_cohort),
                "cohort {} out of range",
                record.graduation_cohort
            );
            assert!(record.is_verified);
            assert!(!record.bio.is_empty());
            assert!(!record.birth_date.is_empty());
        }
    }

    #[test]
    fn generation_is_deterministic_per_seed() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        assert_eq!(generate(10, &mut a), generate(10, &mut b));
    }

    #[test]
    fn requested_count_is_honored() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(generate(100, &mut rng).len(), 100);
    }
}
