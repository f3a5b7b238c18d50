//! Header mapping
//!
//! Source headers are mapped to canonical fields through a static dictionary
//! per record kind (Korean and English labels). Headers that miss the
//! dictionary are tried against the designer share/bonus patterns (projects
//! only), then against the dictionary again by substring containment when
//! fuzzy matching is on. Anything left over is reported as ignored.

use payline_common::config::{ColumnFamily, DesignerColumnPattern};
use payline_common::db::models::RecordKind;
use regex::Regex;
use std::collections::HashMap;
use tracing::warn;

use crate::resolver::normalize_token;

/// Canonical field and the header labels that map onto it
type FieldAliases = (&'static str, &'static [&'static str]);

const ID: FieldAliases = ("id", &["id", "아이디", "고유번호"]);
const MEMBER: FieldAliases = ("member", &["member", "designer", "디자이너", "담당자", "담당", "직원", "이름"]);
const AMOUNT: FieldAliases = ("amount", &["amount", "금액", "비용", "지급액"]);
const MEMO: FieldAliases = ("memo", &["memo", "note", "notes", "메모", "비고"]);

const PROJECT_FIELDS: &[FieldAliases] = &[
    ID,
    ("title", &["title", "project", "project_name", "프로젝트", "프로젝트명", "현장", "현장명"]),
    ("client_name", &["client", "client_name", "customer", "고객", "고객명", "고객이름"]),
    ("channel", &["channel", "채널", "유입채널", "유입경로"]),
    ("category", &["category", "분류", "카테고리", "공간"]),
    ("status", &["status", "상태", "진행상태"]),
    ("contract_date", &["contract_date", "contract", "계약일", "계약일자", "계약날짜"]),
    ("settle_date", &["settle_date", "settlement_date", "정산일", "정산일자", "입금일"]),
    ("gross_amount", &["gross", "gross_amount", "total", "총액", "매출", "계약금액", "총금액"]),
    ("discount_net", &["discount", "discount_net", "할인", "할인액", "할인금액"]),
    ("designer", &["designer", "디자이너", "담당디자이너", "담당자"]),
    MEMO,
];

const CONTACT_FIELDS: &[FieldAliases] = &[
    ID,
    MEMBER,
    ("project", &["project", "프로젝트", "프로젝트명", "현장", "현장명"]),
    ("event_date", &["date", "event_date", "일자", "날짜", "상담일", "방문일"]),
    ("event_type", &["type", "event_type", "구분", "유형", "종류"]),
    AMOUNT,
    ("paid", &["paid", "지급", "지급여부", "정산여부"]),
    MEMO,
];

const FEED_FIELDS: &[FieldAliases] = &[
    ID,
    MEMBER,
    ("feed_date", &["date", "feed_date", "일자", "날짜", "게시일"]),
    ("feed_type", &["type", "feed_type", "구분", "유형", "종류"]),
    AMOUNT,
    ("content", &["content", "내용", "제목", "링크"]),
];

const TEAM_TASK_FIELDS: &[FieldAliases] = &[
    ID,
    MEMBER,
    ("task_date", &["date", "task_date", "일자", "날짜", "업무일"]),
    ("title", &["title", "task", "업무", "업무명", "제목", "내용"]),
    ("status", &["status", "상태", "진행상태"]),
    AMOUNT,
];

const MILEAGE_FIELDS: &[FieldAliases] = &[
    ID,
    MEMBER,
    ("trip_date", &["date", "trip_date", "일자", "날짜", "운행일"]),
    ("distance_km", &["distance", "distance_km", "km", "거리", "주행거리"]),
    AMOUNT,
    ("purpose", &["purpose", "목적", "용도", "방문지"]),
];

const FUND_FIELDS: &[FieldAliases] = &[
    ID,
    ("fund_date", &["date", "fund_date", "일자", "날짜", "거래일"]),
    ("fund_type", &["type", "fund_type", "구분", "유형", "입출금"]),
    AMOUNT,
    MEMBER,
    MEMO,
];

/// Header dictionary for a record kind
pub fn field_dictionary(kind: RecordKind) -> &'static [FieldAliases] {
    match kind {
        RecordKind::Project => PROJECT_FIELDS,
        RecordKind::Contact => CONTACT_FIELDS,
        RecordKind::Feed => FEED_FIELDS,
        RecordKind::TeamTask => TEAM_TASK_FIELDS,
        RecordKind::Mileage => MILEAGE_FIELDS,
        RecordKind::Fund => FUND_FIELDS,
    }
}

/// Compiled designer header patterns
#[derive(Debug, Clone)]
pub struct DesignerPatterns {
    patterns: Vec<(ColumnFamily, Regex)>,
}

impl DesignerPatterns {
    /// Compile configured patterns; invalid ones are logged and skipped
    pub fn compile(config: &[DesignerColumnPattern]) -> Self {
        let patterns = config
            .iter()
            .filter_map(|p| match Regex::new(&p.pattern) {
                Ok(re) if re.capture_names().any(|n| n == Some("member")) => Some((p.family, re)),
                Ok(_) => {
                    warn!(pattern = %p.pattern, "Designer column pattern has no `member` group, skipped");
                    None
                }
                Err(e) => {
                    warn!(pattern = %p.pattern, error = %e, "Invalid designer column pattern, skipped");
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    /// First pattern matching the header: family and member token
    pub fn classify(&self, header: &str) -> Option<(ColumnFamily, String)> {
        self.patterns.iter().find_map(|(family, re)| {
            let caps = re.captures(header)?;
            let member = caps.name("member")?.as_str().trim();
            if member.is_empty() {
                None
            } else {
                Some((*family, member.to_string()))
            }
        })
    }
}

/// Dynamic designer column found in the header row
#[derive(Debug, Clone, PartialEq)]
pub struct DesignerColumn {
    pub index: usize,
    pub family: ColumnFamily,
    /// Member token taken from the header
    pub member: String,
}

/// Result of mapping one header row
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
    fields: HashMap<&'static str, usize>,
    pub designer_columns: Vec<DesignerColumn>,
    pub ignored: Vec<String>,
}

impl ColumnMap {
    /// Build the mapping for a header row
    pub fn build(
        kind: RecordKind,
        headers: &[String],
        designer_patterns: &DesignerPatterns,
        fuzzy: bool,
    ) -> Self {
        let dictionary = field_dictionary(kind);
        let mut map = ColumnMap::default();
        let mut pending = Vec::new();

        // Exact pass first so a fuzzy match never steals a field that a
        // later header names exactly.
        for (index, header) in headers.iter().enumerate() {
            let key = normalize_token(header);
            match exact_field(dictionary, &key) {
                Some(field) if !map.fields.contains_key(field) => {
                    map.fields.insert(field, index);
                }
                _ => pending.push(index),
            }
        }

        for index in pending {
            let header = &headers[index];
            if kind == RecordKind::Project {
                if let Some((family, member)) = designer_patterns.classify(header) {
                    map.designer_columns.push(DesignerColumn { index, family, member });
                    continue;
                }
            }
            let key = normalize_token(header);
            if fuzzy {
                if let Some(field) = fuzzy_field(dictionary, &key) {
                    if !map.fields.contains_key(field) {
                        map.fields.insert(field, index);
                        continue;
                    }
                }
            }
            if !header.trim().is_empty() {
                map.ignored.push(header.clone());
            }
        }

        map
    }

    /// Column index of a canonical field
    pub fn index(&self, field: &str) -> Option<usize> {
        self.fields.get(field).copied()
    }

    pub fn has_share_columns(&self) -> bool {
        self.designer_columns
            .iter()
            .any(|c| c.family == ColumnFamily::Share)
    }
}

fn exact_field(dictionary: &[FieldAliases], key: &str) -> Option<&'static str> {
    dictionary
        .iter()
        .find(|(_, aliases)| aliases.iter().any(|a| normalize_token(a) == key))
        .map(|(field, _)| *field)
}

fn fuzzy_field(dictionary: &[FieldAliases], key: &str) -> Option<&'static str> {
    if key.is_empty() {
        return None;
    }
    let mut best: Option<(&'static str, usize)> = None;
    for (field, aliases) in dictionary {
        // Two-letter ascii ids would match half of all headers
        if *field == "id" {
            continue;
        }
        for alias in aliases.iter() {
            let alias = normalize_token(alias);
            let len = alias.chars().count();
            if len < 2 || !(key.contains(alias.as_str()) || alias.contains(key)) {
                continue;
            }
            if best.map(|(_, l)| len > l).unwrap_or(true) {
                best = Some((field, len));
            }
        }
    }
    best.map(|(field, _)| field)
}
