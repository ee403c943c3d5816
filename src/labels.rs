//! Display labels
//!
//! Immutable lookup tables used only for presentation: hospital names per
//! tenant schema, localized query descriptions and sheet names, and column
//! display names. Built once at startup and passed to whoever renders.

use crate::config::settings::LabelOverride;
use std::collections::BTreeMap;

/// Shown when a schema has no directory entry
pub const UNKNOWN_HOSPITAL: &str = "알 수 없는 병원";

const BUILTIN_HOSPITALS: &[(&str, &str)] = &[
    ("amelia", "테스트 서버"),
    ("c00052", "당당52"),
    ("c00053", "리봄(강남)53"),
    ("c00054", "광덕54"),
    ("c00055", "리봄(대구)55"),
    ("c00057", "메타57"),
    ("c00066", "새로본66"),
    ("c00068", "라라68"),
    ("c00071", "소담71"),
    ("c00072", "경기서부한의사랑72"),
    ("c00076", "원흥76"),
    ("c00078", "광덕(부산하단)78"),
    ("c00082", "당당(대구달서)82"),
    ("c00083", "연산당당한방병원83"),
    ("c00084", "청아람한방병원84"),
    ("c00085", "한가온85"),
];

// (query name, description, sheet name)
const BUILTIN_QUERY_LABELS: &[(&str, &str, &str)] = &[
    (
        "invalidVisitType",
        "주스케줄 진료구분이 초, 재초, 재가 아닌 경우",
        "주스케줄 진료구분 오류",
    ),
    (
        "insuranceMismatch",
        "환자의 자격조회 데이터 매칭이 안되는 경우",
        "자격조회 환자 매칭 오류",
    ),
    (
        "doctorMismatch",
        "스케줄의 담당의와 차트의 담당의가 매칭 안되는 경우",
        "스케줄, 차트 담당의 불일치 오류",
    ),
    (
        "dateMismatch",
        "외래에서 스케줄 날짜와 차트 날짜가 다른 경우",
        "스케줄, 차트 날짜 불일치 오류",
    ),
    (
        "duplicateSchedule",
        "입원 스케줄이 중복된 경우",
        "스케줄 중복 오류",
    ),
    (
        "scheduleTwist",
        "입원 차트에서 차트와 차트수정기록의 SCHID가 다른 경우",
        "차트와 차트수정기록의 SCHID가 다른 오류",
    ),
    (
        "duplicateMeal",
        "입원 차트에서 중복 식이가 존재하는 경우",
        "중복 식이 오류",
    ),
    (
        "visitTypeConsult",
        "입원 주 스케줄의 진료구분이 협진인 경우",
        "입원 주 스케줄 진료구분 오류",
    ),
    (
        "multiDeptChart",
        "입원 주 스케줄에 한의과, 의과 차트가 들어가 있는 경우",
        "입원 주 스케줄에 의과, 한의과 차트 중복 오류",
    ),
    ("patientIdTwist", "환자 ID가 꼬인 경우", "환자ID 꼬이는 오류"),
    (
        "cuppingOnlyTwice",
        "부항컵이 딱 2개만 남는 경우",
        "부항컵이 딱 2개만 남는 경우",
    ),
];

const BUILTIN_FIELD_LABELS: &[(&str, &str)] = &[
    ("PATNAME", "환자명"),
    ("CHARTNO", "차트번호"),
    ("CONSULTDATE", "진료날짜"),
    ("SCHDATE", "스케줄날짜"),
    ("EMPLNAME", "담당의"),
    ("VISITTYPE", "진료구분"),
];

/// Schema name → hospital display name
#[derive(Debug, Clone, Default)]
pub struct HospitalDirectory {
    names: BTreeMap<String, String>,
}

impl HospitalDirectory {
    /// The built-in clinic directory
    pub fn builtin() -> Self {
        Self {
            names: BUILTIN_HOSPITALS
                .iter()
                .map(|(schema, name)| (schema.to_string(), name.to_string()))
                .collect(),
        }
    }

    /// Add or replace entries
    pub fn extend(&mut self, entries: impl IntoIterator<Item = (String, String)>) {
        self.names.extend(entries);
    }

    pub fn lookup(&self, schema: &str) -> Option<&str> {
        self.names.get(schema).map(String::as_str)
    }

    /// Display name, or [`UNKNOWN_HOSPITAL`]
    pub fn display_name(&self, schema: &str) -> &str {
        self.lookup(schema).unwrap_or(UNKNOWN_HOSPITAL)
    }
}

/// Localized labels for one detection query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryLabel {
    pub description: String,
    pub sheet_name: String,
}

/// All presentation lookups
#[derive(Debug, Clone, Default)]
pub struct Labels {
    queries: BTreeMap<String, QueryLabel>,
    fields: BTreeMap<String, String>,
    pub hospitals: HospitalDirectory,
}

impl Labels {
    /// Built-in Korean labels
    pub fn builtin() -> Self {
        Self {
            queries: BUILTIN_QUERY_LABELS
                .iter()
                .map(|(name, description, sheet)| {
                    (
                        name.to_string(),
                        QueryLabel {
                            description: description.to_string(),
                            sheet_name: sheet.to_string(),
                        },
                    )
                })
                .collect(),
            fields: BUILTIN_FIELD_LABELS
                .iter()
                .map(|(col, label)| (col.to_string(), label.to_string()))
                .collect(),
            hospitals: HospitalDirectory::builtin(),
        }
    }

    /// Built-in labels with configured hospitals and query overrides applied
    pub fn with_overrides(
        hospitals: &BTreeMap<String, String>,
        queries: &BTreeMap<String, LabelOverride>,
    ) -> Self {
        let mut labels = Self::builtin();
        labels
            .hospitals
            .extend(hospitals.iter().map(|(k, v)| (k.clone(), v.clone())));
        for (name, label) in queries {
            let entry = labels
                .queries
                .entry(name.clone())
                .or_insert_with(|| QueryLabel {
                    description: name.clone(),
                    sheet_name: name.clone(),
                });
            if let Some(ref description) = label.description {
                entry.description = description.clone();
            }
            if let Some(ref sheet) = label.sheet_name {
                entry.sheet_name = sheet.clone();
            }
        }
        labels
    }

    /// Localized description, falling back to the query name
    pub fn description<'a>(&'a self, query: &'a str) -> &'a str {
        self.queries
            .get(query)
            .map_or(query, |l| l.description.as_str())
    }

    /// Sheet / section title, falling back to the query name
    pub fn sheet_name<'a>(&'a self, query: &'a str) -> &'a str {
        self.queries
            .get(query)
            .map_or(query, |l| l.sheet_name.as_str())
    }

    /// Column display name, falling back to the raw column name.
    ///
    /// Matching ignores case; PostgreSQL folds unquoted column names to
    /// lower case.
    pub fn field<'a>(&'a self, column: &'a str) -> &'a str {
        self.fields
            .get(&column.to_ascii_uppercase())
            .map_or(column, String::as_str)
    }
}
