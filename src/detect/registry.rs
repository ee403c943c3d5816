//! Detection query registry
//!
//! An ordered list of named anomaly queries. Each template reads tables
//! through the `{schema}` placeholder and binds exactly one parameter,
//! `$1`, the run's `YYYYMMDD` cutoff date. Every query is a pure read.

use std::collections::BTreeMap;

/// A named, enable-flagged detection query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionQuery {
    /// Stable identifier used for aggregation and label lookup
    pub name: String,
    /// The consistency rule this query checks
    pub description: String,
    /// SQL with `{schema}` placeholders and a single `$1` cutoff parameter
    pub template: String,
    pub enabled: bool,
}

impl DetectionQuery {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            template: template.into(),
            enabled: true,
        }
    }
}

/// Ordered registry; the order is the execution order within a schema
#[derive(Debug, Clone)]
pub struct QueryRegistry {
    queries: Vec<DetectionQuery>,
}

impl QueryRegistry {
    pub fn new(queries: Vec<DetectionQuery>) -> Self {
        Self { queries }
    }

    /// The built-in clinic consistency rules
    pub fn builtin() -> Self {
        Self::new(
            BUILTIN_QUERIES
                .iter()
                .map(|(name, description, template)| {
                    DetectionQuery::new(*name, *description, *template)
                })
                .collect(),
        )
    }

    /// Toggle one query. Unknown names are ignored.
    ///
    /// Returns whether a query with this name exists.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.queries.iter_mut().find(|q| q.name == name) {
            Some(query) => {
                query.enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Apply configured enable flags
    pub fn apply_overrides(&mut self, overrides: &BTreeMap<String, bool>) {
        for (name, enabled) in overrides {
            if !self.set_enabled(name, *enabled) {
                tracing::warn!(query = %name, "Enable override for unknown detection query");
            }
        }
    }

    /// Copy of every entry, enabled or not
    pub fn list(&self) -> Vec<DetectionQuery> {
        self.queries.clone()
    }

    pub fn get(&self, name: &str) -> Option<&DetectionQuery> {
        self.queries.iter().find(|q| q.name == name)
    }

    pub fn queries(&self) -> &[DetectionQuery] {
        &self.queries
    }

    pub fn enabled_count(&self) -> usize {
        self.queries.iter().filter(|q| q.enabled).count()
    }
}

impl Default for QueryRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// (name, rule, template)
const BUILTIN_QUERIES: &[(&str, &str, &str)] = &[
    (
        "invalidVisitType",
        "Primary inpatient schedule with a visit type outside {0, 1, 2, 3}",
        "SELECT P.PATID, P.PATNAME, P.CHARTNO, S.SCHID, M.MRID, M.CONSULTTIME, \
                E.EMPLNAME, E.EMPLID, S.VISITTYPE \
         FROM {schema}.TSCHEDULE S \
         JOIN {schema}.TPATIENT P ON P.PATID = S.PATID \
         JOIN {schema}.TMEDICALRECORD M ON M.SCHID = S.SCHID \
         JOIN {schema}.TEMPLOYEE E ON E.EMPLID = M.DRID \
         WHERE S.ORGSCHID = 0 \
           AND S.SCHTYPE = 2 \
           AND S.VISITTYPE NOT IN (0, 1, 2, 3) \
           AND S.SCHDATE >= $1",
    ),
    (
        "insuranceMismatch",
        "Eligibility record patient differs from the encounter patient",
        "SELECT H.INSID, P.PATID, P.PATNAME, P.CHARTNO \
         FROM {schema}.TSCHEDULE S \
         JOIN {schema}.THEALTHINSURANCE H ON H.SCHID = S.SCHID \
         JOIN {schema}.TPATIENT P ON P.PATID = S.PATID \
         WHERE S.PATID != H.PATID \
           AND S.SCHDATE >= $1",
    ),
    (
        "doctorMismatch",
        "Procedure slip clinician differs from the medical record clinician",
        "SELECT P.PATID, P.PATNAME, P.CHARTNO, S.SCHID, M.MRID, M.CONSULTTIME, \
                E.EMPLNAME, E.EMPLID \
         FROM {schema}.TSCHEDULE S \
         JOIN {schema}.TPROCSLIP PR ON PR.SCHID = S.SCHID AND PR.SLPTYPE IN (2, 3) \
         JOIN {schema}.TMEDICALRECORD M ON M.MRID = PR.MRID \
         JOIN {schema}.TPATIENT P ON P.PATID = S.PATID \
         JOIN {schema}.TEMPLOYEE E ON E.EMPLID = M.DRID \
         WHERE S.SCHTYPE = 2 \
           AND PR.DRID != M.DRID \
           AND S.SCHDATE >= $1",
    ),
    (
        "dateMismatch",
        "Outpatient schedule date differs from the chart consult date",
        "SELECT P.PATID, P.PATNAME, P.CHARTNO, S.SCHID, M.MRID, M.CONSULTTIME, \
                E.EMPLID, E.EMPLNAME \
         FROM {schema}.TSCHEDULE S \
         JOIN {schema}.TMEDICALRECORD M ON M.SCHID = S.SCHID \
         JOIN {schema}.TPATIENT P ON P.PATID = S.PATID \
         JOIN {schema}.TEMPLOYEE E ON E.EMPLID = M.DRID \
         WHERE S.SCHTYPE = 1 \
           AND S.SCHDATE >= $1 \
           AND S.SCHDATE != SUBSTR(M.CONSULTTIME, 1, 8)",
    ),
    (
        "duplicateSchedule",
        "Two inpatient schedules for the same patient, clinician, day and type",
        "SELECT P.PATID, P.PATNAME, P.CHARTNO, A.SCHID, B.SCHID AS DUPSCHID, A.SCHDATE, \
                E.EMPLNAME, E.EMPLID, A.VISITTYPE \
         FROM {schema}.TSCHEDULE A \
         JOIN {schema}.TSCHEDULE B ON B.PATID = A.PATID \
                                   AND B.SCHDATE = A.SCHDATE \
                                   AND B.DRID = A.DRID \
                                   AND B.SCHTYPE = A.SCHTYPE \
                                   AND B.VISITTYPE = A.VISITTYPE \
                                   AND A.SCHID < B.SCHID \
         JOIN {schema}.TPATIENT P ON P.PATID = A.PATID \
         JOIN {schema}.TEMPLOYEE E ON E.EMPLID = A.DRID \
         WHERE A.SCHTYPE = 2 \
           AND A.ORGSCHID = 0 \
           AND B.ORGSCHID = 0 \
           AND A.SCHDATE >= $1",
    ),
    (
        "scheduleTwist",
        "Inpatient chart and its revision history point at different schedules",
        "SELECT P.PATID, P.PATNAME, P.CHARTNO, M.MRID, M.SCHID, H.SCHID AS HISSCHID, \
                M.CONSULTTIME \
         FROM {schema}.TMEDICALRECORD M \
         JOIN {schema}.TMEDICALRECORDHIS H ON H.MRID = M.MRID \
         JOIN {schema}.TSCHEDULE S ON S.SCHID = M.SCHID \
         JOIN {schema}.TPATIENT P ON P.PATID = S.PATID \
         WHERE S.SCHTYPE = 2 \
           AND H.SCHID != M.SCHID \
           AND S.SCHDATE >= $1",
    ),
    (
        "duplicateMeal",
        "A meal item code repeated within one inpatient medical record",
        "SELECT P.PATID, P.PATNAME, P.CHARTNO, M.MRID, M.CONSULTTIME, PR.ITEMCODE, \
                COUNT(*) AS DUPCOUNT \
         FROM {schema}.TSCHEDULE S \
         JOIN {schema}.TMEDICALRECORD M ON M.SCHID = S.SCHID \
         JOIN {schema}.TPROCSLIP PR ON PR.MRID = M.MRID AND PR.SLPTYPE = 5 \
         JOIN {schema}.TPATIENT P ON P.PATID = S.PATID \
         WHERE S.SCHTYPE = 2 \
           AND S.SCHDATE >= $1 \
         GROUP BY P.PATID, P.PATNAME, P.CHARTNO, M.MRID, M.CONSULTTIME, PR.ITEMCODE \
         HAVING COUNT(*) > 1",
    ),
    (
        "visitTypeConsult",
        "Primary inpatient schedule recorded as a cooperative consult",
        "SELECT P.PATID, P.PATNAME, P.CHARTNO, S.SCHID, M.MRID, M.CONSULTTIME, \
                E.EMPLNAME, E.EMPLID, S.VISITTYPE \
         FROM {schema}.TSCHEDULE S \
         JOIN {schema}.TPATIENT P ON P.PATID = S.PATID \
         JOIN {schema}.TMEDICALRECORD M ON M.SCHID = S.SCHID \
         JOIN {schema}.TEMPLOYEE E ON E.EMPLID = M.DRID \
         WHERE S.ORGSCHID = 0 \
           AND S.SCHTYPE = 2 \
           AND S.VISITTYPE IN (5, 6) \
           AND S.SCHDATE >= $1",
    ),
    (
        "multiDeptChart",
        "Primary inpatient schedule holding both medical and oriental-medicine charts",
        "SELECT P.PATID, P.PATNAME, P.CHARTNO, S.SCHID, S.SCHDATE, \
                COUNT(DISTINCT D.DEPTTYPE) AS DEPTCOUNT \
         FROM {schema}.TSCHEDULE S \
         JOIN {schema}.TMEDICALRECORD M ON M.SCHID = S.SCHID \
         JOIN {schema}.TDEPARTMENT D ON D.DEPTID = M.DEPTID \
         JOIN {schema}.TPATIENT P ON P.PATID = S.PATID \
         WHERE S.ORGSCHID = 0 \
           AND S.SCHTYPE = 2 \
           AND S.SCHDATE >= $1 \
         GROUP BY P.PATID, P.PATNAME, P.CHARTNO, S.SCHID, S.SCHDATE \
         HAVING COUNT(DISTINCT D.DEPTTYPE) > 1",
    ),
    (
        "patientIdTwist",
        "Slips of one medical record reference a patient other than the record's",
        "SELECT M.MRID, M.PATID, M.CONSULTTIME, COUNT(*) AS SLIPCOUNT, \
                SUM(PR.PATID) AS PATIDSUM \
         FROM {schema}.TMEDICALRECORD M \
         JOIN {schema}.TPROCSLIP PR ON PR.MRID = M.MRID \
         JOIN {schema}.TSCHEDULE S ON S.SCHID = M.SCHID \
         WHERE M.PATID <> 0 \
           AND S.SCHDATE >= $1 \
         GROUP BY M.MRID, M.PATID, M.CONSULTTIME \
         HAVING MOD(SUM(PR.PATID), M.PATID) <> 0 \
             OR SUM(PR.PATID) <> COUNT(*) * M.PATID",
    ),
    (
        "cuppingOnlyTwice",
        "Cupping item P0001002 left exactly twice on one medical record",
        "SELECT P.PATID, P.PATNAME, P.CHARTNO, M.MRID, M.CONSULTTIME, \
                COUNT(*) AS ITEMCOUNT \
         FROM {schema}.TSCHEDULE S \
         JOIN {schema}.TMEDICALRECORD M ON M.SCHID = S.SCHID \
         JOIN {schema}.TPROCSLIP PR ON PR.MRID = M.MRID AND PR.ITEMCODE = 'P0001002' \
         JOIN {schema}.TPATIENT P ON P.PATID = S.PATID \
         WHERE S.SCHDATE >= $1 \
         GROUP BY P.PATID, P.PATNAME, P.CHARTNO, M.MRID, M.CONSULTTIME \
         HAVING COUNT(*) = 2",
    ),
];
