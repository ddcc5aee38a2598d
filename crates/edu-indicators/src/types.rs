//! Typed records for every table the pipeline touches.
//!
//! Source extracts arrive as loosely typed text. After coercion each row is
//! lifted into one of the `Source*Record` structs below, and everything
//! downstream (filtering, reshaping, joining, persistence) works on these
//! structs rather than on named columns.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Grain dimensions
// ============================================================================

/// One schooling year of the final cycle of primary education (6th to 9th).
///
/// The inner value is private, so a `Grade` outside 6..=9 cannot be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Grade(u8);

static GRADE_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([6-9])\s*(?:º|°|o|ª)?\s*(?:ano)?\s*$").expect("Invalid regex: grade label"));

impl Grade {
    pub const SIXTH: Grade = Grade(6);
    pub const SEVENTH: Grade = Grade(7);
    pub const EIGHTH: Grade = Grade(8);
    pub const NINTH: Grade = Grade(9);

    /// All grades in ascending order.
    pub const ALL: [Grade; 4] = [Self::SIXTH, Self::SEVENTH, Self::EIGHTH, Self::NINTH];

    pub fn new(value: u8) -> Option<Self> {
        (6..=9).contains(&value).then_some(Grade(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Position of this grade inside per-grade arrays (`0` for the 6th year).
    pub fn index(self) -> usize {
        usize::from(self.0 - 6)
    }

    /// Parse a presentation label such as `"6º ano"`, `"7o ano"` or `"8"`.
    pub fn parse_label(label: &str) -> Option<Self> {
        let caps = GRADE_LABEL.captures(label)?;
        caps.get(1)?.as_str().parse::<u8>().ok().and_then(Grade::new)
    }

    /// Presentation label, e.g. `"6º ano"`.
    pub fn label(self) -> String {
        format!("{}º ano", self.0)
    }
}

impl TryFrom<u8> for Grade {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Grade::new(value).ok_or_else(|| format!("grade {} outside 6..=9", value))
    }
}

impl From<Grade> for u8 {
    fn from(grade: Grade) -> u8 {
        grade.0
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Administrative network of a public school.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Network {
    /// State-run schools.
    Estadual,
    /// Municipally-run schools.
    Municipal,
}

impl Network {
    pub const ALL: [Network; 2] = [Network::Estadual, Network::Municipal];

    pub fn as_str(self) -> &'static str {
        match self {
            Network::Estadual => "Estadual",
            Network::Municipal => "Municipal",
        }
    }

    /// Match a network label exactly as the index and rate extracts spell it.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Estadual" => Some(Network::Estadual),
            "Municipal" => Some(Network::Municipal),
            _ => None,
        }
    }

    /// Derive the network from a census dependency code.
    ///
    /// Code `"2"` is state administration; every other code that survives
    /// the enrollment filter is treated as municipal.
    pub fn from_dependency_code(code: &str) -> Self {
        if code == STATE_DEPENDENCY_CODE {
            Network::Estadual
        } else {
            Network::Municipal
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Census dependency code for state administration.
pub const STATE_DEPENDENCY_CODE: &str = "2";

/// Composite key of the output grain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GrainKey {
    pub municipality_code: String,
    pub network: Network,
    pub grade: Grade,
}

impl GrainKey {
    pub fn new(municipality_code: impl Into<String>, network: Network, grade: Grade) -> Self {
        Self {
            municipality_code: municipality_code.into(),
            network,
            grade,
        }
    }
}

// ============================================================================
// Source records
// ============================================================================

/// One row of the index-and-target extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceIndexRecord {
    pub region: String,
    pub municipality_code: String,
    pub municipality_name: String,
    pub observed: Option<f64>,
    pub target: Option<f64>,
    pub network: String,
}

impl SourceIndexRecord {
    /// Whether the observed index reached the target.
    ///
    /// `None` when either side is missing; the legacy behaviour of reporting
    /// `false` in that case is left to the consuming layer.
    pub fn above_target(&self) -> Option<bool> {
        above_target(self.observed, self.target)
    }
}

/// Null-propagating `observed >= target`.
pub fn above_target(observed: Option<f64>, target: Option<f64>) -> Option<bool> {
    match (observed, target) {
        (Some(observed), Some(target)) => Some(observed >= target),
        _ => None,
    }
}

/// One school-level row of the enrollment census.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEnrollmentRecord {
    pub census_year: String,
    pub region: String,
    pub municipality_code: String,
    pub municipality_name: String,
    /// Enrollment per grade, indexed with [`Grade::index`].
    pub enrollment: [i64; 4],
    pub dependency_code: String,
}

impl SourceEnrollmentRecord {
    pub fn enrollment_for(&self, grade: Grade) -> i64 {
        self.enrollment[grade.index()]
    }
}

/// Approval, retention and dropout for one grade, as fractions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GradeRates {
    pub approval: Option<f64>,
    pub retention: Option<f64>,
    pub dropout: Option<f64>,
}

/// One row of the promotion/retention/dropout extract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRateRecord {
    pub census_year: String,
    pub region: String,
    pub municipality_code: String,
    pub municipality_name: String,
    pub network: String,
    pub category: String,
    /// Rates per grade, indexed with [`Grade::index`].
    pub rates: [GradeRates; 4],
}

impl SourceRateRecord {
    pub fn rates_for(&self, grade: Grade) -> GradeRates {
        self.rates[grade.index()]
    }
}

// ============================================================================
// Long (one row per grade) tables
// ============================================================================

/// Enrollment after aggregation by municipality and network, one row per grade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentRow {
    pub municipality_code: String,
    pub municipality_name: String,
    pub region: String,
    pub network: Network,
    pub grade: Grade,
    pub enrollment: i64,
}

impl EnrollmentRow {
    pub fn key(&self) -> GrainKey {
        GrainKey::new(self.municipality_code.clone(), self.network, self.grade)
    }
}

/// Rates for one (municipality, network, grade).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRow {
    pub municipality_code: String,
    pub network: Network,
    pub grade: Grade,
    pub rates: GradeRates,
}

impl RateRow {
    pub fn key(&self) -> GrainKey {
        GrainKey::new(self.municipality_code.clone(), self.network, self.grade)
    }
}

/// Index values repeated for one grade.
///
/// The index is published for the whole final cycle, not per grade; the
/// same observed/target pair is copied onto each of the four grades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    pub municipality_code: String,
    pub municipality_name: String,
    pub region: String,
    pub network: String,
    pub grade: Grade,
    pub observed: Option<f64>,
    pub target: Option<f64>,
    pub above_target: Option<bool>,
}

impl IndexRow {
    /// Join key, or `None` when the network label is not Estadual/Municipal.
    pub fn key(&self) -> Option<GrainKey> {
        Network::from_label(&self.network)
            .map(|network| GrainKey::new(self.municipality_code.clone(), network, self.grade))
    }
}

// ============================================================================
// Fact table
// ============================================================================

/// One row of the consolidated fact table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
    pub municipality_code: String,
    pub municipality_name: String,
    pub region: String,
    pub network: Network,
    pub grade: Grade,
    pub enrollment: i64,
    pub dropout_rate: Option<f64>,
    pub approval_rate: Option<f64>,
    pub retention_rate: Option<f64>,
    pub dropout_count: f64,
    pub approval_count: f64,
    pub retention_count: f64,
    pub observed_index: Option<f64>,
    pub target_index: Option<f64>,
    pub above_target: Option<bool>,
}

impl FactRow {
    /// A fact row carrying only enrollment; rates, counts and index are empty.
    pub fn from_enrollment(row: &EnrollmentRow) -> Self {
        Self {
            municipality_code: row.municipality_code.clone(),
            municipality_name: row.municipality_name.clone(),
            region: row.region.clone(),
            network: row.network,
            grade: row.grade,
            enrollment: row.enrollment,
            dropout_rate: None,
            approval_rate: None,
            retention_rate: None,
            dropout_count: 0.0,
            approval_count: 0.0,
            retention_count: 0.0,
            observed_index: None,
            target_index: None,
            above_target: None,
        }
    }

    pub fn key(&self) -> GrainKey {
        GrainKey::new(self.municipality_code.clone(), self.network, self.grade)
    }
}

/// Municipality to region-office lookup supplied by the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MunicipalityOffice {
    pub municipality_name: String,
    pub municipality_code: String,
    pub region_office: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grade_bounds() {
        assert!(Grade::new(5).is_none());
        assert!(Grade::new(10).is_none());
        assert_eq!(Grade::new(7), Some(Grade::SEVENTH));
        assert_eq!(Grade::NINTH.index(), 3);
    }

    #[test]
    fn test_grade_labels() {
        assert_eq!(Grade::parse_label("6º ano"), Some(Grade::SIXTH));
        assert_eq!(Grade::parse_label("7o ano"), Some(Grade::SEVENTH));
        assert_eq!(Grade::parse_label(" 8 "), Some(Grade::EIGHTH));
        assert_eq!(Grade::parse_label("Todos"), None);
        assert_eq!(Grade::parse_label("5º ano"), None);
        assert_eq!(Grade::NINTH.label(), "9º ano");
    }

    #[test]
    fn test_grade_serde_rejects_out_of_range() {
        assert_eq!(serde_json::to_string(&Grade::SIXTH).unwrap(), "6");
        assert!(serde_json::from_str::<Grade>("4").is_err());
        assert_eq!(serde_json::from_str::<Grade>("9").unwrap(), Grade::NINTH);
    }

    #[test]
    fn test_network_from_dependency_code() {
        assert_eq!(Network::from_dependency_code("2"), Network::Estadual);
        assert_eq!(Network::from_dependency_code("3"), Network::Municipal);
    }

    #[test]
    fn test_network_from_label() {
        assert_eq!(Network::from_label("Estadual"), Some(Network::Estadual));
        assert_eq!(Network::from_label(" Municipal "), Some(Network::Municipal));
        assert_eq!(Network::from_label("Pública"), None);
    }

    #[test]
    fn test_above_target_propagates_null() {
        assert_eq!(above_target(Some(5.8), Some(5.5)), Some(true));
        assert_eq!(above_target(Some(5.5), Some(5.5)), Some(true));
        assert_eq!(above_target(Some(4.9), Some(5.5)), Some(false));
        assert_eq!(above_target(None, Some(5.5)), None);
        assert_eq!(above_target(Some(5.8), None), None);
    }

    #[test]
    fn test_index_row_key_requires_known_network() {
        let row = IndexRow {
            municipality_code: "3205309".into(),
            municipality_name: "Vitória".into(),
            region: "ES".into(),
            network: "Federal".into(),
            grade: Grade::SIXTH,
            observed: None,
            target: None,
            above_target: None,
        };
        assert!(row.key().is_none());
    }
}
