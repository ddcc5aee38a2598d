//! Read-side store over the persisted outputs of a run.

use super::query::FactQuery;
use super::reports::{
    EnrollmentRank, IndexRank, MunicipalitySlice, NetworkIndexSummary, PerformanceRates,
    RegionOfficeEnrollment, SummaryStats, mean,
};
use crate::config::OutputNames;
use crate::error::{PipelineError, Result, ResultExt};
use crate::pipeline::PipelineResult;
use crate::reporting::frames;
use crate::sources::text_values;
use crate::types::{EnrollmentRow, FactRow, Grade, MunicipalityOffice, Network, SourceIndexRecord};
use crate::utils::canonical_code;
use polars::io::csv::read::{CsvParseOptions, CsvReadOptions};
use polars::prelude::*;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Municipality lookup file kept next to the outputs.
pub const CITIES_FILE: &str = "cities.csv";

const CITY_NAME: &str = "municipio";
const CITY_CODE: &str = "ibge_code";
const CITY_OFFICE: &str = "sre";

/// The consolidated tables plus the municipality lookup, loaded once.
///
/// Reloading means building a new store; nothing here is cached globally.
///
/// # Example
///
/// ```rust,ignore
/// use edu_indicators::{DataStore, FactQuery, Network};
/// use edu_indicators::config::OutputNames;
///
/// let store = DataStore::open("database", &OutputNames::default())?;
/// let query = FactQuery::all().with_network(Network::Estadual);
/// for (grade, rates) in store.performance_by_grade(&query) {
///     println!("{}: {:.1}% approved", grade.label(), rates.approval_pct);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct DataStore {
    facts: Vec<FactRow>,
    enrollment: Vec<EnrollmentRow>,
    index: Vec<SourceIndexRecord>,
    offices: Vec<MunicipalityOffice>,
}

static_assertions::assert_impl_all!(DataStore: Send, Sync);

impl DataStore {
    /// Load the fact table, both aggregates and the optional `cities.csv` from `dir`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::NoDataLoaded`] when one of the three tables is missing.
    pub fn open(dir: impl AsRef<Path>, names: &OutputNames) -> Result<Self> {
        let dir = dir.as_ref();

        let facts = frames::facts_from_frame(&read_table(&require(dir, &names.fact_table)?, b';')?)?;
        let enrollment =
            frames::enrollment_from_frame(&read_table(&require(dir, &names.enrollment_aggregate)?, b';')?)?;
        let index = frames::index_from_frame(&read_table(&require(dir, &names.index_aggregate)?, b';')?)?;

        let cities_path = dir.join(CITIES_FILE);
        let offices = if cities_path.is_file() {
            read_offices(&cities_path)?
        } else {
            debug!("No {} in {}; region offices unavailable", CITIES_FILE, dir.display());
            Vec::new()
        };

        info!(
            "Loaded {} fact rows, {} enrollment rows, {} index rows, {} municipalities from {}",
            facts.len(),
            enrollment.len(),
            index.len(),
            offices.len(),
            dir.display()
        );

        Ok(Self::from_parts(facts, enrollment, index, offices))
    }

    pub fn from_parts(
        facts: Vec<FactRow>,
        enrollment: Vec<EnrollmentRow>,
        index: Vec<SourceIndexRecord>,
        offices: Vec<MunicipalityOffice>,
    ) -> Self {
        Self {
            facts,
            enrollment,
            index,
            offices,
        }
    }

    /// Serve a finished run directly, without reading its files back.
    pub fn from_result(result: &PipelineResult, offices: Vec<MunicipalityOffice>) -> Self {
        Self::from_parts(
            result.facts.clone(),
            result.enrollment.clone(),
            result.index.clone(),
            offices,
        )
    }

    pub fn offices(&self) -> &[MunicipalityOffice] {
        &self.offices
    }

    pub fn summary_stats(&self) -> SummaryStats {
        let municipality_count = if self.offices.is_empty() {
            self.facts
                .iter()
                .map(|fact| fact.municipality_code.as_str())
                .collect::<HashSet<_>>()
                .len()
        } else {
            self.offices.len()
        };
        let networks: BTreeSet<&str> = self.index.iter().map(|r| r.network.as_str()).collect();

        SummaryStats {
            municipality_count,
            index_records: self.index.len(),
            above_target_records: self
                .index
                .iter()
                .filter(|r| r.above_target() == Some(true))
                .count(),
            total_enrollment: self.enrollment.iter().map(|r| r.enrollment).sum(),
            mean_approval_rate: mean(self.facts.iter().filter_map(|f| f.approval_rate)),
            mean_dropout_rate: mean(self.facts.iter().filter_map(|f| f.dropout_rate)),
            networks: networks.into_iter().map(str::to_string).collect(),
        }
    }

    /// Sorted, de-duplicated municipality names; from the lookup when loaded.
    pub fn municipality_names(&self) -> Vec<String> {
        let names: BTreeSet<&str> = if self.offices.is_empty() {
            self.facts.iter().map(|f| f.municipality_name.as_str()).collect()
        } else {
            self.offices.iter().map(|o| o.municipality_name.as_str()).collect()
        };
        names.into_iter().map(str::to_string).collect()
    }

    pub fn region_offices(&self) -> Vec<String> {
        let offices: BTreeSet<&str> = self
            .offices
            .iter()
            .map(|o| o.region_office.as_str())
            .filter(|office| !office.is_empty())
            .collect();
        offices.into_iter().map(str::to_string).collect()
    }

    /// Fact rows matching `query`, in stored order.
    pub fn facts(&self, query: &FactQuery) -> Vec<&FactRow> {
        let codes = self.resolve_codes(query);
        self.facts
            .iter()
            .filter(|f| {
                query.matches_network(f.network)
                    && query.matches_grade(f.grade)
                    && selects(&codes, &f.municipality_code)
            })
            .collect()
    }

    fn enrollment_rows(&self, query: &FactQuery) -> Vec<&EnrollmentRow> {
        let codes = self.resolve_codes(query);
        self.enrollment
            .iter()
            .filter(|r| {
                query.matches_network(r.network)
                    && query.matches_grade(r.grade)
                    && selects(&codes, &r.municipality_code)
            })
            .collect()
    }

    /// Index records matching `query`; the grade filter does not apply.
    fn index_records(&self, query: &FactQuery) -> Vec<&SourceIndexRecord> {
        let codes = self.resolve_codes(query);
        self.index
            .iter()
            .filter(|r| {
                query
                    .network
                    .is_none_or(|wanted| r.network.trim() == wanted.as_str())
                    && selects(&codes, &r.municipality_code)
            })
            .collect()
    }

    /// Every row of one municipality, or `None` for an unknown name.
    pub fn municipality_slice(&self, name: &str) -> Option<MunicipalitySlice> {
        let codes = self.codes_for_name(name);
        let code = codes.iter().min()?.clone();
        let query = FactQuery::all().with_municipality(name);

        Some(MunicipalitySlice {
            municipality_code: code,
            index: self.index_records(&query).into_iter().cloned().collect(),
            enrollment: self.enrollment_rows(&query).into_iter().cloned().collect(),
            facts: self.facts(&query).into_iter().cloned().collect(),
        })
    }

    pub fn performance(&self, query: &FactQuery) -> PerformanceRates {
        PerformanceRates::from_facts(self.facts(query))
    }

    pub fn performance_by_grade(&self, query: &FactQuery) -> BTreeMap<Grade, PerformanceRates> {
        let mut groups: BTreeMap<Grade, Vec<&FactRow>> = BTreeMap::new();
        for fact in self.facts(query) {
            groups.entry(fact.grade).or_default().push(fact);
        }
        groups
            .into_iter()
            .map(|(grade, facts)| (grade, PerformanceRates::from_facts(facts)))
            .collect()
    }

    pub fn performance_by_network(&self, query: &FactQuery) -> BTreeMap<Network, PerformanceRates> {
        let mut groups: BTreeMap<Network, Vec<&FactRow>> = BTreeMap::new();
        for fact in self.facts(query) {
            groups.entry(fact.network).or_default().push(fact);
        }
        groups
            .into_iter()
            .map(|(network, facts)| (network, PerformanceRates::from_facts(facts)))
            .collect()
    }

    pub fn enrollment_by_grade(&self, query: &FactQuery) -> BTreeMap<Grade, i64> {
        let mut totals = BTreeMap::new();
        for row in self.enrollment_rows(query) {
            *totals.entry(row.grade).or_insert(0) += row.enrollment;
        }
        totals
    }

    pub fn enrollment_by_network(&self, query: &FactQuery) -> BTreeMap<Network, i64> {
        let mut totals = BTreeMap::new();
        for row in self.enrollment_rows(query) {
            *totals.entry(row.network).or_insert(0) += row.enrollment;
        }
        totals
    }

    /// Largest (municipality, network) enrollments, at most `limit` entries.
    pub fn enrollment_ranking(&self, query: &FactQuery, limit: usize) -> Vec<EnrollmentRank> {
        let mut totals: HashMap<(&str, Network), i64> = HashMap::new();
        for row in self.enrollment_rows(query) {
            *totals
                .entry((row.municipality_name.as_str(), row.network))
                .or_insert(0) += row.enrollment;
        }

        let mut ranking: Vec<EnrollmentRank> = totals
            .into_iter()
            .map(|((name, network), enrollment)| EnrollmentRank {
                municipality_name: name.to_string(),
                network,
                enrollment,
            })
            .collect();
        ranking.sort_by(|a, b| {
            b.enrollment
                .cmp(&a.enrollment)
                .then_with(|| a.municipality_name.cmp(&b.municipality_name))
                .then_with(|| a.network.cmp(&b.network))
        });
        ranking.truncate(limit);
        ranking
    }

    /// Enrollment per region office, largest first.
    ///
    /// Rows whose municipality has no office in the lookup are left out.
    pub fn enrollment_by_region_office(&self, query: &FactQuery) -> Vec<RegionOfficeEnrollment> {
        let office_by_code: HashMap<&str, &str> = self
            .offices
            .iter()
            .map(|o| (o.municipality_code.as_str(), o.region_office.as_str()))
            .collect();

        let mut totals: HashMap<&str, i64> = HashMap::new();
        for row in self.enrollment_rows(query) {
            if let Some(&office) = office_by_code.get(row.municipality_code.as_str()) {
                *totals.entry(office).or_insert(0) += row.enrollment;
            }
        }

        let mut offices: Vec<RegionOfficeEnrollment> = totals
            .into_iter()
            .map(|(office, enrollment)| RegionOfficeEnrollment {
                region_office: office.to_string(),
                enrollment,
            })
            .collect();
        offices.sort_by(|a, b| {
            b.enrollment
                .cmp(&a.enrollment)
                .then_with(|| a.region_office.cmp(&b.region_office))
        });
        offices
    }

    /// Per-network means over index records that have an observed value.
    pub fn index_by_network(&self, query: &FactQuery) -> Vec<NetworkIndexSummary> {
        let mut groups: BTreeMap<Network, Vec<&SourceIndexRecord>> = BTreeMap::new();
        for record in self.index_records(query) {
            if record.observed.is_none() {
                continue;
            }
            if let Some(network) = Network::from_label(&record.network) {
                groups.entry(network).or_default().push(record);
            }
        }

        groups
            .into_iter()
            .map(|(network, records)| NetworkIndexSummary {
                network,
                records: records.len(),
                mean_observed: mean(records.iter().filter_map(|r| r.observed)).unwrap_or(0.0),
                mean_target: mean(records.iter().filter_map(|r| r.target)),
                above_target: records
                    .iter()
                    .filter(|r| r.above_target() == Some(true))
                    .count(),
            })
            .collect()
    }

    /// Highest observed index values, at most `limit` entries.
    pub fn index_ranking(&self, query: &FactQuery, limit: usize) -> Vec<IndexRank> {
        let mut ranking: Vec<IndexRank> = self
            .index_records(query)
            .into_iter()
            .filter_map(|r| {
                Some(IndexRank {
                    municipality_name: r.municipality_name.clone(),
                    network: r.network.clone(),
                    observed: r.observed?,
                    target: r.target,
                    above_target: r.above_target(),
                })
            })
            .collect();
        ranking.sort_by(|a, b| {
            b.observed
                .total_cmp(&a.observed)
                .then_with(|| a.municipality_name.cmp(&b.municipality_name))
                .then_with(|| a.network.cmp(&b.network))
        });
        ranking.truncate(limit);
        ranking
    }

    /// Municipality codes selected by the name and office filters.
    ///
    /// `None` means no restriction.
    fn resolve_codes(&self, query: &FactQuery) -> Option<HashSet<String>> {
        let by_name = query.municipality.as_deref().map(|name| self.codes_for_name(name));
        let by_office = query.region_office.as_deref().map(|office| {
            self.offices
                .iter()
                .filter(|o| o.region_office == office)
                .map(|o| o.municipality_code.clone())
                .collect::<HashSet<_>>()
        });

        match (by_name, by_office) {
            (Some(names), Some(offices)) => Some(names.intersection(&offices).cloned().collect()),
            (names, offices) => names.or(offices),
        }
    }

    /// Codes for a municipality name: the lookup first, then the tables' own names.
    fn codes_for_name(&self, name: &str) -> HashSet<String> {
        let name = name.trim();
        let from_lookup: HashSet<String> = self
            .offices
            .iter()
            .filter(|o| o.municipality_name == name)
            .map(|o| o.municipality_code.clone())
            .collect();
        if !from_lookup.is_empty() {
            return from_lookup;
        }

        self.facts
            .iter()
            .map(|f| (&f.municipality_name, &f.municipality_code))
            .chain(self.enrollment.iter().map(|r| (&r.municipality_name, &r.municipality_code)))
            .chain(self.index.iter().map(|r| (&r.municipality_name, &r.municipality_code)))
            .filter(|(candidate, _)| candidate.as_str() == name)
            .map(|(_, code)| code.clone())
            .collect()
    }
}

fn selects(codes: &Option<HashSet<String>>, code: &str) -> bool {
    codes.as_ref().is_none_or(|codes| codes.contains(code))
}

fn require(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    if path.is_file() {
        Ok(path)
    } else {
        Err(PipelineError::NoDataLoaded(path))
    }
}

/// Read a delimited UTF-8 table with every column as text.
fn read_table(path: &Path, separator: u8) -> Result<DataFrame> {
    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(separator)
                .with_quote_char(Some(b'"')),
        )
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .context(format!("Failed to read {}", path.display()))
}

fn read_offices(path: &Path) -> Result<Vec<MunicipalityOffice>> {
    let df = read_table(path, b',')?;
    let names = text_values(&df, CITY_NAME).context(format!("{} needs a '{}' column", CITIES_FILE, CITY_NAME))?;
    let codes = text_values(&df, CITY_CODE).context(format!("{} needs a '{}' column", CITIES_FILE, CITY_CODE))?;
    let offices = text_values(&df, CITY_OFFICE).context(format!("{} needs a '{}' column", CITIES_FILE, CITY_OFFICE))?;

    let mut lookup = Vec::with_capacity(df.height());
    let mut unusable = 0;
    for ((name, code), office) in names.into_iter().zip(codes).zip(offices) {
        let name = name.filter(|n| !n.trim().is_empty());
        let code = code.filter(|c| !c.trim().is_empty());
        let (Some(name), Some(code)) = (name, code) else {
            unusable += 1;
            continue;
        };
        lookup.push(MunicipalityOffice {
            municipality_name: name.trim().to_string(),
            municipality_code: canonical_code(&code),
            region_office: office.map(|o| o.trim().to_string()).unwrap_or_default(),
        });
    }
    if unusable > 0 {
        warn!("Skipped {} rows of {} without a name or code", unusable, CITIES_FILE);
    }
    Ok(lookup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GradeRates;
    use pretty_assertions::assert_eq;

    fn fact(code: &str, name: &str, network: Network, grade: Grade, enrollment: i64, approval: f64) -> FactRow {
        let mut fact = FactRow::from_enrollment(&EnrollmentRow {
            municipality_code: code.into(),
            municipality_name: name.into(),
            region: "ES".into(),
            network,
            grade,
            enrollment,
        });
        let rates = GradeRates {
            approval: Some(approval),
            retention: Some(0.0),
            dropout: Some(1.0 - approval),
        };
        fact.approval_rate = rates.approval;
        fact.retention_rate = rates.retention;
        fact.dropout_rate = rates.dropout;
        crate::metrics::apply_absolute_counts(std::slice::from_mut(&mut fact));
        fact
    }

    fn enrollment_of(fact: &FactRow) -> EnrollmentRow {
        EnrollmentRow {
            municipality_code: fact.municipality_code.clone(),
            municipality_name: fact.municipality_name.clone(),
            region: fact.region.clone(),
            network: fact.network,
            grade: fact.grade,
            enrollment: fact.enrollment,
        }
    }

    fn index(code: &str, name: &str, network: &str, observed: Option<f64>, target: Option<f64>) -> SourceIndexRecord {
        SourceIndexRecord {
            region: "ES".into(),
            municipality_code: code.into(),
            municipality_name: name.into(),
            observed,
            target,
            network: network.into(),
        }
    }

    fn office(name: &str, code: &str, office: &str) -> MunicipalityOffice {
        MunicipalityOffice {
            municipality_name: name.into(),
            municipality_code: code.into(),
            region_office: office.into(),
        }
    }

    fn store() -> DataStore {
        let facts = vec![
            fact("1", "Vitória", Network::Estadual, Grade::SIXTH, 100, 0.9),
            fact("1", "Vitória", Network::Municipal, Grade::SIXTH, 300, 0.5),
            fact("2", "Serra", Network::Municipal, Grade::NINTH, 50, 1.0),
            fact("3", "Aracruz", Network::Estadual, Grade::NINTH, 10, 0.0),
        ];
        let enrollment = facts.iter().map(enrollment_of).collect();
        let index = vec![
            index("1", "Vitória", "Estadual", Some(5.0), Some(4.0)),
            index("1", "Vitória", "Municipal", Some(4.0), Some(5.0)),
            index("2", "Serra", "Municipal", Some(6.0), Some(5.5)),
            index("3", "Aracruz", "Estadual", None, Some(4.0)),
        ];
        let offices = vec![
            office("Vitória", "1", "Carapina"),
            office("Serra", "2", "Carapina"),
            office("Aracruz", "3", "Linhares"),
        ];
        DataStore::from_parts(facts, enrollment, index, offices)
    }

    #[test]
    fn test_summary_stats() {
        let stats = store().summary_stats();

        assert_eq!(stats.municipality_count, 3);
        assert_eq!(stats.index_records, 4);
        assert_eq!(stats.above_target_records, 2);
        assert_eq!(stats.total_enrollment, 460);
        assert!((stats.mean_approval_rate.unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(stats.networks, vec!["Estadual", "Municipal"]);
    }

    #[test]
    fn test_lists() {
        let store = store();
        assert_eq!(store.municipality_names(), vec!["Aracruz", "Serra", "Vitória"]);
        assert_eq!(store.region_offices(), vec!["Carapina", "Linhares"]);
    }

    #[test]
    fn test_lists_without_lookup_fall_back_to_facts() {
        let full = store();
        let store = DataStore::from_parts(full.facts.clone(), vec![], vec![], vec![]);

        assert_eq!(store.municipality_names(), vec!["Aracruz", "Serra", "Vitória"]);
        assert!(store.region_offices().is_empty());
        assert_eq!(store.summary_stats().municipality_count, 3);
    }

    #[test]
    fn test_performance_weighted_by_enrollment() {
        let store = store();
        let rates = store.performance(&FactQuery::all().with_municipality("Vitória"));

        // (90 + 150) / 400
        assert_eq!(rates.enrollment, 400);
        assert!((rates.approval_pct - 60.0).abs() < 1e-9);
        assert!((rates.dropout_pct - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_performance_groups() {
        let store = store();

        let by_grade = store.performance_by_grade(&FactQuery::all());
        assert_eq!(by_grade.keys().copied().collect::<Vec<_>>(), vec![Grade::SIXTH, Grade::NINTH]);
        assert_eq!(by_grade[&Grade::NINTH].enrollment, 60);

        let by_network = store.performance_by_network(&FactQuery::all().with_grade(Grade::SIXTH));
        assert!((by_network[&Network::Estadual].approval_pct - 90.0).abs() < 1e-9);
        assert!((by_network[&Network::Municipal].approval_pct - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_enrollment_views() {
        let store = store();

        let by_network = store.enrollment_by_network(&FactQuery::all());
        assert_eq!(by_network[&Network::Estadual], 110);
        assert_eq!(by_network[&Network::Municipal], 350);

        let ranking = store.enrollment_ranking(&FactQuery::all(), 2);
        assert_eq!(
            ranking,
            vec![
                EnrollmentRank {
                    municipality_name: "Vitória".into(),
                    network: Network::Municipal,
                    enrollment: 300,
                },
                EnrollmentRank {
                    municipality_name: "Vitória".into(),
                    network: Network::Estadual,
                    enrollment: 100,
                },
            ]
        );
    }

    #[test]
    fn test_enrollment_by_region_office() {
        let offices = store().enrollment_by_region_office(&FactQuery::all());

        assert_eq!(
            offices,
            vec![
                RegionOfficeEnrollment {
                    region_office: "Carapina".into(),
                    enrollment: 450,
                },
                RegionOfficeEnrollment {
                    region_office: "Linhares".into(),
                    enrollment: 10,
                },
            ]
        );
    }

    #[test]
    fn test_region_office_filter() {
        let store = store();
        let query = FactQuery::all().with_region_office("Linhares");

        let facts = store.facts(&query);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].municipality_name, "Aracruz");
        assert_eq!(store.enrollment_by_grade(&query)[&Grade::NINTH], 10);
    }

    #[test]
    fn test_index_views() {
        let store = store();

        let by_network = store.index_by_network(&FactQuery::all());
        assert_eq!(by_network.len(), 2);
        // Aracruz has no observed value and is left out.
        assert_eq!(by_network[0].network, Network::Estadual);
        assert_eq!(by_network[0].records, 1);
        assert_eq!(by_network[1].records, 2);
        assert_eq!(by_network[1].mean_observed, 5.0);
        assert_eq!(by_network[1].above_target, 1);

        let ranking = store.index_ranking(&FactQuery::all().with_network(Network::Municipal), 10);
        let names: Vec<&str> = ranking.iter().map(|r| r.municipality_name.as_str()).collect();
        assert_eq!(names, vec!["Serra", "Vitória"]);
        assert_eq!(ranking[1].above_target, Some(false));
    }

    #[test]
    fn test_municipality_slice() {
        let store = store();

        let slice = store.municipality_slice("Serra").unwrap();
        assert_eq!(slice.municipality_code, "2");
        assert_eq!(slice.facts.len(), 1);
        assert_eq!(slice.enrollment.len(), 1);
        assert_eq!(slice.index.len(), 1);

        assert!(store.municipality_slice("Atlantis").is_none());
    }

    #[test]
    fn test_open_requires_fact_table() {
        let dir = tempfile::tempdir().unwrap();

        let err = DataStore::open(dir.path(), &OutputNames::default()).unwrap_err();

        assert_eq!(err.error_code(), "NO_DATA_LOADED");
    }

    #[test]
    fn test_read_offices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CITIES_FILE);
        std::fs::write(
            &path,
            "municipio,ibge_code,sre\nVitória,3205309,Carapina\n,3200102,Afonso Cláudio\nSerra,3205002.0,Carapina\n",
        )
        .unwrap();

        let offices = read_offices(&path).unwrap();

        assert_eq!(
            offices,
            vec![
                office("Vitória", "3205309", "Carapina"),
                office("Serra", "3205002", "Carapina"),
            ]
        );
    }
}
