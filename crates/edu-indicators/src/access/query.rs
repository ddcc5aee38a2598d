//! Immutable row filters used by every report.

use crate::types::{Grade, Network};
use serde::{Deserialize, Serialize};

/// Filter over the consolidated tables.
///
/// Each `with_*` call returns a new query; unset fields match everything.
/// Municipality and region-office filters are resolved against the
/// municipality lookup by [`super::DataStore`].
///
/// # Example
///
/// ```rust,ignore
/// use edu_indicators::{FactQuery, Grade, Network};
///
/// let query = FactQuery::all()
///     .with_network(Network::Municipal)
///     .with_grade(Grade::NINTH);
/// let rates = store.performance(&query);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<Grade>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub municipality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_office: Option<String>,
}

impl FactQuery {
    /// A query matching every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_network(self, network: Network) -> Self {
        Self {
            network: Some(network),
            ..self
        }
    }

    pub fn with_grade(self, grade: Grade) -> Self {
        Self {
            grade: Some(grade),
            ..self
        }
    }

    pub fn with_municipality(self, name: impl Into<String>) -> Self {
        Self {
            municipality: Some(name.into()),
            ..self
        }
    }

    pub fn with_region_office(self, office: impl Into<String>) -> Self {
        Self {
            region_office: Some(office.into()),
            ..self
        }
    }

    pub fn is_unfiltered(&self) -> bool {
        *self == Self::all()
    }

    pub(crate) fn matches_network(&self, network: Network) -> bool {
        self.network.is_none_or(|wanted| wanted == network)
    }

    pub(crate) fn matches_grade(&self, grade: Grade) -> bool {
        self.grade.is_none_or(|wanted| wanted == grade)
    }
}
