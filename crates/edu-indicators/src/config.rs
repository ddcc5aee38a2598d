//! Configuration types for the consolidation pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup. Every struct is
//! `#[serde(default)]`, so a JSON file only needs the fields it changes.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where and how to read one source extract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Path to the extract. Spreadsheet extensions are read as workbooks,
    /// anything else as delimited text.
    pub path: PathBuf,

    /// Sheet holding the table (spreadsheets only).
    pub sheet: String,

    /// Rows above the header row (title blocks, notes).
    pub skip_rows: usize,

    /// Field separator (delimited text only).
    pub separator: char,

    /// Text encoding label understood by the WHATWG Encoding Standard
    /// (delimited text only), e.g. `"latin1"` or `"utf-8"`.
    pub encoding: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::new(),
            sheet: String::new(),
            skip_rows: 0,
            separator: ';',
            encoding: "utf-8".to_string(),
        }
    }
}

impl SourceConfig {
    /// Defaults for the index-and-target workbook.
    pub fn index_default() -> Self {
        Self {
            path: PathBuf::from(
                "raw_data/divulgacao_anos_finais_municipios_2023/divulgacao_anos_finais_municipios_2023.xlsx",
            ),
            sheet: "IDEB_AF_MUNICÍPIOS".to_string(),
            skip_rows: 9,
            ..Self::default()
        }
    }

    /// Defaults for the enrollment census microdata.
    pub fn enrollment_default() -> Self {
        Self {
            path: PathBuf::from(
                "raw_data/microdados_censo_escolar_2023/dados/microdados_ed_basica_2023.csv",
            ),
            encoding: "latin1".to_string(),
            ..Self::default()
        }
    }

    /// Defaults for the promotion/retention/dropout workbook.
    pub fn rates_default() -> Self {
        Self {
            path: PathBuf::from("raw_data/tx_rend_municipios_2023/tx_rend_municipios_2023.xlsx"),
            // The published workbook names the sheet with a trailing space.
            sheet: "MUNICIPIOS ".to_string(),
            skip_rows: 8,
            ..Self::default()
        }
    }

    /// Convenience constructor for a delimited file with defaults for the rest.
    pub fn delimited(path: impl Into<PathBuf>, separator: char, encoding: &str) -> Self {
        Self {
            path: path.into(),
            separator,
            encoding: encoding.to_string(),
            ..Self::default()
        }
    }
}

/// Row filter settings shared by the three sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Region (state) code every source is restricted to.
    pub target_region: String,

    /// Network label dropped from the index source (aggregate of all public networks).
    pub excluded_index_network: String,

    /// Enrollment dependency codes to drop (federal and private by default).
    pub excluded_dependency_codes: Vec<String>,

    /// Network labels kept in the rate source.
    pub rate_networks: Vec<String>,

    /// Location category kept in the rate source.
    pub rate_category: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            target_region: "ES".to_string(),
            excluded_index_network: "Pública".to_string(),
            excluded_dependency_codes: vec!["1".to_string(), "4".to_string()],
            rate_networks: vec!["Estadual".to_string(), "Municipal".to_string()],
            rate_category: "Total".to_string(),
        }
    }
}

/// File names of everything the pipeline writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputNames {
    pub fact_table: String,
    pub enrollment_aggregate: String,
    pub index_aggregate: String,
    pub schema_metadata: String,
    pub run_report: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            fact_table: "dados_por_serie.csv".to_string(),
            enrollment_aggregate: "microdados_final.csv".to_string(),
            index_aggregate: "ideb_final.csv".to_string(),
            schema_metadata: "dados_por_serie.schema.json".to_string(),
            run_report: "run_report.json".to_string(),
        }
    }
}

impl OutputNames {
    fn all(&self) -> [(&'static str, &str); 5] {
        [
            ("fact_table", &self.fact_table),
            ("enrollment_aggregate", &self.enrollment_aggregate),
            ("index_aggregate", &self.index_aggregate),
            ("schema_metadata", &self.schema_metadata),
            ("run_report", &self.run_report),
        ]
    }
}

/// Configuration for the consolidation pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use edu_indicators::config::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .target_region("ES")
///     .output_dir("database")
///     .include_index_columns(true)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Index-and-target extract.
    pub index: SourceConfig,

    /// Enrollment census extract.
    pub enrollment: SourceConfig,

    /// Promotion/retention/dropout extract.
    pub rates: SourceConfig,

    /// Region and network restrictions.
    pub filters: FilterConfig,

    /// Directory the outputs are written to.
    /// Default: "database"
    pub output_dir: PathBuf,

    /// Output file names.
    pub output_names: OutputNames,

    /// Append the broadcast index columns to the fact table.
    /// Default: false (the legacy twelve-column layout)
    pub include_index_columns: bool,

    /// Write the schema sidecar next to the fact table.
    /// Default: true
    pub write_schema_metadata: bool,

    /// Whether to write outputs to disk.
    /// When false, results are kept in memory only.
    /// Default: true
    pub save_to_disk: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            index: SourceConfig::index_default(),
            enrollment: SourceConfig::enrollment_default(),
            rates: SourceConfig::rates_default(),
            filters: FilterConfig::default(),
            output_dir: PathBuf::from("database"),
            output_names: OutputNames::default(),
            include_index_columns: false,
            write_schema_metadata: true,
            save_to_disk: true,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load a configuration from a JSON file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> crate::error::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&content)?;
        config
            .validate()
            .map_err(|e| crate::error::PipelineError::InvalidConfig(e.to_string()))?;
        Ok(config)
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.filters.target_region.trim().is_empty() {
            return Err(ConfigValidationError::EmptyField("filters.target_region".to_string()));
        }

        if self.filters.rate_networks.is_empty() {
            return Err(ConfigValidationError::EmptyField("filters.rate_networks".to_string()));
        }

        for (field, source) in [
            ("index", &self.index),
            ("enrollment", &self.enrollment),
            ("rates", &self.rates),
        ] {
            if source.path.as_os_str().is_empty() {
                return Err(ConfigValidationError::EmptyField(format!("{}.path", field)));
            }
            if !source.separator.is_ascii() || source.separator == '\n' {
                return Err(ConfigValidationError::InvalidSeparator {
                    field: field.to_string(),
                    value: source.separator,
                });
            }
            if encoding_rs::Encoding::for_label(source.encoding.trim().as_bytes()).is_none() {
                return Err(ConfigValidationError::UnknownEncoding {
                    field: field.to_string(),
                    label: source.encoding.clone(),
                });
            }
        }

        let mut seen = std::collections::HashSet::new();
        for (field, name) in self.output_names.all() {
            if name.trim().is_empty() {
                return Err(ConfigValidationError::EmptyField(format!("output_names.{}", field)));
            }
            if !seen.insert(name) {
                return Err(ConfigValidationError::DuplicateOutputName(name.to_string()));
            }
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Configuration field '{0}' must not be empty")]
    EmptyField(String),

    #[error("Invalid separator for '{field}': {value:?} (must be a single ASCII character)")]
    InvalidSeparator { field: String, value: char },

    #[error("Unknown text encoding for '{field}': '{label}'")]
    UnknownEncoding { field: String, label: String },

    #[error("Output name '{0}' is used for more than one output")]
    DuplicateOutputName(String),
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    index: Option<SourceConfig>,
    enrollment: Option<SourceConfig>,
    rates: Option<SourceConfig>,
    filters: Option<FilterConfig>,
    target_region: Option<String>,
    output_dir: Option<PathBuf>,
    output_names: Option<OutputNames>,
    include_index_columns: Option<bool>,
    write_schema_metadata: Option<bool>,
    save_to_disk: Option<bool>,
}

impl PipelineConfigBuilder {
    /// Set the index-and-target source.
    pub fn index_source(mut self, source: SourceConfig) -> Self {
        self.index = Some(source);
        self
    }

    /// Set the enrollment census source.
    pub fn enrollment_source(mut self, source: SourceConfig) -> Self {
        self.enrollment = Some(source);
        self
    }

    /// Set the rate source.
    pub fn rates_source(mut self, source: SourceConfig) -> Self {
        self.rates = Some(source);
        self
    }

    /// Replace all filter settings.
    pub fn filters(mut self, filters: FilterConfig) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Override only the target region, keeping the other filter settings.
    pub fn target_region(mut self, region: impl Into<String>) -> Self {
        self.target_region = Some(region.into());
        self
    }

    /// Set the output directory.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Set custom output file names.
    pub fn output_names(mut self, names: OutputNames) -> Self {
        self.output_names = Some(names);
        self
    }

    /// Append observed, target and above-target columns to the fact table.
    pub fn include_index_columns(mut self, include: bool) -> Self {
        self.include_index_columns = Some(include);
        self
    }

    /// Enable or disable the schema sidecar.
    pub fn write_schema_metadata(mut self, write: bool) -> Self {
        self.write_schema_metadata = Some(write);
        self
    }

    /// Enable or disable saving outputs to disk.
    ///
    /// When false, the pipeline keeps results in memory only and skips
    /// all file I/O.
    pub fn save_to_disk(mut self, save: bool) -> Self {
        self.save_to_disk = Some(save);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let mut filters = self.filters.unwrap_or_default();
        if let Some(region) = self.target_region {
            filters.target_region = region;
        }

        let config = PipelineConfig {
            index: self.index.unwrap_or_else(SourceConfig::index_default),
            enrollment: self.enrollment.unwrap_or_else(SourceConfig::enrollment_default),
            rates: self.rates.unwrap_or_else(SourceConfig::rates_default),
            filters,
            output_dir: self.output_dir.unwrap_or_else(|| PathBuf::from("database")),
            output_names: self.output_names.unwrap_or_default(),
            include_index_columns: self.include_index_columns.unwrap_or(false),
            write_schema_metadata: self.write_schema_metadata.unwrap_or(true),
            save_to_disk: self.save_to_disk.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}
