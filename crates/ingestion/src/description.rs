//! Mapping descriptions loaded from YAML.
//!
//! A description names the queries to run, how to filter and split the
//! resulting rows, and what an encoder should write:
//!
//! ```yaml
//! bufr:
//!   subsets: [NC021023]
//!   group_by_variable: radiance
//!   variables:
//!     latitude:
//!       query: "*/CLAT"
//!   splits:
//!     satId:
//!       category:
//!         variable: satelliteId
//!         map: {_3: metop-b, _4: metop-a}
//!   filters:
//!     - bounding: {variable: latitude, lowerBound: -90, upperBound: 90}
//! encoder:
//!   variables:
//!     - {name: "MetaData/latitude", source: variables/latitude}
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use bufr_common::ValueType;
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::encoder::EncoderDescription;
use crate::error::{IngestionError, Result};
use crate::filters::BoundingFilter;
use crate::splits::CategorySplit;
use crate::variables::{DatetimeFields, SpectralRadianceFields, Transform, Variable, VariableSource};

/// The `bufr` half of a mapping: what to query and how to export it.
#[derive(Debug, Clone, PartialEq)]
pub struct BufrDescription {
    /// Descriptor table, resolved against the mapping file's directory.
    pub table: Option<PathBuf>,
    pub subsets: Vec<String>,
    pub group_by_variable: Option<String>,
    pub variables: Vec<Variable>,
    pub splits: Vec<CategorySplit>,
    pub filters: Vec<BoundingFilter>,
}

impl BufrDescription {
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// A complete mapping description.
#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    pub bufr: BufrDescription,
    pub encoder: EncoderDescription,
}

impl Description {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let raw: YamlDescription = serde_yaml::from_str(yaml)?;
        let description = raw.into_description()?;
        description.validate()?;
        Ok(description)
    }

    /// Load a mapping file; a relative table path is taken relative to it.
    pub fn from_yaml_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut description = Self::from_yaml_str(&contents)?;

        if let (Some(table), Some(dir)) = (&description.bufr.table, path.parent()) {
            if table.is_relative() {
                description.bufr.table = Some(dir.join(table));
            }
        }
        debug!(
            path = ?path,
            variables = description.bufr.variables.len(),
            splits = description.bufr.splits.len(),
            "Loaded mapping description"
        );
        Ok(description)
    }

    fn validate(&self) -> Result<()> {
        let bufr = &self.bufr;
        if bufr.variables.is_empty() {
            return Err(IngestionError::InvalidConfig(
                "mapping defines no variables".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for variable in &bufr.variables {
            if !names.insert(variable.name.as_str()) {
                return Err(IngestionError::InvalidConfig(format!(
                    "variable {} defined twice",
                    variable.name
                )));
            }
        }

        if let Some(group_by) = &bufr.group_by_variable {
            match bufr.variable(group_by) {
                Some(variable) if variable.is_query() => {}
                _ => {
                    return Err(IngestionError::InvalidConfig(format!(
                        "group_by_variable {} must name a query variable",
                        group_by
                    )))
                }
            }
        }

        let referenced = bufr
            .filters
            .iter()
            .map(|f| f.variable.as_str())
            .chain(bufr.splits.iter().map(|s| s.variable.as_str()));
        for name in referenced {
            if !names.contains(name) {
                return Err(IngestionError::InvalidConfig(format!(
                    "unknown variable {} referenced by a filter or split",
                    name
                )));
            }
        }
        Ok(())
    }
}

// ===== YAML layout =====

#[derive(Debug, Deserialize)]
struct YamlDescription {
    bufr: YamlBufr,
    #[serde(default)]
    encoder: EncoderDescription,
}

#[derive(Debug, Deserialize)]
struct YamlBufr {
    #[serde(default)]
    table: Option<PathBuf>,
    #[serde(default)]
    subsets: Vec<String>,
    #[serde(default, alias = "groupByVariable")]
    group_by_variable: Option<String>,
    #[serde(deserialize_with = "ordered_map")]
    variables: Vec<(String, YamlVariable)>,
    #[serde(default, deserialize_with = "ordered_map")]
    splits: Vec<(String, YamlSplit)>,
    #[serde(default)]
    filters: Vec<YamlFilter>,
}

#[derive(Debug, Deserialize)]
struct YamlVariable {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    datetime: Option<YamlDatetime>,
    #[serde(default, rename = "spectralRadiance")]
    spectral_radiance: Option<YamlSpectralRadiance>,
    #[serde(rename = "type", default)]
    value_type: Option<String>,
    #[serde(default)]
    transforms: Vec<YamlTransform>,
}

#[derive(Debug, Deserialize)]
struct YamlDatetime {
    year: String,
    month: String,
    day: String,
    hour: String,
    #[serde(default)]
    minute: Option<String>,
    #[serde(default)]
    second: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YamlSpectralRadiance {
    sensor_channel_number: String,
    start_channel: String,
    end_channel: String,
    scale_factor: String,
    scaled_spectral_radiance: String,
}

#[derive(Debug, Deserialize)]
struct YamlTransform {
    #[serde(default)]
    scale: Option<f64>,
    #[serde(default)]
    offset: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct YamlSplit {
    category: YamlCategorySplit,
}

#[derive(Debug, Deserialize)]
struct YamlCategorySplit {
    variable: String,
    #[serde(default)]
    map: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct YamlFilter {
    bounding: YamlBounding,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YamlBounding {
    variable: String,
    #[serde(default)]
    lower_bound: Option<f64>,
    #[serde(default)]
    upper_bound: Option<f64>,
}

/// Deserialize a YAML mapping into (key, value) pairs, keeping file order.
fn ordered_map<'de, D, T>(deserializer: D) -> std::result::Result<Vec<(String, T)>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let mapping = serde_yaml::Mapping::deserialize(deserializer)?;
    mapping
        .into_iter()
        .map(|(key, value)| {
            let key = key
                .as_str()
                .ok_or_else(|| D::Error::custom("mapping keys must be strings"))?
                .to_string();
            let value = serde_yaml::from_value(value).map_err(D::Error::custom)?;
            Ok((key, value))
        })
        .collect()
}

impl YamlDescription {
    fn into_description(self) -> Result<Description> {
        let bufr = self.bufr;

        let variables = bufr
            .variables
            .into_iter()
            .map(|(name, raw)| raw.into_variable(name))
            .collect::<Result<Vec<_>>>()?;

        let splits: Vec<CategorySplit> = bufr
            .splits
            .into_iter()
            .map(|(name, raw)| {
                CategorySplit::new(name, raw.category.variable).with_map(raw.category.map)
            })
            .collect();

        let filters = bufr
            .filters
            .into_iter()
            .map(|f| BoundingFilter::new(f.bounding.variable, f.bounding.lower_bound, f.bounding.upper_bound))
            .collect();

        let mut encoder = self.encoder;
        encoder.splits = splits.iter().map(|s| s.name.clone()).collect();

        Ok(Description {
            bufr: BufrDescription {
                table: bufr.table,
                subsets: bufr.subsets,
                group_by_variable: bufr.group_by_variable,
                variables,
                splits,
                filters,
            },
            encoder,
        })
    }
}

impl YamlVariable {
    fn into_variable(self, name: String) -> Result<Variable> {
        let transforms = self
            .transforms
            .into_iter()
            .map(|t| match (t.scale, t.offset) {
                (Some(scale), None) => Ok(Transform::Scale(scale)),
                (None, Some(offset)) => Ok(Transform::Offset(offset)),
                _ => Err(IngestionError::InvalidConfig(format!(
                    "each transform of {} needs exactly one of scale or offset",
                    name
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        let source = match (self.query, self.datetime, self.spectral_radiance) {
            (Some(query), None, None) => {
                let value_type = self
                    .value_type
                    .as_deref()
                    .map(ValueType::from_str)
                    .transpose()?;
                VariableSource::Query { query, value_type }
            }
            (None, Some(dt), None) => VariableSource::Datetime(DatetimeFields {
                year: dt.year,
                month: dt.month,
                day: dt.day,
                hour: dt.hour,
                minute: dt.minute,
                second: dt.second,
            }),
            (None, None, Some(sr)) => VariableSource::SpectralRadiance(SpectralRadianceFields {
                sensor_channel_number: sr.sensor_channel_number,
                start_channel: sr.start_channel,
                end_channel: sr.end_channel,
                scale_factor: sr.scale_factor,
                scaled_spectral_radiance: sr.scaled_spectral_radiance,
            }),
            _ => {
                return Err(IngestionError::InvalidConfig(format!(
                    "variable {} needs exactly one of query, datetime or spectralRadiance",
                    name
                )))
            }
        };

        Ok(Variable {
            name,
            source,
            transforms,
        })
    }
}
