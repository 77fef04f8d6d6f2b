//! Encoder descriptions, output path templating and the in-memory encoder.
//!
//! An output path may carry `{splits/<name>}` tokens. Each token is replaced
//! by the category value at that split's position, producing one dataset
//! per category. A path without tokens produces a single dataset keyed by
//! the main category.

use std::collections::BTreeMap;

use bufr_common::{Category, DataArray};
use data_container::DataContainer;
use serde::Deserialize;
use tracing::debug;

use crate::error::{IngestionError, Result};

const SPLIT_TOKEN: &str = "{splits/";

/// Name of the row dimension when the description declares none.
pub const DEFAULT_ROW_DIMENSION: &str = "Location";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DimensionDescription {
    pub name: String,
    pub path: String,
}

/// One output variable and where its data comes from in the container.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VariableDescription {
    pub name: String,
    pub source: String,
    #[serde(default)]
    pub units: Option<String>,
    #[serde(default, rename = "longName")]
    pub long_name: Option<String>,
}

impl VariableDescription {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            units: None,
            long_name: None,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_long_name(mut self, long_name: impl Into<String>) -> Self {
        self.long_name = Some(long_name.into());
        self
    }
}

/// What an encoder writes for a container.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EncoderDescription {
    #[serde(default)]
    pub dimensions: Vec<DimensionDescription>,
    #[serde(default)]
    pub variables: Vec<VariableDescription>,
    /// Split names in declaration order; position `i` names part `i` of a
    /// category label.
    #[serde(skip)]
    pub splits: Vec<String>,
}

impl EncoderDescription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable, replacing any existing one with the same name.
    pub fn add_variable(&mut self, variable: VariableDescription) {
        match self.variables.iter_mut().find(|v| v.name == variable.name) {
            Some(existing) => *existing = variable,
            None => self.variables.push(variable),
        }
    }

    pub fn row_dimension(&self) -> &str {
        self.dimensions
            .iter()
            .find(|d| d.path == "*")
            .map_or(DEFAULT_ROW_DIMENSION, |d| d.name.as_str())
    }
}

/// Whether `template` produces one output per category.
pub fn has_category_token(template: &str) -> bool {
    template.contains(SPLIT_TOKEN)
}

/// Substitute every `{splits/<name>}` token in `template` with the value of
/// `category` at the position of `<name>` in `splits`.
pub fn output_path_for(template: &str, splits: &[String], category: &Category) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find(SPLIT_TOKEN) {
        out.push_str(&rest[..start]);
        let after = &rest[start + SPLIT_TOKEN.len()..];
        let end = after.find('}').ok_or_else(|| {
            IngestionError::InvalidConfig(format!("unterminated split token in {}", template))
        })?;
        let name = &after[..end];
        let position = splits.iter().position(|s| s == name).ok_or_else(|| {
            IngestionError::InvalidConfig(format!("unknown split {} in {}", name, template))
        })?;
        let value = category.parts().get(position).ok_or_else(|| {
            IngestionError::InvalidConfig(format!(
                "category {} has no value for split {}",
                category, name
            ))
        })?;
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Writes datasets from a container.
pub trait Encoder {
    /// Handle to one written dataset.
    type Dataset;

    fn encode(
        &self,
        container: &DataContainer,
        output_template: &str,
    ) -> Result<BTreeMap<Category, Self::Dataset>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodedVariable {
    pub name: String,
    pub dimensions: Vec<String>,
    pub data: DataArray,
    pub units: Option<String>,
    pub long_name: Option<String>,
}

/// A dataset held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryDataset {
    pub path: String,
    pub dimensions: Vec<(String, usize)>,
    pub variables: Vec<EncodedVariable>,
}

impl MemoryDataset {
    pub fn variable(&self, name: &str) -> Option<&EncodedVariable> {
        self.variables.iter().find(|v| v.name == name)
    }
}

/// Encoder producing [`MemoryDataset`]s; used for dry runs and tests.
#[derive(Debug, Clone)]
pub struct MemoryEncoder {
    description: EncoderDescription,
}

impl MemoryEncoder {
    pub fn new(description: EncoderDescription) -> Self {
        Self { description }
    }

    fn dataset(
        &self,
        container: &DataContainer,
        path: String,
        category: Option<&Category>,
    ) -> Result<MemoryDataset> {
        let row_dim = self.description.row_dimension().to_string();
        let mut dimensions: Vec<(String, usize)> =
            vec![(row_dim.clone(), container.row_count(category))];
        let inner_names: Vec<&str> = self
            .description
            .dimensions
            .iter()
            .filter(|d| d.path != "*")
            .map(|d| d.name.as_str())
            .collect();

        let mut variables = Vec::with_capacity(self.description.variables.len());
        for variable in &self.description.variables {
            let data = container.get(&variable.source, category)?;
            let mut dims = vec![row_dim.clone()];
            for (k, &extent) in data.inner_dims().iter().enumerate() {
                let name = inner_names
                    .get(k)
                    .map_or_else(|| format!("{}_dim{}", variable.name, k + 1), |n| n.to_string());
                match dimensions.iter().find(|(d, _)| *d == name) {
                    Some((_, existing)) if *existing != extent => {
                        return Err(IngestionError::InvalidConfig(format!(
                            "dimension {} is {} for {} but {} elsewhere",
                            name, extent, variable.name, existing
                        )));
                    }
                    Some(_) => {}
                    None => dimensions.push((name.clone(), extent)),
                }
                dims.push(name);
            }
            variables.push(EncodedVariable {
                name: variable.name.clone(),
                dimensions: dims,
                data,
                units: variable.units.clone(),
                long_name: variable.long_name.clone(),
            });
        }

        debug!(path = %path, variables = variables.len(), "Encoded dataset");
        Ok(MemoryDataset {
            path,
            dimensions,
            variables,
        })
    }
}

impl Encoder for MemoryEncoder {
    type Dataset = MemoryDataset;

    fn encode(
        &self,
        container: &DataContainer,
        output_template: &str,
    ) -> Result<BTreeMap<Category, MemoryDataset>> {
        let mut datasets = BTreeMap::new();
        if !has_category_token(output_template) {
            let dataset = self.dataset(container, output_template.to_string(), None)?;
            datasets.insert(Category::main(), dataset);
            return Ok(datasets);
        }

        for category in container.all_sub_categories() {
            let path = output_path_for(output_template, &self.description.splits, &category)?;
            let dataset = self.dataset(container, path, Some(&category))?;
            datasets.insert(category, dataset);
        }
        Ok(datasets)
    }
}
