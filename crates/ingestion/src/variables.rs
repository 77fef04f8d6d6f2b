//! Exported variables and their per-variable transforms.

use bufr_common::{ArrayData, DataArray, ValueType};
use bufr_query::ResultSet;

use crate::error::{IngestionError, Result};

/// Arithmetic applied to every non-missing value of a variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    Scale(f64),
    Offset(f64),
}

impl Transform {
    pub fn apply(&self, data: &DataArray) -> Result<DataArray> {
        let transformed = match *self {
            Transform::Scale(factor) => data.scaled(factor)?,
            Transform::Offset(offset) => data.offset(offset)?,
        };
        Ok(transformed)
    }
}

/// Field paths combined into a single timestamp variable.
#[derive(Debug, Clone, PartialEq)]
pub struct DatetimeFields {
    pub year: String,
    pub month: String,
    pub day: String,
    pub hour: String,
    pub minute: Option<String>,
    pub second: Option<String>,
}

/// Queries for radiances stored with a per-band scale factor.
///
/// `scaled_spectral_radiance` and `sensor_channel_number` are per channel;
/// `start_channel`, `end_channel` and `scale_factor` are per band.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralRadianceFields {
    pub sensor_channel_number: String,
    pub start_channel: String,
    pub end_channel: String,
    pub scale_factor: String,
    pub scaled_spectral_radiance: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VariableSource {
    /// One query, optionally cast to a fixed type.
    Query {
        query: String,
        value_type: Option<ValueType>,
    },
    /// Epoch seconds assembled from component queries.
    Datetime(DatetimeFields),
    /// Radiance unscaled by the factor of the band holding its channel.
    SpectralRadiance(SpectralRadianceFields),
}

/// A variable exported to `variables/<name>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub source: VariableSource,
    pub transforms: Vec<Transform>,
}

impl Variable {
    /// (result field name, query path) pairs this variable needs.
    pub fn queries(&self) -> Vec<(String, String)> {
        match &self.source {
            VariableSource::Query { query, .. } => vec![(self.name.clone(), query.clone())],
            VariableSource::Datetime(fields) => {
                let mut queries = vec![
                    (self.component("year"), fields.year.clone()),
                    (self.component("month"), fields.month.clone()),
                    (self.component("day"), fields.day.clone()),
                    (self.component("hour"), fields.hour.clone()),
                ];
                if let Some(minute) = &fields.minute {
                    queries.push((self.component("minute"), minute.clone()));
                }
                if let Some(second) = &fields.second {
                    queries.push((self.component("second"), second.clone()));
                }
                queries
            }
            VariableSource::SpectralRadiance(fields) => vec![
                (self.component("sensorChannelNumber"), fields.sensor_channel_number.clone()),
                (self.component("startChannel"), fields.start_channel.clone()),
                (self.component("endChannel"), fields.end_channel.clone()),
                (self.component("scaleFactor"), fields.scale_factor.clone()),
                (
                    self.component("scaledSpectralRadiance"),
                    fields.scaled_spectral_radiance.clone(),
                ),
            ],
        }
    }

    /// Query paths recorded alongside the exported array.
    pub fn source_paths(&self) -> Vec<String> {
        self.queries().into_iter().map(|(_, path)| path).collect()
    }

    /// Whether the variable is a single query.
    pub fn is_query(&self) -> bool {
        matches!(self.source, VariableSource::Query { .. })
    }

    /// Pull this variable out of executed results, before transforms.
    pub fn fetch(&self, results: &ResultSet, group_by: Option<&str>) -> Result<DataArray> {
        let data = match &self.source {
            VariableSource::Query { value_type, .. } => {
                results.get(&self.name, group_by, *value_type)?
            }
            VariableSource::Datetime(fields) => {
                let minute = fields.minute.as_ref().map(|_| self.component("minute"));
                let second = fields.second.as_ref().map(|_| self.component("second"));
                let times = results.get_datetime(
                    &self.component("year"),
                    &self.component("month"),
                    &self.component("day"),
                    &self.component("hour"),
                    minute.as_deref(),
                    second.as_deref(),
                    group_by,
                )?;
                DataArray::new(ArrayData::Int64(times.seconds().to_vec()), times.dims().to_vec())?
            }
            VariableSource::SpectralRadiance(_) => self.spectral_radiance(results, group_by)?,
        };
        Ok(data)
    }

    /// `radiance * 10^-scale_factor`, taking the scale factor of the first
    /// band whose channel range holds the radiance's channel. Radiances
    /// outside every band are missing.
    fn spectral_radiance(&self, results: &ResultSet, group_by: Option<&str>) -> Result<DataArray> {
        let get = |part: &str| results.get(&self.component(part), group_by, None);
        let radiance = get("scaledSpectralRadiance")?;
        let channels = get("sensorChannelNumber")?;
        let starts = get("startChannel")?;
        let ends = get("endChannel")?;
        let factors = get("scaleFactor")?;

        let rows = radiance.rows();
        if channels.dims() != radiance.dims() {
            return Err(self.export_error(format!(
                "sensorChannelNumber has shape {:?} but scaledSpectralRadiance has {:?}",
                channels.dims(),
                radiance.dims()
            )));
        }
        for (part, band) in [("startChannel", &starts), ("endChannel", &ends), ("scaleFactor", &factors)] {
            if band.rows() != rows || band.dims() != starts.dims() {
                return Err(self.export_error(format!(
                    "{} has shape {:?}, expected {} rows of bands like startChannel {:?}",
                    part,
                    band.dims(),
                    rows,
                    starts.dims()
                )));
            }
        }

        let per_row = radiance.row_len();
        let bands = starts.row_len();
        let values: Vec<Option<f64>> = (0..radiance.len())
            .map(|idx| {
                let value = radiance.get_f64(idx)?;
                let channel = channels.get_f64(idx)?;
                let first_band = (idx / per_row.max(1)) * bands;
                let band = (first_band..first_band + bands).find(|&b| {
                    matches!(
                        (starts.get_f64(b), ends.get_f64(b)),
                        (Some(start), Some(end)) if start <= channel && channel <= end
                    )
                })?;
                let factor = factors.get_f64(band)?;
                Some(value * 10f64.powf(-factor))
            })
            .collect();

        Ok(DataArray::from_values(
            ValueType::Float32,
            radiance.dims().to_vec(),
            &values,
        )?)
    }

    fn export_error(&self, reason: String) -> IngestionError {
        IngestionError::Export {
            variable: self.name.clone(),
            reason,
        }
    }

    /// Apply the transforms in declaration order.
    pub fn transform(&self, data: DataArray) -> Result<DataArray> {
        self.transforms
            .iter()
            .try_fold(data, |data, transform| transform.apply(&data))
    }

    fn component(&self, part: &str) -> String {
        format!("{}/{}", self.name, part)
    }
}
