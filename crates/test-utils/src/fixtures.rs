//! Sample descriptor table and observation fixtures.
//!
//! The table mirrors a cut-down NCEP layout: an AMSU-A style radiance subset
//! (`NC021023`) with a delayed-replication channel sequence, and a surface
//! station subset (`NC000001`) with a fixed replication.

use bufr_parser::DescriptorTable;

use crate::builder::{BitWriter, BufrBuilder};

pub const SAMPLE_TABLE_YAML: &str = r#"
elements:
  - {fxy: "0-01-007", mnemonic: SAID, name: Satellite identifier, unit: CODE TABLE, width: 10}
  - {fxy: "0-01-018", mnemonic: STID, name: Station identifier, unit: CCITT IA5, width: 40}
  - {fxy: "0-04-001", mnemonic: YEAR, name: Year, unit: YEAR, width: 12}
  - {fxy: "0-04-002", mnemonic: MNTH, name: Month, unit: MONTH, width: 4}
  - {fxy: "0-04-003", mnemonic: DAYS, name: Day, unit: DAY, width: 6}
  - {fxy: "0-04-004", mnemonic: HOUR, name: Hour, unit: HOUR, width: 5}
  - {fxy: "0-04-005", mnemonic: MINU, name: Minute, unit: MINUTE, width: 6}
  - {fxy: "0-04-006", mnemonic: SECO, name: Second, unit: SECOND, width: 6}
  - {fxy: "0-05-001", mnemonic: CLAT, name: Latitude, unit: DEGREES, scale: 5, reference: -9000000, width: 25}
  - {fxy: "0-06-001", mnemonic: CLON, name: Longitude, unit: DEGREES, scale: 5, reference: -18000000, width: 26}
  - {fxy: "0-02-150", mnemonic: CHNM, name: Channel number, unit: NUMERIC, width: 6}
  - {fxy: "0-12-163", mnemonic: TMBR, name: Brightness temperature, unit: K, scale: 2, width: 16}
  - {fxy: "0-12-101", mnemonic: TMDB, name: Temperature, unit: K, scale: 2, width: 16}
  - {fxy: "0-31-001", mnemonic: DRPF, name: Delayed replication factor, unit: NUMERIC, width: 8}
sequences:
  - {fxy: "3-01-011", mnemonic: YYMMDD, descriptors: ["0-04-001", "0-04-002", "0-04-003"]}
  - {fxy: "3-01-012", mnemonic: HHMMSS, descriptors: ["0-04-004", "0-04-005", "0-04-006"]}
  - {fxy: "3-50-001", mnemonic: BRIT, descriptors: ["0-02-150", "0-12-163"]}
  - fxy: "3-61-001"
    mnemonic: NC021023
    name: MSG TYPE 021-023 PROC AMSU-A 1B TBS
    descriptors: ["0-01-007", "3-01-011", "3-01-012", "0-05-001", "0-06-001", "1-01-000", "0-31-001", "3-50-001"]
  - fxy: "3-61-002"
    mnemonic: NC000001
    name: MSG TYPE 000-001 SURFACE LAND
    descriptors: ["0-01-018", "3-01-011", "3-01-012", "0-05-001", "0-06-001", "1-01-002", "0-12-101"]
"#;

/// The sample table, parsed.
pub fn sample_table() -> DescriptorTable {
    DescriptorTable::from_yaml_str(SAMPLE_TABLE_YAML).expect("sample table is valid")
}

/// One radiance observation (`NC021023` subset).
#[derive(Debug, Clone, PartialEq)]
pub struct RadianceObs {
    pub satellite_id: u16,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: Option<u8>,
    pub latitude: f64,
    pub longitude: f64,
    /// Brightness temperature per channel; channel numbers start at 1.
    pub channels: Vec<Option<f64>>,
}

impl RadianceObs {
    pub fn new(satellite_id: u16, latitude: f64, longitude: f64) -> Self {
        Self {
            satellite_id,
            year: 2020,
            month: 10,
            day: 26,
            hour: 21,
            minute: 0,
            second: Some(0),
            latitude,
            longitude,
            channels: Vec::new(),
        }
    }

    pub fn with_time(mut self, hour: u8, minute: u8, second: Option<u8>) -> Self {
        self.hour = hour;
        self.minute = minute;
        self.second = second;
        self
    }

    pub fn with_channels(mut self, channels: Vec<Option<f64>>) -> Self {
        self.channels = channels;
        self
    }

    fn raw_fields(&self) -> Vec<(Option<u64>, u32)> {
        vec![
            (Some(self.satellite_id as u64), 10),
            (Some(self.year as u64), 12),
            (Some(self.month as u64), 4),
            (Some(self.day as u64), 6),
            (Some(self.hour as u64), 5),
            (Some(self.minute as u64), 6),
            (self.second.map(u64::from), 6),
            (Some(scaled(self.latitude, 5, -9_000_000)), 25),
            (Some(scaled(self.longitude, 5, -18_000_000)), 26),
        ]
    }
}

/// One surface station report (`NC000001` subset).
#[derive(Debug, Clone, PartialEq)]
pub struct StationObs {
    pub station_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub temperatures: [Option<f64>; 2],
}

impl StationObs {
    pub fn new(station_id: &str, latitude: f64, longitude: f64, temperatures: [Option<f64>; 2]) -> Self {
        Self {
            station_id: station_id.to_string(),
            latitude,
            longitude,
            temperatures,
        }
    }
}

fn scaled(value: f64, scale: i32, reference: i64) -> u64 {
    ((value * 10f64.powi(scale)).round() as i64 - reference) as u64
}

/// Uncompressed edition 4 message with one `NC021023` subset per observation.
pub fn radiance_message(observations: &[RadianceObs]) -> Vec<u8> {
    let mut w = BitWriter::new();
    for obs in observations {
        for (raw, width) in obs.raw_fields() {
            match raw {
                Some(v) => w.write(v, width),
                None => w.write_missing(width),
            };
        }
        w.write(obs.channels.len() as u64, 8);
        for (i, tb) in obs.channels.iter().enumerate() {
            w.write(i as u64 + 1, 6);
            w.write_scaled(*tb, 2, 0, 16);
        }
    }

    BufrBuilder::new()
        .subsets(observations.len() as u16)
        .descriptor(3, 61, 1)
        .data(w)
        .build()
}

/// Compressed edition 4 message; every observation must have the same
/// number of channels.
pub fn compressed_radiance_message(observations: &[RadianceObs]) -> Vec<u8> {
    let mut w = BitWriter::new();
    let field_count = observations.first().map_or(0, |o| o.raw_fields().len());
    let columns: Vec<Vec<(Option<u64>, u32)>> =
        observations.iter().map(RadianceObs::raw_fields).collect();

    for field in 0..field_count {
        let width = columns[0][field].1;
        let raws: Vec<Option<u64>> = columns.iter().map(|c| c[field].0).collect();
        write_compressed(&mut w, &raws, width);
    }

    let channels = observations.first().map_or(0, |o| o.channels.len());
    write_compressed(&mut w, &vec![Some(channels as u64); observations.len()], 8);
    for ch in 0..channels {
        write_compressed(&mut w, &vec![Some(ch as u64 + 1); observations.len()], 6);
        let raws: Vec<Option<u64>> = observations
            .iter()
            .map(|o| o.channels[ch].map(|tb| scaled(tb, 2, 0)))
            .collect();
        write_compressed(&mut w, &raws, 16);
    }

    BufrBuilder::new()
        .subsets(observations.len() as u16)
        .compressed(true)
        .descriptor(3, 61, 1)
        .data(w)
        .build()
}

/// Uncompressed edition 3 message with one `NC000001` subset per station.
pub fn station_message(stations: &[StationObs]) -> Vec<u8> {
    let mut w = BitWriter::new();
    for station in stations {
        w.write_str(&station.station_id, 5);
        w.write(2020, 12).write(10, 4).write(26, 6);
        w.write(21, 5).write(0, 6).write(0, 6);
        w.write(scaled(station.latitude, 5, -9_000_000), 25);
        w.write(scaled(station.longitude, 5, -18_000_000), 26);
        for t in station.temperatures {
            w.write_scaled(t, 2, 0, 16);
        }
    }

    BufrBuilder::new()
        .edition(3)
        .data_category(0)
        .subsets(stations.len() as u16)
        .descriptor(3, 61, 2)
        .data(w)
        .build()
}

/// WMO compression of one element across subsets.
fn write_compressed(w: &mut BitWriter, raws: &[Option<u64>], width: u32) {
    let present: Vec<u64> = raws.iter().flatten().copied().collect();
    let Some(&min) = present.iter().min() else {
        w.write_missing(width).write(0, 6);
        return;
    };
    let max_inc = present.iter().map(|v| v - min).max().unwrap_or(0);
    let all_present_equal = max_inc == 0 && present.len() == raws.len();
    if all_present_equal {
        w.write(min, width).write(0, 6);
        return;
    }

    // Reserve the all-ones increment for missing values.
    let mut nbinc = 1;
    while (1u64 << nbinc) - 1 <= max_inc {
        nbinc += 1;
    }
    w.write(min, width).write(nbinc as u64, 6);
    for raw in raws {
        match raw {
            Some(v) => w.write(v - min, nbinc),
            None => w.write_missing(nbinc),
        };
    }
}

/// A typical three-observation radiance batch.
pub fn sample_radiances() -> Vec<RadianceObs> {
    vec![
        RadianceObs::new(209, -12.5, 166.7977)
            .with_time(21, 0, Some(1))
            .with_channels(vec![Some(198.69), Some(254.06), Some(233.85)]),
        RadianceObs::new(209, -12.6, 166.4078)
            .with_time(21, 0, Some(9))
            .with_channels(vec![Some(201.11), None, Some(231.40)]),
        RadianceObs::new(223, -12.7, 165.992)
            .with_time(21, 0, None)
            .with_channels(vec![Some(199.25), Some(250.10), Some(229.93)]),
    ]
}
