//! End-to-end query execution over synthetic files.

use std::sync::Arc;

use bufr_common::ValueType;
use bufr_parser::{BufrFile, DecodePolicy, DescriptorTable, Fxy, TableBuilder};
use bufr_query::{execute, QueryError, QuerySet};
use test_utils::{
    assert_all_approx_eq, assert_approx_eq, compressed_radiance_message, radiance_message,
    require_test_files, sample_radiances, sample_table, station_message, BitWriter, BufrBuilder,
    RadianceObs, StationObs,
};

fn radiance_queries() -> QuerySet {
    let mut qs = QuerySet::new(Arc::new(sample_table()));
    qs.add("latitude", "*/CLAT").unwrap();
    qs.add("longitude", "*/CLON").unwrap();
    qs.add("satelliteId", "*/SAID").unwrap();
    qs.add("year", "*/YEAR").unwrap();
    qs.add("month", "*/MNTH").unwrap();
    qs.add("day", "*/DAYS").unwrap();
    qs.add("hour", "*/HOUR").unwrap();
    qs.add("minute", "*/MINU").unwrap();
    qs.add("second", "*/SECO").unwrap();
    qs.add("channel", "*/BRIT/CHNM").unwrap();
    qs.add("radiance", "*/BRIT/TMBR").unwrap();
    qs
}

fn sample_file() -> BufrFile {
    BufrFile::from_bytes(radiance_message(&sample_radiances()))
}

#[test]
fn test_longitude_values() {
    let mut qs = QuerySet::new(Arc::new(sample_table()));
    qs.add("latitude", "*/CLON").unwrap();
    let rs = execute(&sample_file(), &qs, DecodePolicy::Skip).unwrap();

    let lat = rs.get("latitude", None, None).unwrap();
    let values = lat.as_f32().unwrap();
    assert_all_approx_eq!(values[0..3], [166.7977, 166.4078, 165.992], 1e-3);
}

#[test]
fn test_execute_is_deterministic() {
    let qs = radiance_queries();
    let first = execute(&sample_file(), &qs, DecodePolicy::Skip).unwrap();
    let second = execute(&sample_file(), &qs, DecodePolicy::Skip).unwrap();
    assert_eq!(first, second);
    for name in qs.names() {
        assert_eq!(
            first.get(name, None, None).unwrap(),
            second.get(name, None, None).unwrap()
        );
    }
}

#[test]
fn test_repeated_field_dimensions() {
    let rs = execute(&sample_file(), &radiance_queries(), DecodePolicy::Skip).unwrap();
    let radiance = rs.get("radiance", None, None).unwrap();
    assert_eq!(radiance.dims(), &[3, 3]);
    assert_eq!(rs.dim_paths("radiance").unwrap(), &["*", "*/BRIT"]);

    let values = radiance.as_f32().unwrap();
    assert_approx_eq!(values[0], 198.69, 1e-3);
    assert_approx_eq!(values[1], 254.06, 1e-3);
    assert_approx_eq!(values[2], 233.85, 1e-3);
    assert!(radiance.is_missing(4));

    let channel = rs.get("channel", None, None).unwrap();
    assert_eq!(channel.value_type(), ValueType::Int32);
    assert_eq!(channel.as_i32().unwrap()[..3], [1, 2, 3]);
}

#[test]
fn test_ragged_replication_is_padded() {
    let obs = vec![
        RadianceObs::new(209, 1.0, 2.0).with_channels(vec![Some(200.0)]),
        RadianceObs::new(209, 1.5, 2.5).with_channels(vec![Some(210.0), Some(211.0), Some(212.0)]),
    ];
    let file = BufrFile::from_bytes(radiance_message(&obs));
    let rs = execute(&file, &radiance_queries(), DecodePolicy::Skip).unwrap();

    let radiance = rs.get("radiance", None, None).unwrap();
    assert_eq!(radiance.dims(), &[2, 3]);
    assert!(!radiance.is_missing(0));
    assert!(radiance.is_missing(1));
    assert!(radiance.is_missing(2));
    assert_approx_eq!(radiance.get_f64(5).unwrap(), 212.0, 1e-3);
}

#[test]
fn test_indexed_segment() {
    let mut qs = radiance_queries();
    qs.add("ch2", "*/BRIT{2}/TMBR").unwrap();
    qs.add("ch9", "*/BRIT{9}/TMBR").unwrap();
    let rs = execute(&sample_file(), &qs, DecodePolicy::Skip).unwrap();

    let ch2 = rs.get("ch2", None, None).unwrap();
    assert_eq!(ch2.dims(), &[3]);
    assert_approx_eq!(ch2.get_f64(0).unwrap(), 254.06, 1e-3);
    assert!(ch2.is_missing(1));

    let ch9 = rs.get("ch9", None, None).unwrap();
    assert!((0..3).all(|i| ch9.is_missing(i)));
}

#[test]
fn test_invalid_queries_fail_at_construction() {
    let mut qs = QuerySet::new(Arc::new(sample_table()));
    for bad in ["*/CLAT/", "*/NOSUCH", "*/BRIT{256}/TMBR", "*/TMBR", "* /CLAT"] {
        assert!(
            matches!(qs.add("bad", bad), Err(QueryError::InvalidQuery { .. })),
            "{} should be rejected",
            bad
        );
    }
    assert!(qs.is_empty());
}

#[test]
fn test_unknown_field() {
    let rs = execute(&sample_file(), &radiance_queries(), DecodePolicy::Skip).unwrap();
    assert!(matches!(rs.get("nosuch", None, None), Err(QueryError::UnknownField(_))));
    assert!(matches!(
        rs.get("latitude", Some("nosuch"), None),
        Err(QueryError::UnknownField(_))
    ));
}

#[test]
fn test_group_by_radiance() {
    let rs = execute(&sample_file(), &radiance_queries(), DecodePolicy::Skip).unwrap();
    let lat = rs.get("latitude", Some("radiance"), None).unwrap();
    assert_eq!(lat.dims(), &[9]);
    let channel = rs.get("channel", Some("radiance"), None).unwrap();
    assert_eq!(channel.as_i32().unwrap(), &[1, 2, 3, 1, 2, 3, 1, 2, 3]);
}

#[test]
fn test_type_override_round_trip() {
    let rs = execute(&sample_file(), &radiance_queries(), DecodePolicy::Skip).unwrap();
    let said = rs.get("satelliteId", None, None).unwrap();
    let as_float = rs.get("satelliteId", None, Some(ValueType::Float64)).unwrap();
    assert_eq!(as_float.as_f64().unwrap(), &[209.0, 209.0, 223.0]);
    assert_eq!(as_float.cast(ValueType::Int32).unwrap(), said);

    let truncated = rs.get("latitude", None, Some(ValueType::Int32)).unwrap();
    assert_eq!(truncated.as_i32().unwrap(), &[-12, -12, -12]);
}

#[test]
fn test_datetime_with_missing_component() {
    let rs = execute(&sample_file(), &radiance_queries(), DecodePolicy::Skip).unwrap();
    let times = rs
        .get_datetime("year", "month", "day", "hour", Some("minute"), Some("second"), None)
        .unwrap();
    assert_eq!(times.len(), 3);
    assert_eq!(times.get(0).unwrap().to_rfc3339(), "2020-10-26T21:00:01+00:00");
    assert_eq!(times.get(1).unwrap().to_rfc3339(), "2020-10-26T21:00:09+00:00");
    assert!(times.is_missing(2));
    assert_eq!(times.get_or_fill(2).timestamp(), 0);
    assert_eq!(times.fill_value().timestamp(), 0);
}

#[test]
fn test_compressed_file_gives_same_results() {
    let qs = radiance_queries();
    let plain = execute(&sample_file(), &qs, DecodePolicy::Skip).unwrap();
    let packed_file = BufrFile::from_bytes(compressed_radiance_message(&sample_radiances()));
    let packed = execute(&packed_file, &qs, DecodePolicy::Skip).unwrap();
    assert_eq!(plain, packed);
}

#[test]
fn test_malformed_message_policy() {
    let obs = sample_radiances();
    let mut bytes = radiance_message(&obs[..1]);
    // A message whose data section is cut short.
    let mut broken = radiance_message(&obs[1..]);
    let len = broken.len();
    broken.truncate(len - 30);
    let new_len = broken.len() + 4;
    broken[4..7].copy_from_slice(&[(new_len >> 16) as u8, (new_len >> 8) as u8, new_len as u8]);
    broken.extend_from_slice(b"7777");
    bytes.extend(broken);
    bytes.extend(radiance_message(&obs[2..]));
    let file = BufrFile::from_bytes(bytes);

    let qs = radiance_queries();
    let rs = execute(&file, &qs, DecodePolicy::Skip).unwrap();
    assert_eq!(rs.record_count(), 2);
    let lon = rs.get("longitude", None, None).unwrap();
    assert_approx_eq!(lon.get_f64(0).unwrap(), 166.7977, 1e-3);
    assert_approx_eq!(lon.get_f64(1).unwrap(), 165.992, 1e-3);

    assert!(matches!(
        execute(&file, &qs, DecodePolicy::Abort),
        Err(QueryError::Decode(_))
    ));
}

#[test]
fn test_mixed_subsets() {
    let stations = vec![StationObs::new("KBOS", 42.36, -71.01, [Some(280.15), None])];
    let mut bytes = radiance_message(&sample_radiances());
    bytes.extend(station_message(&stations));
    let file = BufrFile::from_bytes(bytes);
    let table = Arc::new(sample_table());

    let mut all = QuerySet::new(table.clone());
    all.add("latitude", "*/CLAT").unwrap();
    all.add("station", "NC000001/STID").unwrap();
    all.add("temperature", "*/TMDB").unwrap();
    let rs = execute(&file, &all, DecodePolicy::Skip).unwrap();
    assert_eq!(rs.record_count(), 4);

    let station = rs.get("station", None, None).unwrap();
    assert_eq!(station.as_text().unwrap(), &["", "", "", "KBOS"]);
    let temperature = rs.get("temperature", None, None).unwrap();
    assert_eq!(temperature.dims(), &[4, 2]);
    assert!(temperature.is_missing(0));
    assert_approx_eq!(temperature.get_f64(6).unwrap(), 280.15, 1e-3);

    let mut radiance_only = QuerySet::with_subsets(table, ["NC021023"]).unwrap();
    radiance_only.add("latitude", "*/CLAT").unwrap();
    let rs = execute(&file, &radiance_only, DecodePolicy::Skip).unwrap();
    assert_eq!(rs.record_count(), 3);
}

#[test]
fn test_real_amsua_file() {
    let paths = require_test_files!("gdas.t00z.1bamua.tm00.bufr_d", "NC021023.yaml");
    let table = Arc::new(DescriptorTable::from_yaml_path(&paths[1]).unwrap());
    let mut qs = QuerySet::new(table);
    qs.add("latitude", "*/CLON").unwrap();
    let file = BufrFile::open(&paths[0]).unwrap();
    let rs = execute(&file, &qs, DecodePolicy::Skip).unwrap();

    let lat = rs.get("latitude", None, None).unwrap();
    for (i, expected) in [166.7977, 166.4078, 165.992].iter().enumerate() {
        assert_approx_eq!(lat.get_f64(i).unwrap(), *expected, 1e-3);
    }
}

#[test]
fn test_scale_operator_gives_float_field() {
    let table = TableBuilder::new()
        .element(Fxy::new(0, 4, 1), "YEAR", "YEAR", 0, 0, 12)
        .element(Fxy::new(0, 7, 2), "HMSL", "M", 0, 0, 16)
        .sequence(
            Fxy::new(3, 61, 20),
            "NCHGT",
            vec![Fxy::new(2, 2, 129), Fxy::new(0, 7, 2), Fxy::new(2, 2, 0), Fxy::new(0, 4, 1)],
        )
        .build()
        .unwrap();
    let mut w = BitWriter::new();
    w.write(1234, 16).write(2020, 12);
    let bytes = BufrBuilder::new().descriptor(3, 61, 20).data(w).build();

    let mut qs = QuerySet::new(Arc::new(table));
    qs.add("height", "*/HMSL").unwrap();
    qs.add("year", "*/YEAR").unwrap();
    let rs = execute(&BufrFile::from_bytes(bytes), &qs, DecodePolicy::Abort).unwrap();

    let height = rs.get("height", None, None).unwrap();
    assert_eq!(height.value_type(), ValueType::Float32);
    assert_approx_eq!(height.get_f64(0).unwrap(), 123.4, 1e-4);
    let year = rs.get("year", None, None).unwrap();
    assert_eq!(year.value_type(), ValueType::Int32);
    assert_eq!(year.get_i64(0), Some(2020));
}
