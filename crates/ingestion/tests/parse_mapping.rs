//! Parsing synthetic files through YAML mapping descriptions.

use std::sync::Arc;
use std::thread;

use bufr_common::Category;
use bufr_parser::{BufrFile, DecodePolicy, Fxy, TableBuilder};
use data_container::{Communicator, DataCache, DataContainer, LocalGroup};
use ingestion::{Description, Encoder, MemoryEncoder, ParseOptions, Parser};
use test_utils::{
    assert_all_approx_eq, assert_approx_eq, radiance_message, sample_radiances, sample_table,
    temp_test_dir, write_fixture, BitWriter, BufrBuilder,
};

const MAPPING: &str = r#"
bufr:
  variables:
    timestamp:
      datetime:
        year: "*/YEAR"
        month: "*/MNTH"
        day: "*/DAYS"
        hour: "*/HOUR"
        minute: "*/MINU"
        second: "*/SECO"
    latitude:
      query: "*/CLAT"
    longitude:
      query: "*/CLON"
    satelliteId:
      query: "*/SAID"
    radiance:
      query: "*/BRIT/TMBR"
  splits:
    satId:
      category:
        variable: satelliteId
        map:
          _209: noaa-18
          _223: noaa-19
encoder:
  variables:
    - name: MetaData/longitude
      source: variables/longitude
      units: degrees_east
    - name: ObsValue/brightnessTemperature
      source: variables/radiance
      units: K
"#;

fn parser_for(mapping: &str, file: BufrFile) -> Parser {
    let description = Description::from_yaml_str(mapping).unwrap();
    Parser::from_file("sample.bufr", file, description, Arc::new(sample_table()))
}

fn sample_parser(mapping: &str) -> Parser {
    parser_for(mapping, BufrFile::from_bytes(radiance_message(&sample_radiances())))
}

/// Three messages holding one observation each.
fn split_file() -> BufrFile {
    let bytes: Vec<u8> = sample_radiances()
        .iter()
        .flat_map(|obs| radiance_message(std::slice::from_ref(obs)))
        .collect();
    BufrFile::from_bytes(bytes)
}

#[test]
fn test_parse_exports_variables() {
    let container = sample_parser(MAPPING).parse(&ParseOptions::default()).unwrap();

    assert_eq!(container.len(), 3);
    assert_eq!(
        container.field_names(),
        vec![
            "variables/timestamp",
            "variables/latitude",
            "variables/longitude",
            "variables/satelliteId",
            "variables/radiance",
        ]
    );

    let longitude = container.get("variables/longitude", None).unwrap();
    let values: Vec<f64> = (0..3).map(|i| longitude.get_f64(i).unwrap()).collect();
    assert_all_approx_eq!(values, [166.7977, 166.4078, 165.992], 1e-3);

    let radiance = container.get("variables/radiance", None).unwrap();
    assert_eq!(radiance.dims(), &[3, 3]);
    assert!(radiance.is_missing(4));

    let timestamp = container.get("variables/timestamp", None).unwrap();
    let seconds = timestamp.as_i64().unwrap();
    assert_eq!(seconds.len(), 3);
    assert_eq!(seconds[0], 1_603_746_001);
    assert_eq!(timestamp.get_i64(2), Some(0));

    assert_eq!(
        container.paths("variables/timestamp").unwrap().len(),
        6
    );
}

#[test]
fn test_split_labels_rows() {
    let container = sample_parser(MAPPING).parse(&ParseOptions::default()).unwrap();

    assert_eq!(
        container.all_sub_categories(),
        vec![Category::from("noaa-18"), Category::from("noaa-19")]
    );
    let noaa19 = container
        .get("variables/latitude", Some(&Category::from("noaa-19")))
        .unwrap();
    assert_eq!(noaa19.rows(), 1);
    assert_approx_eq!(noaa19.get_f64(0).unwrap(), -12.7, 1e-4);
}

#[test]
fn test_filters_and_transforms() {
    let mapping = r#"
bufr:
  variables:
    latitude:
      query: "*/CLAT"
      transforms:
        - scale: 2.0
        - offset: 1.0
    radiance:
      query: "*/BRIT/TMBR"
  filters:
    - bounding:
        variable: latitude
        lowerBound: -12.65
"#;
    let container = sample_parser(mapping).parse(&ParseOptions::default()).unwrap();

    // Bounds apply to the values as decoded, before transforms.
    assert_eq!(container.len(), 2);
    let latitude = container.get("variables/latitude", None).unwrap();
    assert_approx_eq!(latitude.get_f64(0).unwrap(), -24.0, 1e-4);
    assert_approx_eq!(latitude.get_f64(1).unwrap(), -24.2, 1e-4);
}

#[test]
fn test_group_by_radiance() {
    let mapping = r#"
bufr:
  group_by_variable: radiance
  variables:
    satelliteId:
      query: "*/SAID"
    channel:
      query: "*/BRIT/CHNM"
    radiance:
      query: "*/BRIT/TMBR"
  splits:
    satId:
      category:
        variable: satelliteId
"#;
    let container = sample_parser(mapping).parse(&ParseOptions::default()).unwrap();

    assert_eq!(container.len(), 9);
    let channel = container.get("variables/channel", None).unwrap();
    assert_eq!(channel.get_i64(3), Some(1));
    assert_eq!(container.row_count(Some(&Category::from("209"))), 6);
    assert_eq!(container.row_count(Some(&Category::from("223"))), 3);
}

#[test]
fn test_max_messages() {
    let parser = parser_for(MAPPING, split_file());
    let container = parser
        .parse(&ParseOptions::default().with_max_messages(2))
        .unwrap();
    assert_eq!(container.len(), 2);
}

#[test]
fn test_parallel_parse_matches_serial() {
    let serial = parser_for(MAPPING, split_file())
        .parse(&ParseOptions::default())
        .unwrap();

    let gathered: Vec<DataContainer> = thread::scope(|s| {
        let handles: Vec<_> = LocalGroup::new(2)
            .into_iter()
            .map(|comm| {
                s.spawn(move || {
                    let parser = parser_for(MAPPING, split_file());
                    let mut local = parser
                        .parse_in_parallel(&comm, &ParseOptions::default())
                        .unwrap();
                    assert_eq!(local.len(), if comm.rank() == 0 { 1 } else { 2 });
                    local.all_gather(&comm).unwrap();
                    local
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for container in gathered {
        for path in serial.field_names() {
            assert_eq!(
                container.get(path, None).unwrap(),
                serial.get(path, None).unwrap(),
                "{}",
                path
            );
        }
        assert_eq!(container.all_sub_categories(), serial.all_sub_categories());
    }
}

#[test]
fn test_parse_cached_shares_container() {
    let parser = sample_parser(MAPPING);
    let cache = DataCache::new();
    let options = ParseOptions::default().with_policy(DecodePolicy::Abort);

    let first = parser.parse_cached(&cache, "mapping.yaml", &options).unwrap();
    let second = parser.parse_cached(&cache, "mapping.yaml", &options).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    for category in first.all_sub_categories() {
        cache
            .mark_finished(parser.source(), "mapping.yaml", &category)
            .unwrap();
    }
    assert!(cache.is_empty());

    let reparsed = parser.parse_cached(&cache, "mapping.yaml", &options).unwrap();
    assert!(!Arc::ptr_eq(&first, &reparsed));
    assert_eq!(reparsed.field_names(), first.field_names());
}

#[test]
fn test_encode_per_category() {
    let parser = sample_parser(MAPPING);
    let container = parser.parse(&ParseOptions::default()).unwrap();
    let encoder = MemoryEncoder::new(parser.description().encoder.clone());

    let datasets = encoder
        .encode(&container, "out/amsua_{splits/satId}.nc")
        .unwrap();
    assert_eq!(datasets.len(), 2);

    let noaa18 = &datasets[&Category::from("noaa-18")];
    assert_eq!(noaa18.path, "out/amsua_noaa-18.nc");
    let bt = noaa18.variable("ObsValue/brightnessTemperature").unwrap();
    assert_eq!(bt.data.dims(), &[2, 3]);
    assert_eq!(bt.units.as_deref(), Some("K"));
    assert_eq!(
        bt.dimensions,
        vec!["Location".to_string(), "ObsValue/brightnessTemperature_dim1".to_string()]
    );
}

#[test]
fn test_parser_from_mapping_files() {
    let dir = temp_test_dir();
    write_fixture(&dir, "table.yaml", test_utils::SAMPLE_TABLE_YAML);
    let mapping = format!("bufr:\n  table: table.yaml\n{}", &MAPPING["\nbufr:\n".len()..]);
    let mapping_path = write_fixture(&dir, "mapping.yaml", mapping);
    let source = write_fixture(&dir, "obs.bufr", radiance_message(&sample_radiances()));

    let parser = Parser::from_mapping(&source, &mapping_path, None).unwrap();
    let container = parser.parse(&ParseOptions::default()).unwrap();
    assert_eq!(container.len(), 3);
}

const SPECTRAL_MAPPING: &str = r#"
bufr:
  variables:
    channel:
      query: "*/IASICHN/CHNM"
    radiance:
      spectralRadiance:
        sensorChannelNumber: "*/IASICHN/CHNM"
        startChannel: "*/IASIBAND/STCH"
        endChannel: "*/IASIBAND/ENCH"
        scaleFactor: "*/IASIBAND/CHSF"
        scaledSpectralRadiance: "*/IASICHN/SCRA"
"#;

/// Two subsets with two scale-factor bands and four channels each.
fn spectral_parser() -> Parser {
    let table = TableBuilder::new()
        .element(Fxy::new(0, 5, 42), "CHNM", "NUMERIC", 0, 0, 14)
        .element(Fxy::new(0, 14, 46), "SCRA", "W M-2 SR-1 M", 0, 0, 16)
        .element(Fxy::new(0, 25, 140), "STCH", "NUMERIC", 0, 0, 14)
        .element(Fxy::new(0, 25, 141), "ENCH", "NUMERIC", 0, 0, 14)
        .element(Fxy::new(0, 25, 142), "CHSF", "NUMERIC", 0, 0, 6)
        .element(Fxy::new(0, 31, 1), "DRPF", "NUMERIC", 0, 0, 8)
        .sequence(
            Fxy::new(3, 40, 1),
            "IASIBAND",
            vec![Fxy::new(0, 25, 140), Fxy::new(0, 25, 141), Fxy::new(0, 25, 142)],
        )
        .sequence(Fxy::new(3, 40, 2), "IASICHN", vec![Fxy::new(0, 5, 42), Fxy::new(0, 14, 46)])
        .sequence(
            Fxy::new(3, 61, 10),
            "NC021241",
            vec![
                Fxy::new(1, 1, 2),
                Fxy::new(3, 40, 1),
                Fxy::new(1, 1, 0),
                Fxy::new(0, 31, 1),
                Fxy::new(3, 40, 2),
            ],
        )
        .build()
        .unwrap();

    let mut w = BitWriter::new();
    let subsets: [[(u64, Option<u64>); 4]; 2] = [
        [(1, Some(100)), (2, Some(200)), (3, Some(300)), (4, None)],
        [(1, Some(500)), (2, Some(600)), (3, Some(700)), (5, Some(800))],
    ];
    for channels in subsets {
        w.write(1, 14).write(2, 14).write(2, 6);
        w.write(3, 14).write(4, 14).write(3, 6);
        w.write(channels.len() as u64, 8);
        for (channel, radiance) in channels {
            w.write(channel, 14);
            match radiance {
                Some(raw) => w.write(raw, 16),
                None => w.write_missing(16),
            };
        }
    }
    let bytes = BufrBuilder::new().subsets(2).descriptor(3, 61, 10).data(w).build();

    let description = Description::from_yaml_str(SPECTRAL_MAPPING).unwrap();
    Parser::from_file("iasi.bufr", BufrFile::from_bytes(bytes), description, Arc::new(table))
}

#[test]
fn test_spectral_radiance_applies_band_scale() {
    let container = spectral_parser().parse(&ParseOptions::default()).unwrap();
    assert_eq!(container.len(), 2);

    let radiance = container.get("variables/radiance", None).unwrap();
    assert_eq!(radiance.dims(), &[2, 4]);
    assert!(radiance.as_f32().is_some());

    assert_all_approx_eq!(
        [radiance.get_f64(0).unwrap(), radiance.get_f64(1).unwrap(), radiance.get_f64(2).unwrap()],
        [1.0, 2.0, 0.3],
        1e-6
    );
    assert!(radiance.is_missing(3));
    assert_all_approx_eq!(
        [radiance.get_f64(4).unwrap(), radiance.get_f64(5).unwrap(), radiance.get_f64(6).unwrap()],
        [5.0, 6.0, 0.7],
        1e-6
    );
    // Channel 5 lies outside both bands.
    assert!(radiance.is_missing(7));

    assert_eq!(container.paths("variables/radiance").unwrap().len(), 5);
}
