//! Configuration and source integration tests.
//!
//! Tests verify:
//! - JSON descriptions open into working datasets
//! - Inline rasters, unscaling and image files as inputs
//! - Invalid descriptions are rejected when opening
//! - RAM budget parsing and command-line settings

use std::path::PathBuf;

use clap::Parser;
use image::{Rgb, RgbImage};

use processed_raster::config::parse_memory_size_with_total;
use processed_raster::{
    parse_memory_size, Cli, Command, ConfigError, DataType, OpenOptions, ProcessedConfig,
    ProcessedDataset, RasterError,
};

use super::test_utils::{read_all, samples, test_registry};

const BUDGET: u64 = 64 * 1024 * 1024;

const INLINE_PIPELINE: &str = r#"{
    "Input": {
        "Inline": {
            "Width": 8,
            "Height": 6,
            "BandCount": 3,
            "DataType": "Float32",
            "Fill": [10, 20, 30],
            "Interleave": "BAND",
            "GeoTransform": [1000.0, 2.0, 0.0, 5000.0, 0.0, -2.0]
        },
        "Overviews": [2]
    },
    "OutputBands": { "Count": "FROM_LAST_STEP" },
    "ProcessingSteps": [
        { "Name": "average", "Algorithm": "mean" },
        { "Name": "triple", "Algorithm": "scale", "Arguments": { "factor": 3 } }
    ]
}"#;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("processed-raster-{}-{}", std::process::id(), name))
}

// =============================================================================
// Opening Descriptions
// =============================================================================

#[test]
fn test_open_inline_description() {
    let registry = test_registry();
    let config = ProcessedConfig::from_json_str(INLINE_PIPELINE).unwrap();
    let options = OpenOptions::new()
        .with_registry(&registry)
        .with_ram_budget(BUDGET);
    let mut dataset = ProcessedDataset::open(&config, &options).unwrap();

    assert_eq!((dataset.width(), dataset.height()), (8, 6));
    assert_eq!(dataset.band_count(), 1);
    assert_eq!(dataset.steps()[1].label, "triple");
    assert_eq!(dataset.steps()[1].arguments.get_double("factor"), Some(3.0));

    let values = samples(&read_all(&mut dataset), DataType::Float32);
    assert_eq!(values, vec![60.0; 48]);

    assert_eq!(dataset.overview_count(), 1);
    let overview = dataset.overview_mut(0).unwrap();
    assert_eq!((overview.width(), overview.height()), (4, 3));
    assert_eq!(overview.geo_transform().unwrap().pixel_width, 4.0);
    let values = samples(&read_all(overview), DataType::Float32);
    assert_eq!(values, vec![60.0; 12]);
}

#[test]
fn test_retained_config_round_trips() {
    let registry = test_registry();
    let config = ProcessedConfig::from_json_str(INLINE_PIPELINE).unwrap();
    let options = OpenOptions::new()
        .with_registry(&registry)
        .with_ram_budget(BUDGET);
    let dataset = ProcessedDataset::open(&config, &options).unwrap();

    let text = dataset.config().to_json_string().unwrap();
    assert_eq!(ProcessedConfig::from_json_str(&text).unwrap(), config);
}

#[test]
fn test_unscaled_input() {
    let registry = test_registry();
    let config = ProcessedConfig::from_json_str(
        r#"{
            "Input": {
                "Inline": {
                    "Width": 2, "Height": 2, "DataType": "Byte", "NoData": 0,
                    "Values": [0, 2, 4, 6], "Offsets": [10], "Scales": [0.5]
                },
                "Unscale": true
            },
            "ProcessingSteps": [ { "Algorithm": "identity" } ]
        }"#,
    )
    .unwrap();
    let options = OpenOptions::new()
        .with_registry(&registry)
        .with_ram_budget(BUDGET);
    let mut dataset = ProcessedDataset::open(&config, &options).unwrap();

    assert_eq!(dataset.data_type(), DataType::Float64);
    assert_eq!(dataset.band(0).unwrap().nodata, Some(10.0));
    let values = samples(&read_all(&mut dataset), DataType::Float64);
    assert_eq!(values, vec![10.0, 11.0, 12.0, 13.0]);
}

#[test]
fn test_image_file_input() {
    let path = temp_path("rgb.png");
    let img = RgbImage::from_fn(3, 2, |x, y| Rgb([x as u8 * 30, y as u8 * 60, 90]));
    img.save(&path).unwrap();

    let registry = test_registry();
    let text = format!(
        r#"{{
            "Input": {{ "Filename": "{}" }},
            "OutputBands": {{ "Count": 1 }},
            "ProcessingSteps": [ {{ "Algorithm": "mean" }} ]
        }}"#,
        path.file_name().unwrap().to_string_lossy()
    );
    let config = ProcessedConfig::from_json_str(&text).unwrap();
    let options = OpenOptions::new()
        .with_registry(&registry)
        .with_ram_budget(BUDGET)
        .with_base_dir(std::env::temp_dir());
    let mut dataset = ProcessedDataset::open(&config, &options).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(dataset.data_type(), DataType::Byte);
    assert_eq!(dataset.source().band_count(), 3);
    let values = read_all(&mut dataset);
    // Pixel (2, 1) is (60, 60, 90)
    assert_eq!(values[5], 70);
}

// =============================================================================
// Rejected Descriptions
// =============================================================================

#[test]
fn test_missing_sections() {
    let registry = test_registry();
    let options = OpenOptions::new().with_registry(&registry);

    let config = ProcessedConfig::from_json_str(
        r#"{ "ProcessingSteps": [ { "Algorithm": "identity" } ] }"#,
    )
    .unwrap();
    let err = ProcessedDataset::open(&config, &options).unwrap_err();
    assert!(matches!(err, ConfigError::MissingSection(ref s) if s == "Input"));

    let config = ProcessedConfig::from_json_str(
        r#"{ "Input": { "Inline": { "Width": 2, "Height": 2 } } }"#,
    )
    .unwrap();
    let err = ProcessedDataset::open(&config, &options).unwrap_err();
    assert!(matches!(err, ConfigError::MissingSection(ref s) if s == "ProcessingSteps"));
}

#[test]
fn test_unopenable_inputs() {
    let registry = test_registry();
    let options = OpenOptions::new().with_registry(&registry);

    let config = ProcessedConfig::from_json_str(
        r#"{
            "Input": { "Filename": "/nonexistent/processed-raster/missing.png" },
            "ProcessingSteps": [ { "Algorithm": "identity" } ]
        }"#,
    )
    .unwrap();
    let err = ProcessedDataset::open(&config, &options).unwrap_err();
    assert!(matches!(err, ConfigError::Source(RasterError::Open { .. })));

    let config = ProcessedConfig::from_json_str(
        r#"{
            "Input": { "Inline": { "Width": 0, "Height": 2 } },
            "ProcessingSteps": [ { "Algorithm": "identity" } ]
        }"#,
    )
    .unwrap();
    let err = ProcessedDataset::open(&config, &options).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { field: "Inline", .. }));

    let config = ProcessedConfig::from_json_str(
        r#"{
            "Input": { "Inline": { "Width": 2, "Height": 2, "DataType": "Complex64" } },
            "ProcessingSteps": [ { "Algorithm": "identity" } ]
        }"#,
    );
    assert!(matches!(config, Err(ConfigError::Parse(_))));
}

// =============================================================================
// Settings
// =============================================================================

#[test]
fn test_memory_sizes() {
    assert_eq!(parse_memory_size("300"), Ok(300));
    assert_eq!(parse_memory_size("4K"), Ok(4096));
    assert_eq!(parse_memory_size("500MB"), Ok(500 * 1024 * 1024));
    assert!(parse_memory_size("lots").is_err());
    assert!(parse_memory_size("12XB").is_err());

    assert_eq!(parse_memory_size_with_total("10%", Some(1000)), Ok(100));
    assert!(parse_memory_size_with_total("10%", None).is_err());
    assert!(parse_memory_size_with_total("150%", Some(1000)).is_err());
}

#[test]
fn test_command_line() {
    let cli = Cli::try_parse_from([
        "procraster",
        "--ram-budget",
        "64MB",
        "render",
        "pipeline.json",
        "-o",
        "out.png",
        "--overview",
        "1",
    ])
    .unwrap();

    assert_eq!(cli.settings.ram_budget_bytes(), Ok(Some(64 * 1024 * 1024)));
    assert!(cli.settings.validate().is_ok());
    match cli.command {
        Command::Render(args) => {
            assert_eq!(args.config, PathBuf::from("pipeline.json"));
            assert_eq!(args.output, PathBuf::from("out.png"));
            assert_eq!(args.overview, Some(1));
        }
        other => panic!("unexpected command {:?}", other),
    }

    let cli = Cli::try_parse_from(["procraster", "--block-cache", "0", "algorithms"]).unwrap();
    assert!(cli.settings.validate().is_err());

    assert!(Cli::try_parse_from(["procraster", "info"]).is_err());
}
