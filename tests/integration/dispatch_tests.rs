//! Read dispatch integration tests.
//!
//! Tests verify:
//! - Working block size honours the RAM budget
//! - Requests split to fit the budget return the same pixels as unsplit ones
//! - Block reads compute every band of a block at once
//! - Unrecognised buffer layouts go through the block cache
//! - Failed or cancelled reads leave the dataset usable

use std::sync::Arc;

use processed_raster::dataset::fits_budget;
use processed_raster::{
    process_region, resolve_pipeline, DataType, OpenOptions, ProcessError, ProcessedDataset,
    Progress, RasterError, ReadRequest, Spacing, StepConfig, Window, WorkBuffers,
};

use super::test_utils::{
    counted, flaky, from_last_step, open_with_budget, pattern, pattern_source, read_all,
    read_window, samples, steps_config, test_registry, Counters, FailSwitch,
};

const LARGE_BUDGET: u64 = 256 * 1024 * 1024;

// =============================================================================
// RAM Budget
// =============================================================================

#[test]
fn test_tiny_budget_shrinks_block() {
    let registry = test_registry();
    let config = steps_config(vec![StepConfig::new("double")]);

    let source = Arc::new(pattern_source(1000, 1000, 1, DataType::Float32));
    let mut tight = open_with_budget(source.clone(), &config, &registry, 300).unwrap();
    let mut roomy = open_with_budget(source, &config, &registry, LARGE_BUDGET).unwrap();

    let (w, h) = tight.block_size();
    assert!(w < 256 || h < 256);
    assert!(w * h * tight.working_bytes_per_pixel() <= 300);
    assert_eq!(roomy.block_size(), (256, 256));

    let window = Window::new(100, 200, 50, 40);
    let expected = read_window(&mut roomy, window);
    assert_eq!(read_window(&mut tight, window), expected);

    let values = samples(&expected, DataType::Float32);
    assert_eq!(values[0], 2.0 * pattern(0, 100, 200));
    assert_eq!(values[50 * 39 + 49], 2.0 * pattern(0, 149, 239));
}

#[test]
fn test_block_size_within_budget() {
    let registry = test_registry();
    let config = from_last_step(steps_config(vec![
        StepConfig::new("expand4"),
        StepConfig::new("position"),
    ]));

    for budget in [1u64, 7, 64, 300, 4096, 1 << 20] {
        let source = Arc::new(pattern_source(300, 200, 3, DataType::Byte));
        let dataset = open_with_budget(source, &config, &registry, budget).unwrap();
        let (w, h) = dataset.block_size();
        assert!(
            fits_budget(w, h, dataset.working_bytes_per_pixel(), budget) || (w, h) == (1, 1),
            "block {}x{} exceeds budget {}",
            w,
            h,
            budget
        );
    }
}

#[test]
fn test_split_read_matches_single_region() {
    let registry = test_registry();
    let config = from_last_step(steps_config(vec![
        StepConfig::new("mean"),
        StepConfig::new("position"),
    ]));
    let source = Arc::new(pattern_source(64, 48, 3, DataType::UInt16));

    // Budget for 24 working pixels forces dozens of splits
    let mut dataset = open_with_budget(source.clone(), &config, &registry, 24 * 24).unwrap();
    let window = Window::new(5, 3, 50, 40);
    let split = read_window(&mut dataset, window);

    let (mut steps, _) = resolve_pipeline(&config, &*source, &registry)
        .unwrap()
        .into_parts();
    let mut buffers = WorkBuffers::new();
    let mut noop = |_: f64| true;
    let out_type = process_region(
        &*source,
        &mut steps,
        None,
        &mut buffers,
        window,
        &mut Progress::new(&mut noop),
    )
    .unwrap();

    assert_eq!(out_type, DataType::Float64);
    assert_eq!(split, buffers.current()[..split.len()]);
    assert!(source.read_count() > 2);
}

#[test]
fn test_band_sequential_split_read() {
    let registry = test_registry();
    let config = steps_config(vec![StepConfig::new("identity")]);
    let source = Arc::new(pattern_source(40, 30, 3, DataType::Int16));

    let mut tight = open_with_budget(source.clone(), &config, &registry, 100).unwrap();
    let mut roomy = open_with_budget(source, &config, &registry, LARGE_BUDGET).unwrap();

    let request =
        ReadRequest::band_sequential(Window::new(3, 4, 30, 20), DataType::Int16, vec![0, 1, 2]);
    let mut a = vec![0u8; request.required_len()];
    let mut b = vec![0u8; request.required_len()];
    tight.read(&request, &mut a, None).unwrap();
    roomy.read(&request, &mut b, None).unwrap();
    assert_eq!(a, b);

    let values = samples(&a, DataType::Int16);
    // Band 2, row 5, column 7 of the request
    assert_eq!(values[2 * 600 + 5 * 30 + 7], pattern(2, 10, 9));
}

// =============================================================================
// Block Reads
// =============================================================================

#[test]
fn test_block_read_fans_out_to_all_bands() {
    let registry = test_registry();
    let config = steps_config(vec![StepConfig::new("identity")]);
    let source = Arc::new(pattern_source(32, 32, 3, DataType::Byte).with_block_size(16, 16));
    let mut dataset = open_with_budget(source.clone(), &config, &registry, LARGE_BUDGET).unwrap();
    assert_eq!(dataset.block_size(), (16, 16));
    assert_eq!(dataset.block_counts(), (2, 2));

    let mut block = vec![0u8; 16 * 16];
    dataset.read_block(0, 1, 1, &mut block).unwrap();
    assert_eq!(source.read_count(), 1);
    assert_eq!(block[0] as f64, pattern(0, 16, 16));

    dataset.read_block(1, 1, 1, &mut block).unwrap();
    dataset.read_block(2, 1, 1, &mut block).unwrap();
    assert_eq!(source.read_count(), 1);
    assert_eq!(block[16 + 3] as f64, pattern(2, 19, 17));
    for band in 0..3 {
        assert_eq!(dataset.cached_blocks(band), 1);
    }

    dataset.flush_cache();
    assert_eq!(dataset.cached_blocks(0), 0);
    dataset.read_block(2, 1, 1, &mut block).unwrap();
    assert_eq!(source.read_count(), 2);
}

#[test]
fn test_edge_block_fills_top_left() {
    let registry = test_registry();
    let config = steps_config(vec![StepConfig::new("identity")]);
    let source = Arc::new(pattern_source(40, 20, 1, DataType::Byte).with_block_size(16, 16));
    let mut dataset = open_with_budget(source, &config, &registry, LARGE_BUDGET).unwrap();
    assert_eq!(dataset.block_counts(), (3, 2));

    let mut block = vec![0u8; 16 * 16];
    dataset.read_block(0, 2, 1, &mut block).unwrap();
    // 8 valid columns and 4 valid rows
    assert_eq!(block[0] as f64, pattern(0, 32, 16));
    assert_eq!(block[3 * 16 + 7] as f64, pattern(0, 39, 19));

    let err = dataset.read_block(0, 3, 0, &mut block).unwrap_err();
    assert!(matches!(err, ProcessError::InvalidRequest(_)));
    let err = dataset.read_block(1, 0, 0, &mut block).unwrap_err();
    assert!(matches!(
        err,
        ProcessError::Source(RasterError::InvalidBand { band: 1, .. })
    ));
}

#[test]
fn test_band_subset_uses_block_path() {
    let registry = test_registry();
    let config = steps_config(vec![StepConfig::new("double")]);
    let source = Arc::new(pattern_source(24, 24, 3, DataType::Float32).with_block_size(8, 8));
    let mut dataset = open_with_budget(source, &config, &registry, LARGE_BUDGET).unwrap();

    let window = Window::new(2, 5, 12, 9);
    let full = samples(&read_window(&mut dataset, window), DataType::Float32);

    let request = ReadRequest::pixel_interleaved(window, DataType::Float64, vec![2, 0]);
    let mut buffer = vec![0u8; request.required_len()];
    dataset.read(&request, &mut buffer, None).unwrap();
    let subset = samples(&buffer, DataType::Float64);

    for p in 0..window.pixel_count() {
        assert_eq!(subset[p * 2], full[p * 3 + 2]);
        assert_eq!(subset[p * 2 + 1], full[p * 3]);
    }
    assert!(dataset.cached_blocks(1) > 0);
}

#[test]
fn test_wide_block_read_computes_each_block_once() {
    let registry = test_registry();
    let config = steps_config(vec![StepConfig::new("identity")]);
    let source = Arc::new(pattern_source(4096, 16, 2, DataType::Byte).with_block_size(16, 16));
    // The cache holds far fewer blocks than one block row spans
    let options = OpenOptions::new()
        .with_registry(&registry)
        .with_ram_budget(LARGE_BUDGET)
        .with_block_cache(4);
    let mut dataset = ProcessedDataset::from_source(source.clone(), &config, &options).unwrap();
    assert_eq!(dataset.block_counts(), (256, 1));

    let request =
        ReadRequest::pixel_interleaved(Window::full(4096, 16), DataType::Byte, vec![1, 0]);
    let mut buffer = vec![0u8; request.required_len()];
    dataset.read(&request, &mut buffer, None).unwrap();
    assert!(source.read_count() <= 256);

    for y in [0, 7, 15] {
        for x in [0, 15, 16, 2047, 4095] {
            let p = (y * 4096 + x) * 2;
            assert_eq!(buffer[p] as f64, pattern(1, x, y));
            assert_eq!(buffer[p + 1] as f64, pattern(0, x, y));
        }
    }
}

#[test]
fn test_upsampled_read_uses_nearest_neighbour() {
    let registry = test_registry();
    let config = steps_config(vec![StepConfig::new("identity")]);
    let source = Arc::new(pattern_source(16, 16, 1, DataType::Byte));
    let mut dataset = open_with_budget(source, &config, &registry, LARGE_BUDGET).unwrap();

    let request = ReadRequest::pixel_interleaved(Window::new(4, 4, 4, 4), DataType::Byte, vec![0])
        .with_buffer_size(8, 8);
    let mut buffer = vec![0u8; request.required_len()];
    dataset.read(&request, &mut buffer, None).unwrap();

    for by in 0..8 {
        for bx in 0..8 {
            assert_eq!(buffer[by * 8 + bx] as f64, pattern(0, 4 + bx / 2, 4 + by / 2));
        }
    }
}

#[test]
fn test_padded_spacing() {
    let registry = test_registry();
    let config = steps_config(vec![StepConfig::new("identity")]);
    let source = Arc::new(pattern_source(10, 10, 2, DataType::Byte));
    let mut dataset = open_with_budget(source, &config, &registry, LARGE_BUDGET).unwrap();

    // Two bands per pixel, one pad byte per pixel, four pad bytes per line
    let request = ReadRequest::pixel_interleaved(Window::new(1, 1, 3, 2), DataType::Byte, vec![0, 1])
        .with_spacing(Spacing {
            pixel: 3,
            line: 13,
            band: 1,
        });
    let mut buffer = vec![0xAAu8; request.required_len()];
    dataset.read(&request, &mut buffer, None).unwrap();

    assert_eq!(buffer[0] as f64, pattern(0, 1, 1));
    assert_eq!(buffer[1] as f64, pattern(1, 1, 1));
    assert_eq!(buffer[2], 0xAA);
    assert_eq!(buffer[13 + 2 * 3 + 1] as f64, pattern(1, 3, 2));
}

// =============================================================================
// Invalid Requests
// =============================================================================

#[test]
fn test_invalid_requests() {
    let registry = test_registry();
    let config = steps_config(vec![StepConfig::new("identity")]);
    let source = Arc::new(pattern_source(10, 10, 1, DataType::Byte));
    let mut dataset = open_with_budget(source, &config, &registry, LARGE_BUDGET).unwrap();

    let request = ReadRequest::pixel_interleaved(Window::new(5, 5, 6, 1), DataType::Byte, vec![0]);
    let mut buffer = vec![0u8; 64];
    let err = dataset.read(&request, &mut buffer, None).unwrap_err();
    assert!(matches!(
        err,
        ProcessError::Source(RasterError::WindowOutOfBounds { .. })
    ));

    let request = ReadRequest::pixel_interleaved(Window::new(0, 0, 10, 10), DataType::Byte, vec![0]);
    let err = dataset.read(&request, &mut buffer, None).unwrap_err();
    assert!(matches!(
        err,
        ProcessError::Source(RasterError::BufferTooSmall {
            required: 100,
            actual: 64
        })
    ));

    // Nothing to write: succeeds without touching the buffer
    let request = ReadRequest::pixel_interleaved(Window::new(0, 0, 4, 4), DataType::Byte, vec![0])
        .with_buffer_size(0, 0);
    dataset.read(&request, &mut [], None).unwrap();
}

// =============================================================================
// Progress, Failure and Lifecycle
// =============================================================================

#[test]
fn test_progress_and_cancellation() {
    let registry = test_registry();
    let config = steps_config(vec![StepConfig::new("double")]);
    let source = Arc::new(pattern_source(64, 64, 1, DataType::Float32));
    let mut dataset = open_with_budget(source, &config, &registry, 2048).unwrap();

    let request = ReadRequest::pixel_interleaved(Window::full(64, 64), DataType::Float32, vec![0]);
    let mut buffer = vec![0u8; request.required_len()];

    let mut seen = Vec::new();
    let mut record = |fraction: f64| {
        seen.push(fraction);
        true
    };
    let sink: &mut dyn FnMut(f64) -> bool = &mut record;
    dataset.read(&request, &mut buffer, Some(sink)).unwrap();
    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|pair| pair[0] <= pair[1] + 1e-12));
    assert!(seen.iter().all(|f| (0.0..=1.0 + 1e-12).contains(f)));
    assert!((seen.last().copied().unwrap_or(0.0) - 1.0).abs() < 1e-9);

    let mut calls = 0;
    let mut stop_early = |_: f64| {
        calls += 1;
        calls < 3
    };
    let sink: &mut dyn FnMut(f64) -> bool = &mut stop_early;
    let err = dataset.read(&request, &mut buffer, Some(sink)).unwrap_err();
    assert!(matches!(err, ProcessError::Interrupted));

    buffer.fill(0);
    dataset.read(&request, &mut buffer, None).unwrap();
    assert_eq!(read_all(&mut dataset), buffer);
}

#[test]
fn test_failure_then_retry() {
    let registry = test_registry();
    let switch = FailSwitch::default();
    registry.register(flaky(switch.clone())).unwrap();

    let config = steps_config(vec![StepConfig::new("flaky")]);
    let source = Arc::new(pattern_source(20, 20, 1, DataType::Byte));
    let mut dataset = open_with_budget(source, &config, &registry, LARGE_BUDGET).unwrap();

    switch.set(true);
    let request = ReadRequest::pixel_interleaved(Window::full(20, 20), DataType::Byte, vec![0]);
    let mut buffer = vec![0u8; request.required_len()];
    let err = dataset.read(&request, &mut buffer, None).unwrap_err();
    assert!(matches!(
        err,
        ProcessError::Algorithm { ref algorithm, ref message }
            if algorithm == "flaky" && message == "switched off"
    ));
    let mut block = vec![0u8; 20 * 20];
    assert!(dataset.read_block(0, 0, 0, &mut block).is_err());
    assert_eq!(dataset.cached_blocks(0), 0);

    switch.set(false);
    dataset.read(&request, &mut buffer, None).unwrap();
    assert_eq!(buffer[21] as f64, pattern(0, 1, 1));
}

#[test]
fn test_working_state_released_on_close() {
    let registry = test_registry();
    let counters = Arc::new(Counters::default());
    registry.register(counted(counters.clone())).unwrap();

    let config = steps_config(vec![
        StepConfig::new("counted"),
        StepConfig::new("identity"),
        StepConfig::new("counted"),
    ]);
    let source = Arc::new(pattern_source(8, 8, 2, DataType::Byte));
    let mut dataset = open_with_budget(source, &config, &registry, LARGE_BUDGET).unwrap();
    assert_eq!(counters.inits(), 2);
    assert!(dataset.steps()[0].has_state());
    assert!(!dataset.steps()[1].has_state());

    read_all(&mut dataset);
    assert_eq!(counters.runs(), 2);
    assert_eq!(counters.frees(), 0);

    drop(dataset);
    assert_eq!(counters.frees(), 2);
}
