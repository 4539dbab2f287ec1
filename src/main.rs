//! procraster - Inspect and render processed rasters.

mod providers;

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use processed_raster::{
    config::{Cli, Command, InfoArgs, RenderArgs, Settings},
    AlgorithmRegistry, DataType, OpenOptions, ProcessedConfig, ProcessedDataset, ReadRequest,
    Window,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.settings.verbose);

    if let Err(e) = cli.settings.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    if let Err(e) = providers::register_all() {
        error!("Failed to register algorithms: {}", e);
        return ExitCode::FAILURE;
    }

    match cli.command {
        Command::Info(args) => run_info(&cli.settings, args),
        Command::Render(args) => run_render(&cli.settings, args),
        Command::Algorithms => run_algorithms(),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "processed_raster=debug,procraster=debug"
    } else {
        "processed_raster=info,procraster=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Parse the configuration file and open the dataset it describes.
fn open_dataset(settings: &Settings, path: &Path) -> Result<ProcessedDataset, String> {
    let config = ProcessedConfig::from_path(path).map_err(|e| e.to_string())?;

    let mut options = OpenOptions::new().with_block_cache(settings.block_cache);
    if let Some(bytes) = settings.ram_budget_bytes()? {
        options = options.with_ram_budget(bytes);
    }
    if let Some(dir) = path.parent() {
        options = options.with_base_dir(dir);
    }

    ProcessedDataset::open(&config, &options).map_err(|e| e.to_string())
}

// =============================================================================
// Info Command
// =============================================================================

fn run_info(settings: &Settings, args: InfoArgs) -> ExitCode {
    let dataset = match open_dataset(settings, &args.config) {
        Ok(dataset) => dataset,
        Err(e) => {
            error!("Failed to open {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        return match dataset.config().to_json_string() {
            Ok(text) => {
                println!("{}", text);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("Failed to describe {}: {}", args.config.display(), e);
                ExitCode::FAILURE
            }
        };
    }

    let (block_width, block_height) = dataset.block_size();
    println!("Size: {} x {}", dataset.width(), dataset.height());
    println!("Block: {} x {}", block_width, block_height);
    println!(
        "RAM budget: {} bytes ({} bytes per pixel)",
        dataset.ram_budget(),
        dataset.working_bytes_per_pixel()
    );
    if let Some(gt) = dataset.geo_transform() {
        println!("GeoTransform: {:?}", gt.to_gdal());
    }

    println!("Bands:");
    for (i, band) in dataset.bands().iter().enumerate() {
        match band.nodata {
            Some(nodata) => println!("  {}: {} (no-data {})", i + 1, band.data_type, nodata),
            None => println!("  {}: {}", i + 1, band.data_type),
        }
    }

    println!("Steps:");
    for step in dataset.steps() {
        println!(
            "  {} [{}]: {} x {} -> {} x {}",
            step.label,
            step.algorithm_name(),
            step.input_band_count,
            step.input_type,
            step.output_band_count,
            step.output_type
        );
    }

    if dataset.overview_count() > 0 {
        println!("Overviews:");
        for i in 0..dataset.overview_count() {
            if let Some(overview) = dataset.overview(i) {
                println!("  {}: {} x {}", i, overview.width(), overview.height());
            }
        }
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Render Command
// =============================================================================

fn run_render(settings: &Settings, args: RenderArgs) -> ExitCode {
    let mut dataset = match open_dataset(settings, &args.config) {
        Ok(dataset) => dataset,
        Err(e) => {
            error!("Failed to open {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let target = match args.overview {
        None => &mut dataset,
        Some(level) => match dataset.overview_mut(level) {
            Some(overview) => overview,
            None => {
                error!("Overview {} does not exist", level);
                return ExitCode::FAILURE;
            }
        },
    };

    let (width, height) = (target.width(), target.height());
    let data_type = target.data_type();
    let band_count = target.band_count();
    let request = ReadRequest::pixel_interleaved(
        Window::full(width, height),
        data_type,
        (0..band_count).collect(),
    );

    let mut buffer = vec![0u8; request.required_len()];
    let mut last_percent = 0;
    let mut report = |fraction: f64| {
        let percent = (fraction * 100.0) as u32;
        if percent >= last_percent + 10 {
            info!("{}% done", percent);
            last_percent = percent;
        }
        true
    };

    let sink: &mut dyn FnMut(f64) -> bool = &mut report;
    if let Err(e) = target.read(&request, &mut buffer, Some(sink)) {
        error!("Failed to compute raster: {}", e);
        return ExitCode::FAILURE;
    }

    let written = if data_type == DataType::Byte && (1..=4).contains(&band_count) {
        let color = match band_count {
            1 => image::ExtendedColorType::L8,
            2 => image::ExtendedColorType::La8,
            3 => image::ExtendedColorType::Rgb8,
            _ => image::ExtendedColorType::Rgba8,
        };
        image::save_buffer_with_format(
            &args.output,
            &buffer,
            width as u32,
            height as u32,
            color,
            image::ImageFormat::Png,
        )
        .map_err(|e| e.to_string())
    } else {
        std::fs::write(&args.output, &buffer).map_err(|e| e.to_string())
    };

    match written {
        Ok(()) => {
            info!(
                "Wrote {} x {} x {} {} to {}",
                width,
                height,
                band_count,
                data_type,
                args.output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to write {}: {}", args.output.display(), e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Algorithms Command
// =============================================================================

fn run_algorithms() -> ExitCode {
    for name in AlgorithmRegistry::global().names() {
        println!("{}", name);
    }
    ExitCode::SUCCESS
}
