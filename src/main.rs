//! zisraw - inspect and render tiled microscopy containers.

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use zisraw::{
    compression_name,
    config::{AttachmentConfig, Cli, Command, InfoConfig, MetadataConfig, OpenConfig, RenderConfig},
    io::FileRangeReader,
    Container, Dimension, RegionRequest,
};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let command = cli.into_command();
    init_logging(command.verbose());

    match command {
        Command::Info(config) => run_info(config),
        Command::Render(config) => run_render(config),
        Command::Metadata(config) => run_metadata(config),
        Command::Attachment(config) => run_attachment(config),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose { "zisraw=debug" } else { "zisraw=info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Validate and open, logging any failure.
fn open_container(
    config: &OpenConfig,
    validation: Result<(), String>,
) -> Result<Container<FileRangeReader>, ExitCode> {
    if let Err(e) = validation {
        error!("Configuration error: {}", e);
        return Err(ExitCode::FAILURE);
    }

    Container::open_with(&config.path, config.open_options()).map_err(|e| {
        error!("Failed to open {}: {}", config.path.display(), e);
        ExitCode::FAILURE
    })
}

// =============================================================================
// Info Command
// =============================================================================

fn run_info(config: InfoConfig) -> ExitCode {
    let container = match open_container(&config.open, config.validate()) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let stats = container.statistics();
    let scaling = container.metadata().scaling().unwrap_or_default();
    let mut compressions: Vec<i32> = container
        .directory()
        .entries()
        .map(|e| e.compression)
        .collect();
    compressions.sort_unstable();
    compressions.dedup();

    if config.json {
        let json = serde_json::json!({
            "path": container.identifier(),
            "pyramid_factor": container.pyramid_factor(),
            "subblocks": stats.subblock_count,
            "bounding_box": stats.full_resolution_box(),
            "dimensions": stats.dimensions,
            "levels": stats.levels,
            "pixel_types": stats.pixel_types,
            "compressions": compressions.iter().map(|&c| compression_name(c)).collect::<Vec<_>>(),
            "scaling": scaling,
            "display_channels": container.metadata().display_channels(),
            "attachments": container.attachments(),
        });
        match serde_json::to_string_pretty(&json) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                error!("Failed to serialize summary: {}", e);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    println!("{}", container.identifier());
    println!("═════════════════════════════════");
    println!("Subblocks:      {}", stats.subblock_count);
    if let Some(bbox) = stats.full_resolution_box() {
        println!("Bounding box:   {}", bbox);
    }
    println!("Pyramid factor: {}", container.pyramid_factor());
    for bounds in &stats.dimensions {
        println!(
            "  {}: {}..{} ({})",
            bounds.dimension,
            bounds.start,
            bounds.end,
            bounds.size()
        );
    }
    for level in &stats.levels {
        println!(
            "Level {}: {} subblocks, {}",
            level.level, level.subblock_count, level.bounding_box
        );
    }
    let pixel_types: Vec<&str> = stats.pixel_types.iter().map(|p| p.name()).collect();
    println!("Pixel types:    {}", pixel_types.join(", "));
    let names: Vec<&str> = compressions.iter().map(|&c| compression_name(c)).collect();
    println!("Compression:    {}", names.join(", "));
    if let (Some(x), Some(y)) = (scaling.x, scaling.y) {
        println!("Pixel size:     {:e} x {:e} m", x, y);
    }
    println!("Channels:       {}", stats.size_of(Dimension::C));
    for attachment in container.attachments() {
        println!("Attachment:     {} ({})", attachment.name, attachment.content_type);
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Render Command
// =============================================================================

fn run_render(config: RenderConfig) -> ExitCode {
    let container = match open_container(&config.open, config.validate()) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let mut request = RegionRequest::new(config.region).plane(config.plane);
    request.level = config.level_selection();
    if let Some(channels) = &config.channels {
        request = request.channels(channels.clone());
    }

    let raster = match container.composite(&request) {
        Ok(r) => r,
        Err(e) => {
            error!("Failed to render {}: {}", config.region, e);
            return ExitCode::FAILURE;
        }
    };

    let Some(image) = image::RgbImage::from_raw(raster.width(), raster.height(), raster.to_rgb8())
    else {
        error!("Rendered raster has inconsistent size");
        return ExitCode::FAILURE;
    };
    if let Err(e) = image.save(&config.output) {
        error!("Failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    info!(
        "Rendered {}x{} from level {} to {}",
        raster.width(),
        raster.height(),
        raster.level(),
        config.output.display()
    );
    ExitCode::SUCCESS
}

// =============================================================================
// Metadata Command
// =============================================================================

fn run_metadata(config: MetadataConfig) -> ExitCode {
    let container = match open_container(&config.open, config.validate()) {
        Ok(c) => c,
        Err(code) => return code,
    };

    match &config.path {
        Some(path) => match container.metadata().document().get_text(path) {
            Some(text) => println!("{}", text),
            None => {
                error!("No metadata node at {}", path);
                return ExitCode::FAILURE;
            }
        },
        None => match container.metadata().to_xml() {
            Ok(xml) => println!("{}", xml),
            Err(e) => {
                error!("Failed to serialize metadata: {}", e);
                return ExitCode::FAILURE;
            }
        },
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Attachment Command
// =============================================================================

fn run_attachment(config: AttachmentConfig) -> ExitCode {
    let container = match open_container(&config.open, config.validate()) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let Some(name) = &config.name else {
        for attachment in container.attachments() {
            println!("{}\t{}", attachment.name, attachment.content_type);
        }
        return ExitCode::SUCCESS;
    };

    let data = match container.read_attachment(name) {
        Ok(data) => data,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let written = match &config.output {
        Some(path) => std::fs::write(path, &data),
        None => std::io::stdout().write_all(&data),
    };
    if let Err(e) = written {
        error!("Failed to write attachment: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
