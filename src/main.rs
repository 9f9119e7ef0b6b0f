use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabshot::{RenderParam, Renderer, ServiceConfig, Session};

/// Render an HTML template with a JSON payload into a JPEG.
#[derive(Parser, Debug)]
#[command(name = "tabshot", version, about)]
struct Cli {
    /// Template file to render
    template: PathBuf,

    /// JSON file with the payload handed to the template (must be an object)
    #[arg(long)]
    data: Option<PathBuf>,

    /// Viewport width in logical pixels
    #[arg(long)]
    width: Option<u32>,

    /// Completion-wait timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Output file
    #[arg(long, default_value = "render.jpg")]
    out: PathBuf,

    /// Service config file (bind host/port for the injected `host` value)
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = ServiceConfig::load(&cli.config)?;

    let data: serde_json::Value = match &cli.data {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("invalid JSON in {}", path.display()))?
        }
        None => serde_json::json!({}),
    };

    let mut builder = RenderParam::builder(&data)?
        .host_from(&config)
        .timeout(Duration::from_millis(cli.timeout_ms));
    if let Some(width) = cli.width {
        builder = builder.width(width);
    }
    let params = builder.build();

    let renderer = Renderer::new(Arc::new(Session::default()));
    let result = renderer.render(&cli.template, params).await?;

    let (image, complete) = result.into_parts();
    std::fs::write(&cli.out, &image)
        .with_context(|| format!("failed to write {}", cli.out.display()))?;
    info!("wrote {} bytes to {}", image.len(), cli.out.display());
    println!("complete: {}", complete);

    renderer.shutdown().await;
    Ok(())
}
