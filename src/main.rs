use anyhow::Result;
use clap::{Parser, Subcommand};
use inspection_choropleth::{config, data, render, server, widget};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the choropleth for both metrics into the output directory
    Generate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Serve the choropleth API and the generated output
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Generate { config } => {
            info!("Generating choropleth with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;

            // 1. Load Data
            let datasets = Arc::new(data::load_data(&app_config.input)?);

            // 2. Initial render, then flip the dropdown once so both metrics are written
            let initial = app_config.style.initial_metric;
            let surface = render::FileSurface::new(&app_config.output.dir, app_config.output.raster_width);
            let mut widget = widget::ChoroplethWidget::new(
                datasets.clone(),
                app_config.style.color_style()?,
                app_config.aggregation.inspection_pick,
                initial,
                surface,
            )?;
            widget.on_metric_change(initial.other())?;

            // 3. Tooltips
            let mut surface = widget.into_surface();
            surface.write_tooltips(&datasets, app_config.aggregation.inspection_pick)?;

            info!("Generation complete! Wrote {} files.", surface.written().len());
        }
        Commands::Serve { config } => {
            info!("Serving choropleth with config: {:?}", config);
            let app_config = config::AppConfig::load_from_file(config)?;
            let datasets = data::load_data(&app_config.input)?;

            server::start_server(app_config, datasets).await?;
        }
    }

    Ok(())
}
