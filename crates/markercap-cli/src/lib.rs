use std::ffi::OsString;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use markercap_core::filters;
use markercap_core::{BoundedLayer, LatLng, LatLngBounds, LayerOptions, LayerSettings};
use markercap_io::GeoJsonReader;
use markercap_map::map::as_host;
use markercap_map::{InMemoryMap, RenderFrame, Viewport};

#[derive(Debug, Parser)]
#[command(name = "markercap")]
#[command(about = "Show which point features a capped map layer would render for a view")]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the visible features for one view as JSON.
    View {
        /// GeoJSON file with Point features.
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, allow_hyphen_values = true, required_unless_present = "fit")]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true, required_unless_present = "fit")]
        lng: Option<f64>,
        #[arg(long, required_unless_present = "fit")]
        zoom: Option<f64>,
        /// Frame all features instead of using --lat/--lng/--zoom.
        #[arg(long, conflicts_with_all = ["lat", "lng", "zoom"])]
        fit: bool,
        #[arg(long, default_value_t = 1024.0)]
        width: f64,
        #[arg(long, default_value_t = 768.0)]
        height: f64,
        /// JSON layer settings (cap, auto-hide, zoom range).
        #[arg(long, value_name = "FILE")]
        settings: Option<PathBuf>,
        /// Overrides the cap from the settings file.
        #[arg(long)]
        max_markers: Option<usize>,
        /// Only show features whose property KEY equals VALUE (JSON literal or
        /// plain string). Repeatable; all must match.
        #[arg(long = "where", value_name = "KEY=VALUE")]
        conditions: Vec<String>,
    },
    /// Print CLI version.
    Version,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::View {
            file,
            lat,
            lng,
            zoom,
            fit,
            width,
            height,
            settings,
            max_markers,
            conditions,
        } => {
            let mut viewport = Viewport::new(width, height);
            if let (Some(lat), Some(lng), Some(zoom)) = (lat, lng, zoom) {
                viewport = viewport.with_view(LatLng::new(lat, lng), zoom);
            }
            let frame = run_view(
                &file,
                viewport,
                fit,
                settings.as_deref(),
                max_markers,
                &conditions,
            )?;
            println!("{}", frame.to_json()?);
            Ok(())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn run_view(
    file: &Path,
    viewport: Viewport,
    fit: bool,
    settings_path: Option<&Path>,
    max_markers: Option<usize>,
    conditions: &[String],
) -> Result<RenderFrame> {
    if !file.exists() {
        bail!("file does not exist: {}", file.display());
    }

    let mut settings = match settings_path {
        Some(path) => load_settings(path)?,
        None => LayerSettings::default(),
    };
    if max_markers.is_some() {
        settings.max_markers = max_markers;
    }

    let mut options = LayerOptions::from_settings(&settings).context("invalid layer settings")?;
    if !conditions.is_empty() {
        let parsed = conditions
            .iter()
            .map(|c| parse_condition(c))
            .collect::<Result<Vec<_>>>()?;
        options.display_filter = filters::all_of(
            parsed
                .into_iter()
                .map(|(key, value)| filters::property_equals(&key, value))
                .collect(),
        );
    }

    let reader = BufReader::new(File::open(file).context("failed to open GeoJSON file")?);
    let features = GeoJsonReader::new(reader)
        .read()
        .with_context(|| format!("failed to read {}", file.display()))?;

    let map = InMemoryMap::shared(viewport);
    if fit {
        let positions: Vec<LatLng> = features
            .iter()
            .map(|f| f.lat_lng())
            .filter(LatLng::is_finite)
            .collect();
        match LatLngBounds::from_points(&positions) {
            Some(bounds) => map.borrow_mut().fit_bounds(&bounds),
            None => log::warn!("No positioned features to fit, keeping the default view"),
        }
    }
    let mut layer: BoundedLayer = BoundedLayer::with_features(features, options);
    layer.add_to(&as_host(&map));
    log::info!(
        "{} of {} features visible ({:?})",
        layer.visible().len(),
        layer.len(),
        layer.state()
    );

    let frame = RenderFrame::capture(&layer, *map.borrow().viewport());
    Ok(frame)
}

fn load_settings(path: &Path) -> Result<LayerSettings> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings {}", path.display()))?;
    LayerSettings::from_json(&json).context("failed to parse settings")
}

/// Split `KEY=VALUE`; VALUE is parsed as JSON when possible, otherwise kept as a string.
fn parse_condition(condition: &str) -> Result<(String, Value)> {
    let Some((key, raw)) = condition.split_once('=') else {
        bail!("condition must look like KEY=VALUE, got {condition:?}");
    };
    if key.is_empty() {
        bail!("condition has an empty key: {condition:?}");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
