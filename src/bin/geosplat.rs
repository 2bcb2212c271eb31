//! geosplat binary
//!
//! Mounts a control on the in-memory collaborators, loads the given assets and
//! prints every lifecycle event as a JSON line. Handy for checking placement
//! options and extension routing without a browser.
//!
//! ## Configuration (env / TOML via `config` crate)
//!
//! | Key                          | Default | Description                       |
//! |------------------------------|---------|-----------------------------------|
//! | `GEOSPLAT_DEFAULT_URL`       | *none*  | URL loaded once the map is idle   |
//! | `GEOSPLAT_LOAD_DEFAULT_URL`  | `false` | Enable the deferred default load  |
//! | `GEOSPLAT_DEFAULT_LONGITUDE` | `0`     | Fallback longitude                |
//! | `GEOSPLAT_DEFAULT_LATITUDE`  | `0`     | Fallback latitude                 |
//! | `GEOSPLAT_DEFAULT_ALTITUDE`  | `0`     | Fallback altitude (m)             |
//! | `GEOSPLAT_DEFAULT_SCALE`     | `1`     | Fallback uniform scale            |
//! | `GEOSPLAT_FLY_TO`            | `true`  | Fly to each loaded asset          |
//! | `GEOSPLAT_FLY_TO_ZOOM`       | `18`    | Zoom used when flying             |

use anyhow::{Context, Result};
use clap::Parser;
use geosplat_control::{
    headless::HeadlessRig, ControlOptions, EventKind, LngLat, PlacementOverride, SplatControl,
};
use std::time::Duration;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "geosplat", about = "Georeferenced splat/model placement", version)]
struct Args {
    /// Optional TOML file with control options
    #[arg(long, env = "GEOSPLAT_CONFIG")]
    config: Option<String>,

    /// Longitude for every asset on the command line
    #[arg(long, allow_negative_numbers = true)]
    longitude: Option<f64>,

    /// Latitude for every asset on the command line
    #[arg(long, allow_negative_numbers = true)]
    latitude: Option<f64>,

    /// Altitude (m) for every asset on the command line
    #[arg(long, allow_negative_numbers = true)]
    altitude: Option<f64>,

    /// Uniform scale for every asset on the command line
    #[arg(long)]
    scale: Option<f64>,

    /// Remove every asset again before exiting
    #[arg(long, default_value_t = false)]
    remove: bool,

    /// Asset URLs (.splat, .ply, .spz, .ksplat, .sog, .gltf, .glb)
    urls: Vec<String>,
}

fn load_options(path: Option<&str>) -> Result<ControlOptions> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::with_name(path));
    }
    builder
        .add_source(config::Environment::with_prefix("GEOSPLAT").try_parsing(true))
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Invalid control options")
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialise logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("geosplat_control=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let options = load_options(args.config.as_deref())?;

    tracing::info!(
        "Starting geosplat ({} assets, default_url={:?})",
        args.urls.len(),
        options.default_url,
    );

    let rig = HeadlessRig::new();
    let control = SplatControl::new(options.clone(), rig.collaborators());

    for kind in EventKind::ALL {
        control.on(kind, |event| match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!("Failed to serialise {} event: {}", event.kind, e),
        });
    }

    control
        .on_add(rig.host())
        .context("Failed to mount control")?;
    rig.map.fire_idle();

    if options.load_default_url && options.default_url.is_some() {
        // Let the deferred default load run before the explicit ones.
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let placement = PlacementOverride {
        longitude: args.longitude,
        latitude: args.latitude,
        altitude: args.altitude,
        scale: args.scale,
        ..Default::default()
    };

    let mut failures = 0usize;
    for url in &args.urls {
        if let Err(e) = control.load(url, Some(placement)).await {
            tracing::error!("{}", e);
            failures += 1;
        }
    }

    rig.scene.render_frame();
    if let Some(LngLat { lng, lat }) = rig.map.flights().last().map(|f| f.center) {
        tracing::info!("Camera ended at ({:.6}, {:.6})", lng, lat);
    }

    let state = control.get_state();
    tracing::info!(
        "{} layers attached, {} failed, {} scene groups",
        state.layer_count,
        failures,
        rig.scene.attached_groups().len(),
    );

    if args.remove {
        control.remove_all();
    }
    control.on_remove();

    if failures > 0 {
        anyhow::bail!("{failures} asset(s) failed to load");
    }
    Ok(())
}
