//! Headless driver: extrudes an SVG, runs the orbit loop at a fixed frame
//! rate and writes a still PNG and, optionally, a numbered frame sequence.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;

use extrude_viewer::app::{ManualClock, Viewer};
use extrude_viewer::config::ViewerConfig;
use extrude_viewer::protocol::host::{
    self, ExportedSelection, FileStorage, HeadlessHost, HostBridge, HostEnvironment,
    KeyValueStorage, MemoryStorage, UiEndpoint,
};
use extrude_viewer::protocol::{PluginMessage, STATE_STORAGE_KEY};
use extrude_viewer::render::SoftwareSurface;
use extrude_viewer::state::{serialization, ParameterState};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Extrude an SVG and render it
    Render(RenderArgs),
    /// Print the default parameter state as JSON
    Defaults,
}

#[derive(clap::Args, Debug)]
struct RenderArgs {
    /// SVG file to extrude
    svg: PathBuf,

    /// Parameter state snapshot (JSON)
    #[clap(long)]
    state: Option<PathBuf>,

    /// Viewer configuration (JSON)
    #[clap(long)]
    config: Option<PathBuf>,

    /// Key/value store the parameter snapshot is loaded from and saved to
    #[clap(long)]
    storage: Option<PathBuf>,

    /// Scale hint applied to depth and bevel lengths
    #[clap(long)]
    geometry_scale: Option<f32>,

    /// Still image written after the last frame
    #[clap(long, default_value = "extrude.png")]
    out: PathBuf,

    /// Number of frames to run (overrides --seconds)
    #[clap(long)]
    frames: Option<u32>,

    /// Directory receiving frame_0000.png, frame_0001.png, ...
    #[clap(long)]
    frames_dir: Option<PathBuf>,

    /// Seconds of orbit to run before the still is captured
    #[clap(long, default_value_t = 0.0)]
    seconds: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = Args::parse();
    match args.cmd {
        Command::Render(render) => run_render(render),
        Command::Defaults => {
            let json = serde_json::to_string_pretty(&ParameterState::default())?;
            println!("{json}");
            Ok(())
        }
    }
}

fn run_render(args: RenderArgs) -> Result<()> {
    let config = ViewerConfig::load_or_default(args.config.as_deref())
        .context("loading viewer config")?;
    let svg = std::fs::read_to_string(&args.svg)
        .with_context(|| format!("reading {}", args.svg.display()))?;

    let storage: Box<dyn KeyValueStorage> = match &args.storage {
        Some(path) => Box::new(FileStorage::new(path)),
        None => Box::new(MemoryStorage::new()),
    };
    let selection = ExportedSelection {
        svg,
        geometry_scale: args.geometry_scale,
    };
    let env = HeadlessHost::new(Some(selection), storage).with_image_path(&args.out);
    let (ui, mut bridge) = host::channel(host::HostService::new(env));

    let mut state = match &args.state {
        Some(path) => serialization::load_state_from_file(path)
            .with_context(|| format!("loading state {}", path.display()))?,
        None => ParameterState::default(),
    };
    if args.state.is_none() && args.storage.is_some() {
        ui.send(&PluginMessage::LoadStorage {
            key: STATE_STORAGE_KEY.to_string(),
        })?;
    }
    ui.send(&PluginMessage::GetSelectionSvg)?;
    bridge.pump()?;

    for message in ui.drain()? {
        match message {
            PluginMessage::SelectionSvg {
                svg,
                geometry_scale,
            } => {
                state.svg = svg;
                if let Some(scale) = geometry_scale {
                    state.geometry_scale = scale;
                }
            }
            PluginMessage::NoSelection | PluginMessage::InvalidSelection => {
                bail!("{} could not be used as a selection", args.svg.display())
            }
            PluginMessage::Notify { message } => log::info!("{}", message),
            loaded @ PluginMessage::StorageLoaded { .. } => match loaded.loaded_state() {
                Some(Ok(restored)) => {
                    log::info!("restored parameters from storage");
                    state = restored;
                }
                Some(Err(err)) => log::warn!("ignoring stored parameters: {}", err),
                None => {}
            },
            other => log::debug!("unexpected response {:?}", other),
        }
    }
    let state = state.sanitized();

    let surface = SoftwareSurface::new(config.output.width, config.output.height)?;
    let clock = ManualClock::new();
    let frame_rate = config.output.frame_rate.max(1);
    let mut viewer = Viewer::new(surface, clock.clone(), config)?;

    if let Some(advisory) = viewer.set_scene(&state).advisory() {
        log::warn!("{}", advisory);
    }
    if !viewer.has_mesh() {
        bail!("{} produced no extrudable shapes", args.svg.display());
    }

    let frames = args
        .frames
        .unwrap_or_else(|| (args.seconds.max(0.0) * frame_rate as f32).ceil() as u32);
    run_frames(&mut viewer, &clock, frames, frame_rate, args.frames_dir.as_deref())?;

    let image = viewer.surface().capture_png_data_url()?;
    ui.send(&PluginMessage::AddImage { image })?;
    if args.storage.is_some() {
        ui.send(&PluginMessage::save_state(&state)?)?;
    }
    pump_and_report(&ui, &mut bridge)?;

    viewer.teardown();
    Ok(())
}

/// Fixed-interval driver: one clock tick and one due frame per iteration.
fn run_frames(
    viewer: &mut Viewer<SoftwareSurface, ManualClock>,
    clock: &ManualClock,
    frames: u32,
    frame_rate: u32,
    frames_dir: Option<&Path>,
) -> Result<()> {
    if frames == 0 {
        viewer.render_now()?;
        return Ok(());
    }

    let dt = 1.0 / frame_rate as f32;
    viewer.start_loop();
    for index in 0..frames {
        clock.advance_secs(dt);
        if !viewer.pump_frame() {
            log::warn!("frame loop stopped early at frame {}", index);
            break;
        }
        if let Some(dir) = frames_dir {
            let path = dir.join(format!("frame_{index:04}.png"));
            viewer
                .surface()
                .capture_png(&path)
                .with_context(|| format!("writing {}", path.display()))?;
        }
    }
    viewer.stop_loop(true);
    log::info!("rendered {} frame(s) at {} fps", frames, frame_rate);
    Ok(())
}

fn pump_and_report<E: HostEnvironment>(ui: &UiEndpoint, bridge: &mut HostBridge<E>) -> Result<()> {
    bridge.pump()?;
    for message in ui.drain()? {
        if let PluginMessage::Notify { message } = message {
            log::info!("{}", message);
        }
    }
    Ok(())
}
