use anyhow::{bail, Context, Result};
use cellshape_common::{clamp, SimulationConfig, Snapshot};
use clap::Parser;
use env_logger::Builder;
use image::{ImageBuffer, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn, LevelFilter};
use palette::{FromColor, Hsv, Srgb};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Command-line arguments for the visualizer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input snapshot file (.json, .bin or .msgpack)
    #[arg(short, long)]
    input: PathBuf,

    /// Directory the PNG frames are written to
    #[arg(short, long, default_value = "frames")]
    output: PathBuf,

    /// Width of the output frames in pixels
    #[arg(long, default_value_t = 1024)]
    width: u32,

    /// Height of the output frames in pixels (calculated from aspect ratio if not provided)
    #[arg(long)]
    height: Option<u32>,

    /// Optional path to the config.toml file to get the lattice extent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Radius of interior particles in pixels
    #[arg(long, default_value_t = 2)]
    particle_radius: i32,

    /// Skip drawing interior particles
    #[arg(long, default_value_t = false)]
    outline_only: bool,

    /// Background color - name of the color for the background
    #[arg(long, default_value = "white")]
    bg_color: String,

    /// Seed for the domain color palette
    #[arg(long, default_value_t = 0)]
    palette_seed: u64,
}

// Color definitions for named colors (RGBA format)
const COLOR_MAP: &[(&str, [u8; 4])] = &[
    ("black", [0, 0, 0, 255]),
    ("white", [255, 255, 255, 255]),
    ("red", [255, 0, 0, 255]),
    ("green", [0, 255, 0, 255]),
    ("blue", [0, 0, 255, 255]),
    ("yellow", [255, 255, 0, 255]),
    ("cyan", [0, 255, 255, 255]),
    ("magenta", [255, 0, 255, 255]),
];

/// World rectangle shown in every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
struct View {
    min: (f64, f64),
    max: (f64, f64),
    width: u32,
    height: u32,
}

impl View {
    fn pixels_per_unit(&self) -> f64 {
        let sx = self.width as f64 / (self.max.0 - self.min.0).max(f64::EPSILON);
        let sy = self.height as f64 / (self.max.1 - self.min.1).max(f64::EPSILON);
        sx.min(sy) // Use smaller scale to ensure everything fits
    }

    /// Pixel position of a world point; y is flipped so the lattice origin is bottom-left.
    fn to_pixel(&self, (x, y): (f64, f64)) -> (f32, f32) {
        let s = self.pixels_per_unit();
        let px = clamp((x - self.min.0) * s, -1.0, self.width as f64);
        let py = clamp(self.height as f64 - (y - self.min.1) * s, -1.0, self.height as f64);
        (px as f32, py as f32)
    }
}

/// Parse a color name to RGBA values
fn parse_color(color_name: &str) -> [u8; 4] {
    for &(name, color) in COLOR_MAP {
        if name.eq_ignore_ascii_case(color_name) {
            return color;
        }
    }
    warn!("Color '{}' not recognized, using white.", color_name);
    [255, 255, 255, 255]
}

/// Generate a color palette with a specified number of colors
fn generate_color_palette(count: usize, seed: u64) -> Vec<[u8; 4]> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut colors: Vec<[u8; 4]> = (0..count)
        .map(|i| {
            // Use HSV color space for better distribution
            let hue = i as f32 / count as f32;
            let saturation: f32 = 0.75 + rng.random_range(-0.1..0.1);
            let value: f32 = 0.75 + rng.random_range(-0.1..0.1);
            let rgb = Srgb::from_color(Hsv::new(hue * 360.0, saturation, value));
            [(rgb.red * 255.0) as u8, (rgb.green * 255.0) as u8, (rgb.blue * 255.0) as u8, 255]
        })
        .collect();
    // Shuffle the colors to make adjacent ids less similar
    colors.shuffle(&mut rng);
    colors
}

/// Reads every snapshot, choosing the decoder from the file extension.
fn load_snapshots(path: &Path) -> Result<Vec<Snapshot>> {
    let file = File::open(path).with_context(|| format!("Failed to open input file: {}", path.display()))?;
    let reader = BufReader::new(file);
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
    let snapshots: Vec<Snapshot> = match extension {
        "bin" => bincode::deserialize_from(reader).context("Failed to decode bincode snapshots")?,
        "msgpack" => rmp_serde::from_read(reader).context("Failed to decode MessagePack snapshots")?,
        "json" => serde_json::from_reader(reader).context("Failed to decode JSON snapshots")?,
        other => bail!("Unknown snapshot file extension '{}'", other),
    };
    Ok(snapshots)
}

/// Draw a snapshot frame: each domain's outline as a closed polyline and its
/// interior particles as dots, in the domain's palette color.
fn draw_frame(
    snapshot: &Snapshot,
    view: &View,
    particle_radius: i32,
    outline_only: bool,
    bg_color: [u8; 4],
    color_palette: &[[u8; 4]],
) -> RgbaImage {
    let mut image = ImageBuffer::from_pixel(view.width, view.height, Rgba(bg_color));

    for domain in &snapshot.domains {
        let color = Rgba(color_palette[domain.id as usize % color_palette.len()]);

        if !outline_only {
            for &p in &domain.interior {
                let (px, py) = view.to_pixel(p);
                draw_filled_circle_mut(&mut image, (px.round() as i32, py.round() as i32), particle_radius, color);
            }
        }

        let n = domain.boundary.len();
        for k in 0..n {
            let a = view.to_pixel(domain.boundary[k]);
            let b = view.to_pixel(domain.boundary[(k + 1) % n]);
            draw_line_segment_mut(&mut image, a, b, Rgba([0, 0, 0, 255]));
        }
    }
    image
}

/// Extent to draw: the configured lattice, or the bounds of every snapshot with a margin.
fn world_extent(args: &Args, snapshots: &[Snapshot]) -> Option<((f64, f64), (f64, f64))> {
    if let Some(config_path) = &args.config {
        match SimulationConfig::load(config_path) {
            Ok(config) => {
                let params = config.get_sim_params();
                let (ox, oy) = params.origin;
                info!("Loaded lattice extent from {}", config_path.display());
                return Some((
                    (ox, oy),
                    (ox + params.grid_dim_x as f64 * params.spacing, oy + params.grid_dim_y as f64 * params.spacing),
                ));
            }
            Err(e) => warn!(
                "Failed to load config file '{}': {}. Using snapshot bounds.",
                config_path.display(),
                e
            ),
        }
    }
    let ((x0, y0), (x1, y1)) = snapshots.iter().filter_map(Snapshot::bounds).reduce(|a, b| {
        ((a.0 .0.min(b.0 .0), a.0 .1.min(b.0 .1)), (a.1 .0.max(b.1 .0), a.1 .1.max(b.1 .1)))
    })?;
    let margin = 0.05 * (x1 - x0).max(y1 - y0).max(1.0);
    Some(((x0 - margin, y0 - margin), (x1 + margin, y1 + margin)))
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    Builder::from_default_env().filter(None, LevelFilter::Info).init();

    run_with_args(args)
}

fn run_with_args(args: Args) -> Result<()> {
    info!("Starting Cell Shape Visualizer...");
    info!("Input file: {}", args.input.display());
    info!("Output directory: {}", args.output.display());

    let snapshots = load_snapshots(&args.input)?;
    info!("Found {} snapshots in the file", snapshots.len());
    if snapshots.is_empty() {
        warn!("Input file contains no snapshots. Exiting.");
        return Ok(());
    }

    let Some((min, max)) = world_extent(&args, &snapshots) else {
        warn!("Snapshots contain no particles. Exiting.");
        return Ok(());
    };
    info!("World extent: ({:.1}, {:.1}) to ({:.1}, {:.1})", min.0, min.1, max.0, max.1);

    // --- Calculate Output Dimensions ---
    let aspect_ratio = (max.0 - min.0) / (max.1 - min.1).max(f64::EPSILON);
    let height = args.height.unwrap_or_else(|| ((args.width as f64 / aspect_ratio) as u32).max(1));
    let view = View { min, max, width: args.width, height };
    info!("Frame dimensions: {}x{} px ({:.3} pixels per unit)", view.width, view.height, view.pixels_per_unit());

    // --- Set up Colors ---
    let bg_color = parse_color(&args.bg_color);
    let max_id = snapshots
        .iter()
        .flat_map(|s| s.domains.iter().map(|d| d.id as usize))
        .max()
        .unwrap_or(0);
    let color_palette = generate_color_palette(max_id + 1, args.palette_seed);

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory {}", args.output.display()))?;

    let progress_bar = ProgressBar::new(snapshots.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) [{eta}]")?
            .progress_chars("#>-"),
    );

    let start_time = Instant::now();
    let failures = AtomicUsize::new(0);
    snapshots.par_iter().enumerate().for_each(|(index, snapshot)| {
        let image = draw_frame(snapshot, &view, args.particle_radius, args.outline_only, bg_color, &color_palette);
        let path = args.output.join(format!("frame_{:05}_step_{:06}.png", index, snapshot.step));
        if let Err(e) = image.save(&path) {
            error!("Error writing frame {}: {}", path.display(), e);
            failures.fetch_add(1, Ordering::Relaxed);
        }
        progress_bar.inc(1);
    });
    progress_bar.finish_with_message("Frames written");

    let failed = failures.into_inner();
    if failed > 0 {
        bail!("{} of {} frames could not be written", failed, snapshots.len());
    }
    let duration = start_time.elapsed();
    info!(
        "Rendered {} frames in {:.2?} ({:.1} frames per second)",
        snapshots.len(),
        duration,
        snapshots.len() as f64 / duration.as_secs_f64()
    );
    Ok(())
}
