use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use clap::{Args, Parser, Subcommand};
use gvd_topo::{
    Cell, DistanceField, OccupancyGrid, Origin2D, PipelineConfig, PipelineOutput,
    PipelineOverrides, StageTimings, TopoNode, TopologicalMap, TopologyPipeline,
};
use image::{GrayImage, Rgb, RgbImage};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

const DEFAULT_RESOLUTION: f64 = 0.05;
const DEFAULT_IMAGE_OCC_THRESH: u8 = 50;

const FREE: Rgb<u8> = Rgb([255, 255, 255]);
const OCCUPIED: Rgb<u8> = Rgb([0, 0, 0]);
const UNKNOWN: Rgb<u8> = Rgb([127, 127, 127]);
const SKELETON: Rgb<u8> = Rgb([255, 0, 0]);
const EDGE: Rgb<u8> = Rgb([0, 0, 255]);
const NODE: Rgb<u8> = Rgb([0, 255, 0]);

#[derive(Parser, Debug)]
#[command(name = "gvd_topo")]
#[command(about = "Extract topological maps from occupancy grids via the Generalized Voronoi Diagram")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load a map, run the pipeline, write the graph and optional renders.
    #[command(name = "extract")]
    Extract(ExtractArgs),
    /// Time the pipeline on a seeded random grid.
    #[command(name = "bench")]
    Bench(BenchArgs),
}

#[derive(Args, Debug, Clone)]
struct ExtractArgs {
    /// Grayscale map image (png/pgm).
    #[arg(long, conflicts_with = "map_yaml")]
    input: Option<PathBuf>,
    /// ROS map_server YAML; its `image` is resolved relative to the YAML file.
    #[arg(long)]
    map_yaml: Option<PathBuf>,
    /// Meters per pixel. Overrides the map YAML and the config file.
    #[arg(long)]
    resolution: Option<f64>,
    /// Luma at or below this is an obstacle (plain image input only).
    #[arg(long)]
    occ_thresh: Option<u8>,
    /// YAML config: `input`, `output`, `resolution`, `occupancy_threshold`,
    /// `processing`. Flags win over the file.
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(flatten)]
    processing: ProcessingArgs,
    /// Topological map JSON. Printed to stdout when omitted.
    #[arg(long)]
    out_map: Option<PathBuf>,
    /// Grid overlay PNG with skeleton, edges and nodes.
    #[arg(long)]
    out_gvd: Option<PathBuf>,
    /// Normalized distance field PNG.
    #[arg(long)]
    out_distance: Option<PathBuf>,
    /// Stand-alone graph rendering PNG.
    #[arg(long)]
    out_topo: Option<PathBuf>,
}

impl ExtractArgs {
    fn input_layer(&self) -> InputSection {
        InputSection {
            image_file: self.input.clone(),
            yaml_file: self.map_yaml.clone(),
        }
    }

    fn output_layer(&self) -> OutputSection {
        OutputSection {
            map_file: self.out_map.clone(),
            gvd_image: self.out_gvd.clone(),
            distance_image: self.out_distance.clone(),
            topo_image: self.out_topo.clone(),
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
struct ProcessingArgs {
    #[arg(long)]
    merge_radius: Option<f64>,
    #[arg(long)]
    prune_min_length: Option<f64>,
    #[arg(long)]
    max_trace_steps: Option<usize>,
    #[arg(long)]
    morph_radius: Option<usize>,
    /// Feed the raw ridge mask to the graph builder.
    #[arg(long)]
    no_thin: bool,
    /// Run every stage on the calling thread.
    #[arg(long)]
    sequential: bool,
}

impl ProcessingArgs {
    fn overrides(&self) -> PipelineOverrides {
        PipelineOverrides {
            merge_radius: self.merge_radius,
            prune_min_length: self.prune_min_length,
            max_trace_steps: self.max_trace_steps,
            morph_radius: self.morph_radius,
            thin_skeleton: self.no_thin.then_some(false),
            parallel: self.sequential.then_some(false),
            ..PipelineOverrides::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
struct BenchArgs {
    #[arg(long, default_value_t = 512)]
    width: usize,
    #[arg(long, default_value_t = 512)]
    height: usize,
    /// Probability that a cell is occupied.
    #[arg(long, default_value_t = 0.05)]
    occupancy: f64,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value_t = 5)]
    repeat: usize,
    #[arg(long, default_value_t = DEFAULT_RESOLUTION)]
    resolution: f64,
    #[command(flatten)]
    processing: ProcessingArgs,
}

/// `--config` file contents. Every field is optional.
///
/// `occupancy_threshold` is a luma cut-off (0..=255) for plain map images.
/// `processing.occupancy_threshold` only applies to ROS occupancy values
/// (0..=100), which this binary never reads, so it is rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    input: InputSection,
    output: OutputSection,
    resolution: Option<f64>,
    occupancy_threshold: Option<u8>,
    processing: PipelineOverrides,
}

/// Map source. Paths are used as written, relative to the working directory.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct InputSection {
    image_file: Option<PathBuf>,
    yaml_file: Option<PathBuf>,
}

impl InputSection {
    /// A layer naming any source replaces the lower layer as a whole.
    fn or(self, lower: InputSection) -> InputSection {
        if self.image_file.is_some() || self.yaml_file.is_some() {
            self
        } else {
            lower
        }
    }

    fn source(self) -> Result<MapSource> {
        match (self.yaml_file, self.image_file) {
            (Some(yaml), _) => Ok(MapSource::MapYaml(yaml)),
            (None, Some(image)) => Ok(MapSource::Image(image)),
            (None, None) => bail!(
                "no map given: pass --input or --map-yaml, or set input.image_file or \
                 input.yaml_file in the config file"
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct OutputSection {
    map_file: Option<PathBuf>,
    gvd_image: Option<PathBuf>,
    distance_image: Option<PathBuf>,
    topo_image: Option<PathBuf>,
}

impl OutputSection {
    /// Per-field layering; `self` wins.
    fn or(self, lower: OutputSection) -> OutputSection {
        OutputSection {
            map_file: self.map_file.or(lower.map_file),
            gvd_image: self.gvd_image.or(lower.gvd_image),
            distance_image: self.distance_image.or(lower.distance_image),
            topo_image: self.topo_image.or(lower.topo_image),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum MapSource {
    Image(PathBuf),
    MapYaml(PathBuf),
}

/// ROS `map_server` metadata.
#[derive(Debug, Clone, Deserialize)]
struct MapYaml {
    image: PathBuf,
    resolution: f64,
    #[serde(default)]
    origin: [f64; 3],
    #[serde(default)]
    negate: u8,
    #[serde(default = "default_occupied_thresh")]
    occupied_thresh: f64,
    #[serde(default = "default_free_thresh")]
    free_thresh: f64,
}

fn default_occupied_thresh() -> f64 {
    0.65
}

fn default_free_thresh() -> f64 {
    0.196
}

#[derive(Debug, Clone)]
struct StageReport {
    stage: &'static str,
    mean_ms: f64,
    min_ms: f64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Extract(args) => run_extract(args),
        Command::Bench(args) => run_bench(args),
    }
}

fn run_extract(args: ExtractArgs) -> Result<()> {
    let file = match &args.config {
        Some(path) => read_config(path)?,
        None => ConfigFile::default(),
    };

    let cfg = args
        .processing
        .overrides()
        .or(file.processing)
        .apply(&PipelineConfig::default());
    cfg.validate().context("invalid processing configuration")?;

    let outputs = args.output_layer().or(file.output);
    let grid = match args.input_layer().or(file.input).source()? {
        MapSource::MapYaml(yaml) => {
            let mut grid = load_map_yaml(&yaml)?;
            if let Some(res) = args.resolution {
                grid.resolution = res;
            }
            grid
        }
        MapSource::Image(input) => {
            let res = args
                .resolution
                .or(file.resolution)
                .unwrap_or(DEFAULT_RESOLUTION);
            let thresh = args
                .occ_thresh
                .or(file.occupancy_threshold)
                .unwrap_or(DEFAULT_IMAGE_OCC_THRESH);
            load_image_grid(&input, res, thresh)?
        }
    };
    grid.validate()
        .with_context(|| format!("map {}x{} is not usable", grid.width, grid.height))?;

    info!(
        "map {}x{} @ {} m/px: {} occupied, {} free, {} unknown",
        grid.width,
        grid.height,
        grid.resolution,
        grid.count(Cell::Occupied),
        grid.count(Cell::Free),
        grid.count(Cell::Unknown)
    );
    debug!("pipeline config: {cfg:?}");

    let out = TopologyPipeline::new(cfg).run(&grid);
    report_extract(&out);

    match &outputs.map_file {
        Some(path) => {
            write_map_json(path, &out.map)?;
            info!("wrote map {}", path.display());
        }
        None => println!("{}", out.map.to_json().context("serializing map")?),
    }

    if let Some(path) = &outputs.gvd_image {
        save_rgb(path, &render_overlay(&grid, &out))?;
        info!("wrote overlay {}", path.display());
    }
    if let Some(path) = &outputs.distance_image {
        save_distance(path, &out.distance)?;
        info!("wrote distance field {}", path.display());
    }
    if let Some(path) = &outputs.topo_image {
        if out.map.nodes.is_empty() {
            warn!("no nodes to render, skipping {}", path.display());
        } else {
            save_rgb(path, &render_topology(&out.map, 1200, 800))?;
            info!("wrote topology image {}", path.display());
        }
    }

    Ok(())
}

fn run_bench(args: BenchArgs) -> Result<()> {
    ensure!(
        (0.0..=1.0).contains(&args.occupancy),
        "--occupancy must be within [0, 1], got {}",
        args.occupancy
    );
    ensure!(args.repeat > 0, "--repeat must be at least 1");

    let cfg = args.processing.overrides().apply(&PipelineConfig::default());
    cfg.validate().context("invalid processing configuration")?;

    let grid = random_grid(
        args.width,
        args.height,
        args.resolution,
        args.occupancy,
        args.seed,
    );
    grid.validate().context("invalid bench grid")?;

    let pipeline = TopologyPipeline::new(cfg);
    let mut runs = Vec::with_capacity(args.repeat);
    let mut last = PipelineOutput::default();
    for i in 0..args.repeat {
        last = pipeline.run(&grid);
        debug!("run {i}: {:?}", last.stats.timings);
        runs.push(last.stats.timings);
    }

    info!(
        "bench {}x{} occupancy={} seed={}: {} nodes, {} edges",
        args.width,
        args.height,
        args.occupancy,
        args.seed,
        last.map.nodes.len(),
        last.map.edges.len()
    );

    let report = stage_reports(&runs);
    for r in &report {
        println!("{:<10} mean {:>9.3} ms   min {:>9.3} ms", r.stage, r.mean_ms, r.min_ms);
    }

    Ok(())
}

fn report_extract(out: &PipelineOutput) {
    let g = &out.stats.graph;
    info!(
        "ridge px={}, skeleton px={}, nodes={}, edges={} (traced {}, pruned {}), dead ends={}, aborted traces={}",
        out.stats.ridge_pixels,
        g.skeleton_pixels,
        out.map.nodes.len(),
        out.map.edges.len(),
        g.traced_edges,
        g.pruned_edges,
        g.dead_ends,
        g.aborted_traces
    );
    info!(
        "total {:.3} ms, {:.1} m of edges",
        ms(out.stats.timings.total()),
        out.map.total_length()
    );
}

fn stage_reports(runs: &[StageTimings]) -> Vec<StageReport> {
    let stages: [(&'static str, fn(&StageTimings) -> Duration); 5] = [
        ("distance", |t| t.distance),
        ("ridges", |t| t.ridges),
        ("thinning", |t| t.thinning),
        ("graph", |t| t.graph),
        ("total", |t| t.total()),
    ];

    stages
        .iter()
        .map(|&(stage, pick)| {
            let values: Vec<f64> = runs.iter().map(|t| ms(pick(t))).collect();
            let mean_ms = values.iter().sum::<f64>() / values.len().max(1) as f64;
            let min_ms = values.iter().copied().fold(f64::INFINITY, f64::min);
            StageReport {
                stage,
                mean_ms,
                min_ms: if min_ms.is_finite() { min_ms } else { 0.0 },
            }
        })
        .collect()
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1e3
}

fn random_grid(width: usize, height: usize, res: f64, occupancy: f64, seed: u64) -> OccupancyGrid {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut grid = OccupancyGrid::new(width, height, res);
    for cell in &mut grid.cells {
        *cell = if rng.gen_bool(occupancy) {
            Cell::Occupied
        } else {
            Cell::Free
        };
    }
    grid
}

fn read_config(path: &Path) -> Result<ConfigFile> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse_config(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn parse_config(text: &str) -> Result<ConfigFile> {
    let file: ConfigFile = serde_yaml::from_str(text)?;
    ensure!(
        file.processing.occupancy_threshold.is_none(),
        "processing.occupancy_threshold applies to ROS occupancy values only; \
         set the top-level occupancy_threshold (image luma 0..=255) instead"
    );
    Ok(file)
}

fn load_luma(path: &Path) -> Result<GrayImage> {
    ensure_file_exists(path, "map image")?;
    let dyn_img =
        image::open(path).with_context(|| format!("opening map image {}", path.display()))?;
    Ok(dyn_img.to_luma8())
}

fn load_image_grid(path: &Path, resolution: f64, occ_thresh: u8) -> Result<OccupancyGrid> {
    let luma = load_luma(path)?;
    Ok(grid_from_luma(luma, resolution, |v| classify_luma(v, occ_thresh)))
}

fn grid_from_luma(
    luma: GrayImage,
    resolution: f64,
    classify: impl Fn(u8) -> Cell,
) -> OccupancyGrid {
    let (w, h) = luma.dimensions();
    let cells = luma.into_raw().into_iter().map(classify).collect();

    OccupancyGrid {
        width: w as usize,
        height: h as usize,
        resolution,
        origin: Origin2D::default(),
        cells,
    }
}

fn classify_luma(v: u8, occ_thresh: u8) -> Cell {
    if v <= occ_thresh {
        Cell::Occupied
    } else {
        Cell::Free
    }
}

fn load_map_yaml(path: &Path) -> Result<OccupancyGrid> {
    ensure_file_exists(path, "map yaml")?;
    let text =
        fs::read_to_string(path).with_context(|| format!("reading map yaml {}", path.display()))?;
    let meta: MapYaml =
        serde_yaml::from_str(&text).with_context(|| format!("parsing map yaml {}", path.display()))?;
    ensure!(
        meta.free_thresh <= meta.occupied_thresh,
        "free_thresh {} exceeds occupied_thresh {} in {}",
        meta.free_thresh,
        meta.occupied_thresh,
        path.display()
    );

    let image_path = match path.parent() {
        Some(dir) if meta.image.is_relative() => dir.join(&meta.image),
        _ => meta.image.clone(),
    };
    let luma = load_luma(&image_path)?;
    let origin = Origin2D {
        x: meta.origin[0],
        y: meta.origin[1],
        theta: meta.origin[2],
    };
    let grid = grid_from_luma(luma, meta.resolution, |v| classify_trinary(v, &meta));
    Ok(grid.with_origin(origin))
}

/// `map_server` trinary mode: dark pixels are likely occupied unless negated.
fn classify_trinary(v: u8, meta: &MapYaml) -> Cell {
    let p = if meta.negate != 0 {
        f64::from(v) / 255.0
    } else {
        f64::from(255 - v) / 255.0
    };

    if p > meta.occupied_thresh {
        Cell::Occupied
    } else if p < meta.free_thresh {
        Cell::Free
    } else {
        Cell::Unknown
    }
}

fn write_map_json(path: &Path, map: &TopologicalMap) -> Result<()> {
    let text = map.to_json().context("serializing map")?;
    fs::write(path, text).with_context(|| format!("writing map {}", path.display()))
}

fn save_rgb(path: &Path, img: &RgbImage) -> Result<()> {
    img.save(path)
        .with_context(|| format!("saving image {}", path.display()))
}

fn save_distance(path: &Path, field: &DistanceField) -> Result<()> {
    ensure!(!field.is_empty(), "distance field is empty");
    let data = f32_to_u8_vis(field.data());
    let gray = GrayImage::from_raw(field.width() as u32, field.height() as u32, data)
        .context("constructing GrayImage from distance field")?;
    gray.save(path)
        .with_context(|| format!("saving image {}", path.display()))
}

/// Linear stretch of the finite values to `0..=255`; non-finite values map to
/// white.
fn f32_to_u8_vis(data: &[f32]) -> Vec<u8> {
    let (min_v, max_v) = data
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

    if !min_v.is_finite() || (max_v - min_v).abs() < 1e-12 {
        return data
            .iter()
            .map(|v| if v.is_finite() { 0 } else { 255 })
            .collect();
    }

    let scale = 255.0 / (max_v - min_v);
    data.iter()
        .map(|&v| {
            if v.is_finite() {
                ((v - min_v) * scale).round().clamp(0.0, 255.0) as u8
            } else {
                255
            }
        })
        .collect()
}

fn render_overlay(grid: &OccupancyGrid, out: &PipelineOutput) -> RgbImage {
    let mut rgb = RgbImage::from_fn(grid.width as u32, grid.height as u32, |x, y| {
        match grid.cell(x as usize, y as usize) {
            Some(Cell::Occupied) => OCCUPIED,
            Some(Cell::Free) => FREE,
            _ => UNKNOWN,
        }
    });

    for (i, &v) in out.skeleton.data().iter().enumerate() {
        if v != 0 {
            let (x, y) = (i % out.skeleton.width(), i / out.skeleton.width());
            rgb.put_pixel(x as u32, y as u32, SKELETON);
        }
    }

    let to_px = |p: [f64; 2]| -> (i64, i64) {
        (
            (p[0] / grid.resolution).round() as i64,
            (p[1] / grid.resolution).round() as i64,
        )
    };
    for edge in &out.map.edges {
        for pair in edge.polyline.windows(2) {
            draw_line(&mut rgb, to_px(pair[0]), to_px(pair[1]), EDGE);
        }
    }
    for p in out.map.nodes.iter().map(TopoNode::position) {
        draw_disc(&mut rgb, to_px([p.x, p.y]), 2, NODE);
    }

    rgb
}

/// Graph-only rendering fitted to the node bounds, y pointing up.
fn render_topology(map: &TopologicalMap, width: u32, height: u32) -> RgbImage {
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in map.nodes.iter().map(TopoNode::position) {
        min_x = min_x.min(p.x);
        max_x = max_x.max(p.x);
        min_y = min_y.min(p.y);
        max_y = max_y.max(p.y);
    }

    let margin_x = ((max_x - min_x) * 0.1).max(1.0);
    let margin_y = ((max_y - min_y) * 0.1).max(1.0);
    min_x -= margin_x;
    max_x += margin_x;
    min_y -= margin_y;
    max_y += margin_y;

    let scale = (f64::from(width) / (max_x - min_x)).min(f64::from(height) / (max_y - min_y));
    let to_px = |x: f64, y: f64| -> (i64, i64) {
        let px = ((x - min_x) * scale) as i64;
        let py = ((y - min_y) * scale) as i64;
        (px, i64::from(height) - py)
    };

    let mut rgb = RgbImage::from_pixel(width, height, FREE);
    for edge in &map.edges {
        for pair in edge.polyline.windows(2) {
            let a = to_px(pair[0][0], pair[0][1]);
            let b = to_px(pair[1][0], pair[1][1]);
            draw_line(&mut rgb, a, b, EDGE);
        }
    }
    for p in map.nodes.iter().map(TopoNode::position) {
        draw_disc(&mut rgb, to_px(p.x, p.y), 4, NODE);
    }

    rgb
}

fn put_clipped(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    if x < 0 || y < 0 || x >= i64::from(img.width()) || y >= i64::from(img.height()) {
        return;
    }
    img.put_pixel(x as u32, y as u32, color);
}

/// Bresenham segment, clipped to the image.
fn draw_line(img: &mut RgbImage, from: (i64, i64), to: (i64, i64), color: Rgb<u8>) {
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        put_clipped(img, x, y, color);
        if (x, y) == to {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn draw_disc(img: &mut RgbImage, center: (i64, i64), radius: i64, color: Rgb<u8>) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put_clipped(img, center.0 + dx, center.1 + dy, color);
            }
        }
    }
}

fn ensure_file_exists(path: &Path, what: &str) -> Result<()> {
    if !path.exists() {
        bail!("{} file does not exist: {}", what, path.display());
    }
    if !path.is_file() {
        bail!("{} path is not a file: {}", what, path.display());
    }
    Ok(())
}
