use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use framebuild::extract::{extract_exif_folder, extract_location_history};
use framebuild::extras::ExtraPreset;
use framebuild::{
    load_location_history, load_photos, locations_from_photos, LocationSample, MapAnimator,
    MapPreset, PhotoRecord, RunRange, TimeSeries,
};
use log::info;
use std::path::{Path, PathBuf};

mod cache;
mod download;

use cache::Cache;
use download::{OsmTileSource, TileServer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Project directory holding the auxiliary data and the rendered frames
    #[arg(short, long, default_value = "Example")]
    project: PathBuf,

    /// Path to the tile cache directory
    #[arg(short, long, default_value = ".cache")]
    cache_dir: String,

    /// Hours to subtract from the camera clock to get UTC
    #[arg(short, long, default_value_t = 1, allow_negative_numbers = true)]
    timezone_hours: i32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Folder with the photos, defaults to `<project>/pics`
    #[arg(long)]
    pics: Option<PathBuf>,

    /// Location history export, defaults to `<project>/location_history.json`
    #[arg(long)]
    location_history: Option<PathBuf>,

    /// Regenerate the auxiliary CSV files even if they exist
    #[arg(long)]
    force: bool,

    /// Build the location series from the photos' own GPS data
    #[arg(long)]
    no_location_history: bool,

    /// Give out-of-order photos the time of their successor instead of failing
    #[arg(long)]
    autofix: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract photo metadata and location history into the auxiliary CSV files
    Extract {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Render animation frames
    Render {
        #[command(flatten)]
        source: SourceArgs,

        /// Presets to render, all of them when omitted
        #[arg(long = "preset", value_enum)]
        presets: Vec<PresetName>,

        /// First photo of the animation
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// Photo after the last one of the animation, defaults to all photos
        #[arg(long)]
        end: Option<usize>,

        /// Number of frames already rendered by a previous run
        #[arg(long, default_value_t = 0)]
        resume: usize,

        /// Photos covered by the expanding-last region
        #[arg(long, default_value_t = 7)]
        last_n: usize,
    },

    /// Clear the tile cache
    ClearCache,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum PresetName {
    Region,
    Centered,
    ExpandingDay,
    ExpandingLast,
    Clocks,
    Timeline,
    FrameCount,
}

enum Preset {
    Map(MapPreset),
    Extra(ExtraPreset),
}

impl PresetName {
    fn resolve(self, last_n: usize) -> Preset {
        match self {
            PresetName::Region => Preset::Map(MapPreset::RegionAllData),
            PresetName::Centered => Preset::Map(MapPreset::CenteredOnLocation),
            PresetName::ExpandingDay => Preset::Map(MapPreset::RegionExpandingByDay),
            PresetName::ExpandingLast => Preset::Map(MapPreset::RegionExpandingByLastN { n: last_n }),
            PresetName::Clocks => Preset::Extra(ExtraPreset::Clocks),
            PresetName::Timeline => Preset::Extra(ExtraPreset::Timeline),
            PresetName::FrameCount => Preset::Extra(ExtraPreset::FrameCount),
        }
    }
}

/// Creates the auxiliary CSV files if needed and loads both series
fn prepare_data(
    project: &Path,
    timezone_hours: i32,
    source: &SourceArgs,
) -> Result<(TimeSeries<PhotoRecord>, TimeSeries<LocationSample>)> {
    let aux_dir = project.join("auxiliar");
    std::fs::create_dir_all(&aux_dir).context("Failed to create auxiliary directory")?;

    let exif_csv = aux_dir.join("exif.csv");
    if source.force || !exif_csv.exists() {
        let pics = source.pics.clone().unwrap_or_else(|| project.join("pics"));
        let count = extract_exif_folder(&pics, &exif_csv)
            .with_context(|| format!("Failed to extract EXIF data from {}", pics.display()))?;
        info!("Wrote {} photos to {}", count, exif_csv.display());
    }

    let photos = load_photos(&exif_csv, timezone_hours, source.autofix)
        .context("Failed to load photo metadata")?;
    let (Some(first), Some(last)) = (photos.get(0), photos.get(photos.len().saturating_sub(1)))
    else {
        anyhow::bail!("No photos listed in {}", exif_csv.display());
    };
    let (first_utc, last_utc) = (first.utc, last.utc);
    info!("Photos from {} to {} UTC", first_utc, last_utc);

    if source.no_location_history {
        let locations = locations_from_photos(&photos);
        return Ok((photos, locations));
    }

    let history_csv = aux_dir.join("location_history.csv");
    if source.force || !history_csv.exists() {
        let json = source
            .location_history
            .clone()
            .unwrap_or_else(|| project.join("location_history.json"));
        extract_location_history(&json, &history_csv, first_utc, last_utc)
            .with_context(|| format!("Failed to extract location history from {}", json.display()))?;
    }
    let locations = load_location_history(&history_csv).context("Failed to load location history")?;

    Ok((photos, locations))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let cache = Cache::new(&cli.cache_dir)
        .context("Failed to create cache")?;

    match &cli.command {
        Commands::Extract { source } => {
            let (photos, locations) = prepare_data(&cli.project, cli.timezone_hours, source)?;
            info!("{} photos and {} location samples ready", photos.len(), locations.len());
        },

        Commands::Render { source, presets, start, end, resume, last_n } => {
            let (photos, locations) = prepare_data(&cli.project, cli.timezone_hours, source)?;
            let range = RunRange { start: *start, end: *end, resume: *resume };
            let presets = if presets.is_empty() {
                PresetName::value_variants().to_vec()
            } else {
                presets.clone()
            };

            let mut tiles = OsmTileSource::new(cache, TileServer::default())
                .context("Failed to create tile source")?;

            for name in presets {
                match name.resolve(*last_n) {
                    Preset::Map(preset) => {
                        let folder = cli.project.join(preset.folder());
                        let stats = MapAnimator::new(&photos, &locations)
                            .and_then(|animator| animator.render(preset, &range, &folder, &mut tiles))
                            .with_context(|| format!("Failed to render {:?}", preset))?;
                        info!(
                            "{:?} done, downloaded {} tiles in {} maps",
                            preset, stats.tiles_fetched, stats.maps_fetched
                        );
                    },
                    Preset::Extra(preset) => {
                        let folder = cli.project.join(preset.folder());
                        preset.render(&photos, &range, &folder)
                            .with_context(|| format!("Failed to render {:?}", preset))?;
                        info!("{:?} done", preset);
                    },
                }
            }

            info!("Done");
        },

        Commands::ClearCache => {
            info!("Clearing cache");
            cache.clear()
                .context("Failed to clear cache")?;
            info!("Cache cleared");
        },
    }

    Ok(())
}
