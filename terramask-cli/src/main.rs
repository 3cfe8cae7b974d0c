use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

/// Terrain elevation cache and line-of-sight mask tool
#[derive(Parser)]
#[command(name = "terramask")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Elevation cache file to query
    #[arg(short, long, env = "TERRAMASK_CACHE_FILE", global = true)]
    cache_file: Option<PathBuf>,

    /// Directory of flat .hgt files preferred over the cache
    #[arg(long, env = "TERRAMASK_HGT_DIR", global = true)]
    hgt_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the SRTM tiles covering a circle around a point
    Fetch {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Radius to cover in kilometres
        #[arg(long, default_value = "50")]
        radius_km: f64,

        /// Directory the .hgt files are written to
        #[arg(short, long)]
        dest: PathBuf,

        /// Custom URL template (placeholders: {filename}, {lat_band}, {lat_prefix}, {lat}, {lon_prefix}, {lon})
        #[arg(long, env = "TERRAMASK_DOWNLOAD_URL")]
        url: Option<String>,

        /// Use the ArduPilot SRTM1 server instead of AWS Skadi
        #[arg(long, conflicts_with = "url")]
        ardupilot: bool,

        /// HTTP timeout in seconds
        #[arg(long, default_value = "300")]
        timeout: u64,
    },

    /// Pack a directory of DTED or SRTM tiles into a cache file
    Build {
        /// Source directory (DTED tree or flat .hgt files)
        source: PathBuf,

        /// Output cache file
        output: PathBuf,
    },

    /// Display information about a cache file or a single raw tile
    Info {
        /// Path to a cache file, .dtN or .hgt tile
        path: PathBuf,
    },

    /// List raw tiles found in a source directory
    List {
        /// Source directory (defaults to --hgt-dir)
        dir: Option<PathBuf>,
    },

    /// Query elevation for a single coordinate
    Query {
        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Output result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Compute the terrain mask around a sensor
    Mask {
        /// Sensor latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Sensor longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,

        /// Sensor altitude in metres MSL
        #[arg(long, allow_hyphen_values = true)]
        alt: f64,

        /// Maximum range in metres
        #[arg(long, default_value = "30000")]
        range_m: f64,

        /// Number of azimuths
        #[arg(long, default_value = "360")]
        azimuths: usize,

        /// Samples per azimuth
        #[arg(long, default_value = "200")]
        samples: usize,

        /// Output the full mask as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Test visibility of every target in a CSV file from one sensor
    Batch {
        /// Input CSV file
        input: PathBuf,

        /// Output file (defaults to <input>_visibility.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Sensor latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        sensor_lat: f64,

        /// Sensor longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        sensor_lon: f64,

        /// Sensor altitude in metres MSL
        #[arg(long, allow_hyphen_values = true)]
        sensor_alt: f64,

        /// Maximum range in metres
        #[arg(long, default_value = "30000")]
        range_m: f64,

        /// Number of azimuths
        #[arg(long, default_value = "360")]
        azimuths: usize,

        /// Samples per azimuth
        #[arg(long, default_value = "200")]
        samples: usize,

        /// Column name for target latitude
        #[arg(long, default_value = "lat")]
        lat_col: String,

        /// Column name for target longitude
        #[arg(long, default_value = "lon")]
        lon_col: String,

        /// Column name for target altitude in metres MSL
        #[arg(long, default_value = "alt")]
        alt_col: String,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Fetch {
            lat,
            lon,
            radius_km,
            dest,
            url,
            ardupilot,
            timeout,
        } => commands::fetch::run(lat, lon, radius_km, dest, url, ardupilot, timeout),
        Commands::Build { source, output } => commands::build::run(source, output),
        Commands::Info { path } => commands::info::run(path),
        Commands::List { dir } => commands::list::run(dir.or(cli.hgt_dir)),
        Commands::Query { lat, lon, json } => {
            commands::query::run(cli.cache_file, cli.hgt_dir, lat, lon, json)
        }
        Commands::Mask {
            lat,
            lon,
            alt,
            range_m,
            azimuths,
            samples,
            json,
        } => commands::mask::run(
            cli.cache_file,
            cli.hgt_dir,
            commands::mask::MaskArgs {
                lat,
                lon,
                alt,
                range_m,
                azimuths,
                samples,
            },
            json,
        ),
        Commands::Batch {
            input,
            output,
            sensor_lat,
            sensor_lon,
            sensor_alt,
            range_m,
            azimuths,
            samples,
            lat_col,
            lon_col,
            alt_col,
        } => commands::batch::run(
            cli.cache_file,
            cli.hgt_dir,
            commands::mask::MaskArgs {
                lat: sensor_lat,
                lon: sensor_lon,
                alt: sensor_alt,
                range_m,
                azimuths,
                samples,
            },
            input,
            output,
            commands::batch::Columns {
                lat: lat_col,
                lon: lon_col,
                alt: alt_col,
            },
        ),
    }
}
