use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use clap::{value_parser, Arg, ArgMatches, Command};
use std::fmt;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};

/// Geopotential height (m) below which a point is treated as sea-level terrain.
pub const SEA_LEVEL_HEIGHT_TOLERANCE: f64 = 1e-4;
/// Lower surface-temperature threshold of the sea-level-pressure reduction (K).
pub const T_COLD: f64 = 255.0;
/// Upper surface-temperature threshold of the sea-level-pressure reduction (K).
pub const T_WARM: f64 = 290.5;

/// Target pressure levels in hPa, surface to model top.
pub const DEFAULT_PRESSURE_LEVELS_HPA: [f64; 26] = [
    1000.0, 975.0, 950.0, 925.0, 900.0, 850.0, 800.0, 750.0, 700.0, 650.0, 600.0, 550.0, 500.0,
    450.0, 400.0, 350.0, 300.0, 250.0, 200.0, 150.0, 100.0, 70.0, 50.0, 30.0, 20.0, 10.0,
];

/// Physical constants used by the vertical-coordinate kernels
#[derive(Clone, Debug, PartialEq)]
pub struct Constants {
    /// Standard atmosphere lapse rate (K/m)
    pub lapse_rate: f64,
    /// Gravitational acceleration (m/s²), CAM value
    pub g: f64,
    /// Gas constant for dry air (J/(kg·K)), CAM value
    pub r_dry: f64,
    /// Reference pressure of the hybrid coordinate (Pa)
    pub p0: f64,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            lapse_rate: 0.0065,
            g: 9.80616,
            r_dry: 287.04,
            p0: 100000.0,
        }
    }
}

impl Constants {
    /// Dimensionless `L·R/g`
    pub fn alpha0(&self) -> f64 {
        self.lapse_rate * self.r_dry / self.g
    }
}

/// CMIP historical and future experiments with their available years
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Scenario {
    Historical,
    Rcp45,
    Rcp60,
    Rcp85,
    Ssp126,
    Ssp245,
    Ssp370,
    Ssp585,
}

impl Scenario {
    pub const ALL: [Scenario; 8] = [
        Scenario::Historical,
        Scenario::Rcp45,
        Scenario::Rcp60,
        Scenario::Rcp85,
        Scenario::Ssp126,
        Scenario::Ssp245,
        Scenario::Ssp370,
        Scenario::Ssp585,
    ];

    /// First and last year (inclusive) of the experiment
    pub fn year_range(&self) -> (i32, i32) {
        match self {
            Scenario::Historical => (1850, 2014),
            Scenario::Rcp45 | Scenario::Rcp60 | Scenario::Rcp85 => (2006, 2100),
            Scenario::Ssp126 | Scenario::Ssp245 | Scenario::Ssp370 | Scenario::Ssp585 => {
                (2015, 2100)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Historical => "20THC",
            Scenario::Rcp45 => "RCP45",
            Scenario::Rcp60 => "RCP60",
            Scenario::Rcp85 => "RCP85",
            Scenario::Ssp126 => "SSP126",
            Scenario::Ssp245 => "SSP245",
            Scenario::Ssp370 => "SSP370",
            Scenario::Ssp585 => "SSP585",
        }
    }

    /// Resolve a requested year range against the case table.
    ///
    /// A missing end year defaults to the start year. Start years before the
    /// experiment are clamped up; end years before the experiment start or the
    /// requested start are reset to the start year.
    pub fn resolve_years(&self, start_year: i32, end_year: Option<i32>) -> Result<(i32, i32), String> {
        let (case_start, case_end) = self.year_range();

        let mut end_year = match end_year {
            Some(year) => year,
            None => {
                info!("Setting end year to same as start year {}", start_year);
                start_year
            }
        };

        if start_year > case_end {
            return Err(format!(
                "Case {}: start year must be earlier than {}",
                self, case_end
            ));
        }

        let mut start_year = start_year;
        if start_year < case_start {
            warn!(
                "Case {}: start year must be equal or greater than {}. Setting to {}",
                self, case_start, case_start
            );
            start_year = case_start;
        }

        if end_year < case_start || end_year < start_year {
            warn!(
                "Case {}: end year must be equal or greater than {}. Setting to {}",
                self, start_year, start_year
            );
            end_year = start_year;
        }

        Ok((start_year, end_year))
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Scenario::ALL
            .iter()
            .find(|scenario| scenario.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("Unknown case: {}", s))
    }
}

/// Main configuration structure with CLI support
#[derive(Clone, Debug)]
pub struct Config {
    /// Physical constants
    pub constants: Constants,
    /// Experiment being processed
    pub scenario: Scenario,
    /// First year to process (inclusive)
    pub start_year: i32,
    /// Last year to process (inclusive)
    pub end_year: i32,
    /// Directory holding the `atmos_<var>.nc` inputs
    pub input_dir: PathBuf,
    /// Output directory for pressure-level files
    pub output_dir: PathBuf,
    /// Output file name pattern (strftime, evaluated on the first of the month)
    pub output_pattern: String,
    /// Precomputed regridding weights for the ocean fields
    pub weights_path: Option<PathBuf>,
    /// Target pressure levels (Pa)
    pub pressure_levels: Vec<f64>,
    /// Number of worker threads for the elementwise kernels
    pub num_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        let scenario = Scenario::Historical;
        let (start_year, _) = scenario.year_range();

        Self {
            constants: Constants::default(),
            scenario,
            start_year,
            end_year: start_year,
            input_dir: PathBuf::from("./input"),
            output_dir: PathBuf::from("./output"),
            output_pattern: String::from("cesm_plev_%Y-%m.nc"),
            weights_path: None,
            pressure_levels: DEFAULT_PRESSURE_LEVELS_HPA.iter().map(|p| p * 100.0).collect(),
            num_threads: 4,
        }
    }
}

/// Build the command line interface
pub fn build_cli() -> Command {
    Command::new("cesm_h2p")
        .version("0.1.0")
        .about("Convert CESM data from hybrid sigma-pressure vertical coordinates to pressure level coordinates")
        .after_help("Example:\n    cesm_h2p process --case 20THC --start-year 1990 --input-dir ./cesm")
        .arg(
            Arg::new("loglevel")
                .short('l')
                .long("loglevel")
                .global(true)
                .value_name("LEVEL")
                .help("Set the logging level")
                .value_parser(["debug", "info", "warning", "error", "critical"])
                .default_value("info"),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .global(true)
                .value_name("PATH")
                .help("Write log records to this file instead of stderr"),
        )
        .subcommand(
            Command::new("process")
                .about("Regrid ocean fields and convert atmospheric fields to pressure levels")
                .arg(
                    Arg::new("case")
                        .short('c')
                        .long("case")
                        .value_name("CASE")
                        .help("CMIP historical or future scenario")
                        .value_parser(Scenario::ALL.map(|s| s.name()))
                        .required(true),
                )
                .arg(
                    Arg::new("start-year")
                        .short('s')
                        .long("start-year")
                        .value_name("YEAR")
                        .help("Start year to process")
                        .value_parser(value_parser!(i32))
                        .required(true),
                )
                .arg(
                    Arg::new("end-year")
                        .short('e')
                        .long("end-year")
                        .value_name("YEAR")
                        .help("End year to process (inclusive, defaults to the start year)")
                        .value_parser(value_parser!(i32)),
                )
                .arg(
                    Arg::new("input-dir")
                        .short('i')
                        .long("input-dir")
                        .value_name("DIR")
                        .help("Directory containing atmos_<var>.nc input files")
                        .default_value("./input"),
                )
                .arg(
                    Arg::new("output-dir")
                        .short('o')
                        .long("output-dir")
                        .value_name("DIR")
                        .help("Output directory for pressure-level files")
                        .default_value("./output"),
                )
                .arg(
                    Arg::new("output-pattern")
                        .short('p')
                        .long("output-pattern")
                        .value_name("PATTERN")
                        .help("Output file name pattern (strftime format)")
                        .default_value("cesm_plev_%Y-%m.nc"),
                )
                .arg(
                    Arg::new("weights")
                        .short('w')
                        .long("weights")
                        .value_name("FILE")
                        .help("Regridding weights file to reuse from a previous run"),
                )
                .arg(
                    Arg::new("p0")
                        .long("p0")
                        .value_name("PA")
                        .help("Reference pressure of the hybrid coordinate (Pa)")
                        .value_parser(value_parser!(f64))
                        .default_value("100000"),
                )
                .arg(
                    Arg::new("pressure-levels")
                        .long("pressure-levels")
                        .value_name("HPA,...")
                        .help("Comma-separated target pressure levels in hPa"),
                )
                .arg(
                    Arg::new("num-threads")
                        .short('j')
                        .long("num-threads")
                        .value_name("COUNT")
                        .help("Number of worker threads")
                        .value_parser(value_parser!(usize))
                        .default_value("4"),
                ),
        )
        .subcommand(Command::new("cases").about("List the supported cases and their years"))
}

impl Config {
    /// Build a configuration from the `process` subcommand matches
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, String> {
        let scenario: Scenario = matches
            .get_one::<String>("case")
            .ok_or("Missing case")?
            .parse()?;
        let start_year = *matches
            .get_one::<i32>("start-year")
            .ok_or("Missing start year")?;
        let end_year = matches.get_one::<i32>("end-year").copied();
        let (start_year, end_year) = scenario.resolve_years(start_year, end_year)?;

        let pressure_levels = match matches.get_one::<String>("pressure-levels") {
            Some(levels) => parse_pressure_levels(levels)?,
            None => DEFAULT_PRESSURE_LEVELS_HPA.iter().map(|p| p * 100.0).collect(),
        };

        let constants = Constants {
            p0: *matches.get_one::<f64>("p0").ok_or("Missing p0")?,
            ..Constants::default()
        };

        let config = Self {
            constants,
            scenario,
            start_year,
            end_year,
            input_dir: PathBuf::from(
                matches.get_one::<String>("input-dir").ok_or("Missing input directory")?,
            ),
            output_dir: PathBuf::from(
                matches.get_one::<String>("output-dir").ok_or("Missing output directory")?,
            ),
            output_pattern: matches
                .get_one::<String>("output-pattern")
                .ok_or("Missing output pattern")?
                .clone(),
            weights_path: matches.get_one::<String>("weights").map(PathBuf::from),
            pressure_levels,
            num_threads: *matches.get_one::<usize>("num-threads").unwrap_or(&4),
        };

        config.validate()?;

        info!(
            "Processing CESM for case {}, years {} to {}",
            config.scenario, config.start_year, config.end_year
        );

        Ok(config)
    }

    /// Every (year, month) pair covered by the configuration, in order
    pub fn months(&self) -> impl Iterator<Item = (i32, u32)> {
        (self.start_year..=self.end_year).flat_map(|year| (1..=12).map(move |month| (year, month)))
    }

    /// Output path for one month
    pub fn output_path(&self, year: i32, month: u32) -> Result<PathBuf, String> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| format!("Invalid year/month: {}-{}", year, month))?;
        let mut name = String::new();
        write!(name, "{}", first.format(&self.output_pattern))
            .map_err(|_| format!("Invalid output pattern: {}", self.output_pattern))?;
        Ok(self.output_dir.join(name))
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if !(self.constants.p0.is_finite() && self.constants.p0 > 0.0) {
            return Err("Reference pressure must be positive".to_string());
        }
        if self.pressure_levels.is_empty() {
            return Err("At least one target pressure level is required".to_string());
        }
        if self.pressure_levels.iter().any(|p| !(p.is_finite() && *p > 0.0)) {
            return Err("Target pressure levels must be positive".to_string());
        }
        if self.num_threads == 0 {
            return Err("Number of threads must be at least 1".to_string());
        }
        if self.start_year > self.end_year {
            return Err("Start year must not be after end year".to_string());
        }
        if StrftimeItems::new(&self.output_pattern).any(|item| matches!(item, Item::Error)) {
            return Err(format!("Invalid output pattern: {}", self.output_pattern));
        }

        if !self.input_dir.exists() {
            return Err(format!("Input directory does not exist: {}", self.input_dir.display()));
        }
        if !self.input_dir.is_dir() {
            return Err(format!("Input path is not a directory: {}", self.input_dir.display()));
        }

        if let Some(weights) = &self.weights_path {
            if !weights.is_file() {
                return Err(format!("Weights file does not exist: {}", weights.display()));
            }
        }

        Ok(())
    }
}

/// Parse a comma-separated list of hPa values into Pa
pub fn parse_pressure_levels(levels: &str) -> Result<Vec<f64>, String> {
    levels
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>()
                .map(|hpa| hpa * 100.0)
                .map_err(|_| format!("Invalid pressure level: {}", s))
        })
        .collect()
}
