//! Command-line interface: retrieve, inspect and simulate PSF stacks

use crate::io::configuration::POLL_INTERVAL_MS;
use crate::io::error::{PsfError, Result, invalid_parameter};
use crate::io::image::{psf_xy_preview, psf_xz_preview, save_png};
use crate::io::ome_tiff::{load_stack, write_ome_tiff};
use crate::io::output::{OutputPaths, ensure_directory};
use crate::io::parameters::ParameterFile;
use crate::io::progress::RunProgress;
use crate::io::report::ReportOptions;
use crate::optics::synthetic::SyntheticPsf;
use crate::retrieval::parameters::{FitOverrides, PsfOverrides, PsfParameters};
use crate::session::{Session, SessionState};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "psf-retrieval")]
#[command(
    author,
    version,
    about = "Phase retrieval and Zernike analysis of measured point spread functions"
)]
/// Command-line arguments
pub struct Cli {
    /// Operation to perform
    #[command(subcommand)]
    pub command: Command,

    /// Suppress progress output and lower logging to warnings
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

impl Cli {
    /// Log level implied by `--quiet` and `--verbose`
    pub const fn log_level(&self) -> LevelFilter {
        if self.quiet {
            return LevelFilter::Warn;
        }
        match self.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

/// Subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Retrieve the pupil of a PSF stack and write the report
    Retrieve(RetrieveArgs),
    /// Print stack metadata and write xy/xz previews
    Inspect(InspectArgs),
    /// Write a synthetic OME-TIFF PSF with known aberrations
    Simulate(SimulateArgs),
}

/// Optical parameters replacing values from the file metadata
#[derive(Args, Debug, Default)]
pub struct PsfArgs {
    /// Emission wavelength in nm
    #[arg(long = "wavelength", value_name = "NM")]
    pub wavelength_nm: Option<f64>,

    /// Numerical aperture of the objective
    #[arg(long = "na")]
    pub numerical_aperture: Option<f64>,

    /// Refractive index of the immersion medium
    #[arg(long = "ri")]
    pub refractive_index: Option<f64>,

    /// Lateral pixel size in nm
    #[arg(long = "xy-res", value_name = "NM")]
    pub pixel_size_xy_nm: Option<f64>,

    /// Axial step in nm
    #[arg(long = "z-res", value_name = "NM")]
    pub pixel_size_z_nm: Option<f64>,
}

impl PsfArgs {
    /// Flags as parameter overrides
    pub const fn overrides(&self) -> PsfOverrides {
        PsfOverrides {
            wavelength_nm: self.wavelength_nm,
            numerical_aperture: self.numerical_aperture,
            refractive_index: self.refractive_index,
            pixel_size_xy_nm: self.pixel_size_xy_nm,
            pixel_size_z_nm: self.pixel_size_z_nm,
        }
    }
}

/// Retrieval parameters replacing the defaults
#[derive(Args, Debug, Default)]
pub struct FitArgs {
    /// Maximum iterations before stopping
    #[arg(short = 'i', long = "iterations")]
    pub max_iterations: Option<usize>,

    /// Relative pupil change that counts as converged
    #[arg(long)]
    pub pupil_tolerance: Option<f64>,

    /// Relative MSE change that counts as converged
    #[arg(long)]
    pub mse_tolerance: Option<f64>,

    /// Zernike magnitude in waves tolerated before a term is flagged
    #[arg(long)]
    pub phase_tolerance: Option<f64>,

    /// Number of Zernike polynomials to fit
    #[arg(short = 'z', long = "zernike")]
    pub zernike_count: Option<usize>,

    /// Random seed of the initial phase
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Amplitude in radians of the random initial phase
    #[arg(long = "phase-noise")]
    pub initial_phase_noise: Option<f64>,
}

impl FitArgs {
    /// Flags as parameter overrides
    pub const fn overrides(&self) -> FitOverrides {
        FitOverrides {
            max_iterations: self.max_iterations,
            pupil_tolerance: self.pupil_tolerance,
            mse_tolerance: self.mse_tolerance,
            phase_tolerance: self.phase_tolerance,
            zernike_count: self.zernike_count,
            seed: self.seed,
            initial_phase_noise: self.initial_phase_noise,
        }
    }
}

/// Arguments of `retrieve`
#[derive(Args, Debug)]
pub struct RetrieveArgs {
    /// OME-TIFF PSF stack
    #[arg(value_name = "FILE")]
    pub target: PathBuf,

    /// Directory for the report (default: next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON parameter file applied before the flags
    #[arg(short, long, value_name = "JSON")]
    pub parameters: Option<PathBuf>,

    /// Optical overrides
    #[command(flatten)]
    pub psf: PsfArgs,

    /// Retrieval overrides
    #[command(flatten)]
    pub fit: FitArgs,

    /// Also write the PDF report
    #[arg(long)]
    pub pdf: bool,

    /// Also write PNG figures
    #[arg(long)]
    pub png: bool,

    /// Cancel the run after this many seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<f64>,
}

impl RetrieveArgs {
    /// Flags layered over the parameter file, if any
    ///
    /// # Errors
    ///
    /// Returns [`PsfError::Config`] when the parameter file is unusable
    pub fn parameters(&self) -> Result<ParameterFile> {
        let file = match &self.parameters {
            Some(path) => ParameterFile::load(path)?,
            None => ParameterFile::default(),
        };
        Ok(file.overridden_by(ParameterFile {
            psf: self.psf.overrides(),
            fit: self.fit.overrides(),
        }))
    }

    /// Cancellation deadline measured from now
    ///
    /// # Errors
    ///
    /// Returns [`PsfError::Fit`] for a negative or non-finite timeout
    pub fn deadline(&self) -> Result<Option<Instant>> {
        self.timeout
            .map(|seconds| {
                Duration::try_from_secs_f64(seconds)
                    .map(|timeout| Instant::now() + timeout)
                    .map_err(|e| PsfError::Fit(invalid_parameter("timeout", &seconds, &e)))
            })
            .transpose()
    }
}

/// Arguments of `inspect`
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// OME-TIFF PSF stack
    #[arg(value_name = "FILE")]
    pub target: PathBuf,

    /// Directory for the previews (default: next to the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Plane of the xy preview (default: brightest)
    #[arg(short, long)]
    pub z: Option<usize>,

    /// Row of the xz preview (default: through the brightest voxel)
    #[arg(short, long)]
    pub y: Option<usize>,
}

/// Arguments of `simulate`
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Destination OME-TIFF
    #[arg(value_name = "FILE")]
    pub output: PathBuf,

    /// Plane edge length in pixels
    #[arg(long, default_value_t = 32)]
    pub size: usize,

    /// Number of planes
    #[arg(long, default_value_t = 21)]
    pub slices: usize,

    /// Emission wavelength in nm
    #[arg(long, default_value_t = 520.0)]
    pub wavelength: f64,

    /// Numerical aperture
    #[arg(long, default_value_t = 1.2)]
    pub na: f64,

    /// Immersion refractive index
    #[arg(long, default_value_t = 1.333)]
    pub ri: f64,

    /// Lateral pixel size in nm
    #[arg(long = "xy-res", default_value_t = 100.0)]
    pub xy_res: f64,

    /// Axial step in nm
    #[arg(long = "z-res", default_value_t = 250.0)]
    pub z_res: f64,

    /// Counts of the brightest voxel above background
    #[arg(long, default_value_t = 1000.0)]
    pub peak: f64,

    /// Constant background counts
    #[arg(long, default_value_t = 100.0)]
    pub background: f64,

    /// Aberration as NOLL=WAVES, repeatable
    #[arg(short, long = "aberration", value_name = "NOLL=WAVES", value_parser = parse_aberration)]
    pub aberrations: Vec<(usize, f64)>,
}

impl SimulateArgs {
    /// Acquisition to render
    pub fn synthetic(&self) -> SyntheticPsf {
        let params = PsfParameters {
            wavelength_nm: self.wavelength,
            numerical_aperture: self.na,
            refractive_index: self.ri,
            pixel_size_xy_nm: self.xy_res,
            pixel_size_z_nm: self.z_res,
        };
        self.aberrations.iter().fold(
            SyntheticPsf::new(params, self.size, self.slices)
                .with_levels(self.peak, self.background),
            |psf, &(order, waves)| psf.with_aberration(order, waves),
        )
    }
}

/// Parse `NOLL=WAVES`
///
/// # Errors
///
/// Returns a message when either side is missing or malformed
pub fn parse_aberration(text: &str) -> std::result::Result<(usize, f64), String> {
    let (order, waves) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NOLL=WAVES, got '{text}'"))?;
    let order: usize = order
        .trim()
        .parse()
        .map_err(|e| format!("invalid Noll order '{order}': {e}"))?;
    if order == 0 {
        return Err("Noll orders start at 1".to_string());
    }
    let waves: f64 = waves
        .trim()
        .parse()
        .map_err(|e| format!("invalid amount '{waves}': {e}"))?;
    Ok((order, waves))
}

/// Execute the parsed command line
///
/// # Errors
///
/// Returns the [`PsfError`] of the failing step; its exit code tells the
/// kinds apart
pub fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Retrieve(args) => retrieve(args, cli.quiet),
        Command::Inspect(args) => inspect(args),
        Command::Simulate(args) => simulate(args),
    }
}

fn retrieve(args: &RetrieveArgs, quiet: bool) -> Result<()> {
    let overrides = args.parameters()?;
    let deadline = args.deadline()?;

    let mut session = Session::new();
    session.load(&args.target)?;
    let (psf, fit) = session.resolve_parameters(&overrides)?;
    log::debug!("psf parameters {psf:?}");
    log::debug!("fit parameters {fit:?}");

    let paths = session
        .output_paths(args.output.as_deref())
        .unwrap_or_else(|| OutputPaths::for_input(&args.target, args.output.as_deref()));

    session.start(psf, fit)?;
    let progress = RunProgress::for_run(&args.target, fit.max_iterations, quiet);
    let mut cancelled = false;
    while session.state() == SessionState::Running {
        for event in session.poll_timeout(Duration::from_millis(POLL_INTERVAL_MS))? {
            progress.update(&event);
        }
        let expired = deadline.is_some_and(|d| Instant::now() >= d);
        if expired && !cancelled && session.state() == SessionState::Running {
            log::warn!("timeout reached, cancelling after the current iteration");
            session.cancel()?;
            cancelled = true;
        }
    }

    let result = match session.outcome() {
        Ok(result) => {
            progress.finish(&result.status_line());
            result
        }
        Err(error) => {
            progress.clear();
            return Err(error);
        }
    };
    log::info!(
        "{} final mse {:.3E}",
        result.status_line(),
        result.final_mse().unwrap_or(f64::NAN)
    );

    let options = ReportOptions {
        spreadsheet: true,
        pdf: args.pdf,
        images: args.png,
    };
    session.export(&paths, &options)?;
    Ok(())
}

// Allow print for the metadata listing the user asked for
#[allow(clippy::print_stdout)]
fn inspect(args: &InspectArgs) -> Result<()> {
    let stack = load_stack(&args.target)?;
    let metadata = stack.metadata();
    let optional = |value: Option<f64>| value.map_or_else(|| "unknown".to_string(), |v| v.to_string());

    println!("{}", args.target.display());
    println!("  planes               {}", stack.size_z());
    println!("  plane size           {0} x {0} px", stack.size_xy());
    println!("  xy resolution        {} nm", metadata.pixel_size_xy_nm);
    println!("  z resolution         {} nm", metadata.pixel_size_z_nm);
    println!("  numerical aperture   {}", metadata.numerical_aperture);
    println!("  refractive index     {}", optional(metadata.refractive_index));
    println!("  emission wavelength  {} nm", optional(metadata.wavelength_nm));
    println!("  brightest plane      {}", stack.focal_plane());

    let paths = OutputPaths::for_input(&args.target, args.output.as_deref());
    ensure_directory(paths.directory())?;
    let previews = [
        (psf_xy_preview(&stack, args.z), paths.xy_preview(), "z", args.z),
        (psf_xz_preview(&stack, args.y), paths.xz_preview(), "y", args.y),
    ];
    for (preview, path, axis, index) in previews {
        let Some(image) = preview else {
            return Err(PsfError::Config {
                path: args.target.clone(),
                reason: format!("{axis} = {} lies outside the stack", index.unwrap_or_default()),
            });
        };
        save_png(&image, &path)?;
        log::info!("wrote {}", path.display());
    }
    Ok(())
}

fn simulate(args: &SimulateArgs) -> Result<()> {
    let stack = args.synthetic().render()?;
    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_directory(parent)?;
    }
    write_ome_tiff(&args.output, &stack.with_source(&args.output))?;
    Ok(())
}
