use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use indicatif::{ProgressBar, ProgressStyle};
use tissue::config::lint::Language;
use tissue::config::{ConfigError, Level};
use tissue::scene::{self, Scene};
use tissue::{SimResult, Solver};

const ABOUT: &str = "
Tissue is a finite element simulator of Rayleigh damped linear elastodynamics for soft tissue.";

#[derive(Parser)]
#[clap(author, version, about = ABOUT, name = "tissue")]
struct Opt {
    #[clap(flatten)]
    verbose: Verbosity<WarnLevel>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the simulation described by a configuration file.
    Run {
        /// Path to the RON configuration file.
        ///
        /// Mesh, boundary data and output paths in the configuration are relative to the
        /// directory of this file.
        #[clap(name = "CONFIG", parse(from_os_str))]
        config: PathBuf,

        /// Number of worker threads. Defaults to the number of CPUs.
        #[clap(short = 'j', long)]
        threads: Option<usize>,

        /// Skip writing VTK snapshots.
        #[clap(long)]
        no_output: bool,

        /// Hide the progress bar.
        #[clap(long)]
        no_progress: bool,
    },
    /// Check a configuration or boundary data file for problems without running anything.
    Check {
        /// Path to the RON file to check.
        #[clap(name = "FILE", parse(from_os_str))]
        file: PathBuf,

        /// Kind of file.
        #[clap(short, long, value_enum, default_value = "auto")]
        language: LanguageArg,

        /// Output format of the report.
        #[clap(short, long, value_enum, default_value = "cterm")]
        format: ReportFormat,

        #[clap(flatten)]
        levels: LevelFlags,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum LanguageArg {
    /// Simulation configuration.
    Config,
    /// Boundary data file.
    Bc,
    /// Decide from the contents.
    Auto,
}

impl From<LanguageArg> for Language {
    fn from(arg: LanguageArg) -> Language {
        match arg {
            LanguageArg::Config => Language::Config,
            LanguageArg::Bc => Language::BcData,
            LanguageArg::Auto => Language::Auto,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ReportFormat {
    Json,
    Xml,
    Csv,
    Term,
    /// Terminal output with colors.
    Cterm,
}

/// Report levels to show. All are shown by default.
#[derive(clap::Args)]
struct LevelFlags {
    /// Show errors.
    #[clap(short = 'e', long = "errors", overrides_with = "no_errors")]
    errors: bool,
    /// Hide errors.
    #[clap(short = 'E', long = "no-errors", overrides_with = "errors")]
    no_errors: bool,
    /// Show warnings.
    #[clap(short = 'w', long = "warnings", overrides_with = "no_warnings")]
    warnings: bool,
    /// Hide warnings.
    #[clap(short = 'W', long = "no-warnings", overrides_with = "warnings")]
    no_warnings: bool,
    /// Show hints.
    #[clap(short = 'i', long = "hints", overrides_with = "no_hints")]
    hints: bool,
    /// Hide hints.
    #[clap(short = 'I', long = "no-hints", overrides_with = "hints")]
    no_hints: bool,
}

impl LevelFlags {
    fn levels(&self) -> Vec<Level> {
        let mut levels = Vec::new();
        if !self.no_errors {
            levels.push(Level::Error);
        }
        if !self.no_warnings {
            levels.push(Level::Warning);
        }
        if !self.no_hints {
            levels.push(Level::Hint);
        }
        levels
    }
}

pub fn main() {
    if let Err(err) = try_main() {
        eprintln!("Error: {:#}", err);
        let code = err
            .downcast_ref::<tissue::Error>()
            .map_or(1, tissue::Error::exit_code);
        std::process::exit(code);
    }
}

pub fn try_main() -> Result<()> {
    let opt = Opt::parse();

    let mut logger = env_logger::Builder::new();
    logger.filter_level(opt.verbose.log_level_filter());
    if let Ok(filters) = std::env::var("TISSUE_LOG") {
        logger.parse_filters(&filters);
    }
    let _ = logger.try_init();

    match opt.command {
        Command::Run {
            config,
            threads,
            no_output,
            no_progress,
        } => run(&config, threads, no_output, no_progress),
        Command::Check {
            file,
            language,
            format,
            levels,
        } => check(&file, language.into(), format, &levels.levels()),
    }
}

fn check(file: &Path, language: Language, format: ReportFormat, levels: &[Level]) -> Result<()> {
    let (language, full) = scene::lint_file(file, language)?;
    log::info!("Checked {} as {:?}", file.display(), language);
    // The exit status reflects every error, shown or not.
    let first_error = full.first_error().map(|entry| ConfigError::Invalid {
        path: entry.path.clone(),
        message: entry.message.clone(),
    });

    let report = full.filter(levels);
    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        ReportFormat::Xml => print!("{}", report.to_xml()),
        ReportFormat::Csv => print!("{}", report.to_csv()),
        ReportFormat::Term | ReportFormat::Cterm => {
            if report.is_empty() {
                println!("No problems found in {}", file.display());
            } else if matches!(format, ReportFormat::Cterm) {
                print!("{}", report.to_colored_string());
            } else {
                print!("{}", report);
            }
        }
    }

    match first_error {
        Some(err) => Err(tissue::Error::from(err).into()),
        None => Ok(()),
    }
}

/// Writes VTK snapshots of the displacement every `interval` steps.
struct Snapshots {
    prefix: PathBuf,
    interval: u64,
}

impl Snapshots {
    fn new(scene: &Scene) -> Result<Option<Snapshots>> {
        let interval = scene.config().instationary.output_interval;
        if interval == 0 {
            return Ok(None);
        }
        let prefix = scene.output_prefix();
        if let Some(dir) = prefix.parent() {
            std::fs::create_dir_all(dir)
                .map_err(tissue::Error::from)
                .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        }
        Ok(Some(Snapshots { prefix, interval }))
    }

    fn path(&self, step: u64) -> PathBuf {
        let mut name = self
            .prefix
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!("_{:05}.vtk", step));
        self.prefix.with_file_name(name)
    }

    /// Writes the current state if it falls on the output interval or `force` is set.
    fn write(&self, solver: &Solver, force: bool) -> Result<()> {
        let state = solver.state();
        if !force && state.step % self.interval != 0 {
            return Ok(());
        }
        let path = self.path(state.step);
        let title = format!("tissue step {} t = {}", state.step, state.time);
        tissue::io::write_vtk(&path, solver.mesh(), &solver.vertex_displacements(), &title)
            .map_err(tissue::Error::from)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        log::debug!("Wrote {}", path.display());
        Ok(())
    }
}

fn run(config: &Path, threads: Option<usize>, no_output: bool, no_progress: bool) -> Result<()> {
    let mut scene = Scene::load(config)?;
    if let Some(threads) = threads {
        scene.set_num_threads(threads);
    }
    let mut solver = scene.build_solver()?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .context("Failed to install the interrupt handler")?;
    }
    {
        let interrupted = Arc::clone(&interrupted);
        solver.set_interrupter(move || interrupted.load(Ordering::SeqCst));
    }

    let snapshots = if no_output {
        None
    } else {
        Snapshots::new(&scene)?
    };
    if let Some(snapshots) = &snapshots {
        // The initial state of a fresh dynamic run.
        if solver.integrator().is_some() && solver.state().step == 0 {
            snapshots.write(&solver, true)?;
        }
    }

    let remaining = solver.max_steps().saturating_sub(solver.state().step);
    let progress = if no_progress {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(remaining)
    };
    progress.set_style(
        ProgressStyle::with_template("{elapsed_precise} [{bar:40}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut output_error = None;
    let mut last = None;
    let result = solver.run(|res, solver| {
        progress.inc(1);
        progress.set_message(format!("t = {:.4}", res.time));
        if !res.solve.converged() {
            progress.println(format!("Warning: {}", res));
        }
        last = Some(*res);
        if let Some(snapshots) = &snapshots {
            if let Err(err) = snapshots.write(solver, solver.is_finished()) {
                output_error = Some(err);
                return false;
            }
        }
        !interrupted.load(Ordering::SeqCst)
    });
    progress.finish_and_clear();

    if let Some(err) = output_error {
        return Err(err);
    }

    let stopped = matches!(result, Err(tissue::Error::Interrupted))
        || (result.is_ok() && !solver.is_finished());
    if stopped {
        if scene.config().checkpoint.interval > 0 {
            solver.save_checkpoint()?;
            log::info!("Saved checkpoint at step {}", solver.state().step);
        }
        return Err(tissue::Error::Interrupted.into());
    }
    let steps = result?;

    let summary = match last {
        Some(last) => SimResult::from(Ok::<_, tissue::Error>(last)),
        None => SimResult::Success("Nothing to do".to_string()),
    };
    match summary {
        SimResult::Success(msg) => log::info!("{}", msg),
        SimResult::Warning(msg) => eprintln!("Warning: {}", msg),
        SimResult::Error(msg) => eprintln!("Error: {}", msg),
    }
    println!(
        "Finished {} steps in {:?} (t = {})",
        steps,
        progress.elapsed(),
        solver.state().time
    );
    Ok(())
}
