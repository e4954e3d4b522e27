//! This module describes a simulation scene: a configuration together with the directory its
//! file references are resolved against.

use std::path::{Path, PathBuf};

use crate::config::lint::{self, lint_bc_data, lint_config, Language, Report};
use crate::config::{Config, ConfigError};
use crate::fem::integrator::StepResult;
use crate::fem::solver::{Solver, SolverBuilder};
use crate::{io, Error, SimResult};

#[derive(Clone, Debug)]
pub struct Scene {
    config: Config,
    /// Mesh and boundary data file names are relative to this directory.
    base_dir: PathBuf,
    num_threads: Option<usize>,
}

impl Scene {
    pub fn new(config: Config, base_dir: impl Into<PathBuf>) -> Self {
        Scene {
            config,
            base_dir: base_dir.into(),
            num_threads: None,
        }
    }

    /// Loads the configuration from a RON file. Relative paths inside it are resolved against
    /// the directory of the file.
    pub fn load(path: impl AsRef<Path>) -> Result<Scene, Error> {
        let path = path.as_ref();
        let config = io::load_config(path)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(Scene::new(config, base_dir))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Overrides the number of worker threads, which defaults to the number of CPUs.
    pub fn set_num_threads(&mut self, num_threads: usize) -> &mut Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Path prefix of output snapshots, relative to the configuration directory.
    pub fn output_prefix(&self) -> PathBuf {
        self.base_dir.join(&self.config.output_path_and_prefix)
    }

    /// Lints the configuration and the boundary data file it refers to.
    pub fn lint(&self) -> Report {
        let mut report = lint_config(&self.config, Some(&self.base_dir));
        if let Some(bc) = &self.config.mesh.bc_data_filename {
            let path = self.base_dir.join(bc);
            // A missing file is already reported above.
            if path.is_file() {
                match io::load_bc_data(&path) {
                    Ok(data) => report.extend(lint_bc_data(&data)),
                    Err(err) => report.error(
                        "mesh.bc_data_filename",
                        format!("Failed to read boundary data {:?}: {}", bc, err),
                    ),
                }
            }
        }
        report
    }

    /// Loads the mesh and boundary data and builds the solver.
    pub fn build_solver(&self) -> Result<Solver, Error> {
        let mesh = io::load_mesh(self.base_dir.join(&self.config.mesh.filename))?;
        let mut builder = SolverBuilder::new(self.config.clone());
        builder.set_mesh(mesh);
        if let Some(bc) = &self.config.mesh.bc_data_filename {
            builder.set_bc_data(io::load_bc_data(self.base_dir.join(bc))?);
        }
        if let Some(num_threads) = self.num_threads {
            builder.set_num_threads(num_threads);
        }
        builder.build()
    }

    /// Runs a simulation on this scene.
    pub fn run(&self) -> SimResult {
        let mut last = None;
        let result = self.run_with(|res, _| {
            last = Some(*res);
            true
        });
        match (result, last) {
            (Err(err), _) => err.into(),
            (Ok(_), Some(last)) => Ok(last).into(),
            (Ok(_), None) => SimResult::Success("Nothing to do".to_string()),
        }
    }

    /// Runs a simulation on this scene.
    ///
    /// If callback returns `false`, the simulation is interrupted.
    pub fn run_with(
        &self,
        callback: impl FnMut(&StepResult, &Solver) -> bool,
    ) -> Result<Solver, Error> {
        let mut solver = self.build_solver()?;
        solver.run(callback)?;
        Ok(solver)
    }
}

/// Lints a configuration or boundary data file.
///
/// Missing and unknown fields are all reported. A configuration with a complete field structure
/// is then checked value by value together with the files it refers to. Fails only if the file
/// cannot be read or is not RON at all.
pub fn lint_file(path: impl AsRef<Path>, language: Language) -> Result<(Language, Report), Error> {
    let path = path.as_ref();
    let text = io::read_text(path)?;
    let value: ron::Value = ron::de::from_str(&text).map_err(ConfigError::from)?;
    let language = match language {
        Language::Auto => Language::detect(&value),
        language => language,
    };
    log::debug!("Linting {} as {:?}", path.display(), language);

    let mut report = match language {
        Language::BcData => lint::lint_bc_data_fields(&value),
        _ => lint::lint_config_fields(&value),
    };
    if report.has_errors() {
        return Ok((language, report));
    }
    match language {
        Language::BcData => match ron::de::from_str(&text) {
            Ok(data) => report.extend(lint_bc_data(&data)),
            Err(err) => report.error("(root)", err.to_string()),
        },
        _ => match Config::from_ron(&text) {
            Ok(config) => {
                let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                report.extend(Scene::new(config, base_dir).lint());
            }
            Err(err) => report.error("(root)", err.to_string()),
        },
    }
    Ok((language, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn scene_from_files() {
        let dir = std::env::temp_dir().join(format!("tissue-scene-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        io::save_mesh(&make_unit_cube(), dir.join("cube.ron")).unwrap();
        let mut config = cube_config();
        config.mesh.filename = "cube.ron".into();
        config.instationary.max_time_step_its = 2;
        let text = ron::ser::to_string_pretty(&config, Default::default()).unwrap();
        std::fs::write(dir.join("scene.ron"), text).unwrap();

        let scene = Scene::load(dir.join("scene.ron")).unwrap();
        assert_eq!(scene.config(), &config);
        assert_eq!(scene.output_prefix(), dir.join("results/tissue"));
        assert!(!scene.lint().has_errors());
        let mut steps = 0;
        let solver = scene
            .run_with(|_, _| {
                steps += 1;
                true
            })
            .unwrap();
        assert_eq!(steps, 2);
        assert!(solver.is_finished());
        assert!(matches!(scene.run(), SimResult::Success(_)));
        std::fs::remove_dir_all(dir).unwrap();
    }
}
