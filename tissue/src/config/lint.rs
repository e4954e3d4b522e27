//! Configuration and boundary data linter.
//!
//! Every rule inspects one aspect of the input and appends entries with a severity, a message
//! and the dotted path of the offending field. Nothing is rejected here; callers decide what to
//! do with errors.
//!
//! Field rules run on the untyped RON value, so every missing or unknown field is reported at
//! once. Value rules run on the parsed [`Config`] and [`BcData`].

use std::fmt;
use std::path::Path;

use ron::Value;
use serde::Serialize;

use super::*;
use crate::boundary::BcData;

/// Severity of a report entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Level {
    #[serde(rename = "E")]
    Error,
    #[serde(rename = "W")]
    Warning,
    #[serde(rename = "I")]
    Hint,
}

impl Level {
    pub fn code(self) -> char {
        match self {
            Level::Error => 'E',
            Level::Warning => 'W',
            Level::Hint => 'I',
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Entry {
    pub level: Level,
    pub number: usize,
    pub message: String,
    pub path: String,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}: {} in {}",
            self.level.code(),
            self.number,
            self.message,
            self.path
        )
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Report {
    entries: Vec<Entry>,
}

impl Report {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, level: Level, path: impl Into<String>, message: impl Into<String>) {
        let number = self.entries.len();
        self.entries.push(Entry {
            level,
            number,
            message: message.into(),
            path: path.into(),
        });
    }

    pub fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push(Level::Error, path, message);
    }

    pub fn warning(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push(Level::Warning, path, message);
    }

    pub fn hint(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push(Level::Hint, path, message);
    }

    /// Adds an error unless `condition` holds. Returns `condition`.
    fn require(&mut self, condition: bool, path: &str, message: impl Into<String>) -> bool {
        if !condition {
            self.error(path, message);
        }
        condition
    }

    /// Adds a hint if `value` differs from the reference value.
    fn reference<T: PartialEq + fmt::Debug>(&mut self, value: T, reference: T, path: &str) {
        if value != reference {
            self.hint(
                path,
                format!("Value {:?} differs from the reference value {:?}", value, reference),
            );
        }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.level == Level::Error)
    }

    pub fn count(&self, level: Level) -> usize {
        self.entries.iter().filter(|e| e.level == level).count()
    }

    pub fn first_error(&self) -> Option<&Entry> {
        self.entries.iter().find(|e| e.level == Level::Error)
    }

    /// Appends all entries of `other`, renumbering them.
    pub fn extend(&mut self, other: Report) {
        for e in other.entries {
            self.push(e.level, e.path, e.message);
        }
    }

    /// Keeps only entries of the given levels.
    pub fn filter(self, levels: &[Level]) -> Report {
        Report {
            entries: self
                .entries
                .into_iter()
                .filter(|e| levels.contains(&e.level))
                .collect(),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.entries {
            writeln!(f, "{}", e)?;
        }
        Ok(())
    }
}

impl Report {
    /// One line per entry with ANSI colors by level.
    pub fn to_colored_string(&self) -> String {
        let mut out = String::new();
        for e in &self.entries {
            let color = match e.level {
                Level::Error => 31,
                Level::Warning => 33,
                Level::Hint => 94,
            };
            out.push_str(&format!(
                "\x1b[{}m{}-{}: {} \x1b[37m{}\x1b[0m\n",
                color,
                e.level.code(),
                e.number,
                e.message,
                e.path
            ));
        }
        out
    }

    /// A `<report>` element with one `<entry>` per entry.
    pub fn to_xml(&self) -> String {
        let mut out =
            String::from("<?xml version='1.0' encoding='utf-8' standalone='yes'?>\n<report>\n");
        for e in &self.entries {
            out.push_str(&format!(
                "  <entry level=\"{}\" number=\"{}\" message=\"{}\" path=\"{}\"/>\n",
                e.level.code(),
                e.number,
                xml_escape(&e.message),
                xml_escape(&e.path)
            ));
        }
        out.push_str("</report>\n");
        out
    }

    /// Comma separated `level,number,message,path` records.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for e in &self.entries {
            out.push_str(&format!(
                "{},{},{},{}\r\n",
                e.level.code(),
                e.number,
                csv_field(&e.message),
                csv_field(&e.path)
            ));
        }
        out
    }
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

fn csv_field(text: &str) -> String {
    if text.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

/// Kind of file to lint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Language {
    Config,
    BcData,
    /// Decide from the top level fields.
    Auto,
}

impl Language {
    /// Boundary data files are recognized by their point blocks, anything else is treated as a
    /// configuration.
    pub fn detect(value: &Value) -> Language {
        let is_bc_data = match value {
            Value::Map(map) => map.keys().any(|k| {
                matches!(k, Value::String(k) if BC_DATA_FIELDS.iter().any(|f| f.name == k))
            }),
            _ => false,
        };
        if is_bc_data {
            Language::BcData
        } else {
            Language::Config
        }
    }
}

/// Expected field of a RON file.
struct Field {
    name: &'static str,
    required: bool,
    /// Fields of a section, or of every element of a list of sections.
    fields: &'static [Field],
    list: bool,
}

const fn required(name: &'static str) -> Field {
    Field {
        name,
        required: true,
        fields: &[],
        list: false,
    }
}

const fn optional(name: &'static str) -> Field {
    Field {
        name,
        required: false,
        fields: &[],
        list: false,
    }
}

const fn section(name: &'static str, required: bool, fields: &'static [Field]) -> Field {
    Field {
        name,
        required,
        fields,
        list: false,
    }
}

const fn list(name: &'static str, fields: &'static [Field]) -> Field {
    Field {
        name,
        required: true,
        fields,
        list: true,
    }
}

const MESH_FIELDS: &[Field] = &[
    required("filename"),
    optional("bc_data_filename"),
    required("initial_ref_level"),
];

const LINEAR_ALGEBRA_FIELDS: &[Field] = &[
    required("platform"),
    required("implementation"),
    required("matrix_format"),
];

const ELASTICITY_FIELDS: &[Field] = &[
    required("density"),
    required("lambda"),
    required("mu"),
    required("gravity"),
    optional("gravity_direction"),
];

const FINITE_ELEMENT_FIELDS: &[Field] = &[required("displacement_degree")];

const INSTATIONARY_FIELDS: &[Field] = &[
    required("solve_instationary"),
    required("damping_factor"),
    required("rayleigh_alpha"),
    required("rayleigh_beta"),
    required("method"),
    required("delta_t"),
    required("max_time_step_its"),
    optional("newmark_beta"),
    optional("newmark_gamma"),
    optional("output_interval"),
];

const DIRICHLET_FIELDS: &[Field] = &[required("tag"), optional("displacement")];

const NEUMANN_FIELDS: &[Field] = &[required("tag"), required("pressure"), optional("polarity")];

const BOUNDARY_FIELDS: &[Field] = &[
    list("dirichlet", DIRICHLET_FIELDS),
    list("neumann", NEUMANN_FIELDS),
];

const LINEAR_SOLVER_FIELDS: &[Field] = &[
    required("solver_name"),
    required("maximum_iterations"),
    required("absolute_tolerance"),
    required("relative_tolerance"),
    required("divergence_limit"),
    required("basis_size"),
    required("preconditioning"),
    required("preconditioner_name"),
    required("omega"),
    required("ilu_p"),
    optional("drop_tolerance"),
    optional("non_convergence"),
];

const ILUPP_FIELDS: &[Field] = &[
    required("preprocessing_type"),
    required("preconditioner_number"),
    required("max_multilevels"),
    required("mem_factor"),
    required("pivot_threshold"),
    required("min_pivot"),
];

const CHECKPOINT_FIELDS: &[Field] = &[
    required("restore"),
    optional("resume_step"),
    required("filename"),
    optional("interval"),
];

const CONFIG_FIELDS: &[Field] = &[
    required("output_path_and_prefix"),
    section("mesh", true, MESH_FIELDS),
    section("linear_algebra", true, LINEAR_ALGEBRA_FIELDS),
    section("elasticity_model", true, ELASTICITY_FIELDS),
    required("quadrature_order"),
    section("finite_elements", true, FINITE_ELEMENT_FIELDS),
    section("instationary", true, INSTATIONARY_FIELDS),
    section("boundary", true, BOUNDARY_FIELDS),
    section("linear_solver", true, LINEAR_SOLVER_FIELDS),
    section("ilupp", true, ILUPP_FIELDS),
    section("checkpoint", true, CHECKPOINT_FIELDS),
];

const POINT_BLOCK_FIELDS: &[Field] = &[required("count"), required("points"), required("values")];

const BC_DATA_FIELDS: &[Field] = &[
    section("fixed_constraints", false, POINT_BLOCK_FIELDS),
    section("displacement_constraints", false, POINT_BLOCK_FIELDS),
    section("force_or_pressure", false, POINT_BLOCK_FIELDS),
];

/// Reports missing and unknown fields of a configuration file.
pub fn lint_config_fields(value: &Value) -> Report {
    let mut r = Report::new();
    check_fields(value, CONFIG_FIELDS, "", &mut r);
    r
}

/// Reports missing and unknown fields of a boundary data file.
pub fn lint_bc_data_fields(value: &Value) -> Report {
    let mut r = Report::new();
    check_fields(value, BC_DATA_FIELDS, "", &mut r);
    r
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

/// Strips `Some(..)`, returning `None` for an explicit `None`.
fn unwrap_option(value: &Value) -> Option<&Value> {
    match value {
        Value::Option(inner) => inner.as_deref().and_then(unwrap_option),
        value => Some(value),
    }
}

fn check_fields(value: &Value, fields: &[Field], prefix: &str, r: &mut Report) {
    let empty = ron::Map::new();
    let map = match value {
        Value::Map(map) => map,
        // `()` is an empty section.
        Value::Unit => &empty,
        _ => {
            let path = if prefix.is_empty() { "(root)" } else { prefix };
            r.error(path, "Expected a section of named fields");
            return;
        }
    };

    for field in fields {
        let path = join(prefix, field.name);
        let found = map
            .iter()
            .find(|(k, _)| matches!(k, Value::String(k) if k == field.name))
            .and_then(|(_, v)| unwrap_option(v));
        let value = match found {
            Some(value) => value,
            None => {
                if field.required {
                    r.error(&path, "Field does not exist");
                }
                continue;
            }
        };
        if field.list {
            match value {
                Value::Seq(items) => {
                    for (i, item) in items.iter().enumerate() {
                        check_fields(item, field.fields, &format!("{}[{}]", path, i), r);
                    }
                }
                _ => r.error(&path, "Expected a list"),
            }
        } else if !field.fields.is_empty() {
            check_fields(value, field.fields, &path, r);
        }
    }

    for key in map.keys() {
        match key {
            Value::String(name) if fields.iter().any(|f| f.name == name) => {}
            Value::String(name) => r.error(join(prefix, name), "Unknown field"),
            other => r.error(
                if prefix.is_empty() { "(root)" } else { prefix },
                format!("Unexpected key {:?}", other),
            ),
        }
    }
}

fn positive(x: f64) -> bool {
    x.is_finite() && x > 0.0
}

fn non_negative(x: f64) -> bool {
    x.is_finite() && x >= 0.0
}

/// Lints a configuration.
///
/// File references are checked relative to `base_dir` when given.
pub fn lint_config(config: &Config, base_dir: Option<&Path>) -> Report {
    let mut r = Report::new();
    lint_output(config, &mut r);
    lint_mesh(config, base_dir, &mut r);
    lint_linear_algebra(config, &mut r);
    lint_elasticity(config, &mut r);
    lint_discretization(config, &mut r);
    lint_instationary(config, &mut r);
    lint_boundary(config, &mut r);
    lint_linear_solver(config, &mut r);
    lint_ilupp(config, &mut r);
    lint_checkpoint(config, &mut r);
    r
}

fn lint_output(config: &Config, r: &mut Report) {
    r.require(
        !config.output_path_and_prefix.trim().is_empty(),
        "output_path_and_prefix",
        "Output prefix is empty",
    );
}

fn lint_mesh(config: &Config, base_dir: Option<&Path>, r: &mut Report) {
    let dir = match base_dir {
        Some(dir) => dir,
        None => return,
    };
    let mesh = &config.mesh;
    r.require(
        dir.join(&mesh.filename).is_file(),
        "mesh.filename",
        format!("File {:?} does not exist", mesh.filename),
    );
    if let Some(bc) = &mesh.bc_data_filename {
        r.require(
            dir.join(bc).is_file(),
            "mesh.bc_data_filename",
            format!("File {:?} does not exist", bc),
        );
    }
}

fn lint_linear_algebra(config: &Config, r: &mut Report) {
    let la = &config.linear_algebra;
    r.require(
        la.platform == Platform::Cpu,
        "linear_algebra.platform",
        format!("Platform {:?} is not available; use CPU", la.platform),
    );
    r.require(
        la.implementation != Implementation::Mkl,
        "linear_algebra.implementation",
        "MKL is not available; use Naive, BLAS or OPENMP",
    );
    if la.matrix_format == MatrixFormat::Dense {
        r.hint(
            "linear_algebra.matrix_format",
            "Dense storage grows quadratically with the number of unknowns",
        );
    }
}

fn lint_elasticity(config: &Config, r: &mut Report) {
    let em = &config.elasticity_model;
    r.require(
        positive(em.density),
        "elasticity_model.density",
        "Density must be positive",
    );
    r.require(
        non_negative(em.lambda),
        "elasticity_model.lambda",
        "lambda must be non-negative",
    );
    r.require(
        positive(em.mu),
        "elasticity_model.mu",
        "mu must be positive",
    );
    r.require(
        em.gravity.is_finite(),
        "elasticity_model.gravity",
        "Gravity must be finite",
    );
    if em.gravity != 0.0 {
        r.require(
            em.gravity_direction.iter().any(|&d| d != 0.0)
                && em.gravity_direction.iter().all(|d| d.is_finite()),
            "elasticity_model.gravity_direction",
            "Gravity direction must be a finite non-zero vector",
        );
    }
    if em.mu > 0.5 * em.lambda {
        r.warning(
            "elasticity_model.mu",
            "elasticity_model.mu should be at most half of elasticity_model.lambda",
        );
    }
}

fn lint_discretization(config: &Config, r: &mut Report) {
    if r.require(
        (1..=11).contains(&config.quadrature_order),
        "quadrature_order",
        "Quadrature order must be between 1 and 11",
    ) {
        r.reference(config.quadrature_order, 2, "quadrature_order");
    }
    let degree = config.finite_elements.displacement_degree;
    if r.require(
        degree == 1 || degree == 2,
        "finite_elements.displacement_degree",
        "Displacement degree must be 1 or 2",
    ) {
        r.reference(degree, 1, "finite_elements.displacement_degree");
        if config.quadrature_order < 2 * degree {
            r.warning(
                "quadrature_order",
                format!(
                    "Quadrature order {} under-integrates the mass matrix of degree {} elements",
                    config.quadrature_order, degree
                ),
            );
        }
    }
}

fn lint_instationary(config: &Config, r: &mut Report) {
    let inst = &config.instationary;
    let path = |field: &str| format!("instationary.{}", field);
    r.require(
        non_negative(inst.damping_factor),
        &path("damping_factor"),
        "Damping factor must be non-negative",
    );
    r.reference(inst.damping_factor, 1.0, &path("damping_factor"));
    r.require(
        non_negative(inst.rayleigh_alpha),
        &path("rayleigh_alpha"),
        "Rayleigh alpha must be non-negative",
    );
    r.require(
        non_negative(inst.rayleigh_beta),
        &path("rayleigh_beta"),
        "Rayleigh beta must be non-negative",
    );
    if !inst.solve_instationary {
        return;
    }
    r.require(
        positive(inst.delta_t),
        &path("delta_t"),
        "Time step must be positive",
    );
    r.require(
        inst.max_time_step_its > 0,
        &path("max_time_step_its"),
        "At least one time step is required",
    );
    match inst.method {
        Method::Newmark => {
            r.require(
                inst.newmark_beta > 0.0 && inst.newmark_beta <= 0.5,
                &path("newmark_beta"),
                "Newmark beta must be in (0, 0.5]",
            );
            if inst.newmark_gamma < 0.5 {
                r.warning(
                    &path("newmark_gamma"),
                    "Newmark gamma below 0.5 amplifies oscillations",
                );
            } else if inst.newmark_beta < 0.25 * (inst.newmark_gamma + 0.5).powi(2) {
                r.hint(
                    &path("newmark_beta"),
                    "The Newmark scheme is only conditionally stable for these beta and gamma",
                );
            }
        }
        Method::ExplicitEuler => {
            r.warning(
                &path("method"),
                "ExplicitEuler is only conditionally stable; keep delta_t small",
            );
        }
        Method::ImplicitEuler | Method::CrankNicolson => {}
    }
}

fn lint_boundary(config: &Config, r: &mut Report) {
    let b = &config.boundary;
    let mut seen = std::collections::BTreeMap::new();
    for (i, d) in b.dirichlet.iter().enumerate() {
        let path = format!("boundary.dirichlet[{}].tag", i);
        if seen.insert(d.tag, "dirichlet").is_some() {
            r.error(&path, format!("Tag {} appears more than once", d.tag));
        }
        if let Some(disp) = d.displacement {
            r.require(
                disp.iter().all(|x| x.is_finite()),
                &format!("boundary.dirichlet[{}].displacement", i),
                "Displacement must be finite",
            );
        }
    }
    for (i, n) in b.neumann.iter().enumerate() {
        let path = format!("boundary.neumann[{}].tag", i);
        match seen.insert(n.tag, "neumann") {
            Some("dirichlet") => r.error(
                &path,
                format!("Tag {} is used by both Dirichlet and Neumann conditions", n.tag),
            ),
            Some(_) => r.error(&path, format!("Tag {} appears more than once", n.tag)),
            None => {}
        }
        r.require(
            n.pressure.is_finite(),
            &format!("boundary.neumann[{}].pressure", i),
            "Pressure must be finite",
        );
    }
    if b.dirichlet.is_empty() && config.mesh.bc_data_filename.is_none() {
        r.warning(
            "boundary.dirichlet",
            "No displacement constraints; the stiffness matrix is singular",
        );
    }
}

fn lint_linear_solver(config: &Config, r: &mut Report) {
    let ls = &config.linear_solver;
    let path = |field: &str| format!("linear_solver.{}", field);
    r.require(
        ls.maximum_iterations > 0,
        &path("maximum_iterations"),
        "At least one iteration is required",
    );
    r.require(
        non_negative(ls.absolute_tolerance),
        &path("absolute_tolerance"),
        "Tolerance must be non-negative",
    );
    r.require(
        non_negative(ls.relative_tolerance),
        &path("relative_tolerance"),
        "Tolerance must be non-negative",
    );
    if ls.absolute_tolerance == 0.0 && ls.relative_tolerance == 0.0 {
        r.warning(
            &path("absolute_tolerance"),
            "Both tolerances are zero; the solver can only stop at the iteration cap",
        );
    }
    r.require(
        positive(ls.divergence_limit),
        &path("divergence_limit"),
        "Divergence limit must be positive",
    );
    if ls.solver_name == SolverName::Gmres {
        r.require(
            ls.basis_size > 0,
            &path("basis_size"),
            "GMRES basis size must be positive",
        );
    }
    if !ls.preconditioning {
        if ls.preconditioner_name != PreconditionerName::NoPrecond {
            r.hint(
                &path("preconditioner_name"),
                "Ignored because preconditioning is disabled",
            );
        }
        return;
    }
    match ls.preconditioner_name {
        PreconditionerName::Sor | PreconditionerName::Ssor => {
            r.require(
                ls.omega > 0.0 && ls.omega < 2.0,
                &path("omega"),
                "Relaxation factor must be in (0, 2)",
            );
        }
        PreconditionerName::Ilu2 | PreconditionerName::IluPp => {
            r.require(
                non_negative(ls.drop_tolerance),
                &path("drop_tolerance"),
                "Drop tolerance must be non-negative",
            );
        }
        _ => {}
    }
    let symmetric_solver = matches!(ls.solver_name, SolverName::Cg | SolverName::Cr);
    if symmetric_solver && !ls.preconditioner_name.is_symmetric() {
        r.warning(
            &path("preconditioner_name"),
            format!(
                "{:?} is not symmetric; {:?} may fail to converge, prefer GMRES or a symmetric preconditioner",
                ls.preconditioner_name, ls.solver_name
            ),
        );
    }
}

fn lint_ilupp(config: &Config, r: &mut Report) {
    let p = &config.ilupp;
    let path = |field: &str| format!("ilupp.{}", field);
    let reference = IluppParams::default();
    if r.require(
        p.preprocessing_type <= 1,
        &path("preprocessing_type"),
        "Preprocessing type must be 0 (none) or 1 (diagonal scaling)",
    ) {
        r.reference(p.preprocessing_type, reference.preprocessing_type, &path("preprocessing_type"));
    }
    if r.require(
        matches!(p.preconditioner_number, 0 | 10 | 11),
        &path("preconditioner_number"),
        "Preconditioner number must be 0, 10 or 11",
    ) {
        r.reference(
            p.preconditioner_number,
            reference.preconditioner_number,
            &path("preconditioner_number"),
        );
    }
    if r.require(
        p.max_multilevels > 0,
        &path("max_multilevels"),
        "At least one level is required",
    ) {
        r.reference(p.max_multilevels, reference.max_multilevels, &path("max_multilevels"));
    }
    if r.require(
        positive(p.mem_factor),
        &path("mem_factor"),
        "Memory factor must be positive",
    ) {
        r.reference(p.mem_factor, reference.mem_factor, &path("mem_factor"));
    }
    if r.require(
        p.pivot_threshold.is_finite() && p.pivot_threshold > 1.0,
        &path("pivot_threshold"),
        "Pivot threshold must be greater than 1",
    ) {
        r.reference(p.pivot_threshold, reference.pivot_threshold, &path("pivot_threshold"));
    }
    if r.require(
        non_negative(p.min_pivot) && p.min_pivot < 1.0,
        &path("min_pivot"),
        "Minimum pivot must be in [0, 1)",
    ) {
        r.reference(p.min_pivot, reference.min_pivot, &path("min_pivot"));
    }
}

fn lint_checkpoint(config: &Config, r: &mut Report) {
    let c = &config.checkpoint;
    let uses_file = c.restore || c.interval > 0;
    if uses_file {
        r.require(
            !c.filename.as_os_str().is_empty(),
            "checkpoint.filename",
            "Checkpoint file name is empty",
        );
    }
    if c.resume_step.is_some() && !c.restore {
        r.hint("checkpoint.resume_step", "Ignored because restore is disabled");
    }
    if c.restore && !config.instationary.solve_instationary {
        r.warning(
            "checkpoint.restore",
            "Quasi-static runs have no time history to restore",
        );
    }
}

/// Lints the contents of a boundary data file.
pub fn lint_bc_data(data: &BcData) -> Report {
    let mut r = Report::new();
    for (name, block) in data.blocks() {
        let block = match block {
            Some(block) => block,
            None => continue,
        };
        for (field, vectors) in [("points", &block.points), ("values", &block.values)] {
            let path = format!("{}.{}", name, field);
            r.require(
                block.count == vectors.len(),
                &path,
                format!(
                    "Amount of points mismatch (expected {}, found {})",
                    block.count,
                    vectors.len()
                ),
            );
            for v in vectors.iter() {
                if v.len() != 3 {
                    r.error(
                        &path,
                        format!("The vector {:?} does not have exactly 3 components", v),
                    );
                } else if !v.iter().all(|x| x.is_finite()) {
                    r.error(&path, format!("The vector {:?} is not finite", v));
                }
            }
        }
        if name == "fixed_constraints" && block.values.iter().flatten().any(|&x| x != 0.0) {
            r.hint(
                format!("{}.values", name),
                "Fixed points with non-zero displacement act as displaced points",
            );
        }
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::PointBlock;

    #[test]
    fn default_config_only_warns_about_constraints() {
        let report = lint_config(&Config::default(), None);
        assert!(!report.has_errors(), "{}", report);
        assert_eq!(report.count(Level::Warning), 1);
        assert_eq!(report.entries()[0].path, "boundary.dirichlet");
    }

    #[test]
    fn mu_larger_than_half_lambda_warns() {
        let mut config = crate::test_utils::cube_config();
        config.elasticity_model.lambda = 10.0;
        config.elasticity_model.mu = 6.0;
        let report = lint_config(&config, None);
        assert!(!report.has_errors());
        assert!(report
            .entries()
            .iter()
            .any(|e| e.level == Level::Warning && e.path == "elasticity_model.mu"));
    }

    #[test]
    fn invalid_fields_are_errors() {
        let mut config = crate::test_utils::cube_config();
        config.instationary.delta_t = -1.0;
        config.linear_solver.preconditioner_name = PreconditionerName::Ssor;
        config.linear_solver.omega = 2.5;
        config.linear_algebra.platform = Platform::OpenCl;
        config.boundary.neumann.push(NeumannTag {
            tag: crate::test_utils::FIXED_TAG,
            pressure: 1.0,
            polarity: Polarity::Outward,
        });
        let report = lint_config(&config, None);
        let errors: Vec<_> = report
            .entries()
            .iter()
            .filter(|e| e.level == Level::Error)
            .map(|e| e.path.as_str())
            .collect();
        assert_eq!(
            errors,
            vec![
                "linear_algebra.platform",
                "instationary.delta_t",
                "boundary.neumann[1].tag",
                "linear_solver.omega"
            ]
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { path, .. }) if path == "linear_algebra.platform"
        ));
    }

    #[test]
    fn missing_files_are_reported() {
        let dir = std::env::temp_dir();
        let mut config = Config::default();
        config.mesh.filename = "definitely_not_a_mesh_file.ron".into();
        let report = lint_config(&config, Some(&dir));
        assert!(report
            .entries()
            .iter()
            .any(|e| e.level == Level::Error && e.path == "mesh.filename"));
    }

    #[test]
    fn bc_data_counts_and_components() {
        let data = BcData {
            fixed_constraints: Some(PointBlock {
                count: 2,
                points: vec![vec![0.0, 0.0, 0.0]],
                values: vec![vec![0.0, 0.0, 0.0], vec![0.0, 0.0, 0.0]],
            }),
            force_or_pressure: Some(PointBlock {
                count: 1,
                points: vec![vec![1.0, 0.0]],
                values: vec![vec![0.0, 0.0, 1.0]],
            }),
            ..Default::default()
        };
        let report = lint_bc_data(&data);
        let paths: Vec<_> = report.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["fixed_constraints.points", "force_or_pressure.points"]
        );
        assert!(report.entries()[0]
            .message
            .contains("expected 2, found 1"));
        assert_eq!(
            format!("{}", report.entries()[1]),
            "E-1: The vector [1.0, 0.0] does not have exactly 3 components in force_or_pressure.points"
        );
    }

    fn mixed_report() -> Report {
        let mut r = Report::new();
        r.error("mesh.filename", "File \"a,b.ron\" <missing>");
        r.warning("boundary.dirichlet", "No constraints");
        r.hint("linear_solver.omega", "Unused");
        r
    }

    #[test]
    fn filter_keeps_selected_levels() {
        let report = mixed_report().filter(&[Level::Error, Level::Hint]);
        let levels: Vec<_> = report.entries().iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![Level::Error, Level::Hint]);
        assert_eq!(report.entries()[1].number, 2);
        assert!(mixed_report().filter(&[]).is_empty());
    }

    #[test]
    fn xml_output_escapes_attributes() {
        let xml = mixed_report().to_xml();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains(
            "<entry level=\"E\" number=\"0\" message=\"File &quot;a,b.ron&quot; &lt;missing&gt;\" path=\"mesh.filename\"/>"
        ));
        assert!(xml.trim_end().ends_with("</report>"));
        assert_eq!(xml.matches("<entry ").count(), 3);
    }

    #[test]
    fn csv_output_quotes_fields() {
        let csv = mixed_report().to_csv();
        let lines: Vec<_> = csv.split("\r\n").collect();
        assert_eq!(lines[0], "E,0,\"File \"\"a,b.ron\"\" <missing>\",mesh.filename");
        assert_eq!(lines[1], "W,1,No constraints,boundary.dirichlet");
        assert_eq!(lines[2], "I,2,Unused,linear_solver.omega");
        assert_eq!(lines[3], "");
    }

    #[test]
    fn colored_output_marks_levels() {
        let text = mixed_report().to_colored_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("\x1b[31mE-0: "));
        assert!(lines[1].starts_with("\x1b[33mW-1: "));
        assert!(lines[2].starts_with("\x1b[94mI-2: "));
        assert!(lines[2].ends_with("\x1b[37mlinear_solver.omega\x1b[0m"));
    }

    #[test]
    fn detect_language_from_top_level_fields() {
        let bc: Value = ron::de::from_str("(force_or_pressure: (count: 0, points: [], values: []))")
            .unwrap();
        assert_eq!(Language::detect(&bc), Language::BcData);
        let config: Value = ron::de::from_str("(output_path_and_prefix: \"out\")").unwrap();
        assert_eq!(Language::detect(&config), Language::Config);
        assert_eq!(Language::detect(&Value::Unit), Language::Config);
    }

    #[test]
    fn empty_config_lists_missing_sections() {
        let report = lint_config_fields(&Value::Unit);
        let paths: Vec<_> = report.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths.len(), CONFIG_FIELDS.len());
        assert!(paths.contains(&"mesh"));
        assert!(paths.contains(&"checkpoint"));
        assert!(report
            .entries()
            .iter()
            .all(|e| e.level == Level::Error && e.message == "Field does not exist"));
    }

    #[test]
    fn nested_missing_and_unknown_fields() {
        let value: Value = ron::de::from_str(
            "(boundary: (dirichlet: [(tag: 1), (displacment: Some((0.0, 0.0, 0.0)))], neumann: []), \
             instationary: (delta_T: 0.5))",
        )
        .unwrap();
        let report = lint_config_fields(&value);
        let find = |path: &str| report.entries().iter().find(|e| e.path == path);
        assert_eq!(
            find("boundary.dirichlet[1].tag").map(|e| e.message.as_str()),
            Some("Field does not exist")
        );
        assert_eq!(
            find("boundary.dirichlet[1].displacment").map(|e| e.message.as_str()),
            Some("Unknown field")
        );
        assert!(find("boundary.dirichlet[0].tag").is_none());
        assert_eq!(
            find("instationary.delta_T").map(|e| e.message.as_str()),
            Some("Unknown field")
        );
        assert_eq!(
            find("instationary.delta_t").map(|e| e.message.as_str()),
            Some("Field does not exist")
        );
    }

    #[test]
    fn bc_data_fields_reject_unknown_blocks() {
        let value: Value = ron::de::from_str(
            "(fixed_constraints: Some((count: 1, points: [[0.0, 0.0, 0.0]])), pressure: None)",
        )
        .unwrap();
        let report = lint_bc_data_fields(&value);
        let paths: Vec<_> = report.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["fixed_constraints.values", "pressure"]);
    }
}
