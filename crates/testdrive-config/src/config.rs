use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use testdrive_error::ConfigError;

use crate::layers::{CliOverrides, EnvConfig, FileConfig};
use crate::source::{pick, Source};

/// Fully resolved configuration for one scheduler run, with every field's
/// precedence-winning layer recorded for introspection (§4.10).
#[derive(Debug, Clone)]
pub struct Config {
    pub worker_slots: u32,
    pub core_budget: u32,
    pub machine_max_tasks_per_node: u32,
    pub calculate_model_build_cost: bool,
    pub gmake_j: u32,
    pub serialize_sharedlib_builds: bool,
    pub share_exes: bool,
    pub single_exe: bool,
    pub sort_tests: bool,
    pub no_batch: bool,
    pub test_root: PathBuf,
    pub output_root: Option<PathBuf>,
    pub project: Option<String>,
    pub baseline_root: Option<PathBuf>,
    pub baseline_cmp_name: Option<String>,
    pub baseline_gen_name: Option<String>,
    pub use_testreporter_template: bool,
    pub baseline_store_teststatus: bool,
    pub phase_timeout_seconds: u64,
    provenance: BTreeMap<&'static str, Source>,
}

impl Config {
    /// Every field's winning source, keyed by field name, for `status`-style
    /// introspection.
    pub fn provenance(&self) -> &BTreeMap<&'static str, Source> {
        &self.provenance
    }

    pub fn source_of(&self, field: &str) -> Option<Source> {
        self.provenance.get(field).copied()
    }
}

/// Load and parse a TOML config file. A missing path is not an error at
/// this layer — the caller decides whether "no file" is acceptable.
pub fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::FileUnreadable {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    toml::from_str(&contents).map_err(|e| ConfigError::MalformedToml {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Built-in defaults (§4.10). `machine_max_tasks_per_node` and
/// `test_root` have no globally sensible default and must come from a
/// lower-precedence layer in real deployments; here they default to
/// conservative single-node values so construction never fails outright.
fn default_machine_max_tasks_per_node() -> u32 {
    16
}

fn default_test_root() -> PathBuf {
    PathBuf::from(".")
}

/// Resolve all layers into a single `Config`, CLI > file > env > default.
pub fn resolve(cli: &CliOverrides, file: Option<&FileConfig>, env: &EnvConfig) -> Config {
    let file = file.cloned().unwrap_or_default();
    let mut provenance = BTreeMap::new();

    macro_rules! field {
        ($name:literal, $cli:expr, $file:expr, $env:expr, $default:expr) => {{
            let (value, source) = pick($cli, $file, $env, $default);
            provenance.insert($name, source);
            value
        }};
    }

    let machine_max_tasks_per_node = field!(
        "machine_max_tasks_per_node",
        cli.machine_max_tasks_per_node,
        file.machine_max_tasks_per_node,
        env.machine_max_tasks_per_node,
        default_machine_max_tasks_per_node()
    );

    let worker_slots = field!(
        "worker_slots",
        cli.worker_slots,
        file.worker_slots,
        env.worker_slots,
        machine_max_tasks_per_node
    );

    // Oversubscribed by 25% relative to the machine's nominal per-node task
    // count (§5), unless explicitly overridden at a higher-precedence layer.
    let default_core_budget = (machine_max_tasks_per_node as f64 * 1.25).floor() as u32;
    let core_budget = field!(
        "core_budget",
        cli.core_budget,
        file.core_budget,
        env.core_budget,
        default_core_budget
    );

    let calculate_model_build_cost = field!(
        "calculate_model_build_cost",
        None::<bool>,
        file.calculate_model_build_cost,
        None::<bool>,
        false
    );

    let gmake_j = field!(
        "gmake_j",
        cli.gmake_j,
        file.gmake_j,
        env.gmake_j,
        machine_max_tasks_per_node
    );

    let serialize_sharedlib_builds = field!(
        "serialize_sharedlib_builds",
        cli.serialize_sharedlib_builds,
        file.serialize_sharedlib_builds,
        None::<bool>,
        false
    );

    let share_exes = field!(
        "share_exes",
        cli.share_exes,
        file.share_exes,
        None::<bool>,
        false
    );

    let single_exe = field!(
        "single_exe",
        cli.single_exe,
        file.single_exe,
        None::<bool>,
        false
    );

    let sort_tests = field!(
        "sort_tests",
        cli.sort_tests,
        file.sort_tests,
        None::<bool>,
        true
    );

    let no_batch = field!(
        "no_batch",
        cli.no_batch,
        file.no_batch,
        env.no_batch,
        false
    );

    let test_root = field!(
        "test_root",
        cli.test_root.clone(),
        file.test_root.clone(),
        env.test_root.clone(),
        default_test_root()
    );

    let output_root = field!(
        "output_root",
        cli.output_root.clone().map(Some),
        file.output_root.clone().map(Some),
        None::<Option<PathBuf>>,
        None
    );

    let project = field!(
        "project",
        cli.project.clone().map(Some),
        file.project.clone().map(Some),
        env.project.clone().map(Some),
        None
    );

    let baseline_root = field!(
        "baseline_root",
        cli.baseline_root.clone().map(Some),
        file.baseline_root.clone().map(Some),
        None::<Option<PathBuf>>,
        None
    );

    let baseline_cmp_name = field!(
        "baseline_cmp_name",
        cli.baseline_cmp_name.clone().map(Some),
        file.baseline_cmp_name.clone().map(Some),
        None::<Option<String>>,
        None
    );

    let baseline_gen_name = field!(
        "baseline_gen_name",
        cli.baseline_gen_name.clone().map(Some),
        file.baseline_gen_name.clone().map(Some),
        None::<Option<String>>,
        None
    );

    let use_testreporter_template = field!(
        "use_testreporter_template",
        None::<bool>,
        file.use_testreporter_template,
        None::<bool>,
        true
    );

    let baseline_store_teststatus = field!(
        "baseline_store_teststatus",
        None::<bool>,
        file.baseline_store_teststatus,
        None::<bool>,
        false
    );

    let phase_timeout_seconds = field!(
        "phase_timeout_seconds",
        cli.phase_timeout_seconds,
        file.phase_timeout_seconds,
        None::<u64>,
        3600
    );

    Config {
        worker_slots,
        core_budget,
        machine_max_tasks_per_node,
        calculate_model_build_cost,
        gmake_j,
        serialize_sharedlib_builds,
        share_exes,
        single_exe,
        sort_tests,
        no_batch,
        test_root,
        output_root,
        project,
        baseline_root,
        baseline_cmp_name,
        baseline_gen_name,
        use_testreporter_template,
        baseline_store_teststatus,
        phase_timeout_seconds,
        provenance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_wins_over_everything() {
        let cli = CliOverrides {
            worker_slots: Some(4),
            ..Default::default()
        };
        let file = FileConfig {
            worker_slots: Some(8),
            ..Default::default()
        };
        let env = EnvConfig {
            worker_slots: Some(16),
            ..Default::default()
        };
        let config = resolve(&cli, Some(&file), &env);
        assert_eq!(config.worker_slots, 4);
        assert_eq!(config.source_of("worker_slots"), Some(Source::Cli));
    }

    #[test]
    fn file_wins_over_env_and_default() {
        let cli = CliOverrides::default();
        let file = FileConfig {
            core_budget: Some(20),
            ..Default::default()
        };
        let env = EnvConfig {
            core_budget: Some(99),
            ..Default::default()
        };
        let config = resolve(&cli, Some(&file), &env);
        assert_eq!(config.core_budget, 20);
        assert_eq!(config.source_of("core_budget"), Some(Source::File));
    }

    #[test]
    fn env_wins_over_default() {
        let cli = CliOverrides::default();
        let env = EnvConfig {
            no_batch: Some(true),
            ..Default::default()
        };
        let config = resolve(&cli, None, &env);
        assert!(config.no_batch);
        assert_eq!(config.source_of("no_batch"), Some(Source::Env));
    }

    #[test]
    fn default_core_budget_is_oversubscribed_by_25_percent() {
        let cli = CliOverrides {
            machine_max_tasks_per_node: Some(16),
            ..Default::default()
        };
        let config = resolve(&cli, None, &EnvConfig::default());
        assert_eq!(config.core_budget, 20);
        assert_eq!(config.source_of("core_budget"), Some(Source::Default));
    }

    #[test]
    fn worker_slots_defaults_to_machine_max_tasks_per_node() {
        let cli = CliOverrides {
            machine_max_tasks_per_node: Some(12),
            ..Default::default()
        };
        let config = resolve(&cli, None, &EnvConfig::default());
        assert_eq!(config.worker_slots, 12);
    }
}
