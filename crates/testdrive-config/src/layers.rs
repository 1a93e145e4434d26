use serde::Deserialize;
use std::path::PathBuf;

/// Flags supplied directly on the command line; `None` means "not
/// specified", letting lower-precedence layers take over.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub worker_slots: Option<u32>,
    pub core_budget: Option<u32>,
    pub machine_max_tasks_per_node: Option<u32>,
    pub gmake_j: Option<u32>,
    pub serialize_sharedlib_builds: Option<bool>,
    pub share_exes: Option<bool>,
    pub single_exe: Option<bool>,
    pub sort_tests: Option<bool>,
    pub no_batch: Option<bool>,
    pub test_root: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub project: Option<String>,
    pub baseline_root: Option<PathBuf>,
    pub baseline_cmp_name: Option<String>,
    pub baseline_gen_name: Option<String>,
    pub phase_timeout_seconds: Option<u64>,
}

/// The shape of `.testdrive/config.toml`. Every field optional: an absent
/// key simply falls through to the environment/default layer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub worker_slots: Option<u32>,
    pub core_budget: Option<u32>,
    pub machine_max_tasks_per_node: Option<u32>,
    pub calculate_model_build_cost: Option<bool>,
    pub gmake_j: Option<u32>,
    pub serialize_sharedlib_builds: Option<bool>,
    pub share_exes: Option<bool>,
    pub single_exe: Option<bool>,
    pub sort_tests: Option<bool>,
    pub no_batch: Option<bool>,
    pub test_root: Option<PathBuf>,
    pub output_root: Option<PathBuf>,
    pub project: Option<String>,
    pub baseline_root: Option<PathBuf>,
    pub baseline_cmp_name: Option<String>,
    pub baseline_gen_name: Option<String>,
    pub use_testreporter_template: Option<bool>,
    pub baseline_store_teststatus: Option<bool>,
    pub phase_timeout_seconds: Option<u64>,
}

/// Values pulled from the process environment (`TESTDRIVE_*`).
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub worker_slots: Option<u32>,
    pub core_budget: Option<u32>,
    pub machine_max_tasks_per_node: Option<u32>,
    pub gmake_j: Option<u32>,
    pub no_batch: Option<bool>,
    pub test_root: Option<PathBuf>,
    pub project: Option<String>,
}

impl EnvConfig {
    pub fn from_process_env() -> Self {
        Self {
            worker_slots: env_u32("TESTDRIVE_WORKER_SLOTS"),
            core_budget: env_u32("TESTDRIVE_CORE_BUDGET"),
            machine_max_tasks_per_node: env_u32("TESTDRIVE_MACHINE_MAX_TASKS_PER_NODE"),
            gmake_j: env_u32("TESTDRIVE_GMAKE_J"),
            no_batch: env_bool("TESTDRIVE_NO_BATCH"),
            test_root: std::env::var_os("TESTDRIVE_TEST_ROOT").map(PathBuf::from),
            project: std::env::var("TESTDRIVE_PROJECT").ok(),
        }
    }
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|v| match v.as_str() {
        "1" | "true" | "True" | "TRUE" => Some(true),
        "0" | "false" | "False" | "FALSE" => Some(false),
        _ => None,
    })
}
