use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const PROJECT_CONFIG_FILE: &str = ".quant.yml";
const VCS_ROOT_MARKER: &str = ".git";

/// Project-local overrides from the nearest `.quant.yml`. The file is
/// owned by the user's repository and is read-only to us; an empty
/// config means "no override", never an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectConfig {
    pub platform: Option<String>,
    pub org: Option<String>,
    pub app: Option<String>,
    pub env: Option<String>,
}

impl ProjectConfig {
    pub fn is_empty(&self) -> bool {
        self.platform.is_none() && self.org.is_none() && self.app.is_none() && self.env.is_none()
    }
}

/// Walk upward from `start_dir` looking for `.quant.yml`. A directory
/// containing a `.git` marker bounds the search to the current
/// repository: once seen (and holding no config file itself), the walk
/// stops even if a file exists further up.
pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();

    loop {
        let candidate = current.join(PROJECT_CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }

        if current.join(VCS_ROOT_MARKER).exists() {
            return None;
        }

        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => return None,
        }
    }
}

/// Parse a project config file. Only the four recognized keys are
/// retained, and only when string-typed; unknown keys, non-string
/// values, invalid YAML, and non-mapping roots all degrade to `{}`.
pub fn load_config(path: &Path) -> ProjectConfig {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(_) => return ProjectConfig::default(),
    };

    let value: serde_yaml::Value = match serde_yaml::from_str(&contents) {
        Ok(v) => v,
        Err(_) => return ProjectConfig::default(),
    };

    if !value.is_mapping() {
        return ProjectConfig::default();
    }

    let string_key = |key: &str| -> Option<String> {
        value.get(key).and_then(|v| v.as_str()).map(str::to_string)
    };

    ProjectConfig {
        platform: string_key("platform"),
        org: string_key("org"),
        app: string_key("app"),
        env: string_key("env"),
    }
}

/// Nearest project config for `start_dir` (cwd when omitted). `{}` when
/// nothing is found.
pub fn get_project_config(start_dir: Option<&Path>) -> ProjectConfig {
    let cwd;
    let start = match start_dir {
        Some(dir) => dir,
        None => {
            cwd = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
            &cwd
        }
    };

    match find_config_file(start) {
        Some(path) => load_config(&path),
        None => ProjectConfig::default(),
    }
}
