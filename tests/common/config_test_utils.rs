use std::ffi::OsString;
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

// env vars the config layer reads; cleared for every test
const MANAGED_VARS: &[&str] = &[
    "XDG_CONFIG_HOME",
    "FOLDERSHARE_SERVER__PORT",
    "FOLDERSHARE_SERVER__BIND",
    "FOLDERSHARE_TUNNEL__PROVIDER",
    "FOLDERSHARE_TUNNEL__SUBDOMAIN",
    "FOLDERSHARE_TUNNEL__URL_TIMEOUT_SECS",
    "FOLDERSHARE_SHARE__SYMLINKS",
];

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

struct EnvRestore {
    saved: Vec<(&'static str, Option<OsString>)>,
}

impl EnvRestore {
    fn capture() -> Self {
        Self {
            saved: MANAGED_VARS
                .iter()
                .map(|name| (*name, std::env::var_os(name)))
                .collect(),
        }
    }
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        for (name, value) in self.saved.drain(..) {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }
}

fn write_config(temp_dir: &TempDir, contents: &str) {
    let app_config_dir = temp_dir.path().join("foldershare");
    std::fs::create_dir_all(&app_config_dir).expect("create config dir");
    std::fs::write(app_config_dir.join("config.toml"), contents).expect("write config");
}

/// Runs `f` with a private config file and a clean `FOLDERSHARE_*` env.
pub fn with_config_env<T>(config_toml: &str, f: impl FnOnce() -> T) -> T {
    let _guard = env_lock().lock().unwrap_or_else(|e| e.into_inner());
    let temp_dir = TempDir::new().expect("temp dir");

    write_config(&temp_dir, config_toml);

    let restore = EnvRestore::capture();
    for name in MANAGED_VARS {
        std::env::remove_var(name);
    }
    std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());

    let result = f();
    drop(restore);
    result
}
