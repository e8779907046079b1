//! Init command implementation

use std::io::Write;
use std::path::{Path, PathBuf};

use miette::{IntoDiagnostic, Result};
use spielplatz_bridge::BridgeConfig;
use tracing::info;

const DEFAULT_CONFIG: &str = r#"{
  // Engine WASM module, relative to this file.
  "engine": "engine.wasm",
  // Execution backend passed to the engine.
  "backend": "vm",
  // "thread" or "process".
  "isolation": "thread",
  "poolSize": 1,
  "memoryMaxPages": 2048
  // "runTimeoutMs": 10000
}
"#;

pub fn run_init(force: bool) -> Result<()> {
    let path = init_config(Path::new("."), force)?;
    info!(
        "Created {}",
        path.file_name().unwrap_or(path.as_os_str()).to_string_lossy()
    );
    Ok(())
}

/// Writes the default configuration into `dir`.
///
/// Never follows a symlink at the target path.
pub fn init_config(dir: &Path, force: bool) -> Result<PathBuf> {
    let config_path = dir.join(BridgeConfig::CONFIG_FILES[0]);

    loop {
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create_new(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_NOFOLLOW);
        }

        match options.open(&config_path) {
            Ok(mut file) => {
                file.write_all(DEFAULT_CONFIG.as_bytes()).into_diagnostic()?;
                return Ok(config_path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if !force {
                    return Err(miette::miette!(
                        "Config file already exists. Use --force to overwrite."
                    ));
                }

                match std::fs::remove_file(&config_path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e).into_diagnostic(),
                }
            }
            Err(e) => return Err(e).into_diagnostic(),
        }
    }
}
