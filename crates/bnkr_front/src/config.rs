use bnkr_core::SystemConfig;
use directories_next::ProjectDirs;
use thiserror::Error;

use std::path::{Path, PathBuf};
use std::{fs, io};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {err}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    #[error("failed to parse config file {}: {err}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        err: toml::de::Error,
    },

    #[error(transparent)]
    Invalid(#[from] bnkr_core::Error),
}

/// Where the config file is looked for if no path is given.
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("bunkersim", "", "").map(|dir| dir.config_dir().join("config.toml"))
}

/// Parse and validate a config. Everything not given is left at it's default.
pub fn from_toml(src: &str, path: &Path) -> Result<SystemConfig, ConfigError> {
    let config: SystemConfig = toml::from_str(src).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        err,
    })?;
    config.validate()?;
    Ok(config)
}

/// Load the config file at `path`.
pub fn load(path: &Path) -> Result<SystemConfig, ConfigError> {
    let src = fs::read_to_string(path).map_err(|err| ConfigError::Read {
        path: path.to_path_buf(),
        err,
    })?;
    let config = from_toml(&src, path)?;
    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Try to load the config file at the default location. If there is none, or it can't be loaded,
/// the default config is used.
pub fn from_file_or_default() -> SystemConfig {
    let Some(path) = default_path() else {
        warn!("failed to find config directory, using default config");
        return SystemConfig::default();
    };
    if !path.exists() {
        debug!("no config file at {}, using default config", path.display());
        return SystemConfig::default();
    }
    match load(&path) {
        Ok(config) => config,
        Err(err) => {
            warn!("{err}, using default config");
            SystemConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bnkr_core::AddrRange;

    #[test]
    fn partial_config() {
        let src = r#"
            seed = 3

            [l1]
            size = "32kB"
            latency = 2

            [l2]
            size = "1MiB"
            latency = 3

            [l2.bunker]
            stride = 1
            radix = 2
            range = { start = "0xd3d40", end = 0xf7db0 }
        "#;

        let config = from_toml(src, Path::new("config.toml")).unwrap();
        assert_eq!(config.seed, 3);
        assert_eq!(config.block_size, 64);
        assert_eq!(config.l1.size, 32 * 1024);
        assert_eq!(config.l2.size, 1024 * 1024);

        let bunker = config.l2.bunker.unwrap();
        assert_eq!(bunker.radix, 2);
        assert_eq!(bunker.range, Some(AddrRange::new(0xd3d40, 0xf7db0)));
        assert_eq!(config.memory, SystemConfig::default().memory);
    }

    #[test]
    fn invalid_config() {
        let err = from_toml("block_size = 0", Path::new("config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = from_toml("[l1]\nsize = \"12 parsecs\"", Path::new("config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file() {
        let err = load(Path::new("/does/not/exist.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
