use std::path::{Path, PathBuf};
use anyhow::Context;
use log::info;
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};

/// Values persisted in the config file (`~/.cinelog.config.json`).
/// Every field is optional; unset fields fall back to defaults.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub workdir: Option<String>,
    pub upload_dir: Option<String>,
    pub public_url_prefix: Option<String>,
}

/// Fully resolved configuration. Construction creates the working
/// directory, the upload directory and the journal file if missing.
#[derive(Debug)]
pub struct AppConfig {
    pub config_path: PathBuf,
    pub file_config: FileConfig,
    pub workdir: PathBuf,
    pub upload_dir: PathBuf,
    pub db_path: PathBuf,
    pub public_url_prefix: String,
}

impl AppConfig {
    /// Resolution order per value: explicit override, then config file,
    /// then default (`~/.cinelog`, `<workdir>/uploads`, empty prefix).
    pub fn new(
        workdir_override: Option<String>,
        upload_dir_override: Option<String>,
        public_url_override: Option<String>,
    ) -> anyhow::Result<Self> {
        let config_path = default_config_path()?;
        let file_config = read_file_config(&config_path)?;
        Self::resolve(config_path, file_config, workdir_override, upload_dir_override, public_url_override)
    }

    pub fn resolve(
        config_path: PathBuf,
        file_config: FileConfig,
        workdir_override: Option<String>,
        upload_dir_override: Option<String>,
        public_url_override: Option<String>,
    ) -> anyhow::Result<Self> {
        let workdir_str = workdir_override
            .or_else(|| file_config.workdir.clone())
            .map(Ok)
            .unwrap_or_else(|| default_workdir().map(|x| x.display().to_string()))?;
        let workdir = Self::get_or_create_workdir(&workdir_str)?;

        let upload_dir_str = upload_dir_override
            .or_else(|| file_config.upload_dir.clone())
            .unwrap_or_else(|| workdir.join("uploads").display().to_string());
        let upload_dir = Self::get_or_create_upload_dir(&workdir, &upload_dir_str)?;

        let db_path = Self::get_or_create_db_path(&workdir)?;

        let public_url_prefix = public_url_override
            .or_else(|| file_config.public_url_prefix.clone())
            .unwrap_or_default();

        Ok(Self { config_path, file_config, workdir, upload_dir, db_path, public_url_prefix })
    }

    fn get_or_create_workdir(workdir: &str) -> anyhow::Result<PathBuf> {
        let workdir = Path::new(workdir);
        if !workdir.exists() {
            std::fs::create_dir_all(workdir)?;
        }
        let workdir = workdir.canonicalize()?;
        if !workdir.is_dir() {
            anyhow::bail!("workdir is not a directory");
        }
        info!("workdir: {}", workdir.display());
        Ok(workdir)
    }

    fn get_or_create_upload_dir(workdir: &Path, upload_dir: &str) -> anyhow::Result<PathBuf> {
        // containment check must come before the directory is created
        let upload_dir = Path::new(upload_dir).absolutize_from(std::env::current_dir()?)?;
        if !upload_dir.starts_with(workdir) {
            anyhow::bail!("upload_dir is not a subdirectory of workdir");
        }
        if !upload_dir.exists() {
            std::fs::create_dir_all(&upload_dir)?;
        }
        let upload_dir = upload_dir.canonicalize()?;
        if !upload_dir.is_dir() {
            anyhow::bail!("upload_dir is not a directory");
        }
        info!("upload_dir: {}", upload_dir.display());
        Ok(upload_dir)
    }

    fn get_or_create_db_path(workdir: &Path) -> anyhow::Result<PathBuf> {
        let db_path = workdir.join("cinelog.db.json");
        if !db_path.exists() {
            std::fs::write(&db_path, "")?;
        }
        if !db_path.is_file() {
            anyhow::bail!("db_path is not a file");
        }
        info!("db_path: {}", db_path.display());
        Ok(db_path)
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let home = home::home_dir().context("cannot determine home directory")?;
    Ok(home.join(".cinelog.config.json"))
}

fn default_workdir() -> anyhow::Result<PathBuf> {
    let home = home::home_dir().context("cannot determine home directory")?;
    Ok(home.join(".cinelog"))
}

pub fn read_file_config(config_path: &Path) -> anyhow::Result<FileConfig> {
    if !config_path.exists() {
        return Ok(FileConfig::default());
    }
    let config_str = std::fs::read_to_string(config_path)?;
    let file_config = serde_json::from_str(&config_str)
        .with_context(|| format!("malformed config file: {}", config_path.display()))?;
    Ok(file_config)
}

pub fn write_file_config(config_path: &Path, file_config: &FileConfig) -> anyhow::Result<()> {
    let config_str = serde_json::to_string_pretty(file_config)?;
    std::fs::write(config_path, config_str)?;
    info!("config written: {}", config_path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_creates_workdir_layout() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("journal");
        let config = AppConfig::resolve(
            dir.path().join("config.json"),
            FileConfig::default(),
            Some(workdir.display().to_string()),
            None,
            None,
        ).unwrap();

        assert!(config.workdir.is_dir());
        assert!(config.upload_dir.is_dir());
        assert!(config.upload_dir.starts_with(&config.workdir));
        assert!(config.db_path.is_file());
        assert_eq!(config.public_url_prefix, "");
    }

    #[test]
    fn resolve_rejects_upload_dir_outside_workdir() {
        let dir = tempfile::tempdir().unwrap();
        let workdir = dir.path().join("journal");
        let elsewhere = dir.path().join("elsewhere");
        let result = AppConfig::resolve(
            dir.path().join("config.json"),
            FileConfig::default(),
            Some(workdir.display().to_string()),
            Some(elsewhere.display().to_string()),
            None,
        );
        assert!(result.is_err());
        // the rejected directory must not be left behind on disk
        assert!(!elsewhere.exists());
    }

    #[test]
    fn overrides_beat_file_config() {
        let dir = tempfile::tempdir().unwrap();
        let file_config = FileConfig {
            workdir: Some(dir.path().join("from-file").display().to_string()),
            upload_dir: None,
            public_url_prefix: Some("https://cdn.example.com/".to_string()),
        };
        let override_dir = dir.path().join("from-arg");
        let config = AppConfig::resolve(
            dir.path().join("config.json"),
            file_config,
            Some(override_dir.display().to_string()),
            None,
            None,
        ).unwrap();

        assert_eq!(config.workdir, override_dir.canonicalize().unwrap());
        // file value still applies where no override was given
        assert_eq!(config.public_url_prefix, "https://cdn.example.com/");
    }

    #[test]
    fn file_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        let file_config = FileConfig {
            workdir: Some("/tmp/reviews".to_string()),
            upload_dir: None,
            public_url_prefix: Some("https://cdn.example.com/".to_string()),
        };
        write_file_config(&config_path, &file_config).unwrap();
        let read_back = read_file_config(&config_path).unwrap();
        assert_eq!(read_back.workdir.as_deref(), Some("/tmp/reviews"));
        assert_eq!(read_back.public_url_prefix.as_deref(), Some("https://cdn.example.com/"));
    }

    #[test]
    fn missing_file_config_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let file_config = read_file_config(&dir.path().join("nope.json")).unwrap();
        assert!(file_config.workdir.is_none());
        assert!(file_config.upload_dir.is_none());
    }
}
