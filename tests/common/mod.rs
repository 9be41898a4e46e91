use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Scratch area for one test: a key file, a config file and fake target roots.
pub struct TestEnvironment {
    temp_dir: TempDir,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        fs::create_dir_all(temp_dir.path().join("home"))?;
        fs::create_dir_all(temp_dir.path().join("sudoers.d"))?;
        Ok(Self { temp_dir })
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn home_root(&self) -> PathBuf {
        self.path().join("home")
    }

    pub fn sudoers_dir(&self) -> PathBuf {
        self.path().join("sudoers.d")
    }

    /// Write the key list and return its path.
    pub fn write_keys(&self, lines: &[&str]) -> Result<PathBuf> {
        let path = self.path().join("users");
        fs::write(&path, format!("{}\n", lines.join("\n")))?;
        Ok(path)
    }

    /// Write a config that points every output into the temp directory.
    pub fn write_config(&self, extra: &str) -> Result<PathBuf> {
        let path = self.path().join("config.toml");
        let contents = format!(
            "home_root = \"{}\"\nsudoers_dir = \"{}\"\n{}\n",
            self.home_root().display(),
            self.sudoers_dir().display(),
            extra
        );
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Number of entries under the fake home and sudoers roots.
    pub fn written_entries(&self) -> Result<usize> {
        Ok(fs::read_dir(self.home_root())?.count() + fs::read_dir(self.sudoers_dir())?.count())
    }
}
