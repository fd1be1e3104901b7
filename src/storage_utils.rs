use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;

// STORAGE MANAGER
// Every persisted file (config, watchlist, report snapshot) is a pretty JSON
// document living in one directory.

pub struct AsyncStorageManager {
    // Absolute path to the storage directory (e.g., ".../target/debug/storage")
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// **Constructor: new_relative**
    /// Resolves the storage directory relative to the running executable.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;

        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);

        Self::new(base_dir).await
    }

    /// **Constructor: new**
    /// Uses an explicit directory. It is created right away so later saves
    /// never have to check for it.
    pub async fn new<P: Into<PathBuf>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    fn path_for(&self, filename: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", filename))
    }

    pub fn exists(&self, filename: &str) -> bool {
        self.path_for(filename).exists()
    }

    /// **Generic Save Function**
    /// Atomic write: the document goes to a .tmp sibling first and is then
    /// renamed over the target, so a crash never leaves a half-written file.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> anyhow::Result<()> {
        let final_path = self.path_for(filename);
        let tmp_path = self.base_dir.join(format!("{}.json.tmp", filename));

        let json_bytes = serde_json::to_vec_pretty(data)?;

        fs::write(&tmp_path, json_bytes).await?;
        fs::rename(tmp_path, final_path).await?;

        Ok(())
    }

    /// **Generic Load Function**
    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        let path = self.path_for(filename);

        // serde_json validates UTF-8 while parsing, so read raw bytes.
        let content = fs::read(&path).await?;

        let data = serde_json::from_slice(&content)
            .map_err(|e| anyhow::anyhow!("Invalid JSON in {:?}: {}", path, e))?;
        Ok(data)
    }

    /// Loads `filename`, or writes `T::default()` there first when the file
    /// does not exist yet.
    pub async fn load_or_init<T>(&self, filename: &str) -> anyhow::Result<T>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        if self.exists(filename) {
            return self.load(filename).await;
        }

        let data = T::default();
        self.save(filename, &data).await?;
        tracing::info!(path = ?self.path_for(filename), "wrote default file");
        Ok(data)
    }
}
