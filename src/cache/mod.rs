use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// On-disk store of downloaded map tiles, one directory per tile server
pub struct Cache {
    cache_dir: PathBuf,
}

impl Cache {
    /// Create a new cache with the given directory
    pub fn new<P: AsRef<Path>>(cache_dir: P) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();

        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).context("Failed to create cache directory")?;
        }

        Ok(Self { cache_dir })
    }

    /// Cached tile bytes, or None on a miss
    pub fn get_cached_tile(&self, url_template: &str, zoom: u8, x: u32, y: u32) -> Option<Vec<u8>> {
        let file_path = self.get_tile_path(url_template, zoom, x, y);
        if file_path.exists() {
            fs::read(&file_path).ok()
        } else {
            None
        }
    }

    /// Save a downloaded tile
    pub fn save_tile(
        &self,
        url_template: &str,
        zoom: u8,
        x: u32,
        y: u32,
        data: &[u8],
    ) -> Result<PathBuf> {
        let file_path = self.get_tile_path(url_template, zoom, x, y);

        if let Some(parent) = file_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .context("Failed to create parent directories for cache file")?;
            }
        }

        let mut file = File::create(&file_path).context("Failed to create cache file")?;
        file.write_all(data)
            .context("Failed to write data to cache file")?;

        Ok(file_path)
    }

    /// Tiles live under `<hash of the url template>/<zoom>/<x>/<y>.png`
    fn get_tile_path(&self, url_template: &str, zoom: u8, x: u32, y: u32) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(url_template.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        self.cache_dir
            .join(hash)
            .join(zoom.to_string())
            .join(x.to_string())
            .join(format!("{}.png", y))
    }

    /// Clear the cache
    pub fn clear(&self) -> Result<()> {
        if self.cache_dir.exists() {
            fs::remove_dir_all(&self.cache_dir).context("Failed to remove cache directory")?;
            fs::create_dir_all(&self.cache_dir).context("Failed to recreate cache directory")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OSM: &str = "https://tile.openstreetmap.org/{z}/{x}/{y}.png";
    const OTHER: &str = "https://tiles.example.org/{z}/{x}/{y}.png";

    #[test]
    fn tiles_are_stored_per_server() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path().join("tiles")).unwrap();

        assert!(cache.get_cached_tile(OSM, 15, 16051, 12318).is_none());
        let path = cache.save_tile(OSM, 15, 16051, 12318, b"tile").unwrap();
        assert!(path.ends_with("15/16051/12318.png"));

        assert_eq!(cache.get_cached_tile(OSM, 15, 16051, 12318).unwrap(), b"tile");
        assert!(cache.get_cached_tile(OTHER, 15, 16051, 12318).is_none());
    }

    #[test]
    fn clear_removes_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path()).unwrap();
        cache.save_tile(OSM, 3, 1, 2, b"tile").unwrap();

        cache.clear().unwrap();
        assert!(cache.get_cached_tile(OSM, 3, 1, 2).is_none());
        assert!(dir.path().exists());
    }
}
