use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tiny_skia::Pixmap;
use tracing::debug;

use crate::raster;
use crate::region::TextRegion;
use crate::registry::TargetId;

/// Everything needed to reopen a target without detecting again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedResult {
    pub original_ref: String,
    pub inpainted_ref: String,
    pub regions: Vec<TextRegion>,
}

impl CachedResult {
    /// Loads the original and inpainted rasters behind the two references.
    pub fn load_layers(&self) -> Result<(Pixmap, Pixmap)> {
        let original = raster::load_image(Path::new(&self.original_ref))?;
        let inpainted = raster::load_image(Path::new(&self.inpainted_ref))?;
        Ok((original, inpainted))
    }
}

pub struct ResultCache {
    dir: PathBuf,
    entries: HashMap<TargetId, CachedResult>,
}

impl ResultCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            entries: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, id: &TargetId) -> Option<&CachedResult> {
        self.entries.get(id)
    }

    pub fn insert(&mut self, id: TargetId, result: CachedResult) {
        self.entries.insert(id, result);
    }

    pub fn remove(&mut self, id: &TargetId) -> Option<CachedResult> {
        self.entries.remove(id)
    }

    /// Writes both layers as PNG next to the cache entry and records them.
    pub fn store(
        &mut self,
        id: &TargetId,
        original: &Pixmap,
        inpainted: &Pixmap,
        regions: Vec<TextRegion>,
    ) -> Result<&CachedResult> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create cache dir: {}", self.dir.display()))?;
        let stem = file_stem(id);
        let original_path = self.dir.join(format!("{stem}.original.png"));
        let inpainted_path = self.dir.join(format!("{stem}.inpainted.png"));
        raster::save_png(original, &original_path)?;
        raster::save_png(inpainted, &inpainted_path)?;
        let result = CachedResult {
            original_ref: original_path.to_string_lossy().to_string(),
            inpainted_ref: inpainted_path.to_string_lossy().to_string(),
            regions,
        };
        self.entries.insert(id.clone(), result);
        self.entries
            .get(id)
            .context("cache entry vanished after insert")
    }

    pub fn entry_path(&self, id: &TargetId) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(id)))
    }

    pub fn persist(&self, id: &TargetId) -> Result<Option<PathBuf>> {
        let Some(result) = self.entries.get(id) else {
            return Ok(None);
        };
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create cache dir: {}", self.dir.display()))?;
        let path = self.entry_path(id);
        let content = serde_json::to_string_pretty(result)?;
        fs::write(&path, content)
            .with_context(|| format!("failed to write cache entry: {}", path.display()))?;
        debug!("cached {id} at {}", path.display());
        Ok(Some(path))
    }

    /// Reads the entry for `id` from disk into memory, if one was persisted.
    pub fn load(&mut self, id: &TargetId) -> Result<Option<&CachedResult>> {
        let path = self.entry_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read cache entry: {}", path.display()))?;
        let result: CachedResult = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse cache entry: {}", path.display()))?;
        self.entries.insert(id.clone(), result);
        Ok(self.entries.get(id))
    }
}

fn file_stem(id: &TargetId) -> String {
    format!("{:x}", md5::compute(id.as_str().as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{region_at, solid};

    #[test]
    fn persisted_entries_survive_a_new_cache() {
        let dir = tempfile::tempdir().expect("tempdir");
        let id = TargetId::new("https://example.com/page/1.png");
        let original = solid(8, 6, [10, 20, 30, 255]);
        let inpainted = solid(8, 6, [200, 200, 200, 255]);
        let mut region = region_at(3, 4.0, 3.0, "hello");
        region.original_text = Some("こんにちは".to_string());

        let mut cache = ResultCache::new(dir.path());
        cache
            .store(&id, &original, &inpainted, vec![region.clone()])
            .expect("store");
        let path = cache.persist(&id).expect("persist").expect("path");
        assert!(path.file_name().is_some_and(|name| {
            name.to_string_lossy().len() == "0123456789abcdef0123456789abcdef.json".len()
        }));

        let mut reopened = ResultCache::new(dir.path());
        let loaded = reopened.load(&id).expect("load").expect("entry").clone();
        assert_eq!(loaded.regions, vec![region]);
        let (base, layer) = loaded.load_layers().expect("layers");
        assert_eq!(base.data(), original.data());
        assert_eq!(layer.data(), inpainted.data());
    }

    #[test]
    fn unknown_targets_are_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut cache = ResultCache::new(dir.path());
        let id = TargetId::new("missing");
        assert!(cache.persist(&id).expect("persist").is_none());
        assert!(cache.load(&id).expect("load").is_none());
    }

    #[test]
    fn regions_serialize_with_every_field() {
        let result = CachedResult {
            original_ref: "a.png".to_string(),
            inpainted_ref: "b.png".to_string(),
            regions: vec![region_at(1, 10.0, 10.0, "x")],
        };
        let value = serde_json::to_value(&result).expect("json");
        let region = &value["regions"][0];
        for key in [
            "id",
            "boundingBox",
            "originalText",
            "text",
            "style",
            "rotationRadians",
            "orientation",
            "confidence",
        ] {
            assert!(region.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["originalRef"], "a.png");
    }
}
