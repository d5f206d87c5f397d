//! Diffuse textures and the texture cache.
//!
//! Textures are decoded once per path. The [`TextureCache`] is owned by
//! whoever loads assets and passed by `&mut` into scene loading; dropping it
//! drops every decoded image that no mesh still references.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::TextureError;

/// Decoded RGBA8 pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    /// Raw RGBA pixel data (width * height * 4 bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl TextureData {
    /// Texture from raw RGBA data. Returns `None` on a size mismatch.
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        (data.len() == (width * height * 4) as usize).then_some(Self { data, width, height })
    }

    /// Decode an image file (PNG or JPEG).
    pub fn from_file(path: &Path) -> Result<Self, TextureError> {
        let bytes = std::fs::read(path)?;
        let img = image::load_from_memory(&bytes)?.into_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self { data: img.into_raw(), width, height })
    }

    /// A 1x1 texture of a single color.
    pub fn solid(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { data: vec![r, g, b, a], width: 1, height: 1 }
    }
}

/// Decoded textures keyed by path.
#[derive(Debug, Default)]
pub struct TextureCache {
    entries: HashMap<PathBuf, Arc<TextureData>>,
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached texture for `path`, decoding it on first use.
    pub fn load(&mut self, path: &Path) -> Result<Arc<TextureData>, TextureError> {
        if let Some(tex) = self.entries.get(path) {
            return Ok(Arc::clone(tex));
        }
        let tex = Arc::new(TextureData::from_file(path)?);
        log::info!("Loaded texture {} ({}x{})", path.display(), tex.width, tex.height);
        self.entries.insert(path.to_path_buf(), Arc::clone(&tex));
        Ok(tex)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_png(path: &Path) {
        let img = image::RgbaImage::from_pixel(2, 3, image::Rgba([10, 20, 30, 255]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_from_rgba_checks_size() {
        assert!(TextureData::from_rgba(vec![0; 16], 2, 2).is_some());
        assert!(TextureData::from_rgba(vec![0; 15], 2, 2).is_none());
    }

    #[test]
    fn test_cache_decodes_once() {
        let path = std::env::temp_dir().join(format!("pbd_cloth_tex_{}.png", std::process::id()));
        write_png(&path);

        let mut cache = TextureCache::new();
        let a = cache.load(&path).unwrap();
        let b = cache.load(&path).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        assert_eq!((a.width, a.height), (2, 3));
        assert_eq!(&a.data[..4], &[10, 20, 30, 255]);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file_is_error() {
        let mut cache = TextureCache::new();
        assert!(matches!(
            cache.load(Path::new("definitely/not/here.png")),
            Err(TextureError::Io(_))
        ));
        assert!(cache.is_empty());
    }
}
