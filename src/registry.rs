//! A bounded set of open containers.
//!
//! Layers may reference textures that live in a sibling file, so editing
//! sessions keep several containers open at once. The registry owns them in
//! insertion order, closes the oldest past [Config::max_open] (saving it
//! first when modified), and answers cross-container texture lookups.

use std::path::{Path, PathBuf};

use log::info;

use crate::brres::Brres;
use crate::config::Config;
use crate::error::BrresError;
use crate::formats::tex0::Tex0;
use crate::BrresFile;

pub struct Registry {
    max_open: usize,
    open: Vec<(PathBuf, Brres)>,
}

impl Registry {
    pub fn new(config: &Config) -> Self {
        Self {
            max_open: config.max_open.max(1),
            open: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.open.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Returns the container loaded from `path`, reading it on first use.
    /// Opening past the bound closes the oldest container.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<&mut Brres, BrresError> {
        let path = path.as_ref();
        if let Some(at) = self.open.iter().position(|(p, _)| p == path) {
            return Ok(&mut self.open[at].1);
        }
        let brres = Brres::from_file(path)?;
        self.insert(path.to_path_buf(), brres)?;
        Ok(&mut self
            .open
            .last_mut()
            .ok_or(BrresError::UnknownName(path.display().to_string()))?
            .1)
    }

    /// Registers an already built container under `path`.
    pub fn insert(&mut self, path: PathBuf, brres: Brres) -> Result<(), BrresError> {
        while self.open.len() >= self.max_open {
            let (oldest, file) = self.open.remove(0);
            close(&oldest, file)?;
        }
        self.open.push((path, brres));
        Ok(())
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&Brres> {
        let path = path.as_ref();
        self.open.iter().find(|(p, _)| p == path).map(|(_, b)| b)
    }

    pub fn get_mut(&mut self, path: impl AsRef<Path>) -> Option<&mut Brres> {
        let path = path.as_ref();
        self.open
            .iter_mut()
            .find(|(p, _)| p == path)
            .map(|(_, b)| b)
    }

    /// Looks a texture up across every open container, oldest first.
    pub fn find_texture(&self, name: &str) -> Option<&Tex0> {
        self.open.iter().find_map(|(_, b)| b.texture(name))
    }

    /// Closes everything, saving modified containers in place.
    pub fn close_all(&mut self) -> Result<(), BrresError> {
        for (path, file) in self.open.drain(..) {
            close(&path, file)?;
        }
        Ok(())
    }
}

fn close(path: &Path, brres: Brres) -> Result<(), BrresError> {
    if brres.modified {
        brres.write_to_file(path)?;
        info!("wrote file {}", path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::tex0::Tex0;

    fn container_with_texture(name: &str, texture: &str) -> Brres {
        let mut brres = Brres::new(name);
        let mut tex = Tex0::new(texture);
        tex.width = 4;
        tex.height = 4;
        tex.data = vec![0; 16];
        brres.textures.push(tex);
        brres
    }

    fn small_registry() -> Registry {
        let mut config = Config::default();
        config.max_open = 2;
        Registry::new(&config)
    }

    #[test]
    fn texture_lookup_prefers_oldest() {
        let mut registry = small_registry();
        registry
            .insert("a.brres".into(), container_with_texture("a", "shared"))
            .unwrap();
        registry
            .insert("b.brres".into(), container_with_texture("b", "shared"))
            .unwrap();
        let tex = registry.find_texture("shared").unwrap();
        assert_eq!(tex.name, "shared");
        assert!(registry.get("a.brres").is_some());
    }

    #[test]
    fn opening_past_the_bound_drops_the_oldest() {
        let mut registry = small_registry();
        for name in ["a", "b", "c"] {
            registry
                .insert(
                    format!("{}.brres", name).into(),
                    container_with_texture(name, name),
                )
                .unwrap();
        }
        assert_eq!(registry.len(), 2);
        assert!(registry.get("a.brres").is_none());
        assert!(registry.get("c.brres").is_some());
    }

    #[test]
    fn eviction_saves_modified_containers() {
        let dir = std::env::temp_dir().join("brres_registry_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("evicted.brres");
        let _ = std::fs::remove_file(&path);

        let mut registry = small_registry();
        let mut brres = container_with_texture("evicted", "tex");
        brres.mark_modified();
        registry.insert(path.clone(), brres).unwrap();
        registry
            .insert("b.brres".into(), container_with_texture("b", "b"))
            .unwrap();
        registry
            .insert("c.brres".into(), container_with_texture("c", "c"))
            .unwrap();
        assert!(path.exists());
        let reloaded = Brres::from_file(&path).unwrap();
        assert!(reloaded.has_texture("tex"));
        let _ = std::fs::remove_file(&path);
    }
}
