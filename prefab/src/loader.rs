//! Reading and writing templates through a [`PrefabStorage`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use redlilium_dom::{Dom, Format, decode_bytes, diff, encode};

use crate::error::{LoadError, TemplateError};
use crate::ids::{InstanceAlias, TemplateId};
use crate::path::normalize_source_path;
use crate::template_dom::{self, INSTANCES_KEY};
use crate::template_store::TemplateStore;

/// Byte storage keyed by normalized source path.
pub trait PrefabStorage {
    fn read(&self, path: &str) -> Result<Vec<u8>, LoadError>;
    fn write(&mut self, path: &str, bytes: &[u8]) -> Result<(), LoadError>;
    fn exists(&self, path: &str) -> bool;
}

/// In-memory storage.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: &str, contents: impl Into<Vec<u8>>) {
        self.files.insert(path.to_owned(), contents.into());
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }
}

impl PrefabStorage for MemoryStorage {
    fn read(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(path.to_owned()))
    }

    fn write(&mut self, path: &str, bytes: &[u8]) -> Result<(), LoadError> {
        self.files.insert(path.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}

/// Storage rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSystemStorage {
    root: PathBuf,
}

impl FileSystemStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl PrefabStorage for FileSystemStorage {
    fn read(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        let full = self.resolve(path);
        std::fs::read(&full).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LoadError::NotFound(path.to_owned())
            } else {
                LoadError::Io {
                    path: full.display().to_string(),
                    source,
                }
            }
        })
    }

    fn write(&mut self, path: &str, bytes: &[u8]) -> Result<(), LoadError> {
        let full = self.resolve(path);
        let io_err = |source| LoadError::Io {
            path: full.display().to_string(),
            source,
        };
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(&full, bytes).map_err(io_err)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }
}

/// Loads templates (nested ones first) and saves them in link form.
pub struct PrefabLoader {
    storage: Box<dyn PrefabStorage>,
    format: Format,
    pretty: bool,
}

impl PrefabLoader {
    pub fn new(storage: Box<dyn PrefabStorage>) -> Self {
        Self {
            storage,
            format: Format::Json,
            pretty: true,
        }
    }

    pub fn with_format(mut self, format: Format, pretty: bool) -> Self {
        self.format = format;
        self.pretty = pretty;
        self
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn storage(&self) -> &dyn PrefabStorage {
        self.storage.as_ref()
    }

    /// Explicit extensions win over the configured format.
    fn format_for(&self, path: &str) -> Format {
        Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Format::from_extension)
            .unwrap_or(self.format)
    }

    /// Loads `path` and every template it nests, registering them in `store`.
    ///
    /// Already registered templates are reused. Returns the id of `path`.
    pub fn load_template(&self, store: &mut TemplateStore, path: &str) -> Result<TemplateId, LoadError> {
        let mut stack = Vec::new();
        self.load_recursive(store, &normalize_source_path(path)?, &mut stack)
    }

    fn load_recursive(
        &self,
        store: &mut TemplateStore,
        path: &str,
        stack: &mut Vec<String>,
    ) -> Result<TemplateId, LoadError> {
        if let Some(id) = store.template_id_for_path(path) {
            return Ok(id);
        }
        if let Some(first) = stack.first() {
            if stack.iter().any(|p| p == path) {
                return Err(TemplateError::CyclicNesting {
                    source_path: path.to_owned(),
                    target_path: first.clone(),
                }
                .into());
            }
        }

        let bytes = self.storage.read(path)?;
        let mut dom: Dom = decode_bytes(&bytes, self.format_for(path))?;
        template_dom::validate_template_dom(&dom)?;
        log::info!("Loading template '{path}'");

        stack.push(path.to_owned());
        let members = template_dom::instances_mut(&mut dom)
            .map(std::mem::take)
            .unwrap_or_default();
        let mut links = Vec::with_capacity(members.len());
        for (alias, member) in members {
            let source = template_dom::source(&member)
                .ok_or_else(|| LoadError::MissingSource {
                    path: path.to_owned(),
                    alias: alias.clone(),
                })?
                .to_owned();
            let source_path = normalize_source_path(&source)?;
            let source_id = self.load_recursive(store, &source_path, stack)?;
            let patches = if template_dom::is_link_form(&member) {
                template_dom::link_form_patches(&member)?
            } else {
                let mut expanded = member;
                template_dom::ensure_members(&mut expanded);
                diff(store.find_template_dom(source_id)?, &expanded)
            };
            links.push((InstanceAlias::from(alias), source_id, patches));
        }
        stack.pop();

        let id = store.add_template(dom, path)?;
        for (alias, source_id, patches) in links {
            store.create_link(id, source_id, alias, patches)?;
        }
        store.set_template_dirty(id, false)?;
        store.mark_propagated(id);
        Ok(id)
    }

    /// Encodes `id` in link form.
    pub fn save_template_to_string(&self, store: &TemplateStore, id: TemplateId) -> Result<String, LoadError> {
        let template = store.find_template(id)?;
        let mut dom = template.dom().clone();
        let mut members = BTreeMap::new();
        for link_id in template.links() {
            let link = store.find_link(link_id)?;
            let source = store.find_template(link.source())?;
            members.insert(
                link.alias().as_str().to_owned(),
                template_dom::link_form_dom(source.source_path(), link.patches())?,
            );
        }
        // Unlinked members stay expanded.
        if let Some(existing) = template_dom::instances(&dom) {
            for (alias, member) in existing {
                members.entry(alias.clone()).or_insert_with(|| member.clone());
            }
        }
        dom.insert(INSTANCES_KEY, Dom::Object(members));
        Ok(encode(&dom, self.format_for(template.source_path()), self.pretty)?)
    }

    /// Writes `id` to storage and clears its dirty flag.
    pub fn save_template(&mut self, store: &mut TemplateStore, id: TemplateId) -> Result<(), LoadError> {
        let text = self.save_template_to_string(store, id)?;
        let path = store.find_template(id)?.source_path().to_owned();
        self.storage.write(&path, text.as_bytes())?;
        store.set_template_dirty(id, false)?;
        log::info!("Saved template '{path}'");
        Ok(())
    }
}

impl std::fmt::Debug for PrefabLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefabLoader")
            .field("format", &self.format)
            .field("pretty", &self.pretty)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use redlilium_dom::DomPath;

    use super::*;

    const LEAF: &str = r#"{"Entities": {"E": {"Id": "E", "Name": "Leaf", "Components": {}}}}"#;

    fn storage_with(files: &[(&str, &str)]) -> MemoryStorage {
        let mut storage = MemoryStorage::new();
        for (path, text) in files {
            storage.insert(path, text.as_bytes());
        }
        storage
    }

    #[test]
    fn loads_link_form_members() {
        let storage = storage_with(&[
            ("leaf", LEAF),
            (
                "top",
                r#"{"Entities": {}, "Instances": {"I": {"Source": "leaf",
                    "Patches": [{"op": "replace", "path": "/Entities/E/Name", "value": "Custom"}]}}}"#,
            ),
        ]);
        let loader = PrefabLoader::new(Box::new(storage));
        let mut store = TemplateStore::new();
        let top = loader.load_template(&mut store, "/top").unwrap();

        let leaf = store.template_id_for_path("leaf").unwrap();
        assert_eq!(store.links_with_source(leaf).len(), 1);
        let name = DomPath::parse("/Instances/I/Entities/E/Name").unwrap();
        assert_eq!(
            store.find_template_dom(top).unwrap().pointer(&name),
            Some(&Dom::from("Custom"))
        );
        assert!(!store.is_template_dirty(top).unwrap());
    }

    #[test]
    fn expanded_members_become_links() {
        let storage = storage_with(&[
            ("leaf", LEAF),
            (
                "top",
                r#"{"Instances": {"I": {"Source": "leaf",
                    "Entities": {"E": {"Id": "E", "Name": "Edited", "Components": {}}}}}}"#,
            ),
        ]);
        let loader = PrefabLoader::new(Box::new(storage));
        let mut store = TemplateStore::new();
        let top = loader.load_template(&mut store, "top").unwrap();
        let link = store.link_for_alias(top, "I").unwrap();
        assert_eq!(link.patches().len(), 1);
    }

    #[test]
    fn missing_source_and_missing_file() {
        let storage = storage_with(&[("top", r#"{"Instances": {"I": {"Patches": []}}}"#)]);
        let loader = PrefabLoader::new(Box::new(storage));
        let mut store = TemplateStore::new();
        assert!(matches!(
            loader.load_template(&mut store, "top"),
            Err(LoadError::MissingSource { .. })
        ));
        assert!(matches!(
            loader.load_template(&mut store, "nope"),
            Err(LoadError::NotFound(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn cyclic_files_are_rejected() {
        let storage = storage_with(&[
            ("a", r#"{"Instances": {"I": {"Source": "b", "Patches": []}}}"#),
            ("b", r#"{"Instances": {"I": {"Source": "a", "Patches": []}}}"#),
        ]);
        let loader = PrefabLoader::new(Box::new(storage));
        let mut store = TemplateStore::new();
        assert!(matches!(
            loader.load_template(&mut store, "a"),
            Err(LoadError::Template(TemplateError::CyclicNesting { .. }))
        ));
    }

    #[test]
    fn save_writes_link_form() {
        let storage = storage_with(&[
            ("leaf", LEAF),
            ("top", r#"{"Instances": {"I": {"Source": "leaf", "Patches": []}}}"#),
        ]);
        let mut loader = PrefabLoader::new(Box::new(storage)).with_format(Format::Json, false);
        let mut store = TemplateStore::new();
        let top = loader.load_template(&mut store, "top").unwrap();
        store.set_template_dirty(top, true).unwrap();

        let text = loader.save_template_to_string(&store, top).unwrap();
        let saved: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(saved["Instances"]["I"]["Source"], "leaf");
        assert_eq!(saved["Instances"]["I"]["Patches"], serde_json::json!([]));
        assert!(saved["Instances"]["I"].get("Entities").is_none());

        loader.save_template(&mut store, top).unwrap();
        assert!(!store.is_template_dirty(top).unwrap());
        assert!(loader.storage().exists("top"));
    }

    #[test]
    fn filesystem_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileSystemStorage::new(dir.path());
        storage.write("levels/town.prefab", b"{}").unwrap();
        assert!(storage.exists("levels/town.prefab"));
        assert_eq!(storage.read("levels/town.prefab").unwrap(), b"{}");
        assert!(matches!(storage.read("missing"), Err(LoadError::NotFound(_))));
    }
}
