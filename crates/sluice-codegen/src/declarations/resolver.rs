//! Resolves a recipe against the source tree into a [`DeclarationArtifact`]

use super::cache::{ModuleCache, WatchedFileSet};
use super::extract::{parse_module, Declaration, DeclarationKind, ModuleDeclarations};
use super::recipe::{parse_recipe, Directive, RecipeLine, Selection};
use super::DeclarationArtifact;
use crate::error::DeclarationError;
use crate::GENERATED_FILE_BANNER;
use sluice_core::fingerprint::ContentFingerprint;
use sluice_core::NewLine;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

pub const RECIPE_PATH: &str = "vs/monaco.d.ts.recipe";
pub const DECLARATION_PATH: &str = "vs/monaco.d.ts";
pub const ENUMS_PATH: &str = "vs/editor/common/standalone/standaloneEnums.ts";

/// File access used by the resolver
pub trait FsProvider: Send {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Called before a module's backing file is read
    fn on_will_read(&mut self, _module_id: &str, _path: &Path) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiskFs;

impl FsProvider for DiskFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Disk access that remembers every module file it was asked to read
#[derive(Debug, Default)]
pub struct RegisteringFs {
    files: WatchedFileSet,
    enabled: bool,
}

impl RegisteringFs {
    pub fn new(enabled: bool) -> Self {
        Self {
            files: WatchedFileSet::default(),
            enabled,
        }
    }

    pub fn files(&self) -> &WatchedFileSet {
        &self.files
    }

    pub fn take_pending(&mut self) -> Vec<(PathBuf, String)> {
        self.files.take_pending()
    }
}

impl FsProvider for RegisteringFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn on_will_read(&mut self, module_id: &str, path: &Path) {
        if self.enabled && self.files.register(path, module_id) {
            debug!("Registered {:?} for {}", path, module_id);
        }
    }
}

pub struct DeclarationResolver<F: FsProvider = DiskFs> {
    src_root: PathBuf,
    fs: F,
    cache: ModuleCache,
}

impl<F: FsProvider> DeclarationResolver<F> {
    pub fn new(src_root: impl Into<PathBuf>, fs: F) -> Self {
        Self {
            src_root: src_root.into(),
            fs,
            cache: ModuleCache::default(),
        }
    }

    pub fn src_root(&self) -> &Path {
        &self.src_root
    }

    pub fn recipe_path(&self) -> PathBuf {
        self.src_root.join(RECIPE_PATH)
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn fs_mut(&mut self) -> &mut F {
        &mut self.fs
    }

    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    /// Drop the cached declarations of `module_id`; the next run re-reads it
    pub fn invalidate_cache(&mut self, module_id: &str) -> bool {
        self.cache.invalidate(module_id)
    }

    pub fn run(&mut self) -> Result<DeclarationArtifact, DeclarationError> {
        let recipe_path = self.recipe_path();
        let recipe = self
            .fs
            .read_to_string(&recipe_path)
            .map_err(|e| DeclarationError::io(&recipe_path, e))?;
        let endl = NewLine::detect(&recipe).as_str();

        let mut lines: Vec<String> = Vec::new();
        let mut enums: BTreeMap<String, String> = BTreeMap::new();
        for line in parse_recipe(&recipe)? {
            let directive = match line {
                RecipeLine::Text(text) => {
                    lines.push(text);
                    continue;
                }
                RecipeLine::Include(directive) => directive,
            };

            let module = self.module(&directive.module_id)?;
            for (idx, declaration) in select(&directive, &module)?.into_iter().enumerate() {
                let text = directive.rewrite(&declaration.text);
                if idx > 0 {
                    lines.push(String::new());
                }
                for l in text.lines() {
                    lines.push(if l.is_empty() { String::new() } else { format!("{}{}", directive.indent, l) });
                }
                if declaration.kind == DeclarationKind::Enum {
                    enums.entry(declaration.name.clone()).or_insert(text);
                }
            }
        }

        let mut content = lines.join(endl);
        if recipe.ends_with('\n') {
            content.push_str(endl);
        }
        let enums = render_enums(enums.values(), endl);

        let file_path = self.src_root.join(DECLARATION_PATH);
        let enums_path = self.src_root.join(ENUMS_PATH);
        let fingerprint = fingerprint_of(&content, &enums);
        let is_the_same = match (self.fs.read_to_string(&file_path), self.fs.read_to_string(&enums_path)) {
            (Ok(current), Ok(current_enums)) => fingerprint.content_matches(&fingerprint_of(&current, &current_enums)),
            _ => false,
        };

        Ok(DeclarationArtifact {
            content,
            enums,
            fingerprint,
            file_path,
            enums_path,
            is_the_same,
        })
    }

    fn module(&mut self, module_id: &str) -> Result<Arc<ModuleDeclarations>, DeclarationError> {
        if let Some(declarations) = self.cache.get(module_id) {
            return Ok(declarations);
        }

        let path = [".ts", ".d.ts"]
            .iter()
            .map(|ext| self.src_root.join(format!("{}{}", module_id, ext)))
            .find(|path| self.fs.exists(path))
            .ok_or_else(|| DeclarationError::resolution(module_id, "no such module"))?;

        self.fs.on_will_read(module_id, &path);
        let text = self
            .fs
            .read_to_string(&path)
            .map_err(|e| DeclarationError::io(&path, e))?;
        debug!("Parsed {} from {:?}", module_id, path);
        Ok(self.cache.insert(module_id, parse_module(&text)))
    }
}

fn select<'m>(directive: &Directive, module: &'m ModuleDeclarations) -> Result<Vec<&'m Declaration>, DeclarationError> {
    match &directive.selection {
        Selection::Only(names) => {
            let mut selected = Vec::new();
            for name in names {
                let before = selected.len();
                selected.extend(module.iter().filter(|d| &d.name == name));
                if selected.len() == before {
                    return Err(DeclarationError::resolution(
                        &directive.module_id,
                        format!("cannot find type {}", name),
                    ));
                }
            }
            Ok(selected)
        }
        Selection::AllExcept(excluded) => Ok(module.iter().filter(|d| !excluded.contains(&d.name)).collect()),
    }
}

fn render_enums<'a>(enums: impl Iterator<Item = &'a String>, endl: &str) -> String {
    let mut lines: Vec<&str> = GENERATED_FILE_BANNER.to_vec();
    lines.push("");
    for text in enums {
        lines.extend(text.lines());
        lines.push("");
    }
    lines.join(endl)
}

/// Fingerprint over both outputs, insensitive to line endings
fn fingerprint_of(content: &str, enums: &str) -> ContentFingerprint {
    let content = content.replace("\r\n", "\n");
    let enums = enums.replace("\r\n", "\n");
    ContentFingerprint::of([content.as_str(), enums.as_str()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory tree that counts reads per path
    #[derive(Default)]
    struct MemoryFs {
        files: HashMap<PathBuf, String>,
        reads: Mutex<HashMap<PathBuf, usize>>,
    }

    impl MemoryFs {
        fn with(mut self, path: &str, text: &str) -> Self {
            self.files.insert(PathBuf::from("/src").join(path), text.to_string());
            self
        }

        fn reads(&self, path: &str) -> usize {
            let reads = self.reads.lock().unwrap();
            reads.get(&PathBuf::from("/src").join(path)).copied().unwrap_or(0)
        }
    }

    impl FsProvider for MemoryFs {
        fn exists(&self, path: &Path) -> bool {
            self.files.contains_key(path)
        }

        fn read_to_string(&self, path: &Path) -> io::Result<String> {
            *self.reads.lock().unwrap().entry(path.to_path_buf()).or_default() += 1;
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        }
    }

    const RECIPE: &str = "declare namespace monaco {\n\t#include(vs/base/range;IRange=>Range): IRange\n\t#includeAll(vs/base/enums): Hidden\n}\n";

    fn tree() -> MemoryFs {
        MemoryFs::default()
            .with(RECIPE_PATH, RECIPE)
            .with("vs/base/range.ts", "export interface IRange {\n\tstart: number;\n}\n")
            .with(
                "vs/base/enums.d.ts",
                "export enum Zeta {\n\tA = 1\n}\nexport enum Alpha {\n\tB = 2\n}\nexport type Hidden = string;\n",
            )
    }

    #[test]
    fn test_run_assembles_declarations_and_enums() {
        let mut resolver = DeclarationResolver::new("/src", tree());
        let artifact = resolver.run().unwrap();

        assert!(artifact.content.contains("\texport interface Range {\n\t\tstart: number;\n\t}"));
        assert!(!artifact.content.contains("Hidden"));
        assert!(artifact.content.ends_with("}\n"));
        assert!(!artifact.is_the_same);

        let alpha = artifact.enums.find("export enum Alpha").unwrap();
        let zeta = artifact.enums.find("export enum Zeta").unwrap();
        assert!(alpha < zeta);
        assert!(artifact.enums.contains("// THIS IS A GENERATED FILE. DO NOT EDIT DIRECTLY."));
    }

    #[test]
    fn test_modules_are_cached_until_invalidated() {
        let mut resolver = DeclarationResolver::new("/src", tree());
        resolver.run().unwrap();
        resolver.run().unwrap();
        assert_eq!(resolver.fs().reads("vs/base/range.ts"), 1);

        assert!(resolver.invalidate_cache("vs/base/range"));
        resolver.run().unwrap();
        assert_eq!(resolver.fs().reads("vs/base/range.ts"), 2);
    }

    #[test]
    fn test_identical_output_on_disk_is_the_same() {
        let first = DeclarationResolver::new("/src", tree()).run().unwrap();
        let on_disk = tree()
            .with(DECLARATION_PATH, &first.content.replace('\n', "\r\n"))
            .with(ENUMS_PATH, &first.enums);

        let second = DeclarationResolver::new("/src", on_disk).run().unwrap();
        assert!(second.is_the_same);
    }

    #[test]
    fn test_missing_names_and_modules_fail() {
        let mut missing_name = DeclarationResolver::new(
            "/src",
            tree().with(RECIPE_PATH, "#include(vs/base/range): IPosition\n"),
        );
        let err = missing_name.run().unwrap_err();
        assert!(matches!(err, DeclarationError::Resolution { ref module, .. } if module == "vs/base/range"));

        let mut missing_module =
            DeclarationResolver::new("/src", tree().with(RECIPE_PATH, "#include(vs/base/nope): A\n"));
        assert!(missing_module.run().is_err());
    }
}
