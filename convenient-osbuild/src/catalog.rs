//! Source catalog: classified inventory of every file under the source root
//!
//! Classification is by extension and total: each regular file is exactly
//! one of ignored, header, compilable, CRT startup or pre-built object.
//! CRT startup units are kept apart from ordinary compilable units so the
//! target-claiming rule never filters them. Only files under the libraries
//! directory can be CRT units; a `crtc.c` in a driver is ordinary source.

use crate::config::{BuildConfig, Layout};
use crate::error::{BuildError, BuildResult};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

/// Object file suffix
pub const OBJECT_SUFFIX: &str = "o";

/// Source language of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    C,
    Cpp,
    Assembly,
}

impl Language {
    /// Language of a compilable file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "c" => Some(Language::C),
            "cpp" | "cc" | "cxx" => Some(Language::Cpp),
            "asm" | "s" | "S" => Some(Language::Assembly),
            _ => None,
        }
    }

    /// Toolchain binary that compiles this language
    pub fn tool(self) -> ToolKind {
        match self {
            Language::C | Language::Cpp => ToolKind::Compiler,
            Language::Assembly => ToolKind::Assembler,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::C => write!(f, "C"),
            Language::Cpp => write!(f, "C++"),
            Language::Assembly => write!(f, "Assembly"),
        }
    }
}

/// What a catalogued file is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitRole {
    Header,
    Compilable,
    CrtStartup,
}

/// Which toolchain binary a unit is fed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Compiler,
    Assembler,
}

/// Extension-based classification of one regular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Ignored,
    Header,
    Compilable(Language),
    CrtStartup(Language),
    PrebuiltObject,
}

/// Classify `path` by name alone; files whose name starts with `crt_prefix`
/// and carry a compilable extension are CRT startup candidates.
/// [`SourceCatalog::visit_file`] keeps the CRT role only under the
/// libraries directory.
pub fn classify(path: &Path, crt_prefix: &str) -> FileClass {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return FileClass::Ignored;
    };

    match ext {
        "h" | "hpp" => FileClass::Header,
        OBJECT_SUFFIX => FileClass::PrebuiltObject,
        _ => match Language::from_extension(ext) {
            Some(language) => {
                let is_crt = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !crt_prefix.is_empty() && n.starts_with(crt_prefix));
                if is_crt {
                    FileClass::CrtStartup(language)
                } else {
                    FileClass::Compilable(language)
                }
            }
            None => FileClass::Ignored,
        },
    }
}

/// Map a source path to its object path: the source-root prefix becomes the
/// output-root prefix and the language suffix becomes the object suffix.
///
/// Paths already under the output root map onto themselves (modulo suffix),
/// so the function is idempotent. Returns `None` for paths under neither root.
pub fn derive_output_path(layout: &Layout, path: &Path) -> Option<PathBuf> {
    let mirrored = layout.output_dir_for(path)?;
    let ext = mirrored.extension().and_then(|e| e.to_str())?;
    let known = ext == OBJECT_SUFFIX
        || ext == "h"
        || ext == "hpp"
        || Language::from_extension(ext).is_some();
    if !known {
        return None;
    }
    Some(mirrored.with_extension(OBJECT_SUFFIX))
}

/// One compilable, header or CRT startup file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub language: Language,
    pub role: UnitRole,
    /// Assigned during the scan
    pub tool: Option<ToolKind>,
    /// Assigned during the scan
    pub output: Option<PathBuf>,
}

impl SourceUnit {
    /// Unit with tool and output path assigned from the layout
    pub fn new(layout: &Layout, path: PathBuf, language: Language, role: UnitRole) -> Self {
        let output = derive_output_path(layout, &path);
        Self {
            tool: Some(language.tool()),
            output,
            path,
            language,
            role,
        }
    }

    /// Units that are not headers and have both a tool and an output path
    pub fn is_eligible(&self) -> bool {
        self.role != UnitRole::Header && self.tool.is_some() && self.output.is_some()
    }

    /// Whether the unit lives under `dir` (component-wise)
    pub fn is_under(&self, dir: &Path) -> bool {
        self.path.starts_with(dir)
    }
}

/// Per-language file and line counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LanguageStats {
    pub files: usize,
    pub lines: usize,
}

/// Catalog statistics, keyed explicitly rather than by ordinal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub languages: BTreeMap<Language, LanguageStats>,
    pub headers: LanguageStats,
    pub prebuilt_objects: usize,
}

/// Classified inventory of the source tree.
#[derive(Debug, Clone)]
pub struct SourceCatalog {
    layout: Layout,
    crt_prefix: String,
    units: Vec<SourceUnit>,
    headers: Vec<SourceUnit>,
    crt: Vec<SourceUnit>,
    objects: Vec<PathBuf>,
}

impl SourceCatalog {
    /// Empty catalog for the configured layout
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            layout: config.layout.clone(),
            crt_prefix: config.crt_prefix.clone(),
            units: Vec::new(),
            headers: Vec::new(),
            crt: Vec::new(),
            objects: Vec::new(),
        }
    }

    /// Walk the source root and classify every file
    pub fn scan(config: &BuildConfig) -> BuildResult<Self> {
        let mut catalog = Self::new(config);
        walk(&config.layout.src_dir, |entry| {
            if entry.file_type().is_file() {
                catalog.visit_file(entry.path());
            }
            Ok(())
        })?;
        catalog.log_summary();
        Ok(catalog)
    }

    /// Classify one regular file; CRT candidates outside the libraries
    /// directory are ordinary compilable units
    pub fn visit_file(&mut self, path: &Path) {
        let class = match classify(path, &self.crt_prefix) {
            FileClass::CrtStartup(language) if !path.starts_with(&self.layout.libs_dir) => {
                FileClass::Compilable(language)
            }
            class => class,
        };
        match class {
            FileClass::Ignored => {}
            FileClass::Header => self.headers.push(SourceUnit::new(
                &self.layout,
                path.to_path_buf(),
                Language::C,
                UnitRole::Header,
            )),
            FileClass::Compilable(language) => self.units.push(SourceUnit::new(
                &self.layout,
                path.to_path_buf(),
                language,
                UnitRole::Compilable,
            )),
            FileClass::CrtStartup(language) => self.crt.push(SourceUnit::new(
                &self.layout,
                path.to_path_buf(),
                language,
                UnitRole::CrtStartup,
            )),
            FileClass::PrebuiltObject => self.objects.push(path.to_path_buf()),
        }
    }

    pub(crate) fn log_summary(&self) {
        info!(
            "Catalogued {} compilable units, {} headers, {} CRT units, {} objects",
            self.units.len(),
            self.headers.len(),
            self.crt.len(),
            self.objects.len()
        );
    }

    /// Compilable units (CRT units excluded)
    pub fn units(&self) -> &[SourceUnit] {
        &self.units
    }

    pub fn headers(&self) -> &[SourceUnit] {
        &self.headers
    }

    /// CRT startup units, global to every library
    pub fn crt_units(&self) -> &[SourceUnit] {
        &self.crt
    }

    /// Pre-built object files found in the source tree
    pub fn prebuilt_objects(&self) -> &[PathBuf] {
        &self.objects
    }

    /// Compilable units under `dir`
    pub fn units_under<'a>(&'a self, dir: &'a Path) -> impl Iterator<Item = &'a SourceUnit> + 'a {
        self.units.iter().filter(move |u| u.is_under(dir))
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// File and line counts per language; reads every catalogued file
    pub fn language_stats(&self) -> BuildResult<CatalogStats> {
        let mut stats = CatalogStats {
            prebuilt_objects: self.objects.len(),
            ..CatalogStats::default()
        };

        for unit in self.units.iter().chain(&self.crt) {
            let entry = stats.languages.entry(unit.language).or_default();
            entry.files += 1;
            entry.lines += count_lines(&unit.path)?;
        }
        for header in &self.headers {
            stats.headers.files += 1;
            stats.headers.lines += count_lines(&header.path)?;
        }

        Ok(stats)
    }
}

fn count_lines(path: &Path) -> BuildResult<usize> {
    let bytes = std::fs::read(path).map_err(|e| BuildError::Io(path.to_path_buf(), e))?;
    Ok(String::from_utf8_lossy(&bytes).lines().count())
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Depth-first walk of `root` in file-name order, skipping hidden entries.
/// Any unreadable entry aborts the walk.
pub(crate) fn walk(
    root: &Path,
    mut visit: impl FnMut(&DirEntry) -> BuildResult<()>,
) -> BuildResult<()> {
    debug!("Walking {}", root.display());

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = entry.map_err(|source| BuildError::Scan {
            path: source
                .path()
                .map_or_else(|| root.to_path_buf(), Path::to_path_buf),
            source,
        })?;
        visit(&entry)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_classification_is_total() {
        let c = |p: &str| classify(Path::new(p), "crt");

        assert_eq!(c("a/kmain.c"), FileClass::Compilable(Language::C));
        assert_eq!(c("a/boot.asm"), FileClass::Compilable(Language::Assembly));
        assert_eq!(c("a/start.S"), FileClass::Compilable(Language::Assembly));
        assert_eq!(c("a/ui.cpp"), FileClass::Compilable(Language::Cpp));
        assert_eq!(c("a/crt0.asm"), FileClass::CrtStartup(Language::Assembly));
        assert_eq!(c("a/crti.c"), FileClass::CrtStartup(Language::C));
        assert_eq!(c("a/mem.h"), FileClass::Header);
        assert_eq!(c("a/font.o"), FileClass::PrebuiltObject);
        assert_eq!(c("a/README.md"), FileClass::Ignored);
        assert_eq!(c("a/Makefile"), FileClass::Ignored);
        // A header is never CRT, whatever its name
        assert_eq!(c("a/crt.h"), FileClass::Header);
    }

    #[test]
    fn test_crt_role_is_limited_to_libraries() {
        let config = BuildConfig::for_project("/os");
        let mut catalog = SourceCatalog::new(&config);

        catalog.visit_file(Path::new("/os/src/drivers/video/crtc.c"));
        catalog.visit_file(Path::new("/os/src/kernel/crt_helpers.asm"));
        catalog.visit_file(Path::new("/os/src/libs/LibC/crt0.asm"));

        let units: Vec<_> = catalog.units().iter().map(|u| u.path.clone()).collect();
        assert_eq!(
            units,
            vec![
                PathBuf::from("/os/src/drivers/video/crtc.c"),
                PathBuf::from("/os/src/kernel/crt_helpers.asm"),
            ]
        );
        assert!(catalog.units().iter().all(|u| u.role == UnitRole::Compilable));

        assert_eq!(catalog.crt_units().len(), 1);
        assert_eq!(catalog.crt_units()[0].path, PathBuf::from("/os/src/libs/LibC/crt0.asm"));
        assert_eq!(catalog.crt_units()[0].role, UnitRole::CrtStartup);
    }

    #[test]
    fn test_derive_output_path_is_idempotent() {
        let config = BuildConfig::for_project("/os");
        let layout = &config.layout;

        let once = derive_output_path(layout, Path::new("/os/src/kernel/mem/kmalloc.c")).unwrap();
        assert_eq!(once, PathBuf::from("/os/out/kernel/mem/kmalloc.o"));

        let twice = derive_output_path(layout, &once).unwrap();
        assert_eq!(once, twice);

        let asm = derive_output_path(layout, Path::new("/os/src/kernel/boot.asm")).unwrap();
        assert_eq!(asm, PathBuf::from("/os/out/kernel/boot.o"));
        assert_eq!(derive_output_path(layout, &asm).unwrap(), asm);

        assert_eq!(derive_output_path(layout, Path::new("/tmp/x.c")), None);
        assert_eq!(derive_output_path(layout, Path::new("/os/src/notes.txt")), None);
    }

    #[test]
    fn test_suffix_replacement_is_structural() {
        // Only the extension changes; ".c" inside directory names survives
        let config = BuildConfig::for_project("/os");
        let src = Path::new("/os/src/libs/lib.core/x.c.c");
        let out = derive_output_path(&config.layout, src).unwrap();
        assert_eq!(out, PathBuf::from("/os/out/libs/lib.core/x.c.o"));
    }

    #[test]
    fn test_scan_skips_hidden_and_separates_crt() {
        let tmp = TempDir::new().unwrap();
        let config = BuildConfig::for_project(tmp.path());
        let src = &config.layout.src_dir;

        touch(src, "kernel/kmain.c", "int main;\n");
        touch(src, "kernel/entry.asm", "bits 64\n");
        touch(src, "kernel/kmain.h", "#pragma once\n");
        touch(src, "libs/LibC/crt0.asm", "global _start\n");
        touch(src, "libs/LibC/font.o", "");
        touch(src, ".git/objects/x.c", "");
        touch(src, "kernel/.cache/gen.c", "");

        let catalog = SourceCatalog::scan(&config).unwrap();

        let names: Vec<_> = catalog
            .units()
            .iter()
            .map(|u| u.path.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["entry.asm", "kmain.c"]);
        assert_eq!(catalog.headers().len(), 1);
        assert_eq!(catalog.crt_units().len(), 1);
        assert_eq!(catalog.prebuilt_objects().len(), 1);

        for unit in catalog.units() {
            assert!(unit.is_eligible());
            assert!(unit.output.as_ref().unwrap().starts_with(&config.layout.out_dir));
        }
        // Headers get a tool and output path too, but are never eligible
        assert!(catalog.headers()[0].tool.is_some());
        assert!(!catalog.headers()[0].is_eligible());
    }

    #[test]
    fn test_scan_of_missing_root_fails() {
        let tmp = TempDir::new().unwrap();
        let config = BuildConfig::for_project(tmp.path().join("nowhere"));

        let err = SourceCatalog::scan(&config).unwrap_err();
        assert!(matches!(err, BuildError::Scan { .. }));
    }

    #[test]
    fn test_language_stats() {
        let tmp = TempDir::new().unwrap();
        let config = BuildConfig::for_project(tmp.path());
        let src = &config.layout.src_dir;

        touch(src, "kernel/a.c", "a\nb\nc\n");
        touch(src, "kernel/b.c", "a\n");
        touch(src, "kernel/boot.asm", "x\ny\n");
        touch(src, "kernel/a.h", "h\n");

        let stats = SourceCatalog::scan(&config).unwrap().language_stats().unwrap();

        assert_eq!(stats.languages[&Language::C], LanguageStats { files: 2, lines: 4 });
        assert_eq!(stats.languages[&Language::Assembly], LanguageStats { files: 1, lines: 2 });
        assert!(!stats.languages.contains_key(&Language::Cpp));
        assert_eq!(stats.headers, LanguageStats { files: 1, lines: 1 });
    }
}
