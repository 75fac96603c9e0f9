//! Manifest registry: typed build targets discovered from manifests
//!
//! Each directory holding a manifest becomes one target that claims every
//! catalogued source beneath it. Manifests nested inside an already-claimed
//! subtree are not discovered. Libraries are ordered with the base runtime
//! library first because every other target implicitly links against it.

use crate::catalog::{walk, SourceCatalog, SourceUnit};
use crate::config::{BuildConfig, Layout};
use crate::error::{BuildError, BuildResult, ManifestError};
use crate::manifest::{kind_by_position, LinkMode, Manifest, TargetKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One process, library or driver described by a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildTarget {
    pub kind: TargetKind,
    pub name: String,
    pub linking: LinkMode,
    /// Output subpath under the sysroot (libraries only)
    pub output_subpath: Option<PathBuf>,
    /// Declared library dependencies
    pub dependencies: Vec<String>,
    /// Declared dependencies matching no library target
    pub unresolved: Vec<String>,
    /// Directory owning the manifest
    pub dir: PathBuf,
    /// Mirror of `dir` under the output root
    pub output_dir: PathBuf,
    pub manifest_path: PathBuf,
    /// Compilable units claimed by this target
    pub sources: Vec<SourceUnit>,
    /// Headers claimed by this target
    pub headers: Vec<PathBuf>,
    pub cflags: Vec<String>,
    pub ldflags: Vec<String>,
}

impl BuildTarget {
    /// Turn a validated manifest into a target
    pub fn from_manifest(manifest: Manifest, layout: &Layout) -> Result<Self, ManifestError> {
        let kind = manifest.classify(layout)?;

        let linking = match (kind, manifest.linking) {
            (_, Some(mode)) => mode,
            // Drivers are always linked relocatable; the field is meaningless
            (TargetKind::Driver, None) => LinkMode::Static,
            (_, None) => {
                return Err(ManifestError::MissingField {
                    path: manifest.path.clone(),
                    field: "linking",
                });
            }
        };

        let dir = manifest.dir().to_path_buf();
        let output_dir = layout
            .output_dir_for(&dir)
            .unwrap_or_else(|| layout.out_dir.join(&manifest.name));

        Ok(Self {
            kind,
            name: manifest.name,
            linking,
            output_subpath: if kind == TargetKind::Library {
                manifest.output_subpath
            } else {
                None
            },
            dependencies: manifest.libs,
            unresolved: Vec::new(),
            dir,
            output_dir,
            manifest_path: manifest.path,
            sources: Vec::new(),
            headers: Vec::new(),
            cflags: manifest.cflags,
            ldflags: manifest.ldflags,
        })
    }

    /// Whether `path` lies under this target's output directory
    pub fn owns_output(&self, path: &Path) -> bool {
        path.starts_with(&self.output_dir)
    }
}

/// A manifest that could not become a target.
#[derive(Debug, Clone)]
pub struct ManifestDiagnostic {
    pub path: PathBuf,
    /// Declared kind when the manifest parsed, else the kind implied by its
    /// position; `None` when neither says which category owns it
    pub kind: Option<TargetKind>,
    pub error: ManifestError,
}

impl ManifestDiagnostic {
    /// Name of the directory holding the manifest
    pub fn target_name(&self) -> String {
        self.path
            .parent()
            .and_then(Path::file_name)
            .map_or_else(
                || self.path.display().to_string(),
                |n| n.to_string_lossy().into_owned(),
            )
    }
}

/// Accumulates targets during a tree walk.
#[derive(Debug)]
pub struct RegistryBuilder {
    layout: Layout,
    manifest_name: String,
    base_runtime: String,
    targets: Vec<BuildTarget>,
    diagnostics: Vec<ManifestDiagnostic>,
}

impl RegistryBuilder {
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            layout: config.layout.clone(),
            manifest_name: config.manifest_name.clone(),
            base_runtime: config.libraries.base_runtime.clone(),
            targets: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Look for a manifest in `dir`. Directories inside a subtree that
    /// already yielded a target are not considered.
    pub fn visit_dir(&mut self, dir: &Path) {
        let manifest_path = dir.join(&self.manifest_name);
        if !manifest_path.is_file() {
            return;
        }

        if let Some(owner) = self.targets.iter().find(|t| dir.starts_with(&t.dir)) {
            debug!(
                "Ignoring nested manifest {} inside target '{}'",
                manifest_path.display(),
                owner.name
            );
            return;
        }

        let (kind, result) = match Manifest::load(&manifest_path) {
            Ok(manifest) => (
                manifest.classify(&self.layout).ok(),
                BuildTarget::from_manifest(manifest, &self.layout),
            ),
            Err(error) => (kind_by_position(&self.layout, dir), Err(error)),
        };

        match result {
            Ok(target) => {
                debug!("Found {} '{}' in {}", target.kind, target.name, dir.display());
                self.targets.push(target);
            }
            Err(error) => {
                warn!("Skipping target: {}", error);
                self.diagnostics.push(ManifestDiagnostic {
                    path: manifest_path,
                    kind,
                    error,
                });
            }
        }
    }

    /// Claim sources, order libraries and resolve dependencies
    pub fn finish(self, catalog: &SourceCatalog) -> ManifestRegistry {
        let mut registry = ManifestRegistry::assemble(self.targets, catalog, &self.base_runtime);
        registry.diagnostics = self.diagnostics;
        registry
    }
}

/// Build targets keyed by kind, in discovery order (base runtime first
/// among libraries).
#[derive(Debug, Default)]
pub struct ManifestRegistry {
    libraries: Vec<BuildTarget>,
    drivers: Vec<BuildTarget>,
    processes: Vec<BuildTarget>,
    diagnostics: Vec<ManifestDiagnostic>,
}

impl ManifestRegistry {
    /// Walk the source root for manifests alone
    pub fn scan(config: &BuildConfig, catalog: &SourceCatalog) -> BuildResult<Self> {
        let mut builder = RegistryBuilder::new(config);
        walk(&config.layout.src_dir, |entry| {
            if entry.file_type().is_dir() {
                builder.visit_dir(entry.path());
            }
            Ok(())
        })?;
        Ok(builder.finish(catalog))
    }

    /// Build a registry from already-constructed targets
    pub fn assemble(
        mut targets: Vec<BuildTarget>,
        catalog: &SourceCatalog,
        base_runtime: &str,
    ) -> Self {
        claim_sources(&mut targets, catalog);

        let mut registry = Self::default();
        for target in targets {
            match target.kind {
                TargetKind::Library => registry.libraries.push(target),
                TargetKind::Driver => registry.drivers.push(target),
                TargetKind::Process => registry.processes.push(target),
            }
        }

        // Stable: everything but the base runtime keeps discovery order
        registry
            .libraries
            .sort_by_key(|lib| lib.name != base_runtime);

        registry.resolve_dependencies();

        info!(
            "Registered {} libraries, {} drivers, {} processes",
            registry.libraries.len(),
            registry.drivers.len(),
            registry.processes.len()
        );
        registry
    }

    fn resolve_dependencies(&mut self) {
        let known: Vec<String> = self.libraries.iter().map(|l| l.name.clone()).collect();

        for target in self
            .libraries
            .iter_mut()
            .chain(self.drivers.iter_mut())
            .chain(self.processes.iter_mut())
        {
            target.unresolved = target
                .dependencies
                .iter()
                .filter(|dep| !known.contains(dep))
                .cloned()
                .collect();
            for dep in &target.unresolved {
                warn!("Target '{}' depends on unknown library '{}'", target.name, dep);
            }
        }
    }

    /// Library targets, base runtime first
    pub fn libraries(&self) -> &[BuildTarget] {
        &self.libraries
    }

    pub fn drivers(&self) -> &[BuildTarget] {
        &self.drivers
    }

    pub fn processes(&self) -> &[BuildTarget] {
        &self.processes
    }

    /// Library target with exactly this name
    pub fn library(&self, name: &str) -> Option<&BuildTarget> {
        self.libraries.iter().find(|l| l.name == name)
    }

    /// Resolve a library name or fail for `dependent`
    pub fn require_library(&self, dependent: &str, name: &str) -> BuildResult<&BuildTarget> {
        self.library(name)
            .ok_or_else(|| BuildError::UnresolvedDependency {
                target: dependent.to_string(),
                dependency: name.to_string(),
            })
    }

    /// Every target, libraries first
    pub fn targets(&self) -> impl Iterator<Item = &BuildTarget> {
        self.libraries
            .iter()
            .chain(&self.drivers)
            .chain(&self.processes)
    }

    /// Whether some target claims `unit`
    pub fn is_claimed(&self, unit: &SourceUnit) -> bool {
        self.targets()
            .any(|t| t.sources.iter().any(|s| s.path == unit.path))
    }

    /// Manifests that failed to produce a target
    pub fn diagnostics(&self) -> &[ManifestDiagnostic] {
        &self.diagnostics
    }

    /// Failed manifests owned by the `kind` category
    pub fn rejected(&self, kind: TargetKind) -> impl Iterator<Item = &ManifestDiagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == Some(kind))
    }
}

/// Index of the target whose directory is the closest ancestor of `path`
fn closest_owner(targets: &[BuildTarget], path: &Path) -> Option<usize> {
    targets
        .iter()
        .enumerate()
        .filter(|(_, t)| path.starts_with(&t.dir))
        .max_by_key(|(_, t)| t.dir.components().count())
        .map(|(i, _)| i)
}

/// Give every compilable unit and header to its closest owning target.
/// CRT units are global and never claimed.
fn claim_sources(targets: &mut [BuildTarget], catalog: &SourceCatalog) {
    for target in targets.iter_mut() {
        target.sources.clear();
        target.headers.clear();
    }

    for unit in catalog.units() {
        if let Some(i) = closest_owner(targets, &unit.path) {
            targets[i].sources.push(unit.clone());
        }
    }
    for header in catalog.headers() {
        if let Some(i) = closest_owner(targets, &header.path) {
            targets[i].headers.push(header.path.clone());
        }
    }
}
