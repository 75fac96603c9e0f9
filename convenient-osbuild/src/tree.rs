//! Catalog and registry built from one walk of the source root

use crate::catalog::{walk, SourceCatalog};
use crate::config::BuildConfig;
use crate::error::BuildResult;
use crate::registry::{ManifestRegistry, RegistryBuilder};
use tracing::info;

/// Scanned view of the source tree shared by every build category.
#[derive(Debug)]
pub struct ProjectTree {
    pub catalog: SourceCatalog,
    pub registry: ManifestRegistry,
}

impl ProjectTree {
    /// Walk the source root once, classifying files and discovering
    /// manifests in the same pass
    pub fn scan(config: &BuildConfig) -> BuildResult<Self> {
        info!("Scanning {}", config.layout.src_dir.display());

        let mut catalog = SourceCatalog::new(config);
        let mut builder = RegistryBuilder::new(config);

        walk(&config.layout.src_dir, |entry| {
            let file_type = entry.file_type();
            if file_type.is_dir() {
                builder.visit_dir(entry.path());
            } else if file_type.is_file() {
                catalog.visit_file(entry.path());
            }
            Ok(())
        })?;

        catalog.log_summary();
        let registry = builder.finish(&catalog);
        Ok(Self { catalog, registry })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_single_walk_matches_separate_scans() {
        let tmp = TempDir::new().unwrap();
        let config = BuildConfig::for_project(tmp.path());
        let src = &config.layout.src_dir;

        for (rel, content) in [
            ("kernel/main.c", "int main;\n"),
            ("kernel/boot.asm", "bits 64\n"),
            ("libs/LibC/manifest.json", r#"{"name": "LibC", "linking": "static"}"#),
            ("libs/LibC/string.c", ""),
            ("libs/LibC/string.h", ""),
            ("libs/LibC/crt0.asm", ""),
            ("user/ls/manifest.json", r#"{"name": "ls", "linking": "static"}"#),
            ("user/ls/main.c", ""),
        ] {
            let path = src.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        let tree = ProjectTree::scan(&config).unwrap();
        let catalog = SourceCatalog::scan(&config).unwrap();
        let registry = ManifestRegistry::scan(&config, &catalog).unwrap();

        assert_eq!(tree.catalog.units(), catalog.units());
        assert_eq!(tree.catalog.crt_units(), catalog.crt_units());
        assert_eq!(tree.registry.libraries(), registry.libraries());
        assert_eq!(tree.registry.processes(), registry.processes());
        assert_eq!(tree.registry.libraries()[0].headers.len(), 1);
    }

    #[test]
    fn test_missing_source_root_fails() {
        let tmp = TempDir::new().unwrap();
        let config = BuildConfig::for_project(tmp.path().join("nope"));
        assert!(ProjectTree::scan(&config).is_err());
    }
}
