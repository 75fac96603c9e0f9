//! Immutable per-run build configuration
//!
//! A [`BuildConfig`] is constructed once per run from the project root,
//! optionally overlaid by a `kforge.yml` file, and then only ever borrowed.
//! A fresh run constructs a fresh value.

use crate::catalog::Language;
use crate::error::{BuildError, BuildResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Config file looked up in the project root when none is given explicitly
pub const DEFAULT_CONFIG_FILE: &str = "kforge.yml";

/// Source, output and sysroot directory layout.
///
/// The output root mirrors the source root; every subroot is absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub root: PathBuf,
    pub src_dir: PathBuf,
    pub out_dir: PathBuf,
    pub sysroot_dir: PathBuf,
    /// Kernel source subroots (the kernel may span several, e.g. core + arch)
    pub kernel_dirs: Vec<PathBuf>,
    pub drivers_dir: PathBuf,
    pub libs_dir: PathBuf,
    pub user_dir: PathBuf,
    /// Objects built here are linked into every library but the base runtime
    pub common_dir: PathBuf,
}

impl Layout {
    /// Map a directory or file under the source root (or already under the
    /// output root) to its mirror under the output root, keeping the suffix.
    pub fn output_dir_for(&self, path: &Path) -> Option<PathBuf> {
        if let Ok(rel) = path.strip_prefix(&self.out_dir) {
            return Some(self.out_dir.join(rel));
        }
        path.strip_prefix(&self.src_dir)
            .ok()
            .map(|rel| self.out_dir.join(rel))
    }

    /// Output roots of the kernel category
    pub fn kernel_output_dirs(&self) -> Vec<PathBuf> {
        self.kernel_dirs
            .iter()
            .filter_map(|dir| self.output_dir_for(dir))
            .collect()
    }
}

/// Cross toolchain binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub cc: PathBuf,
    pub asm: PathBuf,
    pub ld: PathBuf,
    pub ar: PathBuf,
    pub nm: PathBuf,
}

impl Toolchain {
    /// GNU-style cross binaries sharing `prefix`, NASM for assembly
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            cc: PathBuf::from(format!("{prefix}gcc")),
            asm: PathBuf::from("nasm"),
            ld: PathBuf::from(format!("{prefix}ld")),
            ar: PathBuf::from(format!("{prefix}ar")),
            nm: PathBuf::from(format!("{prefix}nm")),
        }
    }
}

/// Compiler and assembler flags for one build category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FlagSet {
    #[serde(default)]
    pub c: Vec<String>,
    #[serde(default)]
    pub asm: Vec<String>,
}

impl FlagSet {
    /// Flags for `language`, `None` when this flag set cannot build it
    pub fn for_language(&self, language: Language) -> Option<&[String]> {
        match language {
            Language::C => Some(&self.c),
            Language::Assembly => Some(&self.asm),
            Language::Cpp => None,
        }
    }
}

/// Per-category compile flag sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileFlags {
    pub kernel: FlagSet,
    pub driver: FlagSet,
    pub library: FlagSet,
    pub user: FlagSet,
    /// Appended for userspace drivers, which may call kernel-exposed interfaces
    pub kernel_interface: Vec<String>,
}

/// Link, archive and symbol-dump flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFlags {
    pub kernel: Vec<String>,
    pub linker_script: PathBuf,
    pub driver: Vec<String>,
    pub shared_library: Vec<String>,
    pub user: Vec<String>,
    pub user_dynamic: Vec<String>,
    pub archive: Vec<String>,
    pub symbol_dump: Vec<String>,
}

/// Library naming and linking policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryPolicy {
    /// Always ordered first; every other target links against it
    pub base_runtime: String,
    /// Linked into every userspace process alongside the base runtime
    pub base_syscall: String,
    /// Dynamic-only entry stub kept out of static archives
    pub dynamic_entry_object: String,
}

/// Where final artifacts land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub kernel_image: PathBuf,
    pub symbols_source: PathBuf,
    pub symbol_map: PathBuf,
    pub library_dir: PathBuf,
    pub driver_dir: PathBuf,
    pub include_dir: PathBuf,
}

/// Complete configuration for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    pub layout: Layout,
    pub toolchain: Toolchain,
    pub compile: CompileFlags,
    pub link: LinkFlags,
    pub libraries: LibraryPolicy,
    pub outputs: OutputPaths,
    /// File name of the per-directory build descriptor
    pub manifest_name: String,
    /// Filename prefix marking C-runtime startup units
    pub crt_prefix: String,
    /// Upper bound on a single tool invocation
    pub tool_timeout: Duration,
    /// Concurrent compile jobs within one category
    pub jobs: usize,
    /// Symbol-table regeneration passes; 1 accepts the pass-1 address skew
    pub symbol_passes: usize,
}

impl BuildConfig {
    /// Built-in defaults for a project rooted at `root`
    pub fn for_project(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self::from_dirs(root, "src", "out", "system", &["kernel".to_string()], "x86_64-elf-")
    }

    fn from_dirs(
        root: PathBuf,
        src: &str,
        out: &str,
        sysroot: &str,
        kernel_dirs: &[String],
        prefix: &str,
    ) -> Self {
        let src_dir = root.join(src);
        let out_dir = root.join(out);
        let sysroot_dir = root.join(sysroot);
        let libs_dir = src_dir.join("libs");

        let layout = Layout {
            kernel_dirs: kernel_dirs.iter().map(|d| src_dir.join(d)).collect(),
            drivers_dir: src_dir.join("drivers"),
            user_dir: src_dir.join("user"),
            common_dir: libs_dir.join("common"),
            libs_dir,
            root,
            src_dir,
            out_dir,
            sysroot_dir,
        };

        let kernel_includes: Vec<String> = layout
            .kernel_dirs
            .iter()
            .map(|d| format!("-I{}", d.display()))
            .collect();

        let mut kernel_c: Vec<String> = [
            "-std=gnu11",
            "-Wall",
            "-O2",
            "-ffreestanding",
            "-fno-stack-protector",
            "-fno-pie",
            "-mcmodel=kernel",
            "-mno-red-zone",
            "-mno-sse",
            "-mno-mmx",
            "-nostdlib",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        kernel_c.extend(kernel_includes.iter().cloned());
        kernel_c.push(format!("-I{}", layout.drivers_dir.display()));

        let kernel = FlagSet {
            c: kernel_c,
            asm: vec!["-f".to_string(), "elf64".to_string()],
        };

        let mut user_c: Vec<String> = [
            "-std=gnu11",
            "-Wall",
            "-O2",
            "-ffreestanding",
            "-fno-stack-protector",
            "-nostdlib",
        ]
        .iter()
        .map(ToString::to_string)
        .collect();
        user_c.push(format!("-I{}", layout.libs_dir.display()));

        let user = FlagSet {
            c: user_c,
            asm: vec!["-f".to_string(), "elf64".to_string()],
        };
        let mut library = user.clone();
        library.c.push("-fPIC".to_string());

        let outputs = OutputPaths {
            kernel_image: layout.out_dir.join("kernel.elf"),
            symbols_source: layout.out_dir.join("ksyms").join("ksyms.asm"),
            symbol_map: layout.out_dir.join("kernel.map"),
            library_dir: layout.sysroot_dir.join("lib"),
            driver_dir: layout.sysroot_dir.join("drivers"),
            include_dir: layout.sysroot_dir.join("include"),
        };

        let link = LinkFlags {
            kernel: vec!["-nostdlib".into(), "-z".into(), "max-page-size=0x1000".into()],
            linker_script: layout
                .kernel_dirs
                .first()
                .unwrap_or(&layout.src_dir)
                .join("linker.ld"),
            driver: vec!["-r".into()],
            shared_library: vec!["-shared".into(), "-nostdlib".into()],
            user: vec!["-nostdlib".into(), "-e".into(), "_start".into()],
            user_dynamic: Vec::new(),
            archive: vec!["rcs".into()],
            symbol_dump: vec!["-n".into(), "-g".into(), "--defined-only".into()],
        };

        Self {
            compile: CompileFlags {
                driver: kernel.clone(),
                kernel,
                library,
                user,
                kernel_interface: kernel_includes,
            },
            toolchain: Toolchain::with_prefix(prefix),
            link,
            libraries: LibraryPolicy {
                base_runtime: "LibC".to_string(),
                base_syscall: "LibSys".to_string(),
                dynamic_entry_object: "dynamic_entry.o".to_string(),
            },
            outputs,
            layout,
            manifest_name: "manifest.json".to_string(),
            crt_prefix: "crt".to_string(),
            tool_timeout: Duration::from_secs(300),
            jobs: num_cpus::get(),
            symbol_passes: 1,
        }
    }

    /// Defaults for `root`, overlaid by `config_file` or, when absent,
    /// by `root/kforge.yml` if that exists
    pub fn load(root: impl Into<PathBuf>, config_file: Option<&Path>) -> BuildResult<Self> {
        let root = root.into();
        let path = match config_file {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let candidate = root.join(DEFAULT_CONFIG_FILE);
                candidate.is_file().then_some(candidate)
            }
        };

        let config = match path {
            Some(path) => {
                info!("Loading build configuration from {}", path.display());
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| BuildError::Io(path.clone(), e))?;
                let file: ConfigFile = serde_yaml::from_str(&content)
                    .map_err(|e| BuildError::Config(format!("{}: {e}", path.display())))?;
                file.apply(root)
            }
            None => {
                debug!("No {} found, using built-in defaults", DEFAULT_CONFIG_FILE);
                Self::for_project(root)
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values no run can succeed with
    pub fn validate(&self) -> BuildResult<()> {
        if self.jobs == 0 {
            return Err(BuildError::Config("jobs must be at least 1".to_string()));
        }
        if self.symbol_passes == 0 {
            return Err(BuildError::Config("symbol_passes must be at least 1".to_string()));
        }
        if self.tool_timeout.is_zero() {
            return Err(BuildError::Config("tool timeout must be non-zero".to_string()));
        }
        if self.layout.out_dir == self.layout.src_dir {
            return Err(BuildError::Config(
                "output root must differ from source root".to_string(),
            ));
        }
        Ok(())
    }
}

/// `kforge.yml` contents; every field overrides a built-in default.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigFile {
    pub src: Option<String>,
    pub out: Option<String>,
    pub sysroot: Option<String>,
    /// Kernel subroots, relative to `src`
    pub kernel_dirs: Option<Vec<String>>,
    pub toolchain: ToolchainFile,
    pub flags: FlagsFile,
    pub link: LinkFile,
    pub libraries: LibrariesFile,
    pub manifest_name: Option<String>,
    pub crt_prefix: Option<String>,
    pub tool_timeout_secs: Option<u64>,
    pub jobs: Option<usize>,
    pub symbol_passes: Option<usize>,
}

/// Toolchain overrides
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolchainFile {
    /// Cross prefix for gcc/ld/ar/nm, e.g. `x86_64-elf-`
    pub prefix: Option<String>,
    pub cc: Option<PathBuf>,
    pub asm: Option<PathBuf>,
    pub ld: Option<PathBuf>,
    pub ar: Option<PathBuf>,
    pub nm: Option<PathBuf>,
}

/// Compile flag overrides; a given set replaces the default wholesale
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlagsFile {
    pub kernel: Option<FlagSet>,
    pub driver: Option<FlagSet>,
    pub library: Option<FlagSet>,
    pub user: Option<FlagSet>,
    pub kernel_interface: Option<Vec<String>>,
}

/// Link flag overrides
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinkFile {
    pub kernel: Option<Vec<String>>,
    /// Relative to the project root
    pub linker_script: Option<PathBuf>,
    pub driver: Option<Vec<String>>,
    pub shared_library: Option<Vec<String>>,
    pub user: Option<Vec<String>>,
    pub user_dynamic: Option<Vec<String>>,
    pub archive: Option<Vec<String>>,
    pub symbol_dump: Option<Vec<String>>,
}

/// Library policy overrides
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct LibrariesFile {
    pub base_runtime: Option<String>,
    pub base_syscall: Option<String>,
    pub dynamic_entry_object: Option<String>,
    /// Relative to the sysroot
    pub output_dir: Option<PathBuf>,
}

impl ConfigFile {
    /// Overlay this file onto the defaults for `root`
    pub fn apply(self, root: PathBuf) -> BuildConfig {
        let kernel_dirs = self
            .kernel_dirs
            .unwrap_or_else(|| vec!["kernel".to_string()]);
        let prefix = self.toolchain.prefix.as_deref().unwrap_or("x86_64-elf-");

        let mut config = BuildConfig::from_dirs(
            root,
            self.src.as_deref().unwrap_or("src"),
            self.out.as_deref().unwrap_or("out"),
            self.sysroot.as_deref().unwrap_or("system"),
            &kernel_dirs,
            prefix,
        );

        let tc = self.toolchain;
        if let Some(cc) = tc.cc {
            config.toolchain.cc = cc;
        }
        if let Some(asm) = tc.asm {
            config.toolchain.asm = asm;
        }
        if let Some(ld) = tc.ld {
            config.toolchain.ld = ld;
        }
        if let Some(ar) = tc.ar {
            config.toolchain.ar = ar;
        }
        if let Some(nm) = tc.nm {
            config.toolchain.nm = nm;
        }

        let flags = self.flags;
        if let Some(kernel) = flags.kernel {
            config.compile.kernel = kernel;
        }
        if let Some(driver) = flags.driver {
            config.compile.driver = driver;
        }
        if let Some(library) = flags.library {
            config.compile.library = library;
        }
        if let Some(user) = flags.user {
            config.compile.user = user;
        }
        if let Some(kernel_interface) = flags.kernel_interface {
            config.compile.kernel_interface = kernel_interface;
        }

        let link = self.link;
        let replace = |slot: &mut Vec<String>, value: Option<Vec<String>>| {
            if let Some(value) = value {
                *slot = value;
            }
        };
        replace(&mut config.link.kernel, link.kernel);
        replace(&mut config.link.driver, link.driver);
        replace(&mut config.link.shared_library, link.shared_library);
        replace(&mut config.link.user, link.user);
        replace(&mut config.link.user_dynamic, link.user_dynamic);
        replace(&mut config.link.archive, link.archive);
        replace(&mut config.link.symbol_dump, link.symbol_dump);
        if let Some(script) = link.linker_script {
            config.link.linker_script = config.layout.root.join(script);
        }

        let libs = self.libraries;
        if let Some(name) = libs.base_runtime {
            config.libraries.base_runtime = name;
        }
        if let Some(name) = libs.base_syscall {
            config.libraries.base_syscall = name;
        }
        if let Some(name) = libs.dynamic_entry_object {
            config.libraries.dynamic_entry_object = name;
        }
        if let Some(dir) = libs.output_dir {
            config.outputs.library_dir = config.layout.sysroot_dir.join(dir);
        }

        if let Some(name) = self.manifest_name {
            config.manifest_name = name;
        }
        if let Some(prefix) = self.crt_prefix {
            config.crt_prefix = prefix;
        }
        if let Some(secs) = self.tool_timeout_secs {
            config.tool_timeout = Duration::from_secs(secs);
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(passes) = self.symbol_passes {
            config.symbol_passes = passes;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_layout() {
        let config = BuildConfig::for_project("/work/os");

        assert_eq!(config.layout.src_dir, PathBuf::from("/work/os/src"));
        assert_eq!(config.layout.kernel_dirs, vec![PathBuf::from("/work/os/src/kernel")]);
        assert_eq!(config.layout.common_dir, PathBuf::from("/work/os/src/libs/common"));
        assert_eq!(config.outputs.library_dir, PathBuf::from("/work/os/system/lib"));
        assert_eq!(config.libraries.base_runtime, "LibC");
        assert_eq!(config.compile.kernel, config.compile.driver);
        assert!(config.compile.library.c.contains(&"-fPIC".to_string()));
        assert!(!config.compile.user.c.contains(&"-fPIC".to_string()));
        config.validate().unwrap();
    }

    #[test]
    fn test_output_dir_for() {
        let config = BuildConfig::for_project("/work/os");
        let layout = &config.layout;

        assert_eq!(
            layout.output_dir_for(Path::new("/work/os/src/user/ls")),
            Some(PathBuf::from("/work/os/out/user/ls"))
        );
        assert_eq!(
            layout.output_dir_for(Path::new("/work/os/out/user/ls")),
            Some(PathBuf::from("/work/os/out/user/ls"))
        );
        assert_eq!(layout.output_dir_for(Path::new("/elsewhere/ls")), None);
        assert_eq!(
            layout.kernel_output_dirs(),
            vec![PathBuf::from("/work/os/out/kernel")]
        );
    }

    #[test]
    fn test_flagset_has_no_cpp_entry() {
        let flags = FlagSet {
            c: vec!["-O2".into()],
            asm: vec!["-f".into(), "elf64".into()],
        };
        assert_eq!(flags.for_language(Language::C), Some(&["-O2".to_string()][..]));
        assert!(flags.for_language(Language::Cpp).is_none());
    }

    #[test]
    fn test_load_overlays_yaml() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join(DEFAULT_CONFIG_FILE),
            r#"
src: source
kernel_dirs: [aniva, arch/x86]
toolchain:
  prefix: i686-elf-
  asm: /opt/nasm/bin/nasm
flags:
  user:
    c: ["-O0", "-g"]
link:
  linker_script: project/kernel.ld
libraries:
  output_dir: System/Lib
jobs: 2
symbol_passes: 3
"#,
        )
        .unwrap();

        let config = BuildConfig::load(tmp.path(), None).unwrap();

        assert_eq!(config.layout.src_dir, tmp.path().join("source"));
        assert_eq!(config.layout.kernel_dirs.len(), 2);
        assert_eq!(config.toolchain.cc, PathBuf::from("i686-elf-gcc"));
        assert_eq!(config.toolchain.asm, PathBuf::from("/opt/nasm/bin/nasm"));
        assert_eq!(config.compile.user.c, vec!["-O0".to_string(), "-g".to_string()]);
        assert!(config.compile.user.asm.is_empty());
        assert_eq!(config.link.linker_script, tmp.path().join("project/kernel.ld"));
        assert_eq!(config.outputs.library_dir, tmp.path().join("system/System/Lib"));
        assert_eq!(config.jobs, 2);
        assert_eq!(config.symbol_passes, 3);
    }

    #[test]
    fn test_load_rejects_zero_jobs() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.yml");
        std::fs::write(&path, "jobs: 0\n").unwrap();

        let err = BuildConfig::load(tmp.path(), Some(&path)).unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
    }
}
