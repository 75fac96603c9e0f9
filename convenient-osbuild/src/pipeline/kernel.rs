//! Kernel category: one ELF image linked with the kernel linker script

use crate::catalog::{Language, SourceUnit, UnitRole};
use crate::error::{BuildError, BuildResult};
use crate::pipeline::compile::{compile_all, link, CompileJob};
use crate::pipeline::{BuildCategory, CategoryReport, RunOptions};
use crate::session::BuildSession;
use crate::symbols::{SymbolInjector, SymbolTable};
use convenient_toolchain::ToolInvocation;
use std::path::{Path, PathBuf};
use tracing::info;

/// The kernel's object set plus its generated symbol-table unit.
///
/// Every link of the image, whichever pass, uses the same objects.
#[derive(Debug, Clone)]
pub struct KernelImage {
    path: PathBuf,
    objects: Vec<PathBuf>,
    symbols_unit: SourceUnit,
    symbols_object: PathBuf,
}

impl KernelImage {
    pub fn new(session: &BuildSession<'_>, objects: Vec<PathBuf>) -> BuildResult<Self> {
        let config = session.config();
        let source = &config.outputs.symbols_source;

        let symbols_unit = SourceUnit::new(
            &config.layout,
            source.clone(),
            Language::Assembly,
            UnitRole::Compilable,
        );
        let symbols_object = symbols_unit.output.clone().ok_or_else(|| {
            BuildError::Config(format!(
                "symbol table source {} lies outside the source and output roots",
                source.display()
            ))
        })?;

        Ok(Self {
            path: config.outputs.kernel_image.clone(),
            objects,
            symbols_unit,
            symbols_object,
        })
    }

    /// Linked image path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Kernel objects, symbol-table object excluded
    pub fn objects(&self) -> &[PathBuf] {
        &self.objects
    }

    /// Assemble the current symbol-table source
    pub async fn compile_symbols(&self, session: &BuildSession<'_>) -> BuildResult<()> {
        let job = CompileJob::new(&self.symbols_unit, &session.config().compile.kernel);
        compile_all(session, vec![job]).await?;
        Ok(())
    }

    /// `ld <flags> -T <script> -o <image> <objects> <ksyms object>`
    pub fn link_invocation(&self, session: &BuildSession<'_>) -> ToolInvocation {
        let config = session.config();
        ToolInvocation::new(&config.toolchain.ld)
            .args(&config.link.kernel)
            .arg("-T")
            .arg(&config.link.linker_script)
            .arg("-o")
            .arg(&self.path)
            .args(&self.objects)
            .arg(&self.symbols_object)
    }

    pub async fn link(&self, session: &BuildSession<'_>) -> BuildResult<()> {
        link(session.runner(), &self.link_invocation(session), &self.path).await
    }
}

/// Build and link the kernel, then optionally inject its symbol table
pub async fn build(session: &BuildSession<'_>, options: RunOptions) -> BuildResult<CategoryReport> {
    let config = session.config();
    let layout = &config.layout;
    let flags = BuildCategory::Kernel.flags(&config.compile);

    let jobs = session
        .catalog()
        .units()
        .iter()
        .filter(|unit| layout.kernel_dirs.iter().any(|dir| unit.is_under(dir)))
        .map(|unit| CompileJob::new(unit, flags))
        .collect();
    let objects = compile_all(session, jobs).await?;

    let kernel_objects: Vec<PathBuf> = layout
        .kernel_output_dirs()
        .iter()
        .flat_map(|dir| objects.under(dir))
        .collect();
    info!("Linking kernel from {} objects", kernel_objects.len());

    let image = KernelImage::new(session, kernel_objects)?;
    SymbolTable::empty()
        .write_source(&config.outputs.symbols_source)
        .await?;
    image.compile_symbols(session).await?;
    image.link(session).await?;

    let mut report = CategoryReport::new(BuildCategory::Kernel);
    report.objects = objects.paths();
    report.artifacts.push(image.path().to_path_buf());

    if options.inject_symbols {
        report.symbols = Some(SymbolInjector::new(&image).inject(session).await?);
    }

    Ok(report)
}
