//! Embedded kernel symbol table
//!
//! The kernel carries its own global symbol table in a `.ksyms` data
//! section so it can symbolize addresses without an external file. The
//! table is generated as NASM source with two labels:
//!
//! - `__ksyms_count`: one quad, the number of entries
//! - `__ksyms_table`: the entries, each `len:8, addr:8, name, NUL`, where
//!   `len` covers the whole entry, followed by an 8-byte zero sentinel
//!
//! Injection is two-pass: the kernel is first linked against an empty
//! table, its symbols are dumped with `nm`, and the regenerated table is
//! linked in on the second pass. The second image therefore carries the
//! addresses of the first layout, which the table itself shifts; more
//! passes can be configured to iterate until the map stops changing.

use crate::error::{BuildError, BuildResult};
use crate::pipeline::compile::run_tool;
use crate::pipeline::kernel::KernelImage;
use crate::session::BuildSession;
use convenient_toolchain::ToolInvocation;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, info};

/// Section holding the table
pub const SECTION: &str = ".ksyms";
/// Label of the entry count
pub const COUNT_LABEL: &str = "__ksyms_count";
/// Label of the first entry
pub const TABLE_LABEL: &str = "__ksyms_table";
/// Required suffix of a symbol map file
pub const MAP_SUFFIX: &str = "map";

/// Width of the length prefix and of the address field
const QUAD: u64 = 8;

/// One `(address, type, name)` triple from the symbol map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRecord {
    pub name: String,
    pub address: u64,
    /// `nm` symbol type, e.g. `T` for text
    pub kind: char,
}

/// Parse `nm`-style map content: `<hex address> <type> <name>` per line.
///
/// Blank lines are skipped. A line with fewer than three fields or a
/// non-hex address fails the whole parse.
pub fn parse_map(path: &Path, content: &str) -> BuildResult<Vec<SymbolRecord>> {
    let mut records = Vec::new();

    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let malformed = |reason: String| BuildError::SymbolMap {
            path: path.to_path_buf(),
            line: index + 1,
            reason,
        };

        let mut fields = line.split_whitespace();
        let (Some(address), Some(kind), Some(name)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(malformed(format!(
                "expected '<address> <type> <name>', got '{}'",
                line.trim()
            )));
        };

        let address = u64::from_str_radix(address.trim_start_matches("0x"), 16)
            .map_err(|e| malformed(format!("bad address '{address}': {e}")))?;
        let kind = kind
            .chars()
            .next()
            .ok_or_else(|| malformed("empty symbol type".to_string()))?;

        records.push(SymbolRecord {
            name: name.to_string(),
            address,
            kind,
        });
    }

    Ok(records)
}

/// Read and parse the map at `path`, which must carry the `.map` suffix
pub async fn read_map(path: &Path) -> BuildResult<Vec<SymbolRecord>> {
    if path.extension().and_then(|e| e.to_str()) != Some(MAP_SUFFIX) {
        return Err(BuildError::SymbolMap {
            path: path.to_path_buf(),
            line: 0,
            reason: format!("symbol map must end in .{MAP_SUFFIX}"),
        });
    }

    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| BuildError::Io(path.to_path_buf(), e))?;
    parse_map(path, &content)
}

/// Symbol table contents, in map order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    records: Vec<SymbolRecord>,
}

impl SymbolTable {
    /// Placeholder table for the first link pass
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(records: Vec<SymbolRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[SymbolRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Declared byte length of an entry: length prefix, address, name, NUL
    pub fn entry_len(name: &str) -> u64 {
        name.len() as u64 + 1 + QUAD + QUAD
    }

    /// NASM source for the table
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "[section {SECTION}]");
        out.push('\n');

        put_global_label(&mut out, COUNT_LABEL);
        let _ = writeln!(out, "\tdq {}", self.records.len());
        out.push('\n');

        put_global_label(&mut out, TABLE_LABEL);
        for record in &self.records {
            let _ = writeln!(out, "\tdq {}", Self::entry_len(&record.name));
            let _ = writeln!(out, "\tdq 0x{:016x}", record.address);
            let _ = writeln!(out, "\tdb \"{}\",0x00", record.name);
        }
        // Zero-length sentinel entry
        let _ = writeln!(out, "\tdq 0");

        out
    }

    /// Bytes the assembled section holds, count included
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(self.records.len() as u64).to_le_bytes());
        for record in &self.records {
            bytes.extend_from_slice(&Self::entry_len(&record.name).to_le_bytes());
            bytes.extend_from_slice(&record.address.to_le_bytes());
            bytes.extend_from_slice(record.name.as_bytes());
            bytes.push(0);
        }
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes
    }

    /// Replace the source file at `path` with this table
    pub async fn write_source(&self, path: &Path) -> BuildResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BuildError::Io(parent.to_path_buf(), e))?;
        }
        tokio::fs::write(path, self.render())
            .await
            .map_err(|e| BuildError::Io(path.to_path_buf(), e))?;
        debug!("Wrote {} symbols to {}", self.len(), path.display());
        Ok(())
    }
}

fn put_global_label(out: &mut String, label: &str) {
    let _ = writeln!(out, "[global {label}]");
    let _ = writeln!(out, "align 8");
    let _ = writeln!(out, "{label}:");
}

/// Regenerates the embedded table from a linked image and relinks.
pub struct SymbolInjector<'a> {
    image: &'a KernelImage,
}

impl<'a> SymbolInjector<'a> {
    pub fn new(image: &'a KernelImage) -> Self {
        Self { image }
    }

    /// Run after the first link; returns the number of embedded symbols
    pub async fn inject(&self, session: &BuildSession<'_>) -> BuildResult<usize> {
        let config = session.config();
        let mut embedded: Option<Vec<SymbolRecord>> = None;

        for pass in 1..=config.symbol_passes {
            let records = self.dump(session).await?;
            if embedded.as_ref() == Some(&records) {
                debug!("Symbol map stable after {} passes", pass - 1);
                break;
            }

            info!("Injecting {} kernel symbols (pass {})", records.len(), pass);
            let table = SymbolTable::new(records);
            table.write_source(&config.outputs.symbols_source).await?;
            self.image.compile_symbols(session).await?;
            self.image.link(session).await?;
            embedded = Some(table.records);
        }

        Ok(embedded.map_or(0, |records| records.len()))
    }

    /// Dump the image's global symbols into the map file and parse it
    async fn dump(&self, session: &BuildSession<'_>) -> BuildResult<Vec<SymbolRecord>> {
        let config = session.config();
        let map_path = &config.outputs.symbol_map;

        let invocation = ToolInvocation::new(&config.toolchain.nm)
            .args(&config.link.symbol_dump)
            .arg(self.image.path());
        let output = run_tool(session.runner(), &invocation).await?;
        if !output.success() {
            return Err(BuildError::SymbolMap {
                path: self.image.path().to_path_buf(),
                line: 0,
                reason: format!(
                    "{} exited with {}: {}",
                    invocation.tool_name(),
                    output.exit_code,
                    output.stderr_tail(10)
                ),
            });
        }

        if let Some(parent) = map_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BuildError::Io(parent.to_path_buf(), e))?;
        }
        tokio::fs::write(map_path, &output.stdout)
            .await
            .map_err(|e| BuildError::Io(map_path.clone(), e))?;

        read_map(map_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str, address: u64) -> SymbolRecord {
        SymbolRecord {
            name: name.to_string(),
            address,
            kind: 'T',
        }
    }

    #[test]
    fn test_empty_table_is_count_and_sentinel() {
        let table = SymbolTable::empty();
        assert_eq!(table.to_bytes(), vec![0u8; 16]);

        let source = table.render();
        assert!(source.starts_with("[section .ksyms]\n"));
        assert!(source.contains("__ksyms_count:\n\tdq 0\n"));
        assert!(source.ends_with("__ksyms_table:\n\tdq 0\n"));
    }

    #[test]
    fn test_entry_layout() {
        assert_eq!(SymbolTable::entry_len("kmain"), 5 + 1 + 8 + 8);

        let table = SymbolTable::new(vec![record("kmain", 0xffff_ffff_8000_1000)]);
        let bytes = table.to_bytes();

        assert_eq!(bytes.len(), 8 + 22 + 8);
        assert_eq!(&bytes[0..8], &1u64.to_le_bytes());
        assert_eq!(&bytes[8..16], &22u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &0xffff_ffff_8000_1000u64.to_le_bytes());
        assert_eq!(&bytes[24..29], b"kmain");
        assert_eq!(bytes[29], 0);
        assert_eq!(&bytes[30..38], &[0u8; 8]);

        let source = table.render();
        assert!(source.contains("\tdq 22\n\tdq 0xffffffff80001000\n\tdb \"kmain\",0x00\n"));
    }

    #[test]
    fn test_parse_map_keeps_line_order() {
        let path = Path::new("/out/kernel.map");
        let records = parse_map(
            path,
            "ffffffff80001000 T kmain\nffffffff80000000 T _start\n\n",
        )
        .unwrap();

        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["kmain", "_start"]);
        assert_eq!(records[1].address, 0xffff_ffff_8000_0000);
        assert_eq!(records[0].kind, 'T');
    }

    #[test]
    fn test_parse_map_rejects_missing_name() {
        let path = Path::new("/out/kernel.map");
        let err = parse_map(path, "ffffffff80001000 T kmain\nffffffff80000000 T\n").unwrap_err();
        assert!(matches!(err, BuildError::SymbolMap { line: 2, .. }));
    }

    #[test]
    fn test_parse_map_rejects_bad_address() {
        let path = Path::new("/out/kernel.map");
        let err = parse_map(path, "kmain T ffffffff80001000\n").unwrap_err();
        assert!(matches!(err, BuildError::SymbolMap { line: 1, .. }));
    }

    #[tokio::test]
    async fn test_read_map_requires_suffix() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kernel.syms");
        std::fs::write(&path, "ffffffff80001000 T kmain\n").unwrap();

        let err = read_map(&path).await.unwrap_err();
        assert!(matches!(err, BuildError::SymbolMap { line: 0, .. }));

        let good = tmp.path().join("kernel.map");
        std::fs::write(&good, "ffffffff80001000 T kmain\n").unwrap();
        assert_eq!(read_map(&good).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_write_source_replaces_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("ksyms").join("ksyms.asm");

        SymbolTable::new(vec![record("a", 1)]).write_source(&path).await.unwrap();
        SymbolTable::empty().write_source(&path).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, SymbolTable::empty().render());
    }
}
