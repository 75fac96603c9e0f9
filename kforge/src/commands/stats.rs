//! Per-language statistics of the source tree

use convenient_osbuild::{BuildConfig, BuildResult, SourceCatalog};

pub fn run(config: &BuildConfig) -> BuildResult<bool> {
    let catalog = SourceCatalog::scan(config)?;
    let stats = catalog.language_stats()?;

    println!("{:<10} {:>8} {:>10}", "Language", "Files", "Lines");
    for (language, counts) in &stats.languages {
        println!("{:<10} {:>8} {:>10}", language.to_string(), counts.files, counts.lines);
    }
    println!("{:<10} {:>8} {:>10}", "Headers", stats.headers.files, stats.headers.lines);
    println!("{:<10} {:>8}", "Objects", stats.prebuilt_objects);

    Ok(true)
}
