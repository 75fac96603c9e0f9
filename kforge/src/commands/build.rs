//! Scan the tree once and run the requested categories

use super::CategoryArg;
use convenient_osbuild::{BuildConfig, BuildResult, BuildSession, ProjectTree, RunOptions};
use convenient_toolchain::{ProcessRunner, RetryPolicy};
use std::time::Instant;

/// Returns whether every requested category completed without skipped
/// targets and every manifest was attributed to a category
pub async fn run(
    config: &BuildConfig,
    category: CategoryArg,
    inject_symbols: bool,
    timeout_retries: usize,
) -> BuildResult<bool> {
    let start = Instant::now();

    let tree = ProjectTree::scan(config)?;
    // Manifests with a known kind resurface as skipped targets of their
    // category; the rest belong to no category and fail the run here
    let mut complete = true;
    for diagnostic in tree.registry.diagnostics() {
        println!("⚠️  {}", diagnostic.error);
        complete &= diagnostic.kind.is_some();
    }

    let mut runner = ProcessRunner::new(config.tool_timeout);
    if timeout_retries > 0 {
        runner = runner.with_retry(RetryPolicy::timeouts(timeout_retries + 1));
    }

    let session = BuildSession::new(config, &tree, &runner);
    let reports = session
        .run_all(&category.categories(), RunOptions { inject_symbols })
        .await?;

    println!();
    println!("Build summary:");
    for report in &reports {
        println!(
            "  {:<10} {:>5} objects  {:>4} artifacts",
            report.category.to_string(),
            report.objects.len(),
            report.artifacts.len()
        );
        if let Some(count) = report.symbols {
            println!("  {:<10} {count} symbols embedded", "");
        }
        for skipped in &report.skipped {
            println!("  ❌ {} skipped: {}", skipped.name, skipped.error);
        }
        complete &= report.is_complete();
    }
    println!();
    println!("Finished in {:.1}s", start.elapsed().as_secs_f64());

    Ok(complete)
}
