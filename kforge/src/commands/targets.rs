//! List the build targets the manifests describe

use convenient_osbuild::{BuildConfig, BuildResult, BuildTarget, LinkMode, ProjectTree};

pub fn run(config: &BuildConfig) -> BuildResult<bool> {
    let tree = ProjectTree::scan(config)?;
    let registry = &tree.registry;

    print_group("Libraries", registry.libraries());
    print_group("Drivers", registry.drivers());
    print_group("Processes", registry.processes());

    let diagnostics = registry.diagnostics();
    if !diagnostics.is_empty() {
        println!("Invalid manifests:");
        for diagnostic in diagnostics {
            println!("  {}", diagnostic.error);
        }
    }

    Ok(diagnostics.is_empty())
}

fn print_group(title: &str, targets: &[BuildTarget]) {
    println!("{} ({}):", title, targets.len());
    for target in targets {
        let linking = match target.linking {
            LinkMode::Static => "static",
            LinkMode::Dynamic => "dynamic",
        };
        print!("  {:<20} {:<8} {:>3} sources", target.name, linking, target.sources.len());
        if !target.dependencies.is_empty() {
            print!("  libs: {}", target.dependencies.join(", "));
        }
        if !target.unresolved.is_empty() {
            print!("  (unresolved: {})", target.unresolved.join(", "));
        }
        println!();
    }
    println!();
}
