//! `kiln deps`: prints the templates a page depends on.

use std::path::PathBuf;

use kiln_common::{FrontMatter, Page};
use kiln_isg::DependencyTracker;

use crate::pipeline::load_project;
use crate::{DepsArgs, GlobalArgs};

/// Runs the `kiln deps` command.
///
/// Prints one dependency per line, layout first. Returns exit code 0.
pub fn run(args: &DepsArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (_, config) = load_project(global)?;
    if config.src_dir().is_none() {
        return Err("no [site] src_dir configured; dependency tracking is disabled".into());
    }

    let source = PathBuf::from(&args.source);
    let source = if source.is_absolute() {
        source
    } else {
        std::env::current_dir()?.join(source)
    };

    let mut front_matter = FrontMatter::new();
    if let Some(layout) = &args.layout {
        front_matter.insert("layout", layout.as_str());
    }
    let page = Page::new(source, "", "").with_front_matter(front_matter);

    let deps = DependencyTracker::new().track(&page, &config)?;
    if deps.is_empty() && !global.quiet {
        eprintln!("  No layout found for {}", page.source_path.display());
    }
    for dep in &deps {
        println!("{dep}");
    }
    Ok(0)
}
