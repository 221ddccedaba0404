//! `kiln invalidate`: removes entries from the build cache.

use chrono::Utc;
use kiln_isg::InvalidationResult;

use crate::pipeline::load_project;
use crate::{GlobalArgs, InvalidateArgs, ReportFormat};

/// Runs the `kiln invalidate` command.
///
/// Each argument is one query term, so a shell-quoted `"tag:my tag"` stays a
/// single term. No terms clears the whole cache. Returns exit code 0.
pub fn run(args: &InvalidateArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (_, config) = load_project(global)?;
    let query = kiln_isg::join_terms(&args.query);
    let query = (!args.query.is_empty()).then_some(query.as_str());

    let result = kiln_isg::invalidate(config.cache_dir(), query, Utc::now())?;

    match args.format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        ReportFormat::Text if !global.quiet => print!("{}", render_text(&result)),
        ReportFormat::Text => {}
    }
    Ok(0)
}

fn render_text(result: &InvalidationResult) -> String {
    let mut out = String::new();
    if result.cleared_all {
        out.push_str(&format!("  Cleared all {} cache entries\n", result.invalidated_count));
        return out;
    }
    if result.invalidated_count == 0 {
        out.push_str("  No cache entries matched\n");
        return out;
    }
    let noun = if result.invalidated_count == 1 { "entry" } else { "entries" };
    out.push_str(&format!(
        "  Invalidated {} cache {noun}\n",
        result.invalidated_count
    ));
    for path in &result.invalidated_paths {
        out.push_str(&format!("    {path}\n"));
    }
    out
}
