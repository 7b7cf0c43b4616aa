/// Story linter: load story files and report every verification problem.
///
/// Usage: story_linter <story.ron> [<story.ron> ...]
///
/// Exits with status 1 if any file fails to load or verify.

use std::path::Path;
use story_engine::core::graph::StoryGraph;
use story_engine::schema::content::StoryContent;

fn main() {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        eprintln!("Usage: story_linter <story.ron> [<story.ron> ...]");
        return;
    }

    let mut failed = false;
    for path in &args[1..] {
        match lint(Path::new(path)) {
            Ok(report) => {
                for warning in &report.warnings {
                    println!("{}: warning: {}", path, warning);
                }
                for error in &report.errors {
                    println!("{}: error: {}", path, error);
                }
                if report.errors.is_empty() {
                    println!("{}: ok", path);
                } else {
                    failed = true;
                }
            }
            Err(e) => {
                failed = true;
                println!("{}: {}", path, e);
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
}

struct Report {
    errors: Vec<String>,
    warnings: Vec<String>,
}

fn lint(path: &Path) -> Result<Report, String> {
    let content = StoryContent::load_from_ron(path).map_err(|e| e.to_string())?;
    let graph = StoryGraph::from_content(content).map_err(|e| e.to_string())?;

    let errors: Vec<String> = graph.problems().iter().map(|p| p.to_string()).collect();
    let mut warnings = Vec::new();

    // Unreachable nodes are warnings only.
    if let Ok(start) = graph.start_node() {
        let mut reached = vec![start.to_string()];
        let mut i = 0;
        while i < reached.len() {
            let from = reached[i].clone();
            for to in graph.neighbors(&from) {
                if !reached.iter().any(|r| r == to) {
                    reached.push(to.to_string());
                }
            }
            for (to, _) in graph.weighted_edges(&from) {
                if !reached.iter().any(|r| r == to) {
                    reached.push(to.to_string());
                }
            }
            for to in graph.node(&from).map(|n| n.dynamic_events().keys()).into_iter().flatten() {
                if !reached.contains(to) {
                    reached.push(to.clone());
                }
            }
            i += 1;
        }
        for node in graph.nodes() {
            if !reached.iter().any(|r| r == node.name()) {
                warnings.push(format!("node '{}' is unreachable from '{}'", node.name(), start));
            }
        }
    }

    Ok(Report { errors, warnings })
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
