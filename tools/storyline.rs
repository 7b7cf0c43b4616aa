/// Storyline: generate random walks over a story's weighted edges.
///
/// Usage: storyline <story.ron> [--start <node>] [--count <n>] [--seed <n>] [--max-len <n>]
use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::FxHashSet;
use std::env;
use std::path::Path;
use std::process;
use story_engine::core::graph::StoryGraph;
use story_engine::core::storyline::{StorylineGenerator, DEFAULT_MAX_LEN};
use story_engine::schema::content::StoryContent;

const USAGE: &str =
    "Usage: storyline <story.ron> [--start <node>] [--count <n>] [--seed <n>] [--max-len <n>]";

fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("{}", USAGE);
        return;
    }

    let story_path = args[1].clone();
    let mut start = None;
    let mut count = 5usize;
    let mut seed = 42u64;
    let mut max_len = DEFAULT_MAX_LEN;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--start" if i + 1 < args.len() => {
                i += 1;
                start = Some(args[i].clone());
            }
            "--count" if i + 1 < args.len() => {
                i += 1;
                count = parse_or_exit(&args[i], "--count");
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = parse_or_exit(&args[i], "--seed");
            }
            "--max-len" if i + 1 < args.len() => {
                i += 1;
                max_len = parse_or_exit(&args[i], "--max-len");
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                eprintln!("{}", USAGE);
                process::exit(1);
            }
        }
        i += 1;
    }

    let graph = StoryContent::load_from_ron(Path::new(&story_path))
        .map_err(|e| e.to_string())
        .and_then(|content| StoryGraph::from_content(content).map_err(|e| e.to_string()))
        .unwrap_or_else(|e| {
            eprintln!("Error loading '{}': {}", story_path, e);
            process::exit(1);
        });

    let start = match start {
        Some(name) => name,
        None => match graph.start_node() {
            Ok(name) => name.to_string(),
            Err(e) => {
                eprintln!("Error: {} (use --start)", e);
                process::exit(1);
            }
        },
    };

    let generator = StorylineGenerator::new(max_len);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut covered = FxHashSet::default();
    let mut total_len = 0usize;

    for n in 1..=count {
        match generator.generate(&graph, &start, &mut rng) {
            Ok(line) => {
                println!("{:>3}: {}", n, line.join(" -> "));
                total_len += line.len();
                covered.extend(line);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        }
    }

    let mut missing: Vec<&str> = graph
        .nodes()
        .map(|n| n.name())
        .filter(|name| !covered.contains(*name))
        .collect();
    missing.sort_unstable();

    println!();
    println!(
        "Coverage: {}/{} nodes, average length {:.1}",
        covered.len(),
        graph.len(),
        total_len as f64 / count.max(1) as f64
    );
    if !missing.is_empty() {
        println!("Never reached: {}", missing.join(", "));
    }
}

fn parse_or_exit<T: std::str::FromStr>(value: &str, flag: &str) -> T {
    value.parse().unwrap_or_else(|_| {
        eprintln!("Error: {} expects a number, got '{}'", flag, value);
        process::exit(1);
    })
}
