/// Story runner: play a story file on the console.
///
/// Usage: story_runner <story.ron> [--config <path>] [--seed <n>]
///                     [--keywords <path> | --http]
///
/// Without a classifier, type node names to move between places. With
/// `--keywords` the story runs in classified mode against an offline keyword
/// table; `--http` uses the classifier endpoint from the config.

use std::path::Path;
use story_engine::core::config::{EngineConfig, MatchMode};
use story_engine::core::engine::StoryEngine;
use story_engine::core::graph::StoryGraph;
use story_engine::io::classifier::HttpClassifier;
use story_engine::io::console::{StdinInput, StdoutSink};
use story_engine::io::scripted::KeywordClassifier;
use story_engine::schema::content::StoryContent;

fn main() {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let story_path = args[1].clone();
    let mut config_path = None;
    let mut keywords_path = None;
    let mut use_http = false;
    let mut seed = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                i += 1;
                config_path = Some(args[i].clone());
            }
            "--keywords" if i + 1 < args.len() => {
                i += 1;
                keywords_path = Some(args[i].clone());
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed = args[i].parse::<u64>().ok();
            }
            "--http" => use_http = true,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let mut config = match config_path {
        Some(ref path) => EngineConfig::load_from_ron(Path::new(path)).unwrap_or_else(|e| {
            eprintln!("Error loading config {}: {}", path, e);
            std::process::exit(1);
        }),
        None => EngineConfig::default(),
    };

    let content = StoryContent::load_from_ron(Path::new(&story_path)).unwrap_or_else(|e| {
        eprintln!("Error loading {}: {}", story_path, e);
        std::process::exit(1);
    });
    let graph = StoryGraph::from_content(content).unwrap_or_else(|e| {
        eprintln!("Error building {}: {}", story_path, e);
        std::process::exit(1);
    });

    let mut builder = StoryEngine::builder(graph)
        .input(StdinInput::with_prompt("> "))
        .output(StdoutSink);

    if let Some(ref path) = keywords_path {
        let classifier = KeywordClassifier::load_from_ron(Path::new(path)).unwrap_or_else(|e| {
            eprintln!("Error loading keywords {}: {}", path, e);
            std::process::exit(1);
        });
        config.match_mode = MatchMode::Classified;
        builder = builder.classifier(classifier);
    } else if use_http {
        let classifier = HttpClassifier::new(&config.service).unwrap_or_else(|e| {
            eprintln!("Error creating classifier: {}", e);
            std::process::exit(1);
        });
        config.match_mode = MatchMode::Classified;
        builder = builder.classifier(classifier);
    }

    builder = builder.config(config);
    if let Some(seed) = seed {
        builder = builder.seed(seed);
    }

    let mut engine = builder.build().unwrap_or_else(|e| {
        eprintln!("Cannot start {}: {}", story_path, e);
        std::process::exit(1);
    });

    if let Err(e) = engine.run() {
        eprintln!("Story ended: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    eprintln!("Usage: story_runner <story.ron> [--config <path>] [--seed <n>] [--keywords <path> | --http]");
    eprintln!();
    eprintln!("  --config <path>    Engine config (RON)");
    eprintln!("  --seed <n>         Seed for dynamic events");
    eprintln!("  --keywords <path>  Classify input with an offline keyword table");
    eprintln!("  --http             Classify input with the configured HTTP service");
}
