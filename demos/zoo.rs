/// Zoo example. Loads the San Diego Zoo story, samples a few storylines
/// from its weighted edges, then plays a visit where any exhibit may turn
/// out to be the moment you notice your wallet is missing.
///
/// Run with: cargo run --example zoo

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use story_engine::core::config::{EngineConfig, MatchMode};
use story_engine::core::engine::{StepOutcome, StoryEngine};
use story_engine::core::graph::StoryGraph;
use story_engine::core::storyline::StorylineGenerator;
use story_engine::io::console::StdoutSink;
use story_engine::io::scripted::{KeywordClassifier, ScriptedInput};
use story_engine::schema::content::StoryContent;

fn main() {
    let content = StoryContent::load_from_ron(Path::new("stories/zoo.ron"))
        .expect("Failed to load zoo story");
    let mut graph = StoryGraph::from_content(content).expect("Failed to build zoo story");
    graph.context_mut().insert("name", "Riley");

    // --- Storylines ---
    println!("=== Typical visits ===");
    let generator = StorylineGenerator::default();
    let mut rng = StdRng::seed_from_u64(1916);
    for n in 1..=5 {
        let line = generator
            .generate(&graph, "entrance", &mut rng)
            .expect("Failed to generate storyline");
        println!("{}. {}", n, line.join(" -> "));
    }
    println!();

    // --- Interactive visit ---
    println!("=== A visit ===");
    let classifier = KeywordClassifier::load_from_ron(Path::new("stories/zoo.keywords.ron"))
        .expect("Failed to load zoo keywords");
    let config = EngineConfig {
        match_mode: MatchMode::Classified,
        ..EngineConfig::default()
    };
    let mut engine = StoryEngine::builder(graph)
        .input(ScriptedInput::new([
            "the monkeys!",
            "can we see a lion",
            "penguins next",
            "let's leave",
            "parking lot",
        ]))
        .output(StdoutSink)
        .classifier(classifier)
        .config(config)
        .seed(7)
        .build()
        .expect("Failed to build engine");

    loop {
        match engine.step() {
            Ok(StepOutcome::Advanced {
                to,
                redirected: true,
                ..
            }) => println!("  (a dynamic event sent us to {})", to),
            Ok(StepOutcome::Advanced { .. }) => {}
            Ok(StepOutcome::Finished { at }) => {
                println!("  (visit ended at {})", at);
                break;
            }
            Err(e) => {
                println!("  (visit cut short: {})", e);
                break;
            }
        }
    }

    let mut visited: Vec<&String> = engine.graph().visited().iter().collect();
    visited.sort();
    println!();
    println!("Visited: {}", visited.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "));
}
