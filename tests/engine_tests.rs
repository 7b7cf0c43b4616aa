/// Engine integration tests: stories loaded from RON, driven by scripted
/// collaborators.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use story_engine::core::graph::{GraphError, StoryGraph};
use story_engine::core::node::StoryNode;
use story_engine::core::verify::VerificationError;
use story_engine::io::scripted::{RecordingSink, ScriptedClassifier, ScriptedInput};
use story_engine::io::Classification;
use story_engine::schema::content::StoryContent;
use story_engine::schema::value::Value;
use story_engine::{StepOutcome, StoryEngine, StoryError};

fn load(path: &str) -> StoryGraph {
    let content = StoryContent::load_from_ron(Path::new(path)).unwrap();
    StoryGraph::from_content(content).unwrap()
}

#[test]
fn direct_mode_a_to_c_to_d() {
    let sink = RecordingSink::new();
    let mut engine = StoryEngine::builder(load("tests/fixtures/abcd.ron"))
        .input(ScriptedInput::new(["c", "d"]))
        .output(sink.clone())
        .seed(42)
        .build()
        .unwrap();

    engine.run().unwrap();

    assert!(engine.is_finished());
    assert_eq!(engine.graph().current(), Some("d"));
    for name in ["a", "c", "d"] {
        assert!(engine.graph().has_visited(name), "{name} not visited");
    }
    assert!(!engine.graph().has_visited("b"));
    assert_eq!(
        sink.texts(),
        vec!["You are at a in Bethlehem.", "You are at c.", "The end."]
    );
}

#[test]
fn visited_never_shrinks() {
    let mut engine = StoryEngine::builder(load("tests/fixtures/abcd.ron"))
        .input(ScriptedInput::new(["x", "b", "c", "nope", "d"]))
        .output(RecordingSink::new())
        .build()
        .unwrap();

    let mut previous = engine.graph().visited().clone();
    loop {
        let outcome = engine.step().unwrap();
        let visited = engine.graph().visited();
        assert!(previous.is_subset(visited));
        previous = visited.clone();
        if let StepOutcome::Finished { .. } = outcome {
            break;
        }
    }
    assert_eq!(previous.len(), 4);
}

#[test]
fn set_current_needs_neighbor_and_dependencies() {
    let mut graph = load("tests/fixtures/gated.ron");
    graph.set_current("a").unwrap();
    assert_eq!(
        graph.set_current("c"),
        Err(GraphError::UnmetDependencies {
            node: "c".to_string(),
            missing: vec!["b".to_string()],
        })
    );
    assert_eq!(graph.current(), Some("a"));

    graph.set_current("b").unwrap();
    graph.set_current("c").unwrap();
    assert_eq!(graph.current(), Some("c"));

    assert!(matches!(
        graph.set_current("a"),
        Err(GraphError::NotNeighbor { .. })
    ));
    assert!(matches!(
        graph.set_current("zz"),
        Err(GraphError::UnknownNode(_))
    ));
}

#[test]
fn verify_catches_missing_context_key() {
    let graph = load("tests/fixtures/missing_key.ron");
    assert_eq!(
        graph.verify(),
        Err(VerificationError::MissingContextKey {
            node: "greeting".to_string(),
            key: "town".to_string(),
        })
    );
    let result = StoryEngine::builder(graph.clone())
        .output(RecordingSink::new())
        .build();
    assert!(matches!(result, Err(StoryError::Verification(_))));

    let mut graph = graph;
    graph.context_mut().insert("town", "Allentown");
    assert!(graph.verify().is_ok());
}

#[test]
fn dynamic_event_distribution() {
    let mut node = StoryNode::new("fork");
    node.add_dynamic_event("x", 0.25).add_dynamic_event("y", 0.75);
    let mut rng = StdRng::seed_from_u64(2024);

    let draws = 10_000;
    let mut x = 0;
    let mut y = 0;
    for _ in 0..draws {
        match node.select_destination("fork", &mut rng).as_str() {
            "x" => x += 1,
            "y" => y += 1,
            other => panic!("unexpected destination {other}"),
        }
    }
    assert!((x as f64 / draws as f64 - 0.25).abs() < 0.03);
    assert!((y as f64 / draws as f64 - 0.75).abs() < 0.03);
}

#[test]
fn movie_theater_end_to_end() {
    let sink = RecordingSink::new();
    let classifier = ScriptedClassifier::new([
        Classification::new("order_food", 0.93)
            .with_entity("snacks", "soda")
            .with_entity("snacks", "popcorn"),
        Classification::new("done_ordering", 0.9),
        Classification::new("buy_ticket", 0.97).with_entity("movies", "home"),
    ]);
    let mut engine = StoryEngine::builder(load("stories/movie_theater.ron"))
        .input(ScriptedInput::new([
            "concessions",
            "I'd like a soda and popcorn",
            "that's all",
            "auditorium",
            "box_office",
            "home please",
            "auditorium",
        ]))
        .output(sink.clone())
        .classifier(classifier)
        .seed(7)
        .build()
        .unwrap();

    engine.run().unwrap();

    let context = engine.context();
    assert_eq!(
        context.get("bought"),
        Some(&Value::List(vec!["soda".to_string(), "popcorn".to_string()]))
    );
    assert_eq!(context.get("movie_choice"), Some(&Value::from("home")));
    assert_eq!(engine.graph().current(), Some("auditorium"));

    let texts = sink.texts();
    assert!(texts[0].ends_with("Where would you like to go friend?"));
    assert!(texts.contains(&"Can I get anything else for you?".to_string()));
    assert!(texts
        .iter()
        .any(|t| t.starts_with("Thank you. Here's your soda and popcorn.")));
    assert!(texts.contains(
        &"You can't go to the auditorium yet: visit the box office first; movie choice is not decided yet."
            .to_string()
    ));
    assert_eq!(
        texts.last().map(String::as_str),
        Some("Hello, ticket please! home is in theater 3 A, enjoy the movie!")
    );
    assert_eq!(sink.media(), vec!["https://www.youtube.com/watch?v=MyqZf8LiWvM"]);
}
