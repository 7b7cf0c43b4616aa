/// Movie theater example. Builds the Lehigh Valley Movie Theater story in
/// code and plays it with scripted speech and an offline classifier.
///
/// The visitor buys snacks, tries to walk into the auditorium without a
/// ticket, buys one, then watches the movie.
///
/// Run with: cargo run --example movie_theater

use story_engine::core::action::ActionParams;
use story_engine::core::config::{EngineConfig, MatchMode};
use story_engine::core::engine::{StepOutcome, StoryEngine};
use story_engine::core::graph::StoryGraph;
use story_engine::core::node::RunCondition;
use story_engine::io::console::StdoutSink;
use story_engine::io::scripted::{KeywordClassifier, ScriptedInput};
use story_engine::schema::value::Value;

fn build_story() -> StoryGraph {
    let mut s = StoryGraph::new();
    s.set_scenario_id("movie_theater");

    let ctx = s.context_mut();
    ctx.insert("name", "Sam");
    ctx.insert("movie_names", Value::from(&["inside out", "tomorrowland", "minions", "home"][..]));
    ctx.insert("movie_choice", Value::Null);
    ctx.insert("menu", Value::from(&["soda", "popcorn", "candy"][..]));
    ctx.insert("bought", Value::List(Vec::new()));

    s.add_node("movie_greeting")
        .set_start(true)
        .bind("guest", "name")
        .add_action(
            "say",
            ActionParams::new()
                .message(
                    "Hello! Welcome to the Lehigh Valley Movie Theater. \
                     You can go to the box office and get your ticket \
                     or you can go to the concessions for some snacks. \
                     Where would you like to go {guest}?",
                )
                .style("GoodNews"),
        )
        .expect("greeting");

    let box_office = s.add_node("box_office");
    box_office
        .add_action(
            "say",
            ActionParams::new().message(
                "Welcome to the box office. Which movie would you like to watch? \
                 We have tickets for {movie_names|or}.",
            ),
        )
        .expect("box office prompt");
    box_office
        .add_action(
            "listen",
            ActionParams::new()
                .intent("buy_ticket")
                .entity_type("movies")
                .max_entities(1)
                .verify_against("movie_names")
                .context_key("movie_choice")
                .failure_message(
                    "Sorry we're not showing that at the moment. \
                     Please choose another movie to watch.",
                ),
        )
        .expect("box office listen");
    box_office
        .add_action(
            "say",
            ActionParams::new().message(
                "Here's your ticket. Enjoy the show. \
                 Would you like to go to the concessions or the auditorium?",
            ),
        )
        .expect("box office reply");

    let concessions = s.add_node("concessions");
    concessions
        .add_action("say", ActionParams::new().message("What can I get for you? We have {menu}."))
        .expect("concessions prompt");
    concessions
        .add_action(
            "listen",
            ActionParams::new()
                .intent("order_food")
                .entity_type("snacks")
                .verify_against("menu")
                .context_key("bought")
                .failure_message("Sorry we don't have that on our menu.")
                .done_intent("done_ordering")
                .repeat_prompt("Can I get anything else for you?"),
        )
        .expect("concessions listen");
    concessions
        .add_action(
            "say",
            ActionParams::new().message(
                "Thank you. Here's your {bought}. \
                 If you do not have your ticket yet, go to the box office. \
                 Otherwise, you can go to the auditorium.",
            ),
        )
        .expect("concessions reply");

    let auditorium = s.add_node("auditorium");
    auditorium.add_run_condition(RunCondition::IsSet("movie_choice".into()));
    auditorium
        .add_action(
            "say",
            ActionParams::new()
                .message("Hello, ticket please! {movie_choice} is in theater 3 A, enjoy the movie!"),
        )
        .expect("auditorium");
    for (movie, url) in [
        ("inside out", "https://www.youtube.com/watch?v=_MC3XuMvsDI"),
        ("tomorrowland", "https://www.youtube.com/watch?v=1k59gXTWf-A"),
        ("minions", "https://www.youtube.com/watch?v=eisKxhjBnZ0"),
        ("home", "https://www.youtube.com/watch?v=MyqZf8LiWvM"),
    ] {
        auditorium
            .add_action("play", ActionParams::new().source(url).only_if("movie_choice", movie))
            .expect("trailer");
    }

    s.add_edges_from([
        ("movie_greeting", "box_office"),
        ("movie_greeting", "concessions"),
        ("box_office", "auditorium"),
        ("concessions", "auditorium"),
    ])
    .expect("edges");
    s.add_undirected_edge("box_office", "concessions").expect("undirected edge");
    s.add_dependency("auditorium", "box_office");

    s
}

fn main() {
    let classifier = KeywordClassifier::new()
        .intent("done_ordering", &["that's all", "nothing else"])
        .intent("buy_ticket", &["ticket", "watch"])
        .intent("order_food", &["like", "want", "have"])
        .intent("box_office", &["box office"])
        .intent("concessions", &["concessions", "snacks"])
        .intent("auditorium", &["auditorium"])
        .entities("movies", &["inside out", "tomorrowland", "minions", "home", "jaws"])
        .entities("snacks", &["soda", "popcorn", "candy", "nachos"]);

    let script = [
        "Let's get some snacks first",
        "I'd like nachos",
        "I'd like popcorn and a soda",
        "that's all, thanks",
        "now the auditorium",
        "the box office then",
        "one ticket for jaws",
        "a ticket to watch inside out",
        "auditorium please",
    ];
    for line in &script {
        println!("  [user] {}", line);
    }
    println!();

    let config = EngineConfig {
        match_mode: MatchMode::Classified,
        ..EngineConfig::default()
    };

    let mut engine = StoryEngine::builder(build_story())
        .input(ScriptedInput::new(script))
        .output(StdoutSink)
        .classifier(classifier)
        .config(config)
        .seed(2015)
        .build()
        .expect("Failed to build engine");

    loop {
        match engine.step() {
            Ok(StepOutcome::Advanced { from, to, .. }) => println!("  ({} -> {})", from, to),
            Ok(StepOutcome::Finished { at }) => {
                println!("  (finished at {})", at);
                break;
            }
            Err(e) => {
                eprintln!("Story stopped: {}", e);
                return;
            }
        }
    }

    println!();
    println!("Final context:");
    for (key, value) in engine.context().iter() {
        println!("  {} = {}", key, value);
    }
}
