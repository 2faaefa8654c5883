mod common;

use common::{ints, numbers, Fixture};
use flowcore::{ActorSpec, ConditionSpec, FlowError, FlowSpec, SetupError};
use flowruntime::{load_flow, parse_flow, save_flow, FlowFormat, FlowInstance, InputMode};

fn setup_error(result: Result<impl std::fmt::Debug, FlowError>) -> SetupError {
    match result {
        Err(FlowError::Setup(e)) => e,
        other => panic!("expected a setup error, got {other:?}"),
    }
}

#[tokio::test]
async fn sources_may_only_start_a_pipeline() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    let spec = FlowSpec::new("bad")
        .with_actor(numbers(&[1]))
        .with_actor(numbers(&[2]).with_name("second"));

    let err = setup_error(runtime.execute(&spec).await);

    assert!(matches!(err, SetupError::InvalidStructure { ref actor, .. } if actor == "bad/second"));
}

#[tokio::test]
async fn nothing_may_follow_a_sink() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    let spec = FlowSpec::new("bad")
        .with_actor(numbers(&[1]))
        .with_actor(ActorSpec::new("test.collect"))
        .with_actor(ActorSpec::new("test.double"));

    let err = setup_error(runtime.execute(&spec).await);

    assert!(matches!(err, SetupError::InvalidStructure { ref actor, .. } if actor == "bad/double"));
}

#[tokio::test]
async fn root_cannot_start_with_a_transformer() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    let spec = FlowSpec::new("bad").with_actor(ActorSpec::new("test.double"));

    let err = setup_error(runtime.execute(&spec).await);

    assert!(matches!(err, SetupError::InvalidStructure { .. }));
}

#[tokio::test]
async fn trigger_cannot_start_with_a_transformer() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    let spec = FlowSpec::new("bad")
        .with_actor(numbers(&[1]))
        .with_actor(ActorSpec::new("control.trigger").with_child(ActorSpec::new("test.double")));

    let err = setup_error(runtime.execute(&spec).await);

    assert!(
        matches!(err, SetupError::InvalidStructure { ref actor, .. } if actor == "bad/trigger/double")
    );
}

#[tokio::test]
async fn tee_cannot_start_with_a_source() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    let spec = FlowSpec::new("bad")
        .with_actor(numbers(&[1]))
        .with_actor(ActorSpec::new("control.tee").with_child(numbers(&[2])));

    let err = setup_error(runtime.execute(&spec).await);

    assert!(matches!(err, SetupError::InvalidStructure { .. }));
}

#[tokio::test]
async fn sibling_names_must_be_unique() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    let spec = FlowSpec::new("dup")
        .with_actor(numbers(&[1]))
        .with_actor(ActorSpec::new("test.double"))
        .with_actor(ActorSpec::new("test.double"));

    let err = setup_error(runtime.execute(&spec).await);

    assert_eq!(
        err,
        SetupError::DuplicateName {
            parent: "dup".to_string(),
            name: "double".to_string()
        }
    );
}

#[tokio::test]
async fn unknown_types_are_rejected() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();

    let spec = FlowSpec::new("unknown").with_actor(ActorSpec::new("source.nope"));
    assert_eq!(
        setup_error(runtime.execute(&spec).await),
        SetupError::UnknownActorType("source.nope".to_string())
    );

    let spec = FlowSpec::new("unknown").with_actor(numbers(&[1])).with_actor(
        ActorSpec::new("control.if_then_else")
            .with_condition(ConditionSpec::new("nope"))
            .with_child(ActorSpec::new("test.double")),
    );
    assert_eq!(
        setup_error(runtime.execute(&spec).await),
        SetupError::UnknownConditionType("nope".to_string())
    );
}

#[tokio::test]
async fn branching_actors_check_their_arity() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();

    let too_many = FlowSpec::new("arity").with_actor(numbers(&[1])).with_actor(
        ActorSpec::new("control.if_then_else")
            .with_condition(ConditionSpec::new("test.greater").with_option("value", 1))
            .with_children([
                ActorSpec::new("test.double").with_name("a"),
                ActorSpec::new("test.double").with_name("b"),
                ActorSpec::new("test.double").with_name("c"),
            ]),
    );
    assert!(matches!(
        setup_error(runtime.execute(&too_many).await),
        SetupError::InvalidStructure { .. }
    ));

    let no_condition = FlowSpec::new("arity")
        .with_actor(numbers(&[1]))
        .with_actor(ActorSpec::new("control.if_then_else").with_child(ActorSpec::new("test.double")));
    assert!(matches!(
        setup_error(runtime.execute(&no_condition).await),
        SetupError::InvalidStructure { .. }
    ));

    let switch = FlowSpec::new("arity").with_actor(numbers(&[1])).with_actor(
        ActorSpec::new("control.switch")
            .with_condition(ConditionSpec::new("test.greater").with_option("value", 1))
            .with_children([
                ActorSpec::new("test.double").with_name("a"),
                ActorSpec::new("test.double").with_name("b"),
                ActorSpec::new("test.double").with_name("c"),
            ]),
    );
    assert!(matches!(
        setup_error(runtime.execute(&switch).await),
        SetupError::InvalidStructure { .. }
    ));
}

#[tokio::test]
async fn branches_of_sinks_require_an_input_token() {
    let mut fixture = Fixture::new();
    let branch = || {
        ActorSpec::new("control.if_then_else")
            .with_condition(ConditionSpec::new("test.greater").with_option("value", 1))
            .with_children([
                ActorSpec::new("test.collect").with_name("high"),
                ActorSpec::new("test.collect").with_name("low"),
            ])
    };

    let tee = FlowSpec::new("shape")
        .with_actor(numbers(&[1]))
        .with_actor(ActorSpec::new("control.tee").with_child(branch()));
    let instance = FlowInstance::new(&tee, &fixture.registry).unwrap();
    let tree = instance.tree();
    let node = tree.find("tee/if_then_else").unwrap();
    assert_eq!(tree.node(node).shape().input, InputMode::Required);
    assert!(!tree.node(node).shape().output);

    let runtime = fixture.runtime();
    let trigger = FlowSpec::new("bad")
        .with_actor(numbers(&[1]))
        .with_actor(ActorSpec::new("control.trigger").with_child(branch()));
    let err = setup_error(runtime.execute(&trigger).await);
    assert!(matches!(
        err,
        SetupError::InvalidStructure { ref actor, .. } if actor == "bad/trigger/if_then_else"
    ));
}

#[tokio::test]
async fn names_default_to_the_type_suffix() {
    let fixture = Fixture::new();
    let spec = FlowSpec::new("names")
        .with_actor(numbers(&[1]))
        .with_actor(ActorSpec::new("test.double").with_name("twice"))
        .with_actor(ActorSpec::new("test.collect"));

    let instance = FlowInstance::new(&spec, &fixture.registry).unwrap();
    let tree = instance.tree();

    let root = tree.node(tree.root());
    let names: Vec<&str> = root
        .children()
        .iter()
        .map(|&c| tree.node(c).name())
        .collect();
    assert_eq!(names, vec!["numbers", "twice", "collect"]);

    let collect = tree.find("collect").unwrap();
    assert_eq!(tree.node(collect).path(), "names/collect");
    assert_eq!(tree.node(collect).shape().input, InputMode::Required);
}

#[tokio::test]
async fn callable_transformer_reaches_the_named_actor() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    let spec = FlowSpec::new("callables")
        .with_actor(
            ActorSpec::new("standalone.callable_actors")
                .with_child(ActorSpec::new("test.double").with_name("twice")),
        )
        .with_actor(numbers(&[1, 2]))
        .with_actor(ActorSpec::new("transformer.callable").with_option("callable", "twice"))
        .with_actor(ActorSpec::new("test.collect"));

    runtime.execute(&spec).await.unwrap();

    assert_eq!(fixture.collected("out"), ints(&[2, 4]));
}

#[tokio::test]
async fn callable_source_is_drained_on_every_call() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    let spec = FlowSpec::new("callables")
        .with_actor(
            ActorSpec::new("standalone.callable_actors")
                .with_child(numbers(&[1, 2]).with_name("pair")),
        )
        .with_actor(numbers(&[10, 20]))
        .with_actor(ActorSpec::new("control.trigger").with_children([
            ActorSpec::new("source.callable").with_option("callable", "pair"),
            ActorSpec::new("test.collect"),
        ]));

    runtime.execute(&spec).await.unwrap();

    assert_eq!(fixture.collected("out"), ints(&[1, 2, 1, 2]));
}

#[tokio::test]
async fn callable_sink_consumes_the_token() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    let spec = FlowSpec::new("callables")
        .with_actor(
            ActorSpec::new("standalone.callable_actors")
                .with_child(ActorSpec::new("test.collect").with_name("store")),
        )
        .with_actor(numbers(&[3]))
        .with_actor(ActorSpec::new("sink.callable").with_option("callable", "store"));

    let report = runtime.execute(&spec).await.unwrap();

    assert_eq!(fixture.collected("out"), ints(&[3]));
    assert!(report.outputs.is_empty());
}

#[tokio::test]
async fn nearest_callable_container_wins() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    let spec = FlowSpec::new("callables")
        .with_actor(
            ActorSpec::new("standalone.callable_actors").with_child(
                ActorSpec::new("test.collect")
                    .with_name("target")
                    .with_option("bucket", "outer"),
            ),
        )
        .with_actor(numbers(&[1]))
        .with_actor(ActorSpec::new("control.trigger").with_children([
            ActorSpec::new("standalone.callable_actors").with_child(
                ActorSpec::new("test.collect")
                    .with_name("target")
                    .with_option("bucket", "inner"),
            ),
            numbers(&[5]),
            ActorSpec::new("sink.callable").with_option("callable", "target"),
        ]));

    runtime.execute(&spec).await.unwrap();

    assert_eq!(fixture.collected("inner"), ints(&[5]));
    assert!(fixture.collected("outer").is_empty());
}

#[tokio::test]
async fn unresolved_callable_is_a_setup_error() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    let spec = FlowSpec::new("callables")
        .with_actor(numbers(&[1]))
        .with_actor(ActorSpec::new("sink.callable").with_option("callable", "ghost"));

    let err = setup_error(runtime.execute(&spec).await);

    assert_eq!(
        err,
        SetupError::UnresolvedCallable {
            actor: "callables/callable".to_string(),
            name: "ghost".to_string()
        }
    );
}

#[tokio::test]
async fn recursive_callables_are_rejected() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    let spec = FlowSpec::new("callables")
        .with_actor(
            ActorSpec::new("standalone.callable_actors").with_child(
                ActorSpec::new("control.sequence").with_name("again").with_child(
                    ActorSpec::new("transformer.callable").with_option("callable", "again"),
                ),
            ),
        )
        .with_actor(numbers(&[1]))
        .with_actor(ActorSpec::new("transformer.callable").with_option("callable", "again"));

    let err = setup_error(runtime.execute(&spec).await);

    assert_eq!(err, SetupError::RecursiveCallable("again".to_string()));
}

#[tokio::test]
async fn callable_role_must_fit_the_target() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    let spec = FlowSpec::new("callables")
        .with_actor(
            ActorSpec::new("standalone.callable_actors")
                .with_child(ActorSpec::new("test.collect").with_name("sink")),
        )
        .with_actor(numbers(&[1]))
        .with_actor(ActorSpec::new("transformer.callable").with_option("callable", "sink"));

    let err = setup_error(runtime.execute(&spec).await);

    assert!(matches!(err, SetupError::InvalidStructure { .. }));
}

#[tokio::test]
async fn failed_set_up_wraps_up_initialized_actors_only() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    let spec = FlowSpec::new("life")
        .with_actor(numbers(&[1]))
        .with_actor(ActorSpec::new("test.lifecycle").with_name("a"))
        .with_actor(
            ActorSpec::new("test.lifecycle")
                .with_name("b")
                .with_option("fail_set_up", true),
        )
        .with_actor(ActorSpec::new("test.lifecycle").with_name("c"));

    let err = setup_error(runtime.execute(&spec).await);

    assert!(matches!(err, SetupError::ActorSetUp { ref actor, .. } if actor == "life/b"));
    assert_eq!(
        fixture.log(),
        vec!["set_up life/a", "set_up life/b", "wrap_up life/a"]
    );
}

#[tokio::test]
async fn every_actor_is_wrapped_up_once_after_a_failure() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    let spec = FlowSpec::new("life")
        .with_actor(numbers(&[1, 2]))
        .with_actor(ActorSpec::new("test.lifecycle").with_name("a"))
        .with_actor(ActorSpec::new("test.fail").with_option("on", 1))
        .with_actor(ActorSpec::new("test.lifecycle").with_name("b"));

    assert!(runtime.execute(&spec).await.is_err());

    assert_eq!(
        fixture.log(),
        vec![
            "set_up life/a",
            "set_up life/b",
            "wrap_up life/a",
            "wrap_up life/b"
        ]
    );
}

#[tokio::test]
async fn validate_sets_up_without_executing() {
    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    let spec = FlowSpec::new("dry")
        .with_actor(numbers(&[1]))
        .with_actor(ActorSpec::new("test.lifecycle"))
        .with_actor(ActorSpec::new("test.collect"));

    runtime.validate(&spec).await.unwrap();

    assert!(fixture.collected("out").is_empty());
    assert_eq!(
        fixture.log(),
        vec!["set_up dry/lifecycle", "wrap_up dry/lifecycle"]
    );
}

#[tokio::test]
async fn flows_load_from_json_and_yaml() {
    let yaml = r#"
name: loaded
variables:
  greeting: hi
actors:
  - type: test.numbers
    options:
      values: [1, 2]
  - type: control.tee
    children:
      - type: test.collect
        options:
          bucket: side
  - type: test.collect
    stop_flow_on_error: false
"#;
    let spec = parse_flow(yaml, FlowFormat::Yaml).unwrap();
    assert_eq!(spec.name, "loaded");
    assert_eq!(spec.actors.len(), 3);
    assert!(!spec.actors[2].stop_flow_on_error);
    assert_eq!(spec.actors[1].children[0].effective_name(), "collect");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flow.json");
    save_flow(&spec, &path).await.unwrap();
    let reloaded = load_flow(&path).await.unwrap();
    assert_eq!(reloaded.id, spec.id);
    assert_eq!(reloaded.variables.get("greeting").map(String::as_str), Some("hi"));

    let mut fixture = Fixture::new();
    let runtime = fixture.runtime();
    runtime.execute(&reloaded).await.unwrap();
    assert_eq!(fixture.collected("side"), ints(&[1, 2]));
    assert_eq!(fixture.collected("out"), ints(&[1, 2]));
}

#[tokio::test]
async fn unknown_extensions_are_rejected() {
    let err = load_flow("flow.toml").await.unwrap_err();
    assert!(matches!(err, FlowError::UnsupportedFormat(_)));
}
