//! End-to-end pipeline integration tests.
//!
//! These tests drive whole invocations through scripted stacks and check
//! the order in which phases ran alongside the final outcome:
//!
//! 1. Onion ordering - `before` forward, `after` in reverse
//! 2. Short-circuit - remaining `before`s and the handler are skipped
//! 3. Error routing - `on_error` in reverse from the failing unit
//! 4. Recovery - an `on_error` that resolves the error ends propagation
//! 5. Completion - exactly one outcome per invocation
//! 6. Composition - pipelines nest and run concurrently

use metrics_exporter_prometheus::PrometheusBuilder;
use proptest::prelude::*;
use serde_json::{json, Value};
use std::time::Duration;
use stratum_core::{CompletionError, HandlerContext, HandlerError};
use stratum_middleware::{Flow, FnMiddleware, Pipeline, PipelineError, PipelineOptions};
use stratum_telemetry::metrics::{INVOCATIONS_TOTAL, RECOVERED_ERRORS_TOTAL, SHORT_CIRCUITS_TOTAL};
use stratum_test::{events, CallbackProbe, Recorder, ScriptedHandler, ScriptedMiddleware, Step};

fn unit(name: &str, recorder: &Recorder) -> ScriptedMiddleware {
    ScriptedMiddleware::new(name, recorder)
}

fn event() -> Value {
    events::api_gateway("GET", "/orders/42", None)
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_after_runs_in_reverse_of_before() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder))
        .use_middleware(unit("a", &recorder))
        .use_middleware(unit("b", &recorder))
        .use_middleware(unit("c", &recorder));

    let response = pipeline.invoke(event(), events::metadata()).await.unwrap();

    assert_eq!(response, json!({ "echo": event() }));
    recorder.assert_order(&[
        "a.before", "b.before", "c.before", "handler", "c.after", "b.after", "a.after",
    ]);
}

#[tokio::test]
async fn test_empty_stack_calls_handler_once() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::respond(&recorder, json!("bare")));

    let response = pipeline.invoke(event(), events::metadata()).await.unwrap();

    assert_eq!(response, json!("bare"));
    recorder.assert_order(&["handler"]);
}

#[tokio::test]
async fn test_event_mutations_are_visible_downstream() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder))
        .use_middleware(unit("first", &recorder).before(Step::Tag))
        .use_middleware(unit("second", &recorder).before(Step::Tag));

    let response = pipeline.invoke(event(), events::metadata()).await.unwrap();

    assert_eq!(response["echo"]["trail"], json!(["first", "second"]));
}

// ============================================================================
// Short-circuit
// ============================================================================

/// Stack `[x]` where `x.before` answers from cache.
#[tokio::test]
async fn test_short_circuit_skips_handler() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder))
        .use_middleware(unit("x", &recorder).before(Step::Return(json!({ "cached": true }))));

    let response = pipeline.invoke(event(), events::metadata()).await.unwrap();

    assert_eq!(response, json!({ "cached": true }));
    assert!(!recorder.contains("handler"));
    assert!(!recorder.contains("x.after"));
    recorder.assert_order(&["x.before"]);
}

#[tokio::test]
async fn test_short_circuit_unwinds_outer_units() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder))
        .use_middleware(unit("a", &recorder))
        .use_middleware(unit("b", &recorder))
        .use_middleware(unit("warmup", &recorder).before(Step::Return(json!("warm"))))
        .use_middleware(unit("d", &recorder));

    let response = pipeline
        .invoke(events::warmup(), events::metadata())
        .await
        .unwrap();

    assert_eq!(response, json!("warm"));
    recorder.assert_order(&["a.before", "b.before", "warmup.before", "b.after", "a.after"]);
}

#[tokio::test]
async fn test_outer_after_sees_short_circuit_response() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder))
        .use_middleware(FnMiddleware::new("headers").after_sync(|ctx| {
            if let Some(response) = ctx.response_mut() {
                response["headers"] = json!({ "x-cache": "HIT" });
            }
            Ok(Flow::Continue)
        }))
        .use_middleware(unit("cache", &recorder).before(Step::Return(json!({ "body": "{}" }))));

    let response = pipeline.invoke(event(), events::metadata()).await.unwrap();

    assert_eq!(response, json!({ "body": "{}", "headers": { "x-cache": "HIT" } }));
}

// ============================================================================
// Error routing
// ============================================================================

/// Stack `[a, b]`, handler fails.
#[tokio::test]
async fn test_handler_failure_unwinds_error_chain() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::failing(&recorder, "db down"))
        .use_middleware(unit("a", &recorder))
        .use_middleware(unit("b", &recorder));

    let err = pipeline.invoke(event(), events::metadata()).await.unwrap_err();

    assert_eq!(err.message(), "db down");
    recorder.assert_order(&["a.before", "b.before", "handler", "b.on_error", "a.on_error"]);
}

/// Stack `[a, b]`, handler fails, `a` converts the failure into a response.
#[tokio::test]
async fn test_handler_failure_resolved_by_outer_unit() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::failing(&recorder, "db down"))
        .use_middleware(unit("a", &recorder).on_error(Step::Resolve(json!({ "statusCode": 503 }))))
        .use_middleware(unit("b", &recorder));

    let response = pipeline.invoke(event(), events::metadata()).await.unwrap();

    assert_eq!(response, json!({ "statusCode": 503 }));
    recorder.assert_order(&["a.before", "b.before", "handler", "b.on_error", "a.on_error"]);
}

#[tokio::test]
async fn test_resolution_stops_error_chain() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::failing(&recorder, "boom"))
        .use_middleware(unit("a", &recorder))
        .use_middleware(unit("b", &recorder).on_error(Step::Resolve(json!("handled"))));

    let response = pipeline.invoke(event(), events::metadata()).await.unwrap();

    assert_eq!(response, json!("handled"));
    assert!(!recorder.contains("a.on_error"));
    assert!(!recorder.contains("a.after"));
}

/// Stack `[a, b]` where `a.after` fails after the handler succeeded.
#[tokio::test]
async fn test_after_failure_keeps_response() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::respond(&recorder, json!({ "id": 42 })))
        .use_middleware(unit("a", &recorder).after(Step::Fail("serialize".to_string())))
        .use_middleware(unit("b", &recorder));

    let ctx = pipeline
        .run(HandlerContext::new(event(), events::metadata()))
        .await;

    recorder.assert_order(&[
        "a.before",
        "b.before",
        "handler",
        "b.after",
        "a.after",
        "b.on_error",
        "a.on_error",
    ]);
    assert!(ctx.is_terminated());
    assert_eq!(ctx.error().map(HandlerError::message), Some("serialize"));
    assert_eq!(ctx.response(), Some(&json!({ "id": 42 })));
    assert!(ctx.into_outcome().is_err());
}

#[tokio::test]
async fn test_before_failure_starts_at_failing_unit() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder))
        .use_middleware(unit("a", &recorder))
        .use_middleware(
            unit("validator", &recorder).before(Step::Reject("missing sku".to_string())),
        )
        .use_middleware(unit("c", &recorder));

    let err = pipeline.invoke(event(), events::metadata()).await.unwrap_err();

    assert_eq!(err.status_code().as_u16(), 400);
    recorder.assert_order(&["a.before", "validator.before", "validator.on_error", "a.on_error"]);
}

#[tokio::test]
async fn test_error_left_on_context_counts_as_failure() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder))
        .use_middleware(unit("a", &recorder))
        .use_middleware(
            unit("sloppy", &recorder).before(Step::LeaveError("bad input".to_string())),
        );

    let err = pipeline.invoke(event(), events::metadata()).await.unwrap_err();

    assert_eq!(err.message(), "bad input");
    assert!(!recorder.contains("handler"));
    recorder.assert_order(&["a.before", "sloppy.before", "sloppy.on_error", "a.on_error"]);
}

#[tokio::test]
async fn test_failing_error_handler_replaces_error() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::failing(&recorder, "original"))
        .use_middleware(unit("a", &recorder))
        .use_middleware(unit("b", &recorder).on_error(Step::Fail("replacement".to_string())));

    let err = pipeline.invoke(event(), events::metadata()).await.unwrap_err();

    assert_eq!(err.message(), "replacement");
    // The chain continues with the new failure.
    assert!(recorder.contains("a.on_error"));
}

#[tokio::test]
async fn test_replaced_error_can_still_be_resolved() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::failing(&recorder, "original"))
        .use_middleware(unit("a", &recorder).on_error(Step::Resolve(json!("recovered"))))
        .use_middleware(unit("b", &recorder).on_error(Step::Fail("replacement".to_string())));

    let response = pipeline.invoke(event(), events::metadata()).await.unwrap();

    assert_eq!(response, json!("recovered"));
}

// ============================================================================
// Panics
// ============================================================================

#[tokio::test]
async fn test_phase_panic_becomes_failure() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder))
        .use_middleware(unit("a", &recorder))
        .use_middleware(
            unit("faulty", &recorder).before(Step::Panic("index out of range".to_string())),
        );

    let err = pipeline.invoke(event(), events::metadata()).await.unwrap_err();

    assert!(matches!(err, HandlerError::Internal { .. }));
    assert!(err.message().contains("faulty"));
    assert!(err.message().contains("index out of range"));
    recorder.assert_order(&["a.before", "faulty.before", "faulty.on_error", "a.on_error"]);
}

#[tokio::test]
async fn test_handler_panic_routes_to_error_chain() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::panicking(&recorder, "unreachable state"))
        .use_middleware(unit("a", &recorder).on_error(Step::Resolve(json!({ "statusCode": 500 }))));

    let response = pipeline.invoke(event(), events::metadata()).await.unwrap();

    assert_eq!(response, json!({ "statusCode": 500 }));
    recorder.assert_order(&["a.before", "handler", "a.on_error"]);
}

#[tokio::test]
async fn test_panics_propagate_when_catching_disabled() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::panicking(&recorder, "corrupt ledger"))
        .with_options(PipelineOptions::named("strict").catch_panics(false))
        .use_middleware(unit("a", &recorder).on_error(Step::Resolve(json!("hidden"))));

    let invocation =
        tokio::spawn(async move { pipeline.invoke(event(), events::metadata()).await });
    let join_error = invocation.await.unwrap_err();

    assert!(join_error.is_panic());
    recorder.assert_order(&["a.before", "handler"]);
}

// ============================================================================
// Termination
// ============================================================================

#[tokio::test]
async fn test_terminate_stops_remaining_phases() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder))
        .use_middleware(unit("a", &recorder).before(Step::Terminate))
        .use_middleware(unit("b", &recorder));

    let response = pipeline.invoke(event(), events::metadata()).await.unwrap();

    assert_eq!(response, Value::Null);
    recorder.assert_order(&["a.before"]);
}

#[tokio::test]
async fn test_terminate_in_after_keeps_response() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::respond(&recorder, json!("done")))
        .use_middleware(unit("a", &recorder))
        .use_middleware(unit("b", &recorder).after(Step::Terminate));

    let response = pipeline.invoke(event(), events::metadata()).await.unwrap();

    assert_eq!(response, json!("done"));
    recorder.assert_order(&["a.before", "b.before", "handler", "b.after"]);
}

#[tokio::test]
async fn test_terminate_in_error_handler_delivers_pending_error() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::failing(&recorder, "inventory offline"))
        .use_middleware(unit("a", &recorder).on_error(Step::Resolve(json!("fallback"))))
        .use_middleware(unit("b", &recorder).on_error(Step::Terminate));

    let err = pipeline.invoke(event(), events::metadata()).await.unwrap_err();

    assert_eq!(err.message(), "inventory offline");
    recorder.assert_order(&["a.before", "b.before", "handler", "b.on_error"]);
}

// ============================================================================
// Completion
// ============================================================================

#[tokio::test]
async fn test_callback_receives_exactly_one_outcome() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder));
    let probe = CallbackProbe::new();

    pipeline
        .invoke_with_callback(event(), events::metadata(), probe.callback())
        .await
        .unwrap();

    let err = pipeline
        .invoke_with_callback(event(), events::metadata(), probe.callback())
        .await
        .unwrap_err();

    assert_eq!(err, CompletionError::AlreadyCompleted { attempts: 2 });
    assert_eq!(probe.delivered(), 1);
    assert!(probe.take().unwrap().is_ok());
    assert_eq!(recorder.count("handler"), 2);
}

#[tokio::test]
async fn test_callback_receives_unhandled_error() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::failing(&recorder, "nope"));
    let probe = CallbackProbe::new();

    pipeline
        .invoke_with_callback(event(), events::metadata(), probe.callback())
        .await
        .unwrap();

    let outcome = probe.take().unwrap();
    assert_eq!(outcome.unwrap_err().message(), "nope");
}

#[tokio::test]
async fn test_phase_signalling_twice_uses_first_signal() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder)).use_middleware(
        FnMiddleware::new("double").before_callback(|_ctx, done| {
            let _ = done.succeed(Flow::Continue);
            let _ = done.fail(HandlerError::internal("ignored"));
        }),
    );

    let response = pipeline.invoke(event(), events::metadata()).await.unwrap();

    assert_eq!(response, json!({ "echo": event() }));
    assert_eq!(recorder.count("handler"), 1);
}

#[tokio::test]
async fn test_callback_phase_completed_from_another_task() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder)).use_middleware(
        FnMiddleware::new("lookup").before_callback(|ctx, done| {
            ctx.event_mut()["user"] = json!("alice");
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let _ = done.succeed(Flow::Continue);
            });
        }),
    );

    let response = pipeline.invoke(json!({}), events::metadata()).await.unwrap();

    assert_eq!(response, json!({ "echo": { "user": "alice" } }));
}

#[tokio::test]
async fn test_repeated_invocations_are_independent() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder))
        .use_middleware(unit("a", &recorder).before(Step::Tag))
        .use_middleware(unit("b", &recorder).before(Step::Tag));

    let first = pipeline.invoke(event(), events::metadata()).await.unwrap();
    let second = pipeline.invoke(event(), events::metadata()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first["echo"]["trail"], json!(["a", "b"]));
}

// ============================================================================
// Metrics
// ============================================================================

fn render_metrics_of(pipeline: &Pipeline) -> String {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    let _outcome = metrics::with_local_recorder(&recorder, || {
        tokio_test::block_on(pipeline.invoke(event(), events::metadata()))
    });
    handle.render()
}

#[test]
fn test_recovered_invocation_is_counted() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::failing(&recorder, "timeout"))
        .with_options(PipelineOptions::named("orders"))
        .use_middleware(unit("a", &recorder).on_error(Step::Resolve(json!("fallback"))));

    let output = render_metrics_of(&pipeline);

    assert!(output.contains(INVOCATIONS_TOTAL));
    assert!(output.contains("pipeline=\"orders\""));
    assert!(output.contains("outcome=\"recovered\""));
    assert!(output.contains(RECOVERED_ERRORS_TOTAL));
    assert!(output.contains("phase=\"handler\""));
}

#[test]
fn test_short_circuit_is_counted() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder))
        .with_options(PipelineOptions::named("cache"))
        .use_middleware(unit("a", &recorder).before(Step::Return(json!("cached"))));

    let output = render_metrics_of(&pipeline);

    assert!(output.contains(SHORT_CIRCUITS_TOTAL));
    assert!(output.contains("outcome=\"success\""));
    assert!(!output.contains(RECOVERED_ERRORS_TOTAL));
    assert!(!recorder.contains("handler"));
}

#[test]
fn test_metrics_skipped_when_disabled() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder))
        .with_options(PipelineOptions::named("quiet").record_metrics(false))
        .use_middleware(unit("a", &recorder).before(Step::Return(json!("cached"))));

    let output = render_metrics_of(&pipeline);

    assert!(!output.contains(INVOCATIONS_TOTAL));
    assert!(!output.contains(SHORT_CIRCUITS_TOTAL));
}

// ============================================================================
// Registration
// ============================================================================

#[tokio::test]
async fn test_register_rejected_while_invocation_running() {
    let recorder = Recorder::new();
    let mut pipeline = Pipeline::wrap(
        ScriptedHandler::echo(&recorder).with_delay(Duration::from_millis(50)),
    )
    .use_middleware(unit("a", &recorder));

    let running = pipeline.clone();
    let invocation =
        tokio::spawn(async move { running.invoke(event(), events::metadata()).await });

    let err = pipeline.register(unit("late", &recorder)).unwrap_err();
    assert!(matches!(err, PipelineError::StackInUse { holders } if holders >= 1));

    invocation.await.unwrap().unwrap();

    pipeline.register(unit("late", &recorder)).unwrap();
    assert_eq!(pipeline.middleware_names(), vec!["a", "late"]);
}

#[tokio::test]
async fn test_clone_keeps_its_own_stack() {
    let recorder = Recorder::new();
    let base =
        Pipeline::wrap(ScriptedHandler::echo(&recorder)).use_middleware(unit("a", &recorder));
    let extended = base.clone().use_middleware(unit("b", &recorder));

    base.invoke(event(), events::metadata()).await.unwrap();
    recorder.assert_order(&["a.before", "handler", "a.after"]);

    recorder.clear();
    extended.invoke(event(), events::metadata()).await.unwrap();
    recorder.assert_order(&["a.before", "b.before", "handler", "b.after", "a.after"]);
}

// ============================================================================
// Composition
// ============================================================================

#[tokio::test]
async fn test_nested_pipelines() {
    let recorder = Recorder::new();
    let inner = Pipeline::wrap(ScriptedHandler::echo(&recorder))
        .with_options(PipelineOptions::named("inner"))
        .use_middleware(unit("inner", &recorder));
    let outer = Pipeline::wrap(inner)
        .with_options(PipelineOptions::named("outer"))
        .use_middleware(unit("outer", &recorder));

    outer.invoke(event(), events::metadata()).await.unwrap();

    recorder.assert_order(&[
        "outer.before",
        "inner.before",
        "handler",
        "inner.after",
        "outer.after",
    ]);
}

#[tokio::test]
async fn test_nested_failure_reaches_outer_error_chain() {
    let recorder = Recorder::new();
    let inner = Pipeline::wrap(ScriptedHandler::failing(&recorder, "inner failure"))
        .use_middleware(unit("inner", &recorder));
    let outer = Pipeline::wrap(inner)
        .use_middleware(unit("outer", &recorder).on_error(Step::Resolve(json!("wrapped"))));

    let response = outer.invoke(event(), events::metadata()).await.unwrap();

    assert_eq!(response, json!("wrapped"));
    recorder.assert_order(&[
        "outer.before",
        "inner.before",
        "handler",
        "inner.on_error",
        "outer.on_error",
    ]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_invocations_do_not_leak_state() {
    let recorder = Recorder::new();
    let pipeline = Pipeline::wrap(ScriptedHandler::echo(&recorder))
        .use_middleware(
            unit("a", &recorder)
                .before(Step::Tag)
                .with_delay(Duration::from_millis(2)),
        )
        .use_middleware(unit("b", &recorder).before(Step::Tag));

    let mut tasks = tokio::task::JoinSet::new();
    for id in 0..32 {
        let pipeline = pipeline.clone();
        tasks.spawn(async move {
            let response = pipeline
                .invoke(json!({ "id": id }), events::metadata())
                .await
                .unwrap();
            (id, response)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (id, response) = joined.unwrap();
        assert_eq!(response["echo"]["id"], json!(id));
        assert_eq!(response["echo"]["trail"], json!(["a", "b"]));
    }
    assert_eq!(recorder.count("handler"), 32);
}

// ============================================================================
// Ordering model
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum BeforeScript {
    Continue,
    ShortCircuit,
    Fail,
}

fn before_script() -> impl Strategy<Value = BeforeScript> {
    prop_oneof![
        4 => Just(BeforeScript::Continue),
        1 => Just(BeforeScript::ShortCircuit),
        1 => Just(BeforeScript::Fail),
    ]
}

/// Computes the phase order and whether the invocation fails.
fn expected_trail(scripts: &[BeforeScript], handler_fails: bool) -> (Vec<String>, bool) {
    let mut trail = Vec::new();
    let mut entered = 0;
    let mut failed = false;
    let mut short_circuited = false;

    for (index, script) in scripts.iter().enumerate() {
        trail.push(format!("u{index}.before"));
        match script {
            BeforeScript::Continue => entered = index + 1,
            BeforeScript::ShortCircuit => {
                entered = index;
                short_circuited = true;
                break;
            }
            BeforeScript::Fail => {
                entered = index + 1;
                failed = true;
                break;
            }
        }
    }

    if !failed && !short_circuited {
        trail.push("handler".to_string());
        failed = handler_fails;
    }

    let phase = if failed { "on_error" } else { "after" };
    for index in (0..entered).rev() {
        trail.push(format!("u{index}.{phase}"));
    }
    (trail, failed)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_phase_order_matches_onion_model(
        scripts in prop::collection::vec(before_script(), 0..6),
        handler_fails in any::<bool>(),
    ) {
        let recorder = Recorder::new();
        let handler = if handler_fails {
            ScriptedHandler::failing(&recorder, "handler failed")
        } else {
            ScriptedHandler::echo(&recorder)
        };

        let pipeline = scripts.iter().enumerate().fold(
            Pipeline::wrap(handler),
            |pipeline, (index, script)| {
                let step = match script {
                    BeforeScript::Continue => Step::Continue,
                    BeforeScript::ShortCircuit => Step::Return(json!(index)),
                    BeforeScript::Fail => Step::Fail(format!("u{index} failed")),
                };
                pipeline.use_middleware(unit(&format!("u{index}"), &recorder).before(step))
            },
        );

        let outcome = tokio_test::block_on(pipeline.invoke(json!({}), events::metadata()));
        let (trail, failed) = expected_trail(&scripts, handler_fails);

        prop_assert_eq!(recorder.entries(), trail);
        prop_assert_eq!(outcome.is_err(), failed);
        prop_assert!(recorder.count("handler") <= 1);
    }
}
