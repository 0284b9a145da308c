//! End-to-end supervisor scenarios: ordering, rollback, aggregation,
//! re-entrancy, deadlines, and shutdown triggers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use appvisor::{
    Component, Context, LifecycleFn, LifecycleRef, RunError, Supervisor, SupervisorBuilder,
};

/// Shared event log recording lifecycle calls in order.
#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }
}

/// Component that records its calls and succeeds.
fn ok_component(name: &str, rec: &Recorder) -> Component {
    let start_rec = rec.clone();
    let stop_rec = rec.clone();
    let start_name = format!("start:{name}");
    let stop_name = format!("stop:{name}");
    let lifecycle: LifecycleRef = LifecycleFn::arc(
        move |_ctx: Context| {
            let rec = start_rec.clone();
            let event = start_name.clone();
            async move {
                rec.push(event);
                Ok(())
            }
        },
        move |_ctx: Context| {
            let rec = stop_rec.clone();
            let event = stop_name.clone();
            async move {
                rec.push(event);
                Ok(())
            }
        },
    );
    Component::new(name, lifecycle)
}

/// Component whose start fails with `reason`.
fn failing_start_component(name: &str, rec: &Recorder, reason: &'static str) -> Component {
    let start_rec = rec.clone();
    let stop_rec = rec.clone();
    let start_name = format!("start:{name}");
    let stop_name = format!("stop:{name}");
    Component::new(
        name,
        LifecycleFn::arc(
            move |_ctx: Context| {
                let rec = start_rec.clone();
                let event = start_name.clone();
                async move {
                    rec.push(event);
                    Err(reason.into())
                }
            },
            move |_ctx: Context| {
                let rec = stop_rec.clone();
                let event = stop_name.clone();
                async move {
                    rec.push(event);
                    Ok(())
                }
            },
        ),
    )
}

/// Component whose stop fails with `reason`.
fn failing_stop_component(name: &str, rec: &Recorder, reason: &'static str) -> Component {
    let start_rec = rec.clone();
    let stop_rec = rec.clone();
    let start_name = format!("start:{name}");
    let stop_name = format!("stop:{name}");
    Component::new(
        name,
        LifecycleFn::arc(
            move |_ctx: Context| {
                let rec = start_rec.clone();
                let event = start_name.clone();
                async move {
                    rec.push(event);
                    Ok(())
                }
            },
            move |_ctx: Context| {
                let rec = stop_rec.clone();
                let event = stop_name.clone();
                async move {
                    rec.push(event);
                    Err(reason.into())
                }
            },
        ),
    )
}

fn exit_after(app: &Arc<Supervisor>, delay: Duration) {
    let app = Arc::clone(app);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        app.exit();
    });
}

#[tokio::test]
async fn clean_lifecycle_runs_components_in_order() {
    let rec = Recorder::default();
    let app = Arc::new(
        SupervisorBuilder::new()
            .with_components(vec![
                ok_component("1", &rec),
                ok_component("2", &rec),
                ok_component("3", &rec),
            ])
            .build()
            .unwrap(),
    );

    exit_after(&app, Duration::from_millis(100));
    app.run(Context::background()).await.unwrap();

    assert_eq!(
        rec.events(),
        vec!["start:1", "start:2", "start:3", "stop:3", "stop:2", "stop:1"]
    );
}

#[tokio::test]
async fn middle_start_failure_rolls_back_started_components() {
    let rec = Recorder::default();
    let app = SupervisorBuilder::new()
        .with_components(vec![
            ok_component("1", &rec),
            failing_start_component("2", &rec, "boom"),
            ok_component("3", &rec),
        ])
        .build()
        .unwrap();

    let err = app.run(Context::background()).await.unwrap_err();

    // components 1 and 2 started, only 1 rolled back, 3 never touched
    assert_eq!(rec.events(), vec!["start:1", "start:2", "stop:1"]);

    match err {
        RunError::Start(component_err) => {
            assert_eq!(component_err.component(), "2");
            assert_eq!(component_err.phase(), appvisor::Phase::Start);
            assert_eq!(
                component_err.to_string(),
                r#"start component "2": boom"#
            );
            let cause = std::error::Error::source(&component_err).unwrap();
            assert_eq!(cause.to_string(), "boom");
        }
        other => panic!("expected RunError::Start, got {other:?}"),
    }
}

#[tokio::test]
async fn stop_failures_aggregate_every_cause() {
    let rec = Recorder::default();
    let app = Arc::new(
        SupervisorBuilder::new()
            .with_components(vec![
                failing_stop_component("1", &rec, "first"),
                failing_stop_component("2", &rec, "second"),
                failing_stop_component("3", &rec, "third"),
            ])
            .build()
            .unwrap(),
    );

    exit_after(&app, Duration::from_millis(50));
    let err = app.run(Context::background()).await.unwrap_err();

    assert_eq!(
        rec.events(),
        vec!["start:1", "start:2", "start:3", "stop:3", "stop:2", "stop:1"]
    );

    match err {
        RunError::Stop(aggregate) => {
            let errors = aggregate.errors();
            assert_eq!(errors.len(), 3);
            // stop order, one error per component, causes intact
            let components: Vec<_> = errors.iter().map(|e| e.component()).collect();
            assert_eq!(components, vec!["3", "2", "1"]);
            let causes: Vec<_> = errors
                .iter()
                .map(|e| std::error::Error::source(e).unwrap().to_string())
                .collect();
            assert_eq!(causes, vec!["third", "second", "first"]);
            for e in errors {
                assert_eq!(e.phase(), appvisor::Phase::Stop);
            }
        }
        other => panic!("expected RunError::Stop, got {other:?}"),
    }
}

#[tokio::test]
async fn run_is_not_reentrant() {
    let rec = Recorder::default();
    let app = Arc::new(
        SupervisorBuilder::new()
            .with_component(ok_component("only", &rec))
            .build()
            .unwrap(),
    );

    exit_after(&app, Duration::from_millis(50));
    app.run(Context::background()).await.unwrap();

    let err = app.run(Context::background()).await.unwrap_err();
    assert!(matches!(err, RunError::AlreadyStarted));
    assert_eq!(err.to_string(), "application already started");

    // the second run never touched the component
    assert_eq!(rec.count("start:only"), 1);
    assert_eq!(rec.count("stop:only"), 1);
}

#[tokio::test]
async fn exit_is_idempotent_and_works_before_run() {
    let rec = Recorder::default();
    let app = SupervisorBuilder::new()
        .with_component(ok_component("only", &rec))
        .build()
        .unwrap();

    app.exit();
    app.exit();
    app.exit();

    app.run(Context::background()).await.unwrap();
    assert_eq!(rec.events(), vec!["start:only", "stop:only"]);

    // after a finished run, exit has no effect
    app.exit();
    assert_eq!(rec.count("stop:only"), 1);
}

#[tokio::test]
async fn parent_cancellation_triggers_clean_shutdown() {
    let rec = Recorder::default();
    let app = SupervisorBuilder::new()
        .with_component(ok_component("only", &rec))
        .build()
        .unwrap();

    let ctx = Context::background();
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        canceller.cancel();
    });

    app.run(ctx).await.unwrap();
    assert_eq!(rec.events(), vec!["start:only", "stop:only"]);
}

#[tokio::test]
async fn start_deadline_fails_run_without_stopping_unstarted() {
    let rec = Recorder::default();
    let stop_rec = rec.clone();

    let slow: LifecycleRef = LifecycleFn::arc(
        |ctx: Context| async move {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(200)) => Ok(()),
                _ = ctx.cancelled() => {
                    Err(Box::new(ctx.error().unwrap()) as appvisor::BoxError)
                }
            }
        },
        move |_ctx: Context| {
            let rec = stop_rec.clone();
            async move {
                rec.push("stop:slow");
                Ok(())
            }
        },
    );

    let app = SupervisorBuilder::new()
        .with_start_timeout(Duration::from_millis(100))
        .with_component(Component::new("slow", slow))
        .build()
        .unwrap();

    let err = app.run(Context::background()).await.unwrap_err();
    assert!(matches!(err, RunError::Start(_)));
    // rollback only covers completed starts
    assert_eq!(rec.count("stop:slow"), 0);
}

#[tokio::test]
async fn stop_waits_for_spawned_background_tasks() {
    let rec = Recorder::default();
    let app = Arc::new(
        SupervisorBuilder::new()
            .with_component(ok_component("only", &rec))
            .build()
            .unwrap(),
    );

    let task_rec = rec.clone();
    app.spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        task_rec.push("background-done");
    });

    exit_after(&app, Duration::from_millis(50));
    app.run(Context::background()).await.unwrap();

    assert_eq!(rec.count("background-done"), 1);
}

#[tokio::test]
async fn drain_timeout_is_not_a_failure() {
    let rec = Recorder::default();
    let app = Arc::new(
        SupervisorBuilder::new()
            .with_stop_timeout(Duration::from_millis(100))
            .with_component(ok_component("only", &rec))
            .build()
            .unwrap(),
    );

    // never finishes within the stop budget
    app.spawn(async {
        tokio::time::sleep(Duration::from_secs(60)).await;
    });

    exit_after(&app, Duration::from_millis(50));
    app.run(Context::background()).await.unwrap();
    assert_eq!(rec.count("stop:only"), 1);
}

#[cfg(unix)]
#[tokio::test]
#[ignore = "delivers a real SIGINT; run with --ignored in an isolated process"]
async fn interrupt_signal_triggers_clean_shutdown() {
    let rec = Recorder::default();
    let app = SupervisorBuilder::new()
        .with_component(ok_component("only", &rec))
        .build()
        .unwrap();

    tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = std::process::Command::new("kill")
            .args(["-INT", &std::process::id().to_string()])
            .status();
    });

    app.run(Context::background()).await.unwrap();
    assert_eq!(rec.events(), vec!["start:only", "stop:only"]);
}
