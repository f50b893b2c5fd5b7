use super::*;
use crate::connection::{ConnectionConfig, ConnectionSupervisor};
use crate::error::{MissionError, StateMachineError};
use crate::geo::Coordinate;
use crate::testing::SimFlightStack;
use crate::vehicle::{FlightStack, Vehicle, VehicleKind};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, sleep};

const HOME: Coordinate = Coordinate::new(35.7274, -78.6962, 0.0);

#[derive(Default)]
struct Trace {
    log: Mutex<Vec<String>>,
    count: AtomicU32,
}

impl Trace {
    fn push(&self, entry: &str) {
        self.log.lock().unwrap().push(entry.to_string());
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

fn sim_vehicle() -> Arc<Vehicle> {
    let stack = SimFlightStack::new(HOME, 100.0);
    Vehicle::new(stack, VehicleKind::Drone, None)
}

#[test]
fn build_requires_exactly_one_initial_state() {
    let err = StateMachineBuilder::<Trace>::new().build().unwrap_err();
    assert_eq!(err, StateMachineError::NoInitialState);

    let err = StateMachineBuilder::<Trace>::new()
        .initial_state("a", state_fn(|_, _| async { Ok(None) }))
        .initial_state("b", state_fn(|_, _| async { Ok(None) }))
        .build()
        .unwrap_err();
    assert_eq!(
        err,
        StateMachineError::MultipleInitialStates(vec!["a".to_string(), "b".to_string()])
    );
}

#[test]
fn duplicate_and_empty_state_names_rejected() {
    let err = StateMachineBuilder::<Trace>::new()
        .initial_state("a", state_fn(|_, _| async { Ok(None) }))
        .state("a", state_fn(|_, _| async { Ok(None) }))
        .build()
        .unwrap_err();
    assert_eq!(err, StateMachineError::InvalidStateName("a".to_string()));

    let err = StateMachineBuilder::<Trace>::new()
        .initial_state("", state_fn(|_, _| async { Ok(None) }))
        .build()
        .unwrap_err();
    assert_eq!(err, StateMachineError::InvalidStateName(String::new()));
}

#[tokio::test(start_paused = true)]
async fn states_follow_returned_transitions() {
    let mut machine = StateMachineBuilder::<Trace>::new()
        .at_init(entry_fn(|m: Arc<Trace>, _| async move {
            m.push("init");
            Ok(())
        }))
        .initial_state(
            "takeoff",
            state_fn(|m: Arc<Trace>, _| async move {
                m.push("takeoff");
                Ok(Some("survey".to_string()))
            }),
        )
        .state(
            "survey",
            state_fn(|m: Arc<Trace>, _| async move {
                m.push("survey");
                Ok(None)
            }),
        )
        .build()
        .unwrap();

    let mission = Arc::new(Trace::default());
    machine.run(Arc::clone(&mission), sim_vehicle()).await.unwrap();
    assert_eq!(mission.log(), vec!["init", "takeoff", "survey"]);
}

#[tokio::test(start_paused = true)]
async fn unknown_transition_target_fails_the_mission() {
    let mut machine = StateMachineBuilder::<Trace>::new()
        .initial_state(
            "start",
            state_fn(|_, _| async { Ok(Some("missing".to_string())) }),
        )
        .build()
        .unwrap();

    let err = machine.run(Arc::new(Trace::default()), sim_vehicle()).await.unwrap_err();
    match err {
        MissionError::StateMachine(StateMachineError::InvalidState { target, available }) => {
            assert_eq!(target, "missing");
            assert_eq!(available, vec!["start".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn looped_timed_state_reinvokes_until_deadline() {
    let mut machine = StateMachineBuilder::<Trace>::new()
        .initial_timed_state(
            "hold",
            Duration::from_millis(100),
            true,
            state_fn(|m: Arc<Trace>, _| async move {
                m.count.fetch_add(1, Ordering::SeqCst);
                sleep(Duration::from_millis(30)).await;
                Ok(Some("done".to_string()))
            }),
        )
        .state("done", state_fn(|_, _| async { Ok(None) }))
        .build()
        .unwrap();

    let mission = Arc::new(Trace::default());
    machine.run(Arc::clone(&mission), sim_vehicle()).await.unwrap();
    // Invocations complete at 30, 70 and 110ms; the third crosses the
    // 100ms deadline and its transition is taken.
    assert_eq!(mission.count.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn non_looped_timed_state_holds_for_full_duration() {
    let mut machine = StateMachineBuilder::<Trace>::new()
        .initial_timed_state(
            "pause",
            Duration::from_millis(200),
            false,
            state_fn(|m: Arc<Trace>, _| async move {
                m.count.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            }),
        )
        .build()
        .unwrap();

    let mission = Arc::new(Trace::default());
    let started = Instant::now();
    machine.run(Arc::clone(&mission), sim_vehicle()).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(mission.count.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn forced_transition_overrides_handler_return() {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut machine = StateMachineBuilder::<Trace>::new()
        .initial_state(
            "alpha",
            state_fn(|m: Arc<Trace>, _| async move {
                m.push("alpha");
                // Would loop forever without the forced override.
                Ok(Some("alpha".to_string()))
            }),
        )
        .state(
            "bravo",
            state_fn(|m: Arc<Trace>, _| async move {
                m.push("bravo");
                Ok(None)
            }),
        )
        .with_forced_transitions(rx)
        .build()
        .unwrap();

    tx.send("bravo".to_string()).unwrap();
    let mission = Arc::new(Trace::default());
    machine.run(Arc::clone(&mission), sim_vehicle()).await.unwrap();
    assert_eq!(mission.log(), vec!["alpha", "bravo"]);
}

#[tokio::test(start_paused = true)]
async fn background_task_runs_alongside_states() {
    let mut machine = StateMachineBuilder::<Trace>::new()
        .background(background_fn(|m: Arc<Trace>, _| async move {
            m.count.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(20)).await;
            Ok(())
        }))
        .initial_state(
            "wait",
            state_fn(|_, _| async {
                sleep(Duration::from_millis(200)).await;
                Ok(None)
            }),
        )
        .build()
        .unwrap();

    let mission = Arc::new(Trace::default());
    machine.run(Arc::clone(&mission), sim_vehicle()).await.unwrap();
    assert!(mission.count.load(Ordering::SeqCst) >= 2);
}

#[test]
fn entry_builder_requires_exactly_one_entrypoint() {
    let err = EntryMissionBuilder::<Trace>::new().build().unwrap_err();
    assert_eq!(err, StateMachineError::NoEntrypoint);

    let err = EntryMissionBuilder::<Trace>::new()
        .entrypoint(entry_fn(|_, _| async { Ok(()) }))
        .entrypoint(entry_fn(|_, _| async { Ok(()) }))
        .build()
        .unwrap_err();
    assert_eq!(err, StateMachineError::MultipleEntrypoints);
}

#[tokio::test(start_paused = true)]
async fn entry_mission_runs_init_then_body() {
    let mut mission_runner = EntryMissionBuilder::<Trace>::new()
        .at_init(entry_fn(|m: Arc<Trace>, _| async move {
            m.push("init");
            Ok(())
        }))
        .entrypoint(entry_fn(|m: Arc<Trace>, _| async move {
            m.push("entry");
            Ok(())
        }))
        .build()
        .unwrap();

    let mission = Arc::new(Trace::default());
    mission_runner.run(Arc::clone(&mission), sim_vehicle()).await.unwrap();
    assert_eq!(mission.log(), vec!["init", "entry"]);
}

#[tokio::test(start_paused = true)]
async fn heartbeat_loss_preempts_the_running_state() {
    let stack = SimFlightStack::new(HOME, 100.0);
    let config = ConnectionConfig {
        heartbeat_grace: Duration::from_secs(1),
        heartbeat_timeout: Duration::from_secs(2),
        check_interval: Duration::from_secs(1),
        ..ConnectionConfig::default()
    };
    let (vehicle, supervisor) = ConnectionSupervisor::connect(
        config,
        Arc::clone(&stack) as Arc<dyn FlightStack>,
        VehicleKind::Drone,
        None,
    )
    .await
    .unwrap();

    let mut machine = StateMachineBuilder::<Trace>::new()
        .initial_state(
            "cruise",
            state_fn(|_, _| async {
                sleep(Duration::from_secs(3600)).await;
                Ok(None)
            }),
        )
        .with_supervisor(supervisor)
        .build()
        .unwrap();

    let killer = Arc::clone(&stack);
    tokio::spawn(async move {
        sleep(Duration::from_secs(5)).await;
        killer.set_link_up(false);
    });

    let started = Instant::now();
    let err = machine.run(Arc::new(Trace::default()), vehicle).await.unwrap_err();
    assert!(matches!(err, MissionError::Connection(_)));
    assert_eq!(err.exit_code(), 2);
    assert!(started.elapsed() < Duration::from_secs(60));
}
