//! Process-wide runtime lifecycle
//!
//! The process-wide slot can be filled once, so this binary holds a single test.

use jnat::runtime::global_state;
use jnat::scripted::ScriptedRuntime;
use jnat::{AttachState, BridgeError, BridgeResult, EnvironmentHandle, LifecycleState, RuntimeOptions};
use std::io::Write;

fn add(_env: &EnvironmentHandle, a: i32, b: i32) -> BridgeResult<i32> {
    a.checked_add(b).ok_or_else(|| BridgeError::TypeMismatch {
        expected: "int sum".into(),
        found: "overflow".into(),
    })
}

fn explode(_env: &EnvironmentHandle, depth: i32) -> BridgeResult<bool> {
    panic!("too deep: {}", depth);
}

jnat::jnat!(demo::Calc, add, (i32, i32) -> i32);
jnat::jnat!(demo::Calc, explode, (i32) -> bool);

/// Message of the exception an export left pending
fn pending_message(env: &EnvironmentHandle) -> Option<String> {
    let pending = env.check_exception()?;
    let error = env.materialize(pending).ok()?;
    assert_eq!(error.class_name, "java.lang.RuntimeException");
    error.message
}

#[test]
fn test_process_runtime_lifecycle() {
    assert!(matches!(jnat::global(), Err(BridgeError::RuntimeNotRunning)));
    assert_eq!(global_state(), LifecycleState::Uninitialized);
    assert_eq!(Java_demo_Calc_add(2, 3), 0);

    // A failed startup leaves the slot free for a retry
    let failing = ScriptedRuntime::new();
    failing.fail_startup(true);
    assert!(matches!(
        jnat::initialize(failing, RuntimeOptions::default()),
        Err(BridgeError::StartupFailed(_))
    ));
    assert_eq!(global_state(), LifecycleState::Uninitialized);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "attach_as_daemon = true").unwrap();
    writeln!(file, "thread_name_prefix = \"app\"").unwrap();
    let options = RuntimeOptions::from_file(file.path()).unwrap();

    let backend = ScriptedRuntime::new();
    let runtime = jnat::initialize(backend.clone(), options).unwrap();
    assert!(matches!(
        jnat::initialize(ScriptedRuntime::new(), RuntimeOptions::default()),
        Err(BridgeError::AlreadyInitialized)
    ));
    assert_eq!(global_state(), LifecycleState::Running);

    let global = jnat::global().unwrap();
    assert_eq!(global.id(), runtime.id());

    let env = jnat::current(&global).unwrap();
    assert_eq!(env.state(), AttachState::AttachedAsDaemon);
    assert!(env.thread_name().starts_with("app-"));
    assert_eq!(backend.attached_thread_names(), vec![(env.thread_name().to_string(), true)]);
    assert_eq!(jnat::entry(&runtime, |env| env.read_text(&env.new_text("inside")?)), Some("inside".to_string()));

    // Exported symbols run against the process-wide runtime
    assert_eq!(Java_demo_Calc_add(2, 3), 5);
    assert!(!env.has_pending_exception());
    assert_eq!(Java_demo_Calc_add(i32::MAX, 1), 0);
    assert_eq!(
        pending_message(&env).as_deref(),
        Some("type mismatch: expected int sum, found overflow")
    );
    assert!(!Java_demo_Calc_explode(3));
    assert_eq!(pending_message(&env).as_deref(), Some("native code panicked: too deep: 3"));
    assert_eq!(env.reference_stats().live_locals, 0);

    assert!(matches!(
        runtime.shutdown(),
        Err(BridgeError::ActiveThreadsAttached { count: 1 })
    ));
    env.detach();
    runtime.shutdown().unwrap();

    assert_eq!(global_state(), LifecycleState::Stopped);
    assert!(backend.is_destroyed());
    assert!(matches!(runtime.current_env(), Err(BridgeError::RuntimeNotRunning)));
    assert!(matches!(runtime.shutdown(), Err(BridgeError::RuntimeNotRunning)));
    assert_eq!(jnat::entry(&runtime, |_| Ok(1)), None);
    assert_eq!(Java_demo_Calc_add(2, 3), 0);
}
