//! Lifecycle and thread attachment tests

use super::*;
use crate::error::BridgeError;
use crate::scripted::{fixture, ScriptedRuntime};
use std::thread;

fn defaults() -> (Arc<ScriptedRuntime>, RuntimeHandle) {
    fixture(RuntimeOptions::default())
}

mod attach_tests {
    use super::*;

    #[test]
    fn test_current_attaches_once() {
        let (backend, runtime) = defaults();

        let env = runtime.current_env().unwrap();
        let again = runtime.current_env().unwrap();

        assert_eq!(env.thread_name(), again.thread_name());
        assert_eq!(env.state(), AttachState::AttachedNative);
        assert_eq!(runtime.attached_threads(), 1);
        assert_eq!(backend.attached_threads(), 1);

        env.detach();
        assert_eq!(runtime.attached_threads(), 0);
        assert_eq!(backend.attached_threads(), 0);
    }

    #[test]
    fn test_detach_is_idempotent() {
        let (_backend, runtime) = defaults();
        let env = runtime.current_env().unwrap();

        env.detach();
        env.detach();

        assert_eq!(env.state(), AttachState::Detached);
        assert!(!env.is_attached());
        assert_eq!(runtime.attached_threads(), 0);
    }

    #[test]
    fn test_detached_handle_rejects_operations() {
        let (_backend, runtime) = defaults();
        let env = runtime.current_env().unwrap();
        env.detach();

        assert!(matches!(env.resolve_class("java/lang/Object"), Err(BridgeError::Detached)));
        assert!(matches!(env.new_text("x"), Err(BridgeError::Detached)));
        assert!(env.check_exception().is_none());
    }

    #[test]
    fn test_reattach_after_detach() {
        let (_backend, runtime) = defaults();
        let first = runtime.current_env().unwrap();
        first.detach();

        let second = runtime.current_env().unwrap();
        assert!(second.is_attached());
        assert!(!first.is_attached());
        assert_eq!(runtime.attached_threads(), 1);
        second.detach();
    }

    #[test]
    fn test_daemon_attach_and_thread_name() {
        let options = RuntimeOptions {
            attach_as_daemon: true,
            thread_name_prefix: "worker".into(),
            ..RuntimeOptions::default()
        };
        let (backend, runtime) = fixture(options);

        let names = thread::Builder::new()
            .name("native-1".into())
            .spawn({
                let runtime = runtime.clone();
                let backend = backend.clone();
                move || {
                    let env = runtime.current_env().unwrap();
                    assert_eq!(env.state(), AttachState::AttachedAsDaemon);
                    let names = backend.attached_thread_names();
                    env.detach();
                    names
                }
            })
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(names, vec![("worker-native-1".to_string(), true)]);
    }

    #[test]
    fn test_each_thread_gets_its_own_environment() {
        let (backend, runtime) = defaults();
        let main = runtime.current_env().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let runtime = runtime.clone();
                thread::spawn(move || {
                    let env = runtime.current_env().unwrap();
                    let raw = env.raw();
                    env.detach();
                    raw
                })
            })
            .collect();

        for handle in handles {
            assert_ne!(handle.join().unwrap(), main.raw());
        }
        assert_eq!(backend.attached_threads(), 1);
        main.detach();
    }

    #[test]
    fn test_attach_refused() {
        let (backend, runtime) = defaults();
        backend.refuse_attach(true);

        assert!(matches!(runtime.current_env(), Err(BridgeError::AttachFailed(_))));
        assert_eq!(runtime.attached_threads(), 0);
    }

    #[test]
    fn test_runtime_owned_thread_is_borrowed() {
        let (backend, runtime) = defaults();

        thread::spawn({
            let runtime = runtime.clone();
            let backend = backend.clone();
            move || {
                let raw = backend.adopt_current_thread("runtime-worker").unwrap();

                let env = runtime.current_env().unwrap();
                assert_eq!(env.state(), AttachState::Borrowed);
                assert_eq!(env.raw(), raw);
                assert_eq!(runtime.attached_threads(), 0);
                let _ = env.new_text("scratch").unwrap();

                env.detach();
                assert!(!env.is_attached());
                assert_eq!(backend.attached_threads(), 1);
                assert_eq!(backend.thread_handle_counts().locals, 0);

                // Exits still holding a handle
                let again = runtime.current_env().unwrap();
                assert_eq!(again.state(), AttachState::Borrowed);
                assert!(backend.release_adopted_thread());
            }
        })
        .join()
        .unwrap();

        assert_eq!(runtime.leak_report().leaked_threads, 0);
        assert_eq!(runtime.attached_threads(), 0);
        assert_eq!(backend.attached_threads(), 0);
        assert_eq!(backend.protocol_violations(), 0);
        runtime.shutdown().unwrap();
    }

    #[test]
    fn test_exited_thread_counts_as_leak() {
        let (backend, runtime) = defaults();

        thread::spawn({
            let runtime = runtime.clone();
            move || {
                let env = runtime.current_env().unwrap();
                let _ = env.new_text("left behind").unwrap();
            }
        })
        .join()
        .unwrap();

        assert_eq!(runtime.leak_report().leaked_threads, 1);
        assert_eq!(runtime.attached_threads(), 0);
        assert_eq!(backend.attached_threads(), 0);
        assert_eq!(backend.handle_counts().locals, 0);
    }
}

mod lifecycle_tests {
    use super::*;

    #[test]
    fn test_starts_running() {
        let (_backend, runtime) = defaults();
        assert_eq!(runtime.state(), LifecycleState::Running);
        assert!(runtime.is_running());
    }

    #[test]
    fn test_startup_failure() {
        let backend = ScriptedRuntime::new();
        backend.fail_startup(true);

        let result = RuntimeHandle::isolated(backend, RuntimeOptions::default());
        assert!(matches!(result, Err(BridgeError::StartupFailed(_))));
    }

    #[test]
    fn test_shutdown_refused_while_attached() {
        let (backend, runtime) = defaults();
        let env = runtime.current_env().unwrap();

        match runtime.shutdown() {
            Err(BridgeError::ActiveThreadsAttached { count }) => assert_eq!(count, 1),
            other => panic!("unexpected {:?}", other),
        }
        assert!(runtime.is_running());
        assert!(!backend.is_destroyed());

        env.detach();
        runtime.shutdown().unwrap();
        assert_eq!(runtime.state(), LifecycleState::Stopped);
        assert!(backend.is_destroyed());
    }

    #[test]
    fn test_operations_after_shutdown() {
        let (_backend, runtime) = defaults();
        runtime.shutdown().unwrap();

        assert!(matches!(runtime.current_env(), Err(BridgeError::RuntimeNotRunning)));
        assert!(matches!(runtime.shutdown(), Err(BridgeError::RuntimeNotRunning)));
    }

    #[test]
    fn test_shutdown_releases_cached_descriptors() {
        let (backend, runtime) = defaults();
        let env = runtime.current_env().unwrap();
        env.resolve_class("java.lang.String").unwrap();
        env.resolve_class("java.lang.Throwable").unwrap();
        assert_eq!(backend.handle_counts().globals, 2);

        env.detach();
        runtime.shutdown().unwrap();

        assert_eq!(backend.handle_counts().globals, 0);
        assert_eq!(backend.protocol_violations(), 0);
    }

    #[test]
    fn test_leak_report_counts_globals() {
        let (_backend, runtime) = defaults();
        let env = runtime.current_env().unwrap();

        let text = env.new_text("kept").unwrap();
        let global = env.promote(&text).unwrap();
        let weak = env.downgrade(&text).unwrap();

        let report = runtime.leak_report();
        assert_eq!(report.live_globals, 1);
        assert_eq!(report.live_weaks, 1);
        assert!(report.has_leaks());

        env.release(&global);
        env.release(&weak);
        assert!(!runtime.leak_report().has_leaks());
        env.detach();
    }

    #[test]
    fn test_debug_output() {
        let (_backend, runtime) = defaults();
        let text = format!("{:?}", runtime);
        assert!(text.contains("scripted"));
        assert!(text.contains("Running"));
    }
}
