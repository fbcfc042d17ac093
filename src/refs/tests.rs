//! Reference scope and frame tests

use super::*;
use crate::config::RuntimeOptions;
use crate::scripted::fixture;
use std::thread;

mod scope_tests {
    use super::*;

    #[test]
    fn test_local_release_is_idempotent() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();

        let text = env.new_text("abc").unwrap();
        assert!(text.is_local());
        assert_eq!(backend.thread_handle_counts().locals, 1);

        env.release(&text);
        env.release(&text);

        assert_eq!(backend.thread_handle_counts().locals, 0);
        assert!(matches!(env.raw_object(&text), Err(BridgeError::InvalidReference(_))));
        assert_eq!(backend.protocol_violations(), 0);
        env.detach();
    }

    #[test]
    fn test_promote_survives_frame() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();

        let global = env.with_frame(|env| {
            let text = env.new_text("shared").unwrap();
            env.promote(&text).unwrap()
        });

        assert_eq!(global.scope(), RefScope::Global);
        assert_eq!(backend.thread_handle_counts().locals, 0);
        assert_eq!(env.read_text(&global).unwrap(), "shared");

        env.release(&global);
        env.release(&global);
        assert_eq!(backend.handle_counts().globals, 0);
        env.detach();
    }

    #[test]
    fn test_global_release_from_detached_env_stays_live() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();
        let text = env.new_text("kept").unwrap();
        let global = env.promote(&text).unwrap();
        env.detach();

        env.release(&global);
        assert_eq!(runtime.leak_report().live_globals, 1);
        assert_eq!(backend.handle_counts().globals, 1);

        let fresh = runtime.current_env().unwrap();
        assert_eq!(fresh.read_text(&global).unwrap(), "kept");
        fresh.release(&global);
        assert_eq!(runtime.leak_report().live_globals, 0);
        assert_eq!(backend.handle_counts().globals, 0);
        assert_eq!(backend.protocol_violations(), 0);
        fresh.detach();
    }

    #[test]
    fn test_global_usable_from_other_thread() {
        let (_backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();
        let text = env.new_text("crossing").unwrap();
        let global = env.promote(&text).unwrap();

        let read = thread::spawn({
            let runtime = runtime.clone();
            move || {
                let env = runtime.current_env().unwrap();
                let text = env.read_text(&global);
                env.detach();
                text
            }
        })
        .join()
        .unwrap();

        assert_eq!(read.unwrap(), "crossing");
        env.release(&global);
        env.detach();
    }

    #[test]
    fn test_local_invalid_on_other_thread() {
        let (_backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();
        let local = env.new_text("mine").unwrap();

        let result = thread::spawn({
            let runtime = runtime.clone();
            move || {
                let env = runtime.current_env().unwrap();
                let result = env.read_text(&local);
                env.detach();
                result
            }
        })
        .join()
        .unwrap();

        assert!(matches!(result, Err(BridgeError::InvalidReference(_))));
        env.detach();
    }

    #[test]
    fn test_weak_reference_lifecycle() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();

        let text = env.new_text("fleeting").unwrap();
        let weak = env.downgrade(&text).unwrap();
        assert_eq!(weak.scope(), RefScope::Weak);
        assert!(env.is_alive(&weak).unwrap());

        let strong = env.upgrade(&weak).unwrap().unwrap();
        assert!(env.is_same_object(&strong, &text).unwrap());
        env.release(&strong);

        env.release(&text);
        backend.collect_garbage();

        assert!(!env.is_alive(&weak).unwrap());
        assert!(env.upgrade(&weak).unwrap().is_none());

        env.release(&weak);
        assert_eq!(backend.handle_counts().weaks, 0);
        env.detach();
    }

    #[test]
    fn test_promote_released_reference() {
        let (_backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();
        let text = env.new_text("gone").unwrap();
        env.release(&text);

        assert!(matches!(env.promote(&text), Err(BridgeError::InvalidReference(_))));
        env.detach();
    }

    #[test]
    fn test_identity_comparison() {
        let (_backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();

        let a = env.new_text("same").unwrap();
        let b = env.new_text("same").unwrap();
        let a_global = env.promote(&a).unwrap();

        assert!(env.is_same_object(&a, &a_global).unwrap());
        assert!(!env.is_same_object(&a, &b).unwrap());

        env.release(&a_global);
        env.detach();
    }
}

mod frame_tests {
    use super::*;

    #[test]
    fn test_frame_releases_its_locals() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();
        let outer = env.new_text("outer").unwrap();

        {
            let _frame = env.push_frame();
            for i in 0..10 {
                env.new_text(&i.to_string()).unwrap();
            }
            assert_eq!(env.reference_stats().live_locals, 11);
            assert_eq!(env.reference_stats().frame_depth, 2);
        }

        let stats = env.reference_stats();
        assert_eq!(stats.live_locals, 1);
        assert_eq!(stats.frame_depth, 1);
        assert_eq!(stats.created_locals, 11);
        assert_eq!(stats.released_locals, 10);
        assert_eq!(backend.thread_handle_counts().locals, 1);
        assert_eq!(env.read_text(&outer).unwrap(), "outer");
        env.detach();
    }

    #[test]
    fn test_loop_with_frames_stays_bounded() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();

        for i in 0..1000 {
            env.with_frame(|env| {
                let text = env.new_text(&format!("item-{}", i)).unwrap();
                assert_eq!(env.read_text(&text).unwrap(), format!("item-{}", i));
            });
        }

        assert_eq!(env.reference_stats().live_locals, 0);
        assert_eq!(backend.thread_handle_counts().locals, 0);
        env.detach();
    }

    #[test]
    fn test_outer_guard_closes_inner_frames() {
        let (_backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();

        let outer = env.push_frame();
        let inner = env.push_frame();
        env.new_text("deep").unwrap();
        std::mem::forget(inner);
        drop(outer);

        let stats = env.reference_stats();
        assert_eq!(stats.frame_depth, 1);
        assert_eq!(stats.live_locals, 0);
        env.detach();
    }

    #[test]
    fn test_explicit_release_inside_frame() {
        let (_backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();

        env.with_frame(|env| {
            let text = env.new_text("early").unwrap();
            env.release(&text);
        });

        let stats = env.reference_stats();
        assert_eq!(stats.created_locals, 1);
        assert_eq!(stats.released_locals, 1);
        env.detach();
    }

    #[test]
    fn test_detach_releases_locals() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();
        let text = env.new_text("dropped").unwrap();

        env.detach();

        assert_eq!(env.reference_stats().live_locals, 0);
        assert_eq!(backend.handle_counts().locals, 0);
        assert!(matches!(env.raw_object(&text), Err(BridgeError::InvalidReference(_))));
    }
}

mod report_tests {
    use super::*;

    #[test]
    fn test_leak_report_json() {
        let report = LeakReport {
            live_globals: 2,
            live_weaks: 0,
            leaked_threads: 1,
            attached_threads: 0,
        };
        assert!(report.has_leaks());
        let json = report.to_json();
        assert!(json.contains("\"live_globals\":2"));
        assert!(json.contains("\"leaked_threads\":1"));
    }

    #[test]
    fn test_clean_report() {
        assert!(!LeakReport::default().has_leaks());
    }

    #[test]
    fn test_global_table_counts() {
        let table = GlobalTable::new();
        let raw = RawObject::from_raw(9).unwrap();
        table.insert(1, raw, RefScope::Global);
        table.insert(2, raw, RefScope::Weak);
        table.insert(3, raw, RefScope::Global);
        assert_eq!(table.counts(), (2, 1));

        assert!(table.remove(3).is_some());
        assert!(table.remove(3).is_none());
        assert_eq!(table.counts(), (1, 1));
        assert_eq!(table.get(1), Some(raw));
    }
}
