//! Descriptor resolution and cache tests

use super::*;
use crate::config::RuntimeOptions;
use crate::scripted::{fixture, ClassBuilder, Slot};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

fn counter_class() -> ClassBuilder {
    ClassBuilder::new("demo/Counter")
        .field("count", "I")
        .static_field("instances", "I", Slot::Int(0))
        .constructor("()V", |_| Ok(Slot::Void))
        .method("increment", "(I)I", |call| Ok(Slot::Int(call.int(0).unwrap_or(0) + 1)))
        .static_method("create", "()Ldemo/Counter;", |_| Ok(Slot::Null))
}

mod class_tests {
    use super::*;

    #[test]
    fn test_dotted_and_slashed_names_share_entry() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();

        let a = env.resolve_class("java.lang.String").unwrap();
        let b = env.resolve_class("java/lang/String").unwrap();

        assert_eq!(a, b);
        assert_eq!(a.name(), "java/lang/String");
        assert_eq!(a.binary_name(), "java.lang.String");
        assert_eq!(backend.class_lookups("java/lang/String"), 1);

        let stats = runtime.resolver_stats();
        assert_eq!(stats.class_lookups, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.cached_classes, 1);
        env.detach();
    }

    #[test]
    fn test_missing_class_is_not_cached() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();

        match env.resolve_class("demo.Counter") {
            Err(BridgeError::ClassNotFound(name)) => assert_eq!(name, "demo/Counter"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!env.has_pending_exception());

        backend.define(counter_class()).unwrap();
        let class = env.resolve_class("demo.Counter").unwrap();

        assert_eq!(class.name(), "demo/Counter");
        assert_eq!(backend.class_lookups("demo/Counter"), 2);
        assert_eq!(backend.protocol_violations(), 0);
        env.detach();
    }

    #[test]
    fn test_resolution_refused_while_exception_pending() {
        let (_backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();

        env.throw_new("java/lang/IllegalStateException", "pending").unwrap();
        assert!(matches!(env.resolve_class("java/lang/String"), Err(BridgeError::ExceptionPending)));

        env.clear_exception();
        assert!(env.resolve_class("java/lang/String").is_ok());
        env.detach();
    }

    #[test]
    fn test_concurrent_first_resolution_looks_up_once() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        backend.define(counter_class()).unwrap();
        backend.set_lookup_delay(Some(Duration::from_millis(20)));

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let runtime = runtime.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let env = runtime.current_env().unwrap();
                    barrier.wait();
                    let class = env.resolve_class("demo/Counter").unwrap();
                    env.detach();
                    class
                })
            })
            .collect();

        let classes: Vec<ClassDescriptor> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(backend.class_lookups("demo/Counter"), 1);
        assert!(classes.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(runtime.resolver_stats().class_lookups, 1);
    }
}

mod member_tests {
    use super::*;

    #[test]
    fn test_method_cached() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();
        let string = env.resolve_class("java/lang/String").unwrap();

        let a = env.resolve_method(&string, "length", "()I", false).unwrap();
        let b = env.resolve_method(&string, "length", "()I", false).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.kind(), MemberKind::Method);
        assert!(!a.is_static());
        assert_eq!(a.value_type(), &JavaType::Int);
        assert!(a.param_types().is_empty());
        assert_eq!(a.to_string(), "java/lang/String.length ()I");
        assert_eq!(backend.member_lookups(), 1);
        env.detach();
    }

    #[test]
    fn test_missing_member_reports_and_clears() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();
        let string = env.resolve_class("java/lang/String").unwrap();

        match env.resolve_method(&string, "reverse", "()Ljava/lang/String;", false) {
            Err(BridgeError::MemberNotFound { class, name, signature }) => {
                assert_eq!(class, "java/lang/String");
                assert_eq!(name, "reverse");
                assert_eq!(signature, "()Ljava/lang/String;");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(!env.has_pending_exception());

        assert!(env.resolve_method(&string, "reverse", "()Ljava/lang/String;", false).is_err());
        assert_eq!(backend.member_lookups(), 2);
        assert_eq!(backend.protocol_violations(), 0);
        env.detach();
    }

    #[test]
    fn test_static_and_instance_are_distinct() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        backend.define(counter_class()).unwrap();
        let env = runtime.current_env().unwrap();
        let class = env.resolve_class("demo.Counter").unwrap();

        let create = env.resolve_method(&class, "create", "()Ldemo/Counter;", true).unwrap();
        assert!(create.is_static());
        assert!(env.resolve_method(&class, "create", "()Ldemo/Counter;", false).is_err());
        assert!(env.resolve_method(&class, "increment", "(I)I", true).is_err());
        env.detach();
    }

    #[test]
    fn test_constructor_resolution() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        backend.define(counter_class()).unwrap();
        let env = runtime.current_env().unwrap();
        let class = env.resolve_class("demo.Counter").unwrap();

        let by_name = env.resolve_method(&class, CONSTRUCTOR_NAME, "()V", false).unwrap();
        let direct = env.resolve_constructor(&class, "()V").unwrap();
        assert_eq!(by_name.kind(), MemberKind::Constructor);
        assert_eq!(by_name, direct);

        assert!(matches!(
            env.resolve_constructor(&class, "()I"),
            Err(BridgeError::InvalidSignature { .. })
        ));
        env.detach();
    }

    #[test]
    fn test_field_resolution() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        backend.define(counter_class()).unwrap();
        let env = runtime.current_env().unwrap();
        let class = env.resolve_class("demo.Counter").unwrap();

        let count = env.resolve_field(&class, "count", "I", false).unwrap();
        let instances = env.resolve_field(&class, "instances", "I", true).unwrap();

        assert_eq!(count.kind(), MemberKind::Field);
        assert_eq!(count.signature(), "I");
        assert!(instances.is_static());
        assert!(matches!(
            env.resolve_field(&class, "count", "J", false),
            Err(BridgeError::MemberNotFound { .. })
        ));
        env.detach();
    }

    #[test]
    fn test_malformed_signature_never_reaches_runtime() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();
        let string = env.resolve_class("java/lang/String").unwrap();

        assert!(matches!(
            env.resolve_method(&string, "length", "(I", false),
            Err(BridgeError::InvalidSignature { .. })
        ));
        assert!(matches!(
            env.resolve_field(&string, "value", "Q", false),
            Err(BridgeError::InvalidSignature { .. })
        ));
        assert_eq!(backend.member_lookups(), 0);
        env.detach();
    }

    #[test]
    fn test_inherited_member() {
        let (_backend, runtime) = fixture(RuntimeOptions::default());
        let env = runtime.current_env().unwrap();
        let class = env.resolve_class("java/lang/IllegalStateException").unwrap();

        let get_message = env.resolve_method(&class, "getMessage", "()Ljava/lang/String;", false).unwrap();
        assert_eq!(get_message.class(), &class);
        assert_eq!(get_message.value_type(), &JavaType::string());
        env.detach();
    }
}

mod reentrancy_tests {
    use super::*;
    use crate::runtime::RuntimeHandle;
    use crate::scripted::LookupHook;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    /// Resolves again from inside the lookup of each listed name, once per name
    fn reenter_once(runtime: &RuntimeHandle, names: &[&str], seen: Arc<Mutex<Vec<String>>>) -> LookupHook {
        let runtime = runtime.clone();
        let pending: Mutex<HashSet<String>> = Mutex::new(names.iter().map(|n| n.to_string()).collect());
        Arc::new(move |name: &str| {
            if !pending.lock().remove(name) {
                return;
            }
            let env = runtime.current_env().unwrap();
            let outcome = env.resolve_class("demo.Counter").and_then(|class| {
                if name == "increment" {
                    env.resolve_method(&class, "increment", "(I)I", false).map(|m| m.to_string())
                } else {
                    Ok(class.name().to_string())
                }
            });
            seen.lock().push(outcome.unwrap_or_else(|e| e.to_string()));
        })
    }

    #[test]
    fn test_class_lookup_reentering_same_class() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        backend.define(counter_class()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        backend.set_lookup_hook(Some(reenter_once(&runtime, &["demo/Counter"], Arc::clone(&seen))));
        let env = runtime.current_env().unwrap();

        let class = env.resolve_class("demo.Counter").unwrap();

        assert_eq!(*seen.lock(), vec!["demo/Counter".to_string()]);
        assert_eq!(backend.class_lookups("demo/Counter"), 2);
        assert_eq!(env.resolve_class("demo/Counter").unwrap(), class);
        assert_eq!(runtime.resolver_stats().cached_classes, 1);
        assert_eq!(backend.handle_counts().globals, 2);

        backend.set_lookup_hook(None);
        env.detach();
        runtime.shutdown().unwrap();
        assert_eq!(backend.handle_counts().globals, 0);
        assert_eq!(backend.protocol_violations(), 0);
    }

    #[test]
    fn test_member_lookup_reentering_same_member() {
        let (backend, runtime) = fixture(RuntimeOptions::default());
        backend.define(counter_class()).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        backend.set_lookup_hook(Some(reenter_once(&runtime, &["increment"], Arc::clone(&seen))));
        let env = runtime.current_env().unwrap();
        let class = env.resolve_class("demo.Counter").unwrap();

        let method = env.resolve_method(&class, "increment", "(I)I", false).unwrap();

        assert_eq!(*seen.lock(), vec!["demo/Counter.increment (I)I".to_string()]);
        assert_eq!(backend.member_lookups(), 2);
        assert_eq!(env.resolve_method(&class, "increment", "(I)I", false).unwrap(), method);
        let stats = runtime.resolver_stats();
        assert_eq!(stats.cached_members, 1);
        assert_eq!(stats.member_lookups, 2);

        backend.set_lookup_hook(None);
        env.detach();
    }
}
