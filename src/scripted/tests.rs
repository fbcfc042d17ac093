//! Scripted runtime tests, driven through the raw capability set

use super::*;

fn attached(runtime: &ScriptedRuntime) -> RawEnv {
    runtime.attach_current_thread(AttachMode::Native, "test").unwrap()
}

fn class(runtime: &ScriptedRuntime, env: RawEnv, name: &str) -> RawObject {
    runtime.find_class(env, name).unwrap()
}

mod heap_tests {
    use super::*;

    #[test]
    fn test_bootstrap_classes_present() {
        let runtime = ScriptedRuntime::new();
        let env = attached(&runtime);

        for name in ["java/lang/Object", "java/lang/String", "java/lang/Throwable", "java/lang/NoSuchMethodError"] {
            assert!(runtime.find_class(env, name).is_some(), "{} missing", name);
        }
        assert_eq!(runtime.protocol_violations(), 0);
        runtime.detach_current_thread(env).unwrap();
    }

    #[test]
    fn test_missing_class_leaves_exception_pending() {
        let runtime = ScriptedRuntime::new();
        let env = attached(&runtime);

        assert!(runtime.find_class(env, "demo/Missing").is_none());
        assert!(runtime.exception_check(env));

        // Any further call except the exception functions is a violation
        runtime.find_class(env, "java/lang/Object");
        assert_eq!(runtime.protocol_violations(), 1);

        runtime.exception_clear(env);
        assert!(!runtime.exception_check(env));
        runtime.detach_current_thread(env).unwrap();
    }

    #[test]
    fn test_define_rejects_duplicates_and_bad_signatures() {
        let runtime = ScriptedRuntime::new();
        runtime.define(ClassBuilder::new("demo/A")).unwrap();

        assert!(runtime.define(ClassBuilder::new("demo.A")).is_err());
        assert!(runtime
            .define(ClassBuilder::new("demo/B").method("m", "(I", |_| Ok(Slot::Void)))
            .is_err());
        assert!(runtime.define(ClassBuilder::new("demo/C").extends("demo/Nope")).is_err());
    }

    #[test]
    fn test_handle_deletion_checks_kind() {
        let runtime = ScriptedRuntime::new();
        let env = attached(&runtime);
        let local = class(&runtime, env, "java/lang/String");
        let global = runtime.new_global_ref(env, local).unwrap();

        runtime.delete_global_ref(env, local);
        assert_eq!(runtime.protocol_violations(), 1);

        runtime.delete_global_ref(env, global);
        runtime.delete_local_ref(env, local);
        runtime.delete_local_ref(env, local);
        assert_eq!(runtime.protocol_violations(), 2);
        assert_eq!(runtime.handle_counts(), HandleCounts::default());
        runtime.detach_current_thread(env).unwrap();
    }

    #[test]
    fn test_detach_drops_thread_locals() {
        let runtime = ScriptedRuntime::new();
        let env = attached(&runtime);
        runtime.new_string(env, &[0x41]).unwrap();
        assert_eq!(runtime.thread_handle_counts().locals, 1);

        runtime.detach_current_thread(env).unwrap();
        assert_eq!(runtime.handle_counts().locals, 0);
        assert!(runtime.detach_current_thread(env).is_err());
    }

    #[test]
    fn test_collection_clears_weak_handles() {
        let runtime = ScriptedRuntime::new();
        let env = attached(&runtime);

        let string = runtime.new_string(env, &[0x61]).unwrap();
        let weak = runtime.new_weak_ref(env, string).unwrap();
        let kept = runtime.new_string(env, &[0x62]).unwrap();
        let global = runtime.new_global_ref(env, kept).unwrap();

        runtime.delete_local_ref(env, string);
        runtime.delete_local_ref(env, kept);
        assert!(runtime.collect_garbage() >= 1);

        assert!(runtime.is_same_object(env, Some(weak), None));
        assert!(runtime.string_units(env, global).is_some());
        runtime.detach_current_thread(env).unwrap();
    }

    #[test]
    fn test_attach_is_per_thread() {
        let runtime = ScriptedRuntime::new();
        let first = attached(&runtime);
        let again = runtime.attach_current_thread(AttachMode::Daemon, "ignored").unwrap();
        assert_eq!(first, again);

        let other = std::thread::spawn({
            let runtime = Arc::clone(&runtime);
            move || {
                let env = runtime.attach_current_thread(AttachMode::Daemon, "other").unwrap();
                let names = runtime.attached_thread_names();
                runtime.detach_current_thread(env).unwrap();
                (env, names)
            }
        })
        .join()
        .unwrap();

        assert_ne!(other.0, first);
        assert_eq!(other.1, vec![("other".to_string(), true), ("test".to_string(), false)]);
        runtime.detach_current_thread(first).unwrap();
    }

    #[test]
    fn test_destroy_refuses_attach() {
        let runtime = ScriptedRuntime::new();
        runtime.destroy().unwrap();
        assert!(runtime.is_destroyed());
        assert!(runtime.attach_current_thread(AttachMode::Native, "late").is_err());
        assert!(runtime.destroy().is_err());
    }
}

mod invoke_tests {
    use super::*;

    fn shapes(runtime: &ScriptedRuntime) {
        runtime
            .define(
                ClassBuilder::new("demo/Shape")
                    .constructor("()V", |_| Ok(Slot::Void))
                    .method("sides", "()I", |_| Ok(Slot::Int(0))),
            )
            .unwrap();
        runtime
            .define(
                ClassBuilder::new("demo/Square")
                    .extends("demo/Shape")
                    .constructor("()V", |_| Ok(Slot::Void))
                    .method("sides", "()I", |_| Ok(Slot::Int(4))),
            )
            .unwrap();
    }

    #[test]
    fn test_virtual_dispatch() {
        let runtime = ScriptedRuntime::new();
        shapes(&runtime);
        let env = attached(&runtime);

        let shape = class(&runtime, env, "demo/Shape");
        let square = class(&runtime, env, "demo/Square");
        let sides = runtime.method_id(env, shape, "sides", "()I", false).unwrap();
        let init = runtime.method_id(env, square, "<init>", "()V", false).unwrap();

        let object = runtime.new_object(env, square, init, &[]).unwrap();
        let result = runtime.call_method(env, CallTarget::Instance(object), sides, WireType::Int, &[]);

        assert_eq!(result, WireValue::Int(4));
        assert!(runtime.is_instance_of(env, object, shape));
        assert_eq!(runtime.protocol_violations(), 0);
        runtime.detach_current_thread(env).unwrap();
    }

    #[test]
    fn test_declared_return_type_is_checked() {
        let runtime = ScriptedRuntime::new();
        shapes(&runtime);
        let env = attached(&runtime);
        let shape = class(&runtime, env, "demo/Shape");
        let sides = runtime.method_id(env, shape, "sides", "()I", false).unwrap();
        let init = runtime.method_id(env, shape, "<init>", "()V", false).unwrap();
        let object = runtime.new_object(env, shape, init, &[]).unwrap();

        let result = runtime.call_method(env, CallTarget::Instance(object), sides, WireType::Long, &[]);

        assert_eq!(result, WireValue::Long(0));
        assert_eq!(runtime.protocol_violations(), 1);
        runtime.detach_current_thread(env).unwrap();
    }

    #[test]
    fn test_throw_new_builds_message() {
        let runtime = ScriptedRuntime::new();
        let env = attached(&runtime);
        let ise = class(&runtime, env, "java/lang/IllegalStateException");
        let throwable = class(&runtime, env, "java/lang/Throwable");
        let get_message = runtime
            .method_id(env, throwable, "getMessage", "()Ljava/lang/String;", false)
            .unwrap();

        runtime.throw_new(env, ise, "bad state").unwrap();
        let exception = runtime.exception_occurred(env).unwrap();
        runtime.exception_clear(env);

        let message = runtime.call_method(env, CallTarget::Instance(exception), get_message, WireType::Object, &[]);
        let units = runtime.string_units(env, message.as_object().unwrap()).unwrap();
        assert_eq!(String::from_utf16(&units).unwrap(), "bad state");
        runtime.detach_current_thread(env).unwrap();
    }

    #[test]
    fn test_body_can_call_back() {
        let runtime = ScriptedRuntime::new();
        shapes(&runtime);
        runtime
            .define(ClassBuilder::new("demo/Report").static_method(
                "describe",
                "(Ldemo/Shape;)Ljava/lang/String;",
                |call| {
                    let shape = call.arg(0).object().ok_or_else(|| Thrown::bare("java/lang/NullPointerException"))?;
                    let sides = call.invoke(shape, "sides", "()I", vec![])?;
                    let name = call.class_name(shape).unwrap_or_default();
                    Ok(call.new_string(&format!("{} has {} sides", name, sides.as_int().unwrap_or(-1))))
                },
            ))
            .unwrap();
        let env = attached(&runtime);
        let square = class(&runtime, env, "demo/Square");
        let report = class(&runtime, env, "demo/Report");
        let init = runtime.method_id(env, square, "<init>", "()V", false).unwrap();
        let describe = runtime
            .method_id(env, report, "describe", "(Ldemo/Shape;)Ljava/lang/String;", true)
            .unwrap();
        let object = runtime.new_object(env, square, init, &[]).unwrap();

        let text = runtime.call_method(
            env,
            CallTarget::Static(report),
            describe,
            WireType::Object,
            &[WireValue::Object(Some(object))],
        );
        let units = runtime.string_units(env, text.as_object().unwrap()).unwrap();
        assert_eq!(String::from_utf16(&units).unwrap(), "demo/Square has 4 sides");
        runtime.detach_current_thread(env).unwrap();
    }
}

mod array_tests {
    use super::*;

    #[test]
    fn test_primitive_region() {
        let runtime = ScriptedRuntime::new();
        let env = attached(&runtime);
        let array = runtime.new_array(env, WireType::Int, 4).unwrap();

        runtime.set_array_region(env, array, 1, &[WireValue::Int(7), WireValue::Int(8)]);
        let values = runtime.get_array_region(env, array, WireType::Int, 0, 4).unwrap();

        assert_eq!(
            values,
            vec![WireValue::Int(0), WireValue::Int(7), WireValue::Int(8), WireValue::Int(0)]
        );
        assert_eq!(runtime.array_length(env, array), Some(4));
        runtime.detach_current_thread(env).unwrap();
    }

    #[test]
    fn test_out_of_bounds_raises() {
        let runtime = ScriptedRuntime::new();
        let env = attached(&runtime);
        let array = runtime.new_array(env, WireType::Byte, 2).unwrap();

        assert!(runtime.get_array_region(env, array, WireType::Byte, 1, 2).is_none());
        assert!(runtime.exception_check(env));
        runtime.exception_clear(env);

        assert!(runtime.new_array(env, WireType::Int, -1).is_none());
        assert!(runtime.exception_check(env));
        runtime.exception_clear(env);
        runtime.detach_current_thread(env).unwrap();
    }

    #[test]
    fn test_reference_array_store_check() {
        let runtime = ScriptedRuntime::new();
        let env = attached(&runtime);
        let string_class = class(&runtime, env, "java/lang/String");
        let throwable = class(&runtime, env, "java/lang/Throwable");
        let array = runtime.new_object_array(env, 2, string_class, None).unwrap();
        let text = runtime.new_string(env, &[0x7A]).unwrap();

        runtime.set_object_array_element(env, array, 1, Some(text));
        let element = runtime.get_object_array_element(env, array, 1).unwrap();
        assert!(runtime.is_same_object(env, Some(element), Some(text)));
        assert!(runtime.get_object_array_element(env, array, 0).is_none());

        runtime.set_object_array_element(env, array, 0, Some(throwable));
        assert!(runtime.exception_check(env));
        runtime.exception_clear(env);
        runtime.detach_current_thread(env).unwrap();
    }
}
