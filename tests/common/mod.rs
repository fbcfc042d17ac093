//! Shared fixtures for integration tests
//!
//! The classes mirror small managed programs that call into native code and
//! get called back from it.

#![allow(dead_code)]

use jnat::backend::RawObject;
use jnat::runtime::RuntimeHandle;
use jnat::scripted::{ClassBuilder, ScriptedRuntime, Slot, Thrown};
use jnat::{BridgeError, BridgeResult, EnvironmentHandle, RuntimeOptions};
use std::sync::Arc;

pub fn start() -> (Arc<ScriptedRuntime>, RuntimeHandle) {
    start_with(RuntimeOptions::default())
}

pub fn start_with(options: RuntimeOptions) -> (Arc<ScriptedRuntime>, RuntimeHandle) {
    let backend = ScriptedRuntime::new();
    let runtime = RuntimeHandle::isolated(backend.clone(), options).unwrap();
    install(&backend, &runtime);
    (backend, runtime)
}

/// Native implementation of `Hello.hello(String)`
pub fn hello(env: &EnvironmentHandle, name: Option<RawObject>) -> BridgeResult<String> {
    let name = name.ok_or_else(|| BridgeError::TypeMismatch {
        expected: "java.lang.String".into(),
        found: "null".into(),
    })?;
    let name = env.adopt_local(name)?;
    Ok(format!("Hello, {}!", env.read_text(&name)?))
}

fn install(backend: &ScriptedRuntime, runtime: &RuntimeHandle) {
    let native = runtime.clone();
    backend
        .define(
            ClassBuilder::new("Hello").static_method("hello", "(Ljava/lang/String;)Ljava/lang/String;", move |call| {
                let name = call.local_ref(call.arg(0));
                let greeting = jnat::entry(&native, |env| hello(env, name));
                Ok(greeting.map_or(Slot::Null, |text| call.new_string(&text)))
            }),
        )
        .unwrap();

    backend
        .define(
            ClassBuilder::new("CallMethod")
                .constructor("()V", |_| Ok(Slot::Void))
                .method("callback", "(I)V", |call| {
                    call.print(format!("Static callback: {}", call.int(0).unwrap_or_default()));
                    Ok(Slot::Void)
                }),
        )
        .unwrap();

    backend
        .define(
            ClassBuilder::new("Method")
                .constructor("()V", |_| Ok(Slot::Void))
                .method("callback", "(ILjava/lang/String;)V", |call| {
                    let n = call.int(0).unwrap_or_default();
                    let s = call.string(1).unwrap_or_else(|| "null".into());
                    call.print(format!("Static callback: {}{}", n, s));
                    Ok(Slot::Void)
                })
                .static_method("fail", "(Ljava/lang/String;)V", |call| {
                    Err(Thrown::new("java/lang/IllegalStateException", call.string(0).unwrap_or_default()))
                }),
        )
        .unwrap();

    backend
        .define(ClassBuilder::new("StaticField").static_field("staticField", "I", Slot::Int(0)))
        .unwrap();

    backend
        .define(
            ClassBuilder::new("Field")
                .field("field", "I")
                .field("name", "Ljava/lang/String;")
                .constructor("(I)V", |call| {
                    if let Some(this) = call.this() {
                        call.set_field(this, "field", call.arg(0));
                    }
                    Ok(Slot::Void)
                }),
        )
        .unwrap();

    backend
        .define(ClassBuilder::new("Echo").static_method("echo", "(I)I", |call| {
            Ok(call.int(0).map_or(Slot::Void, Slot::Int))
        }))
        .unwrap();
}
