//! `ManagedRuntime` over a Java virtual machine
//!
//! Design: thin adapter over the raw JNI function tables from `jni::sys`.
//! Every capability maps onto one table entry; no state is kept apart from
//! the set of threads this adapter attached itself (threads the JVM created
//! are never detached by the bridge).

use crate::backend::{
    AttachMode, CallTarget, ManagedRuntime, RawEnv, RawField, RawMethod, RawObject, WireType, WireValue,
};
use crate::error::BackendError;
use dashmap::DashSet;
use jni::sys::{self, jint, jobject, jsize, jvalue};
use smallvec::SmallVec;
use std::ffi::{c_void, CString};
use std::ptr;
use std::thread::{self, ThreadId};

/// Call a JNI environment function; `$default` when the table lacks it
macro_rules! jni_env {
    ($env:expr, $name:ident $(, $arg:expr)* ; $default:expr) => {{
        let env: *mut sys::JNIEnv = $env;
        // SAFETY: `env` is a live environment pointer for the calling thread
        match unsafe { (**env).$name } {
            Some(f) => unsafe { f(env $(, $arg)*) },
            None => $default,
        }
    }};
}

/// Call a JNI invocation-interface function
macro_rules! jni_vm {
    ($vm:expr, $name:ident $(, $arg:expr)*) => {{
        let vm: *mut sys::JavaVM = $vm;
        // SAFETY: `vm` points to the process JavaVM for the adapter's lifetime
        match unsafe { (**vm).$name } {
            Some(f) => unsafe { f(vm $(, $arg)*) },
            None => sys::JNI_ERR,
        }
    }};
}

pub struct JvmRuntime {
    vm: *mut sys::JavaVM,
    owns_vm: bool,
    attached: DashSet<ThreadId>,
}

// SAFETY: a JavaVM pointer is valid on every thread; per-thread JNIEnv
// pointers are obtained through attach and never shared
unsafe impl Send for JvmRuntime {}
unsafe impl Sync for JvmRuntime {}

impl JvmRuntime {
    /// Wrap the VM hosting this library, e.g. from `JNI_OnLoad`
    ///
    /// Shutdown leaves the VM running.
    pub fn hosted(vm: &jni::JavaVM) -> Self {
        Self {
            vm: vm.get_java_vm_pointer(),
            owns_vm: false,
            attached: DashSet::new(),
        }
    }

    /// Wrap the VM behind a live environment
    pub fn from_env(env: &jni::JNIEnv<'_>) -> Result<Self, BackendError> {
        let vm = env
            .get_java_vm()
            .map_err(|e| BackendError::new(sys::JNI_ERR, e.to_string()))?;
        Ok(Self::hosted(&vm))
    }

    /// Wrap a VM this process created; shutdown destroys it
    ///
    /// # Safety
    /// `vm` must be a valid `JavaVM` pointer that outlives the adapter.
    pub unsafe fn owning(vm: *mut sys::JavaVM) -> Self {
        Self {
            vm,
            owns_vm: true,
            attached: DashSet::new(),
        }
    }

    fn current_env(&self) -> Option<*mut sys::JNIEnv> {
        let mut env: *mut c_void = ptr::null_mut();
        let status = jni_vm!(self.vm, GetEnv, &mut env, sys::JNI_VERSION_1_8);
        (status == sys::JNI_OK && !env.is_null()).then_some(env as *mut sys::JNIEnv)
    }
}

#[inline]
fn env_ptr(env: RawEnv) -> *mut sys::JNIEnv {
    env.as_raw() as *mut sys::JNIEnv
}

#[inline]
fn obj(raw: RawObject) -> jobject {
    raw.as_raw() as jobject
}

#[inline]
fn opt_obj(raw: Option<RawObject>) -> jobject {
    raw.map_or(ptr::null_mut(), obj)
}

#[inline]
fn raw_obj(object: jobject) -> Option<RawObject> {
    RawObject::from_raw(object as usize)
}

fn to_jvalue(value: &WireValue) -> jvalue {
    match *value {
        WireValue::Void => jvalue { j: 0 },
        WireValue::Boolean(z) => jvalue { z },
        WireValue::Byte(b) => jvalue { b },
        WireValue::Char(c) => jvalue { c },
        WireValue::Short(s) => jvalue { s },
        WireValue::Int(i) => jvalue { i },
        WireValue::Long(j) => jvalue { j },
        WireValue::Float(f) => jvalue { f },
        WireValue::Double(d) => jvalue { d },
        WireValue::Object(o) => jvalue { l: opt_obj(o) },
    }
}

fn status(code: jint, what: &str) -> Result<(), BackendError> {
    if code == sys::JNI_OK {
        Ok(())
    } else {
        Err(BackendError::new(code, format!("{} failed", what)))
    }
}

/// Copy a primitive region into wire values
macro_rules! get_region {
    ($env:expr, $fn:ident, $ty:ty, $array:expr, $start:expr, $len:expr, $wrap:path) => {{
        let mut buf: Vec<$ty> = vec![<$ty>::default(); $len as usize];
        jni_env!($env, $fn, $array, $start, $len, buf.as_mut_ptr(); ());
        buf.into_iter().map($wrap).collect()
    }};
}

/// Write wire values of one variant into a primitive region
macro_rules! set_region {
    ($env:expr, $fn:ident, $array:expr, $start:expr, $values:expr, $variant:path) => {{
        let buf: Vec<_> = $values
            .iter()
            .filter_map(|v| match v {
                $variant(x) => Some(*x),
                _ => None,
            })
            .collect();
        if buf.len() == $values.len() {
            jni_env!($env, $fn, $array, $start, buf.len() as jsize, buf.as_ptr(); ());
        }
    }};
}

impl ManagedRuntime for JvmRuntime {
    fn name(&self) -> &str {
        "jvm"
    }

    fn startup(&self) -> Result<(), BackendError> {
        if self.vm.is_null() {
            return Err(BackendError::new(sys::JNI_ERR, "null JavaVM pointer"));
        }
        Ok(())
    }

    fn attach_current_thread(&self, mode: AttachMode, thread_name: &str) -> Result<RawEnv, BackendError> {
        if let Some(env) = self.current_env() {
            return RawEnv::from_raw(env as usize).ok_or_else(|| BackendError::new(sys::JNI_ERR, "null env"));
        }

        let name = CString::new(thread_name).map_err(|e| BackendError::new(sys::JNI_EINVAL, e.to_string()))?;
        let mut args = sys::JavaVMAttachArgs {
            version: sys::JNI_VERSION_1_8,
            name: name.as_ptr() as *mut _,
            group: ptr::null_mut(),
        };
        let mut env: *mut c_void = ptr::null_mut();
        let args_ptr = &mut args as *mut sys::JavaVMAttachArgs as *mut c_void;
        let code = match mode {
            AttachMode::Native => jni_vm!(self.vm, AttachCurrentThread, &mut env, args_ptr),
            AttachMode::Daemon => jni_vm!(self.vm, AttachCurrentThreadAsDaemon, &mut env, args_ptr),
        };
        status(code, "AttachCurrentThread")?;

        self.attached.insert(thread::current().id());
        RawEnv::from_raw(env as usize).ok_or_else(|| BackendError::new(sys::JNI_ERR, "null env"))
    }

    fn borrowed_env(&self) -> Option<RawEnv> {
        if self.attached.contains(&thread::current().id()) {
            return None;
        }
        self.current_env().and_then(|env| RawEnv::from_raw(env as usize))
    }

    fn detach_current_thread(&self, _env: RawEnv) -> Result<(), BackendError> {
        // Threads the JVM started stay attached
        if self.attached.remove(&thread::current().id()).is_none() {
            return Ok(());
        }
        status(jni_vm!(self.vm, DetachCurrentThread), "DetachCurrentThread")
    }

    fn destroy(&self) -> Result<(), BackendError> {
        if !self.owns_vm {
            return Ok(());
        }
        status(jni_vm!(self.vm, DestroyJavaVM), "DestroyJavaVM")
    }

    fn find_class(&self, env: RawEnv, name: &str) -> Option<RawObject> {
        let name = CString::new(name).ok()?;
        raw_obj(jni_env!(env_ptr(env), FindClass, name.as_ptr(); ptr::null_mut()))
    }

    fn method_id(&self, env: RawEnv, class: RawObject, name: &str, signature: &str, is_static: bool) -> Option<RawMethod> {
        let (name, signature) = (CString::new(name).ok()?, CString::new(signature).ok()?);
        let env = env_ptr(env);
        let id = if is_static {
            jni_env!(env, GetStaticMethodID, obj(class), name.as_ptr(), signature.as_ptr(); ptr::null_mut())
        } else {
            jni_env!(env, GetMethodID, obj(class), name.as_ptr(), signature.as_ptr(); ptr::null_mut())
        };
        RawMethod::from_raw(id as usize)
    }

    fn field_id(&self, env: RawEnv, class: RawObject, name: &str, signature: &str, is_static: bool) -> Option<RawField> {
        let (name, signature) = (CString::new(name).ok()?, CString::new(signature).ok()?);
        let env = env_ptr(env);
        let id = if is_static {
            jni_env!(env, GetStaticFieldID, obj(class), name.as_ptr(), signature.as_ptr(); ptr::null_mut())
        } else {
            jni_env!(env, GetFieldID, obj(class), name.as_ptr(), signature.as_ptr(); ptr::null_mut())
        };
        RawField::from_raw(id as usize)
    }

    fn object_class(&self, env: RawEnv, object: RawObject) -> Option<RawObject> {
        raw_obj(jni_env!(env_ptr(env), GetObjectClass, obj(object); ptr::null_mut()))
    }

    fn is_instance_of(&self, env: RawEnv, object: RawObject, class: RawObject) -> bool {
        jni_env!(env_ptr(env), IsInstanceOf, obj(object), obj(class); sys::JNI_FALSE) == sys::JNI_TRUE
    }

    fn call_method(&self, env: RawEnv, target: CallTarget, method: RawMethod, ret: WireType, args: &[WireValue]) -> WireValue {
        let env = env_ptr(env);
        let m = method.as_raw() as sys::jmethodID;
        let args: SmallVec<[jvalue; 8]> = args.iter().map(to_jvalue).collect();
        let a = args.as_ptr();

        match target {
            CallTarget::Instance(receiver) => {
                let o = obj(receiver);
                match ret {
                    WireType::Void => {
                        jni_env!(env, CallVoidMethodA, o, m, a; ());
                        WireValue::Void
                    }
                    WireType::Boolean => WireValue::Boolean(jni_env!(env, CallBooleanMethodA, o, m, a; 0)),
                    WireType::Byte => WireValue::Byte(jni_env!(env, CallByteMethodA, o, m, a; 0)),
                    WireType::Char => WireValue::Char(jni_env!(env, CallCharMethodA, o, m, a; 0)),
                    WireType::Short => WireValue::Short(jni_env!(env, CallShortMethodA, o, m, a; 0)),
                    WireType::Int => WireValue::Int(jni_env!(env, CallIntMethodA, o, m, a; 0)),
                    WireType::Long => WireValue::Long(jni_env!(env, CallLongMethodA, o, m, a; 0)),
                    WireType::Float => WireValue::Float(jni_env!(env, CallFloatMethodA, o, m, a; 0.0)),
                    WireType::Double => WireValue::Double(jni_env!(env, CallDoubleMethodA, o, m, a; 0.0)),
                    WireType::Object => WireValue::Object(raw_obj(jni_env!(env, CallObjectMethodA, o, m, a; ptr::null_mut()))),
                }
            }
            CallTarget::Static(class) => {
                let c = obj(class);
                match ret {
                    WireType::Void => {
                        jni_env!(env, CallStaticVoidMethodA, c, m, a; ());
                        WireValue::Void
                    }
                    WireType::Boolean => WireValue::Boolean(jni_env!(env, CallStaticBooleanMethodA, c, m, a; 0)),
                    WireType::Byte => WireValue::Byte(jni_env!(env, CallStaticByteMethodA, c, m, a; 0)),
                    WireType::Char => WireValue::Char(jni_env!(env, CallStaticCharMethodA, c, m, a; 0)),
                    WireType::Short => WireValue::Short(jni_env!(env, CallStaticShortMethodA, c, m, a; 0)),
                    WireType::Int => WireValue::Int(jni_env!(env, CallStaticIntMethodA, c, m, a; 0)),
                    WireType::Long => WireValue::Long(jni_env!(env, CallStaticLongMethodA, c, m, a; 0)),
                    WireType::Float => WireValue::Float(jni_env!(env, CallStaticFloatMethodA, c, m, a; 0.0)),
                    WireType::Double => WireValue::Double(jni_env!(env, CallStaticDoubleMethodA, c, m, a; 0.0)),
                    WireType::Object => {
                        WireValue::Object(raw_obj(jni_env!(env, CallStaticObjectMethodA, c, m, a; ptr::null_mut())))
                    }
                }
            }
        }
    }

    fn new_object(&self, env: RawEnv, class: RawObject, constructor: RawMethod, args: &[WireValue]) -> Option<RawObject> {
        let args: SmallVec<[jvalue; 8]> = args.iter().map(to_jvalue).collect();
        let m = constructor.as_raw() as sys::jmethodID;
        raw_obj(jni_env!(env_ptr(env), NewObjectA, obj(class), m, args.as_ptr(); ptr::null_mut()))
    }

    fn get_field(&self, env: RawEnv, target: CallTarget, field: RawField, ty: WireType) -> WireValue {
        let env = env_ptr(env);
        let f = field.as_raw() as sys::jfieldID;
        match target {
            CallTarget::Instance(object) => {
                let o = obj(object);
                match ty {
                    WireType::Void => WireValue::Void,
                    WireType::Boolean => WireValue::Boolean(jni_env!(env, GetBooleanField, o, f; 0)),
                    WireType::Byte => WireValue::Byte(jni_env!(env, GetByteField, o, f; 0)),
                    WireType::Char => WireValue::Char(jni_env!(env, GetCharField, o, f; 0)),
                    WireType::Short => WireValue::Short(jni_env!(env, GetShortField, o, f; 0)),
                    WireType::Int => WireValue::Int(jni_env!(env, GetIntField, o, f; 0)),
                    WireType::Long => WireValue::Long(jni_env!(env, GetLongField, o, f; 0)),
                    WireType::Float => WireValue::Float(jni_env!(env, GetFloatField, o, f; 0.0)),
                    WireType::Double => WireValue::Double(jni_env!(env, GetDoubleField, o, f; 0.0)),
                    WireType::Object => WireValue::Object(raw_obj(jni_env!(env, GetObjectField, o, f; ptr::null_mut()))),
                }
            }
            CallTarget::Static(class) => {
                let c = obj(class);
                match ty {
                    WireType::Void => WireValue::Void,
                    WireType::Boolean => WireValue::Boolean(jni_env!(env, GetStaticBooleanField, c, f; 0)),
                    WireType::Byte => WireValue::Byte(jni_env!(env, GetStaticByteField, c, f; 0)),
                    WireType::Char => WireValue::Char(jni_env!(env, GetStaticCharField, c, f; 0)),
                    WireType::Short => WireValue::Short(jni_env!(env, GetStaticShortField, c, f; 0)),
                    WireType::Int => WireValue::Int(jni_env!(env, GetStaticIntField, c, f; 0)),
                    WireType::Long => WireValue::Long(jni_env!(env, GetStaticLongField, c, f; 0)),
                    WireType::Float => WireValue::Float(jni_env!(env, GetStaticFloatField, c, f; 0.0)),
                    WireType::Double => WireValue::Double(jni_env!(env, GetStaticDoubleField, c, f; 0.0)),
                    WireType::Object => {
                        WireValue::Object(raw_obj(jni_env!(env, GetStaticObjectField, c, f; ptr::null_mut())))
                    }
                }
            }
        }
    }

    fn set_field(&self, env: RawEnv, target: CallTarget, field: RawField, value: WireValue) {
        let env = env_ptr(env);
        let f = field.as_raw() as sys::jfieldID;
        match target {
            CallTarget::Instance(object) => {
                let o = obj(object);
                match value {
                    WireValue::Void => {}
                    WireValue::Boolean(v) => jni_env!(env, SetBooleanField, o, f, v; ()),
                    WireValue::Byte(v) => jni_env!(env, SetByteField, o, f, v; ()),
                    WireValue::Char(v) => jni_env!(env, SetCharField, o, f, v; ()),
                    WireValue::Short(v) => jni_env!(env, SetShortField, o, f, v; ()),
                    WireValue::Int(v) => jni_env!(env, SetIntField, o, f, v; ()),
                    WireValue::Long(v) => jni_env!(env, SetLongField, o, f, v; ()),
                    WireValue::Float(v) => jni_env!(env, SetFloatField, o, f, v; ()),
                    WireValue::Double(v) => jni_env!(env, SetDoubleField, o, f, v; ()),
                    WireValue::Object(v) => jni_env!(env, SetObjectField, o, f, opt_obj(v); ()),
                }
            }
            CallTarget::Static(class) => {
                let c = obj(class);
                match value {
                    WireValue::Void => {}
                    WireValue::Boolean(v) => jni_env!(env, SetStaticBooleanField, c, f, v; ()),
                    WireValue::Byte(v) => jni_env!(env, SetStaticByteField, c, f, v; ()),
                    WireValue::Char(v) => jni_env!(env, SetStaticCharField, c, f, v; ()),
                    WireValue::Short(v) => jni_env!(env, SetStaticShortField, c, f, v; ()),
                    WireValue::Int(v) => jni_env!(env, SetStaticIntField, c, f, v; ()),
                    WireValue::Long(v) => jni_env!(env, SetStaticLongField, c, f, v; ()),
                    WireValue::Float(v) => jni_env!(env, SetStaticFloatField, c, f, v; ()),
                    WireValue::Double(v) => jni_env!(env, SetStaticDoubleField, c, f, v; ()),
                    WireValue::Object(v) => jni_env!(env, SetStaticObjectField, c, f, opt_obj(v); ()),
                }
            }
        }
    }

    fn exception_check(&self, env: RawEnv) -> bool {
        jni_env!(env_ptr(env), ExceptionCheck; sys::JNI_FALSE) == sys::JNI_TRUE
    }

    fn exception_occurred(&self, env: RawEnv) -> Option<RawObject> {
        raw_obj(jni_env!(env_ptr(env), ExceptionOccurred; ptr::null_mut()))
    }

    fn exception_clear(&self, env: RawEnv) {
        jni_env!(env_ptr(env), ExceptionClear; ())
    }

    fn throw_new(&self, env: RawEnv, class: RawObject, message: &str) -> Result<(), BackendError> {
        let message = CString::new(message.replace('\0', " ")).map_err(|e| BackendError::new(sys::JNI_EINVAL, e.to_string()))?;
        status(
            jni_env!(env_ptr(env), ThrowNew, obj(class), message.as_ptr(); sys::JNI_ERR),
            "ThrowNew",
        )
    }

    fn new_local_ref(&self, env: RawEnv, object: RawObject) -> Option<RawObject> {
        raw_obj(jni_env!(env_ptr(env), NewLocalRef, obj(object); ptr::null_mut()))
    }

    fn delete_local_ref(&self, env: RawEnv, object: RawObject) {
        jni_env!(env_ptr(env), DeleteLocalRef, obj(object); ())
    }

    fn new_global_ref(&self, env: RawEnv, object: RawObject) -> Option<RawObject> {
        raw_obj(jni_env!(env_ptr(env), NewGlobalRef, obj(object); ptr::null_mut()))
    }

    fn delete_global_ref(&self, env: RawEnv, object: RawObject) {
        jni_env!(env_ptr(env), DeleteGlobalRef, obj(object); ())
    }

    fn new_weak_ref(&self, env: RawEnv, object: RawObject) -> Option<RawObject> {
        raw_obj(jni_env!(env_ptr(env), NewWeakGlobalRef, obj(object); ptr::null_mut()))
    }

    fn delete_weak_ref(&self, env: RawEnv, object: RawObject) {
        jni_env!(env_ptr(env), DeleteWeakGlobalRef, obj(object); ())
    }

    fn is_same_object(&self, env: RawEnv, a: Option<RawObject>, b: Option<RawObject>) -> bool {
        jni_env!(env_ptr(env), IsSameObject, opt_obj(a), opt_obj(b); sys::JNI_FALSE) == sys::JNI_TRUE
    }

    fn new_string(&self, env: RawEnv, units: &[u16]) -> Option<RawObject> {
        let len = jsize::try_from(units.len()).ok()?;
        raw_obj(jni_env!(env_ptr(env), NewString, units.as_ptr(), len; ptr::null_mut()))
    }

    fn string_units(&self, env: RawEnv, string: RawObject) -> Option<Vec<u16>> {
        let env = env_ptr(env);
        let len = jni_env!(env, GetStringLength, obj(string); -1);
        let mut units = vec![0u16; usize::try_from(len).ok()?];
        jni_env!(env, GetStringRegion, obj(string), 0, len, units.as_mut_ptr(); ());
        Some(units)
    }

    fn array_length(&self, env: RawEnv, array: RawObject) -> Option<i32> {
        let len = jni_env!(env_ptr(env), GetArrayLength, obj(array); -1);
        (len >= 0).then_some(len)
    }

    fn new_array(&self, env: RawEnv, element: WireType, len: i32) -> Option<RawObject> {
        let env = env_ptr(env);
        let array = match element {
            WireType::Boolean => jni_env!(env, NewBooleanArray, len; ptr::null_mut()),
            WireType::Byte => jni_env!(env, NewByteArray, len; ptr::null_mut()),
            WireType::Char => jni_env!(env, NewCharArray, len; ptr::null_mut()),
            WireType::Short => jni_env!(env, NewShortArray, len; ptr::null_mut()),
            WireType::Int => jni_env!(env, NewIntArray, len; ptr::null_mut()),
            WireType::Long => jni_env!(env, NewLongArray, len; ptr::null_mut()),
            WireType::Float => jni_env!(env, NewFloatArray, len; ptr::null_mut()),
            WireType::Double => jni_env!(env, NewDoubleArray, len; ptr::null_mut()),
            WireType::Void | WireType::Object => return None,
        };
        raw_obj(array)
    }

    fn new_object_array(&self, env: RawEnv, len: i32, element_class: RawObject, init: Option<RawObject>) -> Option<RawObject> {
        raw_obj(jni_env!(env_ptr(env), NewObjectArray, len, obj(element_class), opt_obj(init); ptr::null_mut()))
    }

    fn get_array_region(&self, env: RawEnv, array: RawObject, element: WireType, start: i32, len: i32) -> Option<Vec<WireValue>> {
        if len < 0 {
            return None;
        }
        let env = env_ptr(env);
        let a = obj(array);
        let values = match element {
            WireType::Boolean => get_region!(env, GetBooleanArrayRegion, sys::jboolean, a, start, len, WireValue::Boolean),
            WireType::Byte => get_region!(env, GetByteArrayRegion, sys::jbyte, a, start, len, WireValue::Byte),
            WireType::Char => get_region!(env, GetCharArrayRegion, sys::jchar, a, start, len, WireValue::Char),
            WireType::Short => get_region!(env, GetShortArrayRegion, sys::jshort, a, start, len, WireValue::Short),
            WireType::Int => get_region!(env, GetIntArrayRegion, sys::jint, a, start, len, WireValue::Int),
            WireType::Long => get_region!(env, GetLongArrayRegion, sys::jlong, a, start, len, WireValue::Long),
            WireType::Float => get_region!(env, GetFloatArrayRegion, sys::jfloat, a, start, len, WireValue::Float),
            WireType::Double => get_region!(env, GetDoubleArrayRegion, sys::jdouble, a, start, len, WireValue::Double),
            WireType::Void | WireType::Object => return None,
        };
        Some(values)
    }

    fn set_array_region(&self, env: RawEnv, array: RawObject, start: i32, values: &[WireValue]) {
        let Some(first) = values.first() else {
            return;
        };
        let env = env_ptr(env);
        let a = obj(array);
        match first.wire_type() {
            WireType::Boolean => set_region!(env, SetBooleanArrayRegion, a, start, values, WireValue::Boolean),
            WireType::Byte => set_region!(env, SetByteArrayRegion, a, start, values, WireValue::Byte),
            WireType::Char => set_region!(env, SetCharArrayRegion, a, start, values, WireValue::Char),
            WireType::Short => set_region!(env, SetShortArrayRegion, a, start, values, WireValue::Short),
            WireType::Int => set_region!(env, SetIntArrayRegion, a, start, values, WireValue::Int),
            WireType::Long => set_region!(env, SetLongArrayRegion, a, start, values, WireValue::Long),
            WireType::Float => set_region!(env, SetFloatArrayRegion, a, start, values, WireValue::Float),
            WireType::Double => set_region!(env, SetDoubleArrayRegion, a, start, values, WireValue::Double),
            WireType::Void | WireType::Object => {}
        }
    }

    fn get_object_array_element(&self, env: RawEnv, array: RawObject, index: i32) -> Option<RawObject> {
        raw_obj(jni_env!(env_ptr(env), GetObjectArrayElement, obj(array), index; ptr::null_mut()))
    }

    fn set_object_array_element(&self, env: RawEnv, array: RawObject, index: i32, value: Option<RawObject>) {
        jni_env!(env_ptr(env), SetObjectArrayElement, obj(array), index, opt_obj(value); ())
    }
}
