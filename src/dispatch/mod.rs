//! Invocation pipeline
//!
//! Design: every call, construction and field access goes through one
//! sequence:
//! 1. refuse to start while an exception is pending
//! 2. check member kind, receiver compatibility and arity
//! 3. marshal arguments (text arguments become transient locals)
//! 4. invoke
//! 5. query the pending-exception state before anything else
//! 6. materialize the exception, or convert the return value
//! 7. release transient references on every path


use crate::backend::{CallTarget, RawField, RawMethod, RawObject, WireValue};
use crate::error::{BridgeError, BridgeResult};
use crate::logging::{log_invocation, perf};
use crate::marshal::{Transients, Value};
use crate::refs::{ObjectReference, RefScope};
use crate::resolve::{ClassDescriptor, MemberIdentifier, MemberKind, RawMember};
use crate::runtime::EnvironmentHandle;
use crate::signature::JavaType;
use smallvec::SmallVec;
use std::slice;

const CLASS_CLASS: &str = "java/lang/Class";

/// Receiver of a field access
#[derive(Debug, Clone, Copy)]
pub enum FieldTarget<'a> {
    Instance(&'a ObjectReference),
    Static(&'a ClassDescriptor),
}

/// One interaction with the runtime
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    CallInstance {
        receiver: &'a ObjectReference,
        method: &'a MemberIdentifier,
    },
    CallStatic {
        class: &'a ClassDescriptor,
        method: &'a MemberIdentifier,
    },
    NewInstance {
        class: &'a ClassDescriptor,
        constructor: &'a MemberIdentifier,
    },
    GetField {
        target: FieldTarget<'a>,
        field: &'a MemberIdentifier,
    },
    SetField {
        target: FieldTarget<'a>,
        field: &'a MemberIdentifier,
    },
}

impl<'a> Operation<'a> {
    fn label(&self) -> &'static str {
        match self {
            Self::CallInstance { .. } => "call_instance",
            Self::CallStatic { .. } => "call_static",
            Self::NewInstance { .. } => "new_instance",
            Self::GetField { .. } => "get_field",
            Self::SetField { .. } => "set_field",
        }
    }

    fn member(&self) -> &'a MemberIdentifier {
        match *self {
            Self::CallInstance { method, .. } | Self::CallStatic { method, .. } => method,
            Self::NewInstance { constructor, .. } => constructor,
            Self::GetField { field, .. } | Self::SetField { field, .. } => field,
        }
    }

    fn param_types(&self) -> &'a [JavaType] {
        match *self {
            Self::CallInstance { method, .. } | Self::CallStatic { method, .. } => method.param_types(),
            Self::NewInstance { constructor, .. } => constructor.param_types(),
            Self::GetField { .. } => &[],
            Self::SetField { field, .. } => slice::from_ref(field.value_type()),
        }
    }

    fn return_type(&self) -> JavaType {
        match *self {
            Self::CallInstance { method, .. } | Self::CallStatic { method, .. } => method.value_type().clone(),
            Self::NewInstance { class, .. } => JavaType::Object(class.name().to_string()),
            Self::GetField { field, .. } => field.value_type().clone(),
            Self::SetField { .. } => JavaType::Void,
        }
    }
}

/// What to do when the invoked code leaves an exception pending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OnException {
    /// Describe it as `BridgeError::Invocation`
    Materialize,
    /// Clear it and report `NestedException`; used while describing another exception
    Nested(&'static str),
}

/// Validated backend call
#[derive(Debug, Clone, Copy)]
enum Invoke {
    Method { target: CallTarget, method: RawMethod },
    Construct { class: RawObject, constructor: RawMethod },
    Get { target: CallTarget, field: RawField },
    Set { target: CallTarget, field: RawField },
}

impl EnvironmentHandle {
    /// Run one operation through the invocation pipeline
    pub fn execute(&self, op: Operation<'_>, args: &[Value]) -> BridgeResult<Value> {
        self.execute_with(op, args, OnException::Materialize)
    }

    pub(crate) fn execute_with(&self, op: Operation<'_>, args: &[Value], policy: OnException) -> BridgeResult<Value> {
        self.ensure_usable()?;
        self.ensure_clear()?;

        let invoke = self.prepare(&op)?;
        let params = op.param_types();
        if params.len() != args.len() {
            return Err(BridgeError::ArityMismatch {
                expected: params.len(),
                found: args.len(),
            });
        }

        let mut transients = Transients::new();
        let mut wires: SmallVec<[WireValue; 8]> = SmallVec::with_capacity(args.len());
        for (value, ty) in args.iter().zip(params) {
            match self.marshal_arg(value, ty, &mut transients) {
                Ok(wire) => wires.push(wire),
                Err(e) => {
                    self.release_transients(&transients);
                    return Err(e);
                }
            }
        }

        log_invocation(op.label(), op.member().name(), args.len());
        let _timer = perf::track(op.label());

        let ret = op.return_type();
        let backend = self.backend();
        let env = self.raw();
        let wire = match invoke {
            Invoke::Method { target, method } => backend.call_method(env, target, method, ret.wire_type(), &wires),
            Invoke::Construct { class, constructor } => {
                WireValue::Object(backend.new_object(env, class, constructor, &wires))
            }
            Invoke::Get { target, field } => backend.get_field(env, target, field, ret.wire_type()),
            Invoke::Set { target, field } => {
                if let Some(value) = wires.first() {
                    backend.set_field(env, target, field, *value);
                }
                WireValue::Void
            }
        };

        let result = if backend.exception_check(env) {
            if let WireValue::Object(Some(raw)) = wire {
                backend.delete_local_ref(env, raw);
            }
            Err(self.on_exception(policy))
        } else if let (Invoke::Construct { .. }, WireValue::Object(Some(raw))) = (invoke, wire) {
            // A new object is a reference, strings included
            Ok(Value::Object(self.track(raw, RefScope::Local)))
        } else {
            self.take_return(wire, &ret)
        };

        self.release_transients(&transients);
        result
    }

    fn prepare(&self, op: &Operation<'_>) -> BridgeResult<Invoke> {
        let member = op.member();
        let incompatible = |target: &str| BridgeError::IncompatibleMember {
            member: member.to_string(),
            target: target.to_string(),
        };

        match (*op, member.raw()) {
            (Operation::CallInstance { receiver, .. }, RawMember::Method(method))
                if member.kind() == MemberKind::Method && !member.is_static() =>
            {
                let target = self.receiver(receiver, member)?;
                Ok(Invoke::Method { target, method })
            }
            (Operation::CallStatic { class, .. }, RawMember::Method(method))
                if member.kind() == MemberKind::Method && member.is_static() =>
            {
                if member.class() != class {
                    return Err(incompatible(class.name()));
                }
                Ok(Invoke::Method {
                    target: CallTarget::Static(class.raw()),
                    method,
                })
            }
            (Operation::NewInstance { class, .. }, RawMember::Method(constructor))
                if member.kind() == MemberKind::Constructor =>
            {
                if member.class() != class {
                    return Err(incompatible(class.name()));
                }
                Ok(Invoke::Construct {
                    class: class.raw(),
                    constructor,
                })
            }
            (Operation::GetField { target, .. }, RawMember::Field(field)) => Ok(Invoke::Get {
                target: self.field_target(target, member)?,
                field,
            }),
            (Operation::SetField { target, .. }, RawMember::Field(field)) => Ok(Invoke::Set {
                target: self.field_target(target, member)?,
                field,
            }),
            (op, _) => Err(incompatible(op.label())),
        }
    }

    fn receiver(&self, receiver: &ObjectReference, member: &MemberIdentifier) -> BridgeResult<CallTarget> {
        let raw = self.raw_object(receiver)?;
        if self.runtime().options().check_receivers && !self.backend().is_instance_of(self.raw(), raw, member.class().raw()) {
            return Err(BridgeError::IncompatibleMember {
                member: member.to_string(),
                target: format!("receiver #{}", receiver.id()),
            });
        }
        Ok(CallTarget::Instance(raw))
    }

    fn field_target(&self, target: FieldTarget<'_>, field: &MemberIdentifier) -> BridgeResult<CallTarget> {
        match target {
            FieldTarget::Instance(receiver) if !field.is_static() => self.receiver(receiver, field),
            FieldTarget::Static(class) if field.is_static() && field.class() == class => {
                Ok(CallTarget::Static(class.raw()))
            }
            FieldTarget::Instance(_) => Err(BridgeError::IncompatibleMember {
                member: field.to_string(),
                target: "an instance".into(),
            }),
            FieldTarget::Static(class) => Err(BridgeError::IncompatibleMember {
                member: field.to_string(),
                target: format!("static access on {}", class.name()),
            }),
        }
    }

    fn on_exception(&self, policy: OnException) -> BridgeError {
        match policy {
            OnException::Materialize => self.materialize_pending(),
            OnException::Nested(during) => {
                self.clear_exception();
                BridgeError::NestedException { during: during.into() }
            }
        }
    }

    fn release_transients(&self, transients: &Transients) {
        for reference in transients {
            self.release(reference);
        }
    }

    /// Binary name of the runtime class of `object`
    pub(crate) fn runtime_class_name(&self, object: RawObject, policy: OnException) -> BridgeResult<String> {
        let backend = self.backend();
        let Some(class) = backend.object_class(self.raw(), object) else {
            return Err(if backend.exception_check(self.raw()) {
                self.on_exception(policy)
            } else {
                BridgeError::ClassNotFound("<class of object>".into())
            });
        };
        let class = self.track(class, RefScope::Local);

        let result = self
            .resolve_class(CLASS_CLASS)
            .and_then(|class_class| self.resolve_method(&class_class, "getName", "()Ljava/lang/String;", false))
            .and_then(|get_name| {
                self.execute_with(
                    Operation::CallInstance {
                        receiver: &class,
                        method: &get_name,
                    },
                    &[],
                    policy,
                )
            });
        self.release(&class);

        match result? {
            Value::Text(name) => Ok(name),
            other => Err(BridgeError::type_mismatch("class name", other.type_name())),
        }
    }

    /// Descriptor of the runtime class of `object`
    pub fn class_of(&self, object: &ObjectReference) -> BridgeResult<ClassDescriptor> {
        self.ensure_usable()?;
        self.ensure_clear()?;
        let raw = self.raw_object(object)?;
        let name = self.runtime_class_name(raw, OnException::Materialize)?;
        self.resolve_class(&name)
    }

    // ========================================================================
    // Typed entry points
    // ========================================================================

    pub fn call_instance_method(
        &self,
        receiver: &ObjectReference,
        method: &MemberIdentifier,
        args: &[Value],
    ) -> BridgeResult<Value> {
        self.execute(Operation::CallInstance { receiver, method }, args)
    }

    pub fn call_static_method(
        &self,
        class: &ClassDescriptor,
        method: &MemberIdentifier,
        args: &[Value],
    ) -> BridgeResult<Value> {
        self.execute(Operation::CallStatic { class, method }, args)
    }

    pub fn new_instance(
        &self,
        class: &ClassDescriptor,
        constructor: &MemberIdentifier,
        args: &[Value],
    ) -> BridgeResult<ObjectReference> {
        match self.execute(Operation::NewInstance { class, constructor }, args)? {
            Value::Object(object) => Ok(object),
            other => Err(BridgeError::type_mismatch(class.name(), other.type_name())),
        }
    }

    pub fn get_field(&self, receiver: &ObjectReference, field: &MemberIdentifier) -> BridgeResult<Value> {
        self.execute(
            Operation::GetField {
                target: FieldTarget::Instance(receiver),
                field,
            },
            &[],
        )
    }

    pub fn set_field(&self, receiver: &ObjectReference, field: &MemberIdentifier, value: Value) -> BridgeResult<()> {
        self.execute(
            Operation::SetField {
                target: FieldTarget::Instance(receiver),
                field,
            },
            slice::from_ref(&value),
        )
        .map(drop)
    }

    pub fn get_static_field(&self, class: &ClassDescriptor, field: &MemberIdentifier) -> BridgeResult<Value> {
        self.execute(
            Operation::GetField {
                target: FieldTarget::Static(class),
                field,
            },
            &[],
        )
    }

    pub fn set_static_field(&self, class: &ClassDescriptor, field: &MemberIdentifier, value: Value) -> BridgeResult<()> {
        self.execute(
            Operation::SetField {
                target: FieldTarget::Static(class),
                field,
            },
            slice::from_ref(&value),
        )
        .map(drop)
    }

    // ========================================================================
    // By-name conveniences (resolution goes through the shared cache)
    // ========================================================================

    /// Call an instance method declared on the receiver's runtime class or a superclass
    pub fn call_method(
        &self,
        receiver: &ObjectReference,
        name: &str,
        signature: &str,
        args: &[Value],
    ) -> BridgeResult<Value> {
        let class = self.class_of(receiver)?;
        let method = self.resolve_method(&class, name, signature, false)?;
        self.call_instance_method(receiver, &method, args)
    }

    pub fn call_static(&self, class: &str, name: &str, signature: &str, args: &[Value]) -> BridgeResult<Value> {
        let class = self.resolve_class(class)?;
        let method = self.resolve_method(&class, name, signature, true)?;
        self.call_static_method(&class, &method, args)
    }

    pub fn new_object(&self, class: &str, signature: &str, args: &[Value]) -> BridgeResult<ObjectReference> {
        let class = self.resolve_class(class)?;
        let constructor = self.resolve_constructor(&class, signature)?;
        self.new_instance(&class, &constructor, args)
    }

    pub fn read_field(&self, receiver: &ObjectReference, name: &str, field_type: &str) -> BridgeResult<Value> {
        let class = self.class_of(receiver)?;
        let field = self.resolve_field(&class, name, field_type, false)?;
        self.get_field(receiver, &field)
    }

    pub fn write_field(&self, receiver: &ObjectReference, name: &str, field_type: &str, value: Value) -> BridgeResult<()> {
        let class = self.class_of(receiver)?;
        let field = self.resolve_field(&class, name, field_type, false)?;
        self.set_field(receiver, &field, value)
    }

    pub fn read_static(&self, class: &str, name: &str, field_type: &str) -> BridgeResult<Value> {
        let class = self.resolve_class(class)?;
        let field = self.resolve_field(&class, name, field_type, true)?;
        self.get_static_field(&class, &field)
    }

    pub fn write_static(&self, class: &str, name: &str, field_type: &str, value: Value) -> BridgeResult<()> {
        let class = self.resolve_class(class)?;
        let field = self.resolve_field(&class, name, field_type, true)?;
        self.set_static_field(&class, &field, value)
    }
}
