//! Managed arrays
//!
//! Primitive arrays move in bulk through region copies; reference arrays
//! are read and written element by element.

use crate::backend::{ManagedRuntime, RawEnv, WireValue};
use crate::error::{BridgeError, BridgeResult};
use crate::marshal::{Transients, Value};
use crate::refs::{ObjectReference, RefScope};
use crate::resolve::ClassDescriptor;
use crate::runtime::EnvironmentHandle;
use crate::signature::JavaType;

fn index(value: usize) -> BridgeResult<i32> {
    i32::try_from(value).map_err(|_| BridgeError::type_mismatch("int index", value))
}

impl EnvironmentHandle {
    /// Run a raw array operation and surface any exception it raised
    fn guarded<T>(&self, f: impl FnOnce(&dyn ManagedRuntime, RawEnv) -> T) -> BridgeResult<T> {
        self.ensure_usable()?;
        self.ensure_clear()?;
        let out = f(self.backend(), self.raw());
        if self.backend().exception_check(self.raw()) {
            return Err(self.materialize_pending());
        }
        Ok(out)
    }

    /// New zero-filled array of a primitive element type
    pub fn new_array(&self, element: &JavaType, len: usize) -> BridgeResult<ObjectReference> {
        let wire = element.wire_type();
        if !wire.is_primitive() {
            return Err(BridgeError::type_mismatch("primitive element type", element));
        }
        let len = index(len)?;
        let raw = self
            .guarded(|backend, env| backend.new_array(env, wire, len))?
            .ok_or_else(|| BridgeError::type_mismatch(JavaType::array(element.clone()), "null"))?;
        Ok(self.track(raw, RefScope::Local))
    }

    /// New reference array with every slot set to `init`
    pub fn new_object_array(
        &self,
        element_class: &ClassDescriptor,
        len: usize,
        init: &Value,
    ) -> BridgeResult<ObjectReference> {
        let len = index(len)?;
        let element = JavaType::Object(element_class.name().to_string());
        let mut transients = Transients::new();
        let init = self.marshal_arg(init, &element, &mut transients)?.as_object();

        let raw = self.guarded(|backend, env| backend.new_object_array(env, len, element_class.raw(), init));
        for reference in &transients {
            self.release(reference);
        }

        let raw = raw?.ok_or_else(|| BridgeError::type_mismatch(JavaType::array(element), "null"))?;
        Ok(self.track(raw, RefScope::Local))
    }

    pub fn array_length(&self, array: &ObjectReference) -> BridgeResult<usize> {
        let raw = self.raw_object(array)?;
        let len = self
            .guarded(|backend, env| backend.array_length(env, raw))?
            .ok_or_else(|| BridgeError::type_mismatch("array", "non-array object"))?;
        Ok(usize::try_from(len).unwrap_or(0))
    }

    /// Copy `len` elements starting at `start`
    pub fn get_elements(
        &self,
        array: &ObjectReference,
        element: &JavaType,
        start: usize,
        len: usize,
    ) -> BridgeResult<Vec<Value>> {
        let raw = self.raw_object(array)?;
        let wire = element.wire_type();
        // Both bounds fit in an int, so `start + len` cannot overflow below
        let (first, count) = (index(start)?, index(len)?);

        if wire.is_primitive() {
            let values = self
                .guarded(|backend, env| backend.get_array_region(env, raw, wire, first, count))?
                .ok_or_else(|| BridgeError::type_mismatch(JavaType::array(element.clone()), "other array"))?;
            return values
                .into_iter()
                .map(|value| self.from_managed(value, element))
                .collect();
        }

        (start..start + len)
            .map(|i| self.array_get(array, element, i))
            .collect()
    }

    /// Overwrite elements starting at `start`
    pub fn set_elements(
        &self,
        array: &ObjectReference,
        element: &JavaType,
        start: usize,
        values: &[Value],
    ) -> BridgeResult<()> {
        let raw = self.raw_object(array)?;
        let wire = element.wire_type();
        let first = index(start)?;

        if wire.is_primitive() {
            let mut transients = Transients::new();
            let wires = values
                .iter()
                .map(|value| self.marshal_arg(value, element, &mut transients))
                .collect::<BridgeResult<Vec<WireValue>>>()?;
            return self.guarded(|backend, env| backend.set_array_region(env, raw, first, &wires));
        }

        for (offset, value) in values.iter().enumerate() {
            self.array_set(array, element, start + offset, value)?;
        }
        Ok(())
    }

    pub fn array_get(&self, array: &ObjectReference, element: &JavaType, at: usize) -> BridgeResult<Value> {
        let raw = self.raw_object(array)?;
        let wire = element.wire_type();
        let at = index(at)?;

        if wire.is_primitive() {
            let value = self
                .guarded(|backend, env| backend.get_array_region(env, raw, wire, at, 1))?
                .and_then(|values| values.into_iter().next())
                .ok_or_else(|| BridgeError::type_mismatch(JavaType::array(element.clone()), "other array"))?;
            return self.from_managed(value, element);
        }

        let object = self.guarded(|backend, env| backend.get_object_array_element(env, raw, at))?;
        self.take_return(WireValue::Object(object), element)
    }

    pub fn array_set(&self, array: &ObjectReference, element: &JavaType, at: usize, value: &Value) -> BridgeResult<()> {
        let raw = self.raw_object(array)?;
        let at = index(at)?;
        let mut transients = Transients::new();
        let wire = self.marshal_arg(value, element, &mut transients)?;

        let result = if element.wire_type().is_primitive() {
            self.guarded(|backend, env| backend.set_array_region(env, raw, at, &[wire]))
        } else {
            self.guarded(|backend, env| backend.set_object_array_element(env, raw, at, wire.as_object()))
        };

        for reference in &transients {
            self.release(reference);
        }
        result
    }
}
