// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.

//! Hooks for observing pipeline stages without tying the crate to a
//! particular metrics backend.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock, RwLock};

/// Record of a completed field operation.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldOpEvent {
    pub op_name: &'static str,
    pub input_shape: Vec<usize>,
    pub output_shape: Vec<usize>,
}

/// Observer callback invoked after a field operation completes.
pub type FieldOpObserver = Arc<dyn Fn(&FieldOpEvent) + Send + Sync + 'static>;

static FIELD_OP_OBSERVER: OnceLock<RwLock<Option<FieldOpObserver>>> = OnceLock::new();

thread_local! {
    static IN_OBSERVER_CALLBACK: Cell<bool> = const { Cell::new(false) };
}

fn slot() -> &'static RwLock<Option<FieldOpObserver>> {
    FIELD_OP_OBSERVER.get_or_init(|| RwLock::new(None))
}

/// Installs (or clears) the global observer and returns the previous one.
pub fn set_field_op_observer(observer: Option<FieldOpObserver>) -> Option<FieldOpObserver> {
    let mut guard = match slot().write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    std::mem::replace(&mut *guard, observer)
}

/// Installs `observer` until the returned guard is dropped, then restores
/// whatever was installed before.
pub fn scoped_field_op_observer(observer: FieldOpObserver) -> ObserverGuard {
    ObserverGuard {
        previous: Some(set_field_op_observer(Some(observer))),
    }
}

pub struct ObserverGuard {
    previous: Option<Option<FieldOpObserver>>,
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            set_field_op_observer(previous);
        }
    }
}

/// Forwards an event to the installed observer, if any.
///
/// Events raised from inside an observer callback are dropped, and a
/// panicking observer never unwinds into the pipeline.
pub fn emit_field_op(op_name: &'static str, input_shape: &[usize], output_shape: &[usize]) {
    let Some(lock) = FIELD_OP_OBSERVER.get() else {
        return;
    };
    let observer = match lock.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    };
    let Some(observer) = observer else {
        return;
    };

    if IN_OBSERVER_CALLBACK.with(|flag| flag.replace(true)) {
        return;
    }

    let event = FieldOpEvent {
        op_name,
        input_shape: input_shape.to_vec(),
        output_shape: output_shape.to_vec(),
    };
    let _ = catch_unwind(AssertUnwindSafe(|| observer(&event)));

    IN_OBSERVER_CALLBACK.with(|flag| flag.set(false));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn scoped_observer_sees_events_and_nested_emits_are_dropped() {
        let seen: Arc<Mutex<Vec<FieldOpEvent>>> = Arc::default();
        let sink = seen.clone();
        {
            let _guard = scoped_field_op_observer(Arc::new(move |event: &FieldOpEvent| {
                emit_field_op("nested", &[], &[]);
                sink.lock().unwrap().push(event.clone());
            }));
            emit_field_op("observability.test", &[2, 3], &[6]);
        }
        emit_field_op("observability.after", &[1], &[1]);

        let seen = seen.lock().unwrap();
        assert!(seen.iter().any(|e| e.op_name == "observability.test"
            && e.input_shape == vec![2, 3]
            && e.output_shape == vec![6]));
        assert!(seen.iter().all(|e| e.op_name != "nested"));
        assert!(seen.iter().all(|e| e.op_name != "observability.after"));
    }
}
