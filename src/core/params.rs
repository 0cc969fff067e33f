//! Named parameter store with change notification.
//!
//! Models the host framework's parameter library at the boundary the driver
//! needs: integer, float64-array and string parameters addressed by
//! `(Param, channel)`, plus [`ParamStore::publish`] which pushes every change
//! made since the previous publish to the subscribed listeners.
//!
//! Setters only mark a parameter pending when its value actually changes, so a
//! publish after a no-op write is silent.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

/// Parameters known to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    /// Driver status, values from [`DetectorState`](crate::core::types::DetectorState)
    Status,
    /// Acquisition toggle (non-zero = acquire)
    Acquire,
    /// Frames exported since start-up
    ArrayCounter,
    /// Size in bytes of the last exported frame
    ArraySize,
    /// Downstream delivery enabled when non-zero
    ArrayCallbacks,
    /// One 24-element weight row per channel
    OutputMatrix,
    /// One name per channel
    OutputNames,
}

/// Stored parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int32(i32),
    Float64Array(Vec<f64>),
    Octet(String),
}

/// A change delivered to listeners by [`ParamStore::publish`]
#[derive(Debug, Clone, PartialEq)]
pub struct ParamUpdate {
    pub param: Param,
    pub addr: usize,
    pub value: ParamValue,
}

type Listener = Box<dyn Fn(&ParamUpdate) + Send + Sync>;

#[derive(Default)]
struct StoreState {
    values: HashMap<(Param, usize), ParamValue>,
    pending: Vec<(Param, usize)>,
}

/// Thread-safe parameter store
#[derive(Default)]
pub struct ParamStore {
    state: Mutex<StoreState>,
    listeners: RwLock<Vec<Listener>>,
}

impl ParamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener called from `publish()` for every pending change
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&ParamUpdate) + Send + Sync + 'static,
    {
        self.listeners.write().push(Box::new(listener));
    }

    pub fn set_int(&self, param: Param, addr: usize, value: i32) {
        self.set(param, addr, ParamValue::Int32(value));
    }

    /// Integer value, 0 when never set
    pub fn get_int(&self, param: Param, addr: usize) -> i32 {
        match self.state.lock().values.get(&(param, addr)) {
            Some(ParamValue::Int32(v)) => *v,
            _ => 0,
        }
    }

    /// Add one to an integer parameter and return the new value
    pub fn increment(&self, param: Param, addr: usize) -> i32 {
        let mut state = self.state.lock();
        let next = match state.values.get(&(param, addr)) {
            Some(ParamValue::Int32(v)) => v.wrapping_add(1),
            _ => 1,
        };
        state.values.insert((param, addr), ParamValue::Int32(next));
        mark_pending(&mut state, param, addr);
        next
    }

    pub fn set_float64_array(&self, param: Param, addr: usize, value: &[f64]) {
        self.set(param, addr, ParamValue::Float64Array(value.to_vec()));
    }

    /// Float array value, empty when never set
    pub fn get_float64_array(&self, param: Param, addr: usize) -> Vec<f64> {
        match self.state.lock().values.get(&(param, addr)) {
            Some(ParamValue::Float64Array(v)) => v.clone(),
            _ => Vec::new(),
        }
    }

    pub fn set_string(&self, param: Param, addr: usize, value: &str) {
        self.set(param, addr, ParamValue::Octet(value.to_string()));
    }

    /// String value, empty when never set
    pub fn get_string(&self, param: Param, addr: usize) -> String {
        match self.state.lock().values.get(&(param, addr)) {
            Some(ParamValue::Octet(v)) => v.clone(),
            _ => String::new(),
        }
    }

    /// Notify listeners of every change since the last publish.
    ///
    /// Listeners run after the store lock is released, so they may read the
    /// store. Returns the number of updates delivered.
    pub fn publish(&self) -> usize {
        let updates: Vec<ParamUpdate> = {
            let mut state = self.state.lock();
            let pending = std::mem::take(&mut state.pending);
            pending
                .into_iter()
                .filter_map(|(param, addr)| {
                    state.values.get(&(param, addr)).map(|value| ParamUpdate {
                        param,
                        addr,
                        value: value.clone(),
                    })
                })
                .collect()
        };

        if updates.is_empty() {
            return 0;
        }

        let listeners = self.listeners.read();
        for update in &updates {
            for listener in listeners.iter() {
                listener(update);
            }
        }
        updates.len()
    }

    fn set(&self, param: Param, addr: usize, value: ParamValue) {
        let mut state = self.state.lock();
        if state.values.get(&(param, addr)) == Some(&value) {
            return;
        }
        state.values.insert((param, addr), value);
        mark_pending(&mut state, param, addr);
    }
}

fn mark_pending(state: &mut StoreState, param: Param, addr: usize) {
    if !state.pending.contains(&(param, addr)) {
        state.pending.push((param, addr));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_defaults_for_unset_params() {
        let store = ParamStore::new();
        assert_eq!(store.get_int(Param::Status, 0), 0);
        assert!(store.get_float64_array(Param::OutputMatrix, 3).is_empty());
        assert_eq!(store.get_string(Param::OutputNames, 5), "");
    }

    #[test]
    fn test_publish_delivers_changes_once() {
        let store = ParamStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |u| sink.lock().push(u.clone()));

        store.set_int(Param::Status, 0, 9);
        store.set_string(Param::OutputNames, 2, "x");
        assert_eq!(store.publish(), 2);
        assert_eq!(store.publish(), 0);

        let seen = seen.lock();
        assert_eq!(seen[0].param, Param::Status);
        assert_eq!(seen[0].value, ParamValue::Int32(9));
        assert_eq!(seen[1].addr, 2);
        assert_eq!(seen[1].value, ParamValue::Octet("x".to_string()));
    }

    #[test]
    fn test_unchanged_value_is_not_republished() {
        let store = ParamStore::new();
        store.set_int(Param::Acquire, 0, 1);
        store.publish();
        store.set_int(Param::Acquire, 0, 1);
        assert_eq!(store.publish(), 0);
    }

    #[test]
    fn test_repeated_writes_coalesce_to_latest_value() {
        let store = ParamStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |u| sink.lock().push(u.value.clone()));

        store.set_int(Param::Status, 0, 8);
        store.set_int(Param::Status, 0, 0);
        assert_eq!(store.publish(), 1);
        assert_eq!(*seen.lock(), vec![ParamValue::Int32(0)]);
    }

    #[test]
    fn test_increment() {
        let store = ParamStore::new();
        assert_eq!(store.increment(Param::ArrayCounter, 0), 1);
        assert_eq!(store.increment(Param::ArrayCounter, 0), 2);
        assert_eq!(store.get_int(Param::ArrayCounter, 0), 2);
    }

    #[test]
    fn test_listener_may_read_store() {
        let store = Arc::new(ParamStore::new());
        let reader = Arc::clone(&store);
        let observed = Arc::new(Mutex::new(0));
        let out = Arc::clone(&observed);
        store.subscribe(move |_| *out.lock() = reader.get_int(Param::ArraySize, 0));

        store.set_int(Param::ArraySize, 0, 96);
        store.publish();
        assert_eq!(*observed.lock(), 96);
    }
}
