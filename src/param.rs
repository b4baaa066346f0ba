//! Externally tunable parameters

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

type Callback = Arc<dyn Fn(f64) + Send + Sync>;

struct Inner {
    name: String,
    value: f64,
    min: Option<f64>,
    max: Option<f64>,
    callbacks: Vec<Callback>,
}

/// Shared, tunable value cell.
///
/// Clones share the same cell. Blocks holding a `Param` read it on every
/// evaluation, so a tuning collaborator can change behavior mid-run.
#[derive(Clone)]
pub struct Param {
    inner: Arc<Mutex<Inner>>,
}

impl Param {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                name: name.into(),
                value,
                min: None,
                max: None,
                callbacks: Vec::new(),
            })),
        }
    }

    /// Restrict the values accepted by [`Param::set`]. Bounds given in
    /// either order are sorted; a NaN bound leaves that side open.
    pub fn with_range(self, min: f64, max: f64) -> Self {
        let (min, max) = if min > max { (max, min) } else { (min, max) };
        {
            let mut inner = self.lock();
            inner.min = (!min.is_nan()).then_some(min);
            inner.max = (!max.is_nan()).then_some(max);
            inner.value = inner.clamp(inner.value);
        }
        self
    }

    // A poisoned lock still holds a valid f64; keep going with it.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    pub fn get(&self) -> f64 {
        self.lock().value
    }

    pub fn range(&self) -> (Option<f64>, Option<f64>) {
        let inner = self.lock();
        (inner.min, inner.max)
    }

    /// Set a new value, clamped to the range. Callbacks fire only when the
    /// stored value actually changes. Returns the value stored by this call.
    ///
    /// Callbacks run after the cell is unlocked, so they may read or set
    /// the parameter themselves.
    pub fn set(&self, value: f64) -> f64 {
        let (value, callbacks) = {
            let mut inner = self.lock();
            let value = inner.clamp(value);
            if value == inner.value {
                return value;
            }
            inner.value = value;
            (value, inner.callbacks.clone())
        };
        for cb in &callbacks {
            cb(value);
        }
        value
    }

    /// Register a callback run with the new value after every change
    pub fn on_change(&self, callback: impl Fn(f64) + Send + Sync + 'static) {
        self.lock().callbacks.push(Arc::new(callback));
    }

    /// True when both handles refer to the same cell
    pub fn same_cell(&self, other: &Param) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Inner {
    fn clamp(&self, value: f64) -> f64 {
        let value = self.min.map_or(value, |min| value.max(min));
        self.max.map_or(value, |max| value.min(max))
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Param")
            .field("name", &inner.name)
            .field("value", &inner.value)
            .field("callbacks", &inner.callbacks.len())
            .finish()
    }
}

/// A numeric parameter that is either fixed or bound to a tunable [`Param`].
#[derive(Debug, Clone)]
pub enum Tunable {
    Fixed(f64),
    Param(Param),
}

impl Tunable {
    pub fn get(&self) -> f64 {
        match self {
            Tunable::Fixed(v) => *v,
            Tunable::Param(p) => p.get(),
        }
    }
}

impl From<f64> for Tunable {
    fn from(v: f64) -> Self {
        Tunable::Fixed(v)
    }
}

impl From<Param> for Tunable {
    fn from(p: Param) -> Self {
        Tunable::Param(p)
    }
}

impl From<&Param> for Tunable {
    fn from(p: &Param) -> Self {
        Tunable::Param(p.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_callbacks_fire_on_change_only() {
        let p = Param::new("gain", 1.0);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        p.on_change(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        p.set(1.0);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        p.set(2.0);
        p.set(2.0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(p.get(), 2.0);
    }

    #[test]
    fn test_clones_share_cell() {
        let p = Param::new("k", 0.5);
        let q = p.clone();
        q.set(4.0);
        assert_eq!(p.get(), 4.0);
        assert!(p.same_cell(&q));
        assert!(!p.same_cell(&Param::new("k", 0.5)));
    }

    #[test]
    fn test_range_clamps() {
        let p = Param::new("k", 5.0).with_range(0.0, 2.0);
        assert_eq!(p.get(), 2.0);
        assert_eq!(p.set(-1.0), 0.0);
        assert_eq!(p.range(), (Some(0.0), Some(2.0)));
    }

    #[test]
    fn test_range_bounds_in_any_order() {
        let p = Param::new("k", 5.0).with_range(2.0, 0.0);
        assert_eq!(p.range(), (Some(0.0), Some(2.0)));
        assert_eq!(p.get(), 2.0);

        let open = Param::new("k", -3.0).with_range(f64::NAN, 1.0);
        assert_eq!(open.range(), (None, Some(1.0)));
        assert_eq!(open.get(), -3.0);
        assert_eq!(open.set(4.0), 1.0);
    }

    #[test]
    fn test_callback_may_use_the_param() {
        let p = Param::new("k", 0.0).with_range(0.0, 3.0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (q, log) = (p.clone(), seen.clone());
        p.on_change(move |v| {
            log.lock().unwrap().push(q.get());
            if v < 3.0 {
                q.set(v + 1.0);
            }
        });

        assert_eq!(p.set(1.0), 1.0);
        assert_eq!(p.get(), 3.0);
        assert_eq!(*seen.lock().unwrap(), vec![1.0, 2.0, 3.0]);
    }
}
