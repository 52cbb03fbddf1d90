//! Observers sample properties of the simulation during a run.
//!
//! An [`ObserversSet`] calls each registered observer every `lag` steps.

use std::any::Any;

use crate::simul::Simul;

pub trait Observer {
    /// Takes one observation.
    fn observe(&mut self, sim: &Simul);

    /// Writes buffered data out; called at the end of a run.
    fn flush(&mut self) {}

    /// Identifies this observer, e.g. to name a column in a score table.
    fn name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

/// A set of observers with individual sampling intervals.
#[derive(Default)]
pub struct ObserversSet {
    observers: Vec<Box<dyn Observer>>,
    lag_times: Vec<u64>,
    n_called: u64,
}

impl ObserversSet {
    pub fn new() -> ObserversSet {
        ObserversSet::default()
    }

    pub fn add_observer(&mut self, o: Box<dyn Observer>, lag_time: u64) {
        assert!(lag_time > 0);
        self.observers.push(o);
        self.lag_times.push(lag_time);
    }

    pub fn observe(&mut self, sim: &Simul) {
        for i in 0..self.observers.len() {
            if self.n_called % self.lag_times[i] == 0 {
                self.observers[i].observe(sim);
            }
        }
        self.n_called += 1;
    }

    pub fn flush_observers(&mut self) {
        for o in self.observers.iter_mut() {
            o.flush();
        }
    }

    /// Finds an observer by name and downcasts it to its concrete type.
    pub fn get<T: 'static>(&self, name: &str) -> Option<&T> {
        for o in &self.observers {
            if o.name() == name {
                return o.as_any().downcast_ref::<T>();
            }
        }
        return None;
    }
}

/// Records the total and mean fiber length over time.
#[derive(Default)]
pub struct FiberLengthObserver {
    pub samples: Vec<(f64, f64, usize)>,
}

impl Observer for FiberLengthObserver {
    fn observe(&mut self, sim: &Simul) {
        let n = sim.fibers.len();
        let total = sim.fibers.total_length();
        self.samples.push((sim.time(), total, n));
    }

    fn name(&self) -> &str {
        "fiber_length"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Records the number of attached hands over time.
#[derive(Default)]
pub struct AttachmentObserver {
    pub samples: Vec<(f64, usize)>,
}

impl Observer for AttachmentObserver {
    fn observe(&mut self, sim: &Simul) {
        self.samples.push((sim.time(), sim.count_attached()));
    }

    fn name(&self) -> &str {
        "attachments"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Records the total bending energy over time.
#[derive(Default)]
pub struct BendingEnergyObserver {
    pub samples: Vec<(f64, f64)>,
}

impl Observer for BendingEnergyObserver {
    fn observe(&mut self, sim: &Simul) {
        self.samples.push((sim.time(), sim.bending_energy()));
    }

    fn name(&self) -> &str {
        "bending_energy"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
