//! Coordination between the simulation thread and a live observer.
//!
//! The simulation owns the authoritative loop; an observing thread may read
//! the state between steps through one mutex, and is woken by a condition
//! variable after every completed step. A non-blocking variant serves
//! observers that refresh at their own frame rate. The observer may request
//! termination at any time; the simulation notices at the top of the next
//! step and winds down cleanly, restoring the fast-diffusion reserves.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::context::SimContext;
use crate::errors::SimError;
use crate::simul::Simul;

struct Shared {
    state: Mutex<(Simul, SimContext)>,
    step_done: Condvar,
    stop: Arc<AtomicBool>,
}

/// Cloneable handle to a simulation shared between threads.
#[derive(Clone)]
pub struct SimHost {
    shared: Arc<Shared>,
}

impl SimHost {
    pub fn new(sim: Simul, ctx: SimContext) -> SimHost {
        let stop = ctx.stop_flag();
        SimHost {
            shared: Arc::new(Shared {
                state: Mutex::new((sim, ctx)),
                step_done: Condvar::new(),
                stop,
            }),
        }
    }

    /// Runs up to `n_steps` steps, releasing the lock between steps so
    /// observers can interleave. Returns the number of steps done.
    pub fn run(&self, n_steps: u64) -> Result<u64, SimError> {
        let mut done = 0;
        for _ in 0..n_steps {
            if self.shared.stop.load(Ordering::Relaxed) {
                let mut guard = self.shared.state.lock().unwrap();
                guard.0.relax();
                break;
            }
            {
                let mut guard = self.shared.state.lock().unwrap();
                let (sim, ctx) = &mut *guard;
                sim.step(ctx)?;
                done += 1;
            }
            self.shared.step_done.notify_all();
        }
        Ok(done)
    }

    /// Asks the simulation thread to terminate.
    pub fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        self.shared.step_done.notify_all();
    }

    pub fn stop_requested(&self) -> bool {
        self.shared.stop.load(Ordering::Relaxed)
    }

    /// Reads the state under the lock; never mutates.
    pub fn observe<R>(&self, f: impl FnOnce(&Simul) -> R) -> R {
        let guard = self.shared.state.lock().unwrap();
        f(&guard.0)
    }

    /// Non-blocking read for frame-rate display; None if the simulation
    /// holds the lock.
    pub fn try_observe<R>(&self, f: impl FnOnce(&Simul) -> R) -> Option<R> {
        match self.shared.state.try_lock() {
            Ok(guard) => Some(f(&guard.0)),
            Err(_) => None,
        }
    }

    /// Blocks until the next completed step, or until termination.
    pub fn wait_step(&self) {
        let guard = self.shared.state.lock().unwrap();
        let _unused = self.shared.step_done.wait(guard).unwrap();
    }

    /// Takes the state back out of the host, after the run.
    pub fn into_inner(self) -> Option<(Simul, SimContext)> {
        Arc::try_unwrap(self.shared).ok().map(|s| s.state.into_inner().unwrap())
    }
}
