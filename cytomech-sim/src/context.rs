use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cytomech_numerical::SimRng;

use crate::modulo::Modulo;

/// Mutable environment threaded through the simulation call graph.
///
/// Carries the process random number generator and the periodic-boundary
/// folding, which older designs kept as globals. Passing the context
/// explicitly keeps every stochastic draw attributable to the seed and lets
/// tests run several simulations side by side.
pub struct SimContext {
    pub rng: SimRng,
    pub modulo: Modulo,
    stop: Arc<AtomicBool>,
}

impl SimContext {
    pub fn new(seed: u64) -> SimContext {
        SimContext {
            rng: SimRng::seeded(seed),
            modulo: Modulo::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle that another thread may use to request termination.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// True once termination was requested; checked at the top of each step.
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}
