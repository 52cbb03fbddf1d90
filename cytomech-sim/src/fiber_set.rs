use cytomech_numerical::SimRng;

use crate::fiber::Fiber;

/// A binding site on a fiber, produced by the attachment searches.
#[derive(Clone, Copy, Debug)]
pub struct BindingSite {
    pub fiber: usize,
    pub abscissa: f64,
}

/// Owns all fibers, with stable slots and deferred deletion.
#[derive(Default)]
pub struct FiberSet {
    slots: Vec<Option<Fiber>>,
}

impl FiberSet {
    pub fn new() -> FiberSet {
        FiberSet::default()
    }

    pub fn add(&mut self, fib: Fiber) -> usize {
        self.slots.push(Some(fib));
        self.slots.len() - 1
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: usize) -> Option<&Fiber> {
        self.slots.get(id).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Fiber> {
        self.slots.get_mut(id).and_then(|s| s.as_mut())
    }

    /// Two disjoint mutable fibers; panics if the ids are equal.
    pub fn get_pair_mut(&mut self, a: usize, b: usize) -> (&mut Fiber, &mut Fiber) {
        assert_ne!(a, b);
        if a < b {
            let (lo, hi) = self.slots.split_at_mut(b);
            (lo[a].as_mut().expect("deleted fiber"), hi[0].as_mut().expect("deleted fiber"))
        } else {
            let (lo, hi) = self.slots.split_at_mut(a);
            (hi[0].as_mut().expect("deleted fiber"), lo[b].as_mut().expect("deleted fiber"))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Fiber)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| s.as_ref().map(|f| (i, f)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut Fiber)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| s.as_mut().map(|f| (i, f)))
    }

    pub fn ids(&self) -> Vec<usize> {
        self.iter().map(|(i, _)| i).collect()
    }

    /// Removes a fiber; its slot remains reserved.
    pub fn remove(&mut self, id: usize) -> Option<Fiber> {
        self.slots.get_mut(id).and_then(|s| s.take())
    }

    pub fn total_length(&self) -> f64 {
        self.iter().map(|(_, f)| f.length()).sum()
    }

    /// Draws binding sites uniformly distributed over all fibers, with an
    /// average spacing `spread` along the polymer.
    ///
    /// The gaps between consecutive sites are exponential, so the draw is a
    /// Poisson process over the total length, as a population of freely
    /// diffusing hands would produce.
    pub fn uniform_sites(&self, spread: f64, rng: &mut SimRng, out: &mut Vec<BindingSite>) {
        assert!(spread > 0.0);
        out.clear();
        let mut abs = spread * rng.exponential();
        for (id, fib) in self.iter() {
            let len = fib.length();
            while abs < len {
                out.push(BindingSite { fiber: id, abscissa: abs + fib.abscissa_m() });
                abs += spread * rng.exponential();
            }
            abs -= len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::properties::FiberProp;
    use cytomech_numerical::Vec3;
    use std::sync::Arc;

    #[test]
    fn uniform_sites_density() {
        let mut set = FiberSet::new();
        let prop = Arc::new(FiberProp::new("f"));
        for k in 0..10 {
            set.add(Fiber::new(prop.clone(), Vec3::new(0.0, k as f64, 0.0), Vec3::new(1.0, 0.0, 0.0), 10.0));
        }
        // 100 um of fiber, spacing 0.1 -> about 1000 sites
        let mut rng = SimRng::seeded(4);
        let mut sites = Vec::new();
        set.uniform_sites(0.1, &mut rng, &mut sites);
        assert!(sites.len() > 850 && sites.len() < 1150, "unexpected count {}", sites.len());
        for s in &sites {
            let fib = set.get(s.fiber).unwrap();
            assert!(s.abscissa >= fib.abscissa_m() && s.abscissa <= fib.abscissa_p());
        }
    }
}
