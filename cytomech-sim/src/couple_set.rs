use log::trace;

use crate::couple::{Couple, CoupleState};

/// Owns all couples and keeps them sorted into the four state lists.
///
/// Invariant at every quiescent point: each live couple appears in exactly
/// one list, the one matching the attachment state of its two hands; the
/// list sizes sum to the inventory. Couples of a fast-diffusing class are
/// parked in a per-class reserve instead of the FF list while they wait for
/// the direct attachment draw.
#[derive(Default)]
pub struct CoupleSet {
    slots: Vec<Option<Couple>>,
    lists: [Vec<usize>; 4],
    /// reserves of free fast-diffusing couples, per couple class
    reserves: Vec<Vec<usize>>,
}

impl CoupleSet {
    pub fn new() -> CoupleSet {
        CoupleSet::default()
    }

    pub fn add(&mut self, c: Couple) -> usize {
        let state = c.state();
        let id = self.slots.len();
        self.slots.push(Some(c));
        self.lists[state as usize].push(id);
        return id;
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: usize) -> Option<&Couple> {
        self.slots.get(id).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Couple> {
        self.slots.get_mut(id).and_then(|s| s.as_mut())
    }

    pub fn list(&self, state: CoupleState) -> &[usize] {
        &self.lists[state as usize]
    }

    pub fn slots(&self) -> impl Iterator<Item = (usize, &Couple)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| s.as_ref().map(|c| (i, c)))
    }

    /// Moves a couple between lists after a hand transition.
    pub fn relink(&mut self, id: usize, old: CoupleState, new: CoupleState) {
        debug_assert_ne!(old, new);
        let list = &mut self.lists[old as usize];
        let k = list.iter().position(|x| *x == id).expect("couple is not in its state list");
        list.swap_remove(k);
        self.lists[new as usize].push(id);
    }

    /// Ensures the per-class reserves exist.
    pub fn prepare_reserves(&mut self, n_classes: usize) {
        if self.reserves.len() < n_classes {
            self.reserves.resize_with(n_classes, Vec::new);
        }
    }

    /// Parks a free couple of class `class` into its reserve.
    ///
    /// The couple must currently be in the FF list.
    pub fn park(&mut self, id: usize, class: usize) {
        let list = &mut self.lists[CoupleState::FF as usize];
        let k = list.iter().position(|x| *x == id).expect("couple is not free");
        list.swap_remove(k);
        self.reserves[class].push(id);
    }

    pub fn reserve(&self, class: usize) -> &[usize] {
        self.reserves.get(class).map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// Takes the last parked couple of a class.
    pub fn pop_reserve(&mut self, class: usize) -> Option<usize> {
        self.reserves.get_mut(class).and_then(|r| r.pop())
    }

    /// Inserts a formerly-parked couple into the list matching its state.
    pub fn link(&mut self, id: usize) {
        let state = self.get(id).expect("linking a deleted couple").state();
        self.lists[state as usize].push(id);
    }

    /// Returns every reserved couple to the FF list, before teardown or
    /// when fast diffusion is disabled.
    pub fn relax(&mut self) {
        let mut n = 0;
        for class in 0..self.reserves.len() {
            while let Some(id) = self.reserves[class].pop() {
                self.lists[CoupleState::FF as usize].push(id);
                n += 1;
            }
        }
        if n > 0 {
            trace!("relaxed {} couples back to the free list", n);
        }
    }

    /// Verifies the list discipline; used by tests and assertions.
    pub fn lists_consistent(&self) -> bool {
        let mut seen = vec![0usize; self.slots.len()];
        for state in 0..4 {
            for id in &self.lists[state] {
                match self.get(*id) {
                    Some(c) => {
                        if c.state() as usize != state {
                            return false;
                        }
                        seen[*id] += 1;
                    }
                    None => return false,
                }
            }
        }
        for r in &self.reserves {
            for id in r {
                match self.get(*id) {
                    Some(c) => {
                        if c.state() != CoupleState::FF {
                            return false;
                        }
                        seen[*id] += 1;
                    }
                    None => return false,
                }
            }
        }
        // every live couple is in exactly one place
        for (id, slot) in self.slots.iter().enumerate() {
            if slot.is_some() && seen[id] != 1 {
                return false;
            }
        }
        return true;
    }

    /// Number of couples per state, reserves counted as free.
    pub fn counts(&self) -> [usize; 4] {
        let mut n = [0; 4];
        for s in 0..4 {
            n[s] = self.lists[s].len();
        }
        for r in &self.reserves {
            n[0] += r.len();
        }
        return n;
    }
}
