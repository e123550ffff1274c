//! Mutable per-chain search state over an [`Mrf`] skeleton.
//!
//! Bookkeeping, with `w` the cost weight of a constraint:
//!
//! | constraint | `nsat == 0`              | `nsat == 1`                      |
//! |------------|--------------------------|----------------------------------|
//! | positive   | every atom: `make += w`  | the satisfying atom: `break += w`|
//! | negative   | every atom: `break += w` | the satisfying atom: `make += w` |
//!
//! With `nsat >= 2` a single flip cannot change satisfaction, so the
//! constraint contributes nothing. `delta = break - make` is the cost change
//! of flipping an atom now.

use rand::Rng;

use super::Mrf;

/// Fixed-value state of an atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fixed {
    #[default]
    Free,
    True,
    False,
}

/// Search state of one chain.
#[derive(Debug, Clone)]
pub struct MrfState<'m> {
    mrf: &'m Mrf,
    state: Vec<bool>,
    fixed: Vec<Fixed>,
    low_state: Vec<bool>,
    low_cost: f64,
    true_counts: Vec<u32>,
    make: Vec<f64>,
    brk: Vec<f64>,
    last_flip: Vec<u64>,
    flips: u64,
    nsat: Vec<u32>,
    inactive: Vec<bool>,
    /// Violated active constraints, with each one's position for O(1) removal.
    violated: Vec<u32>,
    violated_pos: Vec<Option<usize>>,
    soft_cost: f64,
    hard_violations: usize,
}

impl<'m> MrfState<'m> {
    /// All atoms FALSE and free.
    pub fn new(mrf: &'m Mrf) -> Self {
        let n = mrf.atom_count();
        let m = mrf.constraint_count();
        let mut st = Self {
            mrf,
            state: vec![false; n],
            fixed: vec![Fixed::Free; n],
            low_state: vec![false; n],
            low_cost: f64::INFINITY,
            true_counts: vec![0; n],
            make: vec![0.0; n],
            brk: vec![0.0; n],
            last_flip: vec![0; n],
            flips: 0,
            nsat: vec![0; m],
            inactive: vec![false; m],
            violated: Vec::new(),
            violated_pos: vec![None; m],
            soft_cost: 0.0,
            hard_violations: 0,
        };
        st.recompute();
        st
    }

    pub fn mrf(&self) -> &'m Mrf {
        self.mrf
    }

    pub fn state(&self) -> &[bool] {
        &self.state
    }

    pub fn value(&self, atom: u32) -> bool {
        self.state[atom as usize]
    }

    pub fn fixed(&self, atom: u32) -> Fixed {
        self.fixed[atom as usize]
    }

    pub fn is_fixed(&self, atom: u32) -> bool {
        self.fixed[atom as usize] != Fixed::Free
    }

    pub fn make_cost(&self, atom: u32) -> f64 {
        self.make[atom as usize]
    }

    pub fn break_cost(&self, atom: u32) -> f64 {
        self.brk[atom as usize]
    }

    /// Cost change if `atom` were flipped now.
    pub fn delta(&self, atom: u32) -> f64 {
        self.brk[atom as usize] - self.make[atom as usize]
    }

    /// Fixed, or flipping would violate a hard constraint.
    pub fn is_critical(&self, atom: u32) -> bool {
        self.is_fixed(atom) || self.brk[atom as usize] >= self.mrf.hard_weight()
    }

    pub fn nsat(&self, constraint: u32) -> u32 {
        self.nsat[constraint as usize]
    }

    pub fn is_inactive(&self, constraint: u32) -> bool {
        self.inactive[constraint as usize]
    }

    /// Total cost of active violated constraints.
    pub fn cost(&self) -> f64 {
        self.soft_cost + self.hard_violations as f64 * self.mrf.hard_weight()
    }

    pub fn soft_cost(&self) -> f64 {
        self.soft_cost
    }

    pub fn hard_violations(&self) -> usize {
        self.hard_violations
    }

    pub fn violated(&self) -> &[u32] {
        &self.violated
    }

    pub fn flips(&self) -> u64 {
        self.flips
    }

    pub fn last_flip(&self, atom: u32) -> u64 {
        self.last_flip[atom as usize]
    }

    pub fn low_state(&self) -> &[bool] {
        &self.low_state
    }

    pub fn low_cost(&self) -> f64 {
        self.low_cost
    }

    // -----------------------------------------------------------------------
    // Assignment
    // -----------------------------------------------------------------------

    /// Flip one atom, updating satisfaction counts, cost and the make/break
    /// potentials of every atom sharing a constraint with it.
    pub fn flip(&mut self, atom: u32) {
        let mrf = self.mrf;
        let node = mrf.atom(atom);
        for ci in node.occurrences() {
            self.remove_potential(ci);
        }
        let now = !self.state[atom as usize];
        self.state[atom as usize] = now;
        for ci in node.positive.iter().copied() {
            self.shift_nsat(ci, now);
        }
        for ci in node.negative.iter().copied() {
            self.shift_nsat(ci, !now);
        }
        for ci in node.occurrences() {
            self.add_potential(ci);
        }
        self.flips += 1;
        self.last_flip[atom as usize] = self.flips;
    }

    /// Set an atom's value and mark it fixed.
    pub fn fix(&mut self, atom: u32, value: bool) {
        if self.state[atom as usize] != value {
            self.flip(atom);
        }
        self.fixed[atom as usize] = if value { Fixed::True } else { Fixed::False };
    }

    pub fn unfix(&mut self, atom: u32) {
        self.fixed[atom as usize] = Fixed::Free;
    }

    /// Replace the assignment of free atoms and rebuild all bookkeeping.
    pub fn assign(&mut self, assignment: &[bool]) {
        for (i, &v) in assignment.iter().enumerate().take(self.state.len()) {
            if self.fixed[i] == Fixed::Free {
                self.state[i] = v;
            }
        }
        self.recompute();
    }

    /// Random values for every free atom.
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        for i in 0..self.state.len() {
            if self.fixed[i] == Fixed::Free {
                self.state[i] = rng.gen_bool(0.5);
            }
        }
        self.recompute();
    }

    /// Exclude (or re-include) a constraint from cost and potentials.
    pub fn set_inactive(&mut self, constraint: u32, inactive: bool) {
        if self.inactive[constraint as usize] == inactive {
            return;
        }
        if inactive {
            self.remove_potential(constraint);
            self.account(constraint, false);
            self.inactive[constraint as usize] = true;
        } else {
            self.inactive[constraint as usize] = false;
            self.account(constraint, true);
            self.add_potential(constraint);
        }
    }

    /// Rebuild nsat, cost, violation set and potentials from the current state.
    pub fn recompute(&mut self) {
        let mrf = self.mrf;
        self.make.iter_mut().for_each(|m| *m = 0.0);
        self.brk.iter_mut().for_each(|b| *b = 0.0);
        self.violated.clear();
        self.violated_pos.iter_mut().for_each(|p| *p = None);
        self.soft_cost = 0.0;
        self.hard_violations = 0;
        for (ci, c) in mrf.constraints().iter().enumerate() {
            self.nsat[ci] = c
                .lits
                .iter()
                .filter(|l| self.state[l.atom as usize] == l.positive)
                .count() as u32;
        }
        for ci in 0..mrf.constraint_count() as u32 {
            if !self.inactive[ci as usize] {
                self.account(ci, true);
                self.add_potential(ci);
            }
        }
    }

    /// Cost of the current state re-derived without any incremental counter.
    pub fn cost_from_scratch(&self) -> f64 {
        let mrf = self.mrf;
        mrf.constraints()
            .iter()
            .enumerate()
            .filter(|(ci, _)| !self.inactive[*ci])
            .filter(|(_, c)| {
                let nsat = c
                    .lits
                    .iter()
                    .filter(|l| self.state[l.atom as usize] == l.positive)
                    .count() as u32;
                c.is_violated(nsat)
            })
            .map(|(ci, _)| mrf.cost_weight(ci as u32))
            .sum()
    }

    // -----------------------------------------------------------------------
    // Best state and sampling statistics
    // -----------------------------------------------------------------------

    /// Record the current state as the best seen.
    pub fn save_low(&mut self) {
        self.low_state.clone_from(&self.state);
        self.low_cost = self.cost();
    }

    pub fn restore_low(&mut self) {
        if self.low_cost.is_finite() {
            self.state.clone_from(&self.low_state);
            self.recompute();
        }
    }

    /// Add the current state to the per-atom true counts.
    pub fn count_states(&mut self) {
        for (count, &v) in self.true_counts.iter_mut().zip(&self.state) {
            *count += v as u32;
        }
    }

    pub fn true_count(&self, atom: u32) -> u32 {
        self.true_counts[atom as usize]
    }

    /// Fraction of `samples` in which the atom was true.
    pub fn probability(&self, atom: u32, samples: u32) -> f64 {
        if samples == 0 {
            0.0
        } else {
            self.true_counts[atom as usize] as f64 / samples as f64
        }
    }

    // -----------------------------------------------------------------------
    // Incremental bookkeeping
    // -----------------------------------------------------------------------

    fn shift_nsat(&mut self, ci: u32, became_true: bool) {
        let active = !self.inactive[ci as usize];
        if active {
            self.account(ci, false);
        }
        let n = &mut self.nsat[ci as usize];
        if became_true {
            *n += 1;
        } else {
            *n -= 1;
        }
        if active {
            self.account(ci, true);
        }
    }

    /// Add (or withdraw) a constraint's cost and violation-set membership.
    fn account(&mut self, ci: u32, add: bool) {
        let c = self.mrf.constraint(ci);
        if !c.is_violated(self.nsat[ci as usize]) {
            return;
        }
        if add {
            if c.hard {
                self.hard_violations += 1;
            } else {
                self.soft_cost += c.weight.abs();
            }
            self.violated_pos[ci as usize] = Some(self.violated.len());
            self.violated.push(ci);
        } else {
            if c.hard {
                self.hard_violations -= 1;
            } else {
                self.soft_cost -= c.weight.abs();
            }
            if let Some(pos) = self.violated_pos[ci as usize].take() {
                self.violated.swap_remove(pos);
                if let Some(&moved) = self.violated.get(pos) {
                    self.violated_pos[moved as usize] = Some(pos);
                }
            }
        }
    }

    fn add_potential(&mut self, ci: u32) {
        self.potential(ci, 1.0);
    }

    fn remove_potential(&mut self, ci: u32) {
        self.potential(ci, -1.0);
    }

    fn potential(&mut self, ci: u32, sign: f64) {
        if self.inactive[ci as usize] {
            return;
        }
        let mrf = self.mrf;
        let c = mrf.constraint(ci);
        let w = sign * mrf.cost_weight(ci);
        match self.nsat[ci as usize] {
            0 => {
                let slot = if c.is_positive() { &mut self.make } else { &mut self.brk };
                for l in &c.lits {
                    slot[l.atom as usize] += w;
                }
            }
            1 => {
                let slot = if c.is_positive() { &mut self.brk } else { &mut self.make };
                if let Some(l) = c
                    .lits
                    .iter()
                    .find(|l| self.state[l.atom as usize] == l.positive)
                {
                    slot[l.atom as usize] += w;
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ground::registry::{CliqueEntry, CliqueRegistry};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn network() -> Mrf {
        let registry = CliqueRegistry::new(4);
        for e in [
            CliqueEntry::new(vec![1, 2], 1.5, 0, 1),
            CliqueEntry::new(vec![-1, 3], 0.7, 1, 1),
            CliqueEntry::new(vec![2, -3, 4], 2.0, 2, 1),
            CliqueEntry::new(vec![4], -1.2, 3, 1),
            CliqueEntry::new(vec![-2, -4], f64::INFINITY, 4, 1),
            CliqueEntry::new(vec![1, 3, 4], -0.4, 5, 1),
        ] {
            registry.register(e);
        }
        Mrf::assemble(registry.into_cliques(), [], Some((1, 4)))
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn initial_cost_matches_evaluate() {
        let mrf = network();
        let st = MrfState::new(&mrf);
        assert_close(st.cost(), mrf.evaluate(st.state()));
        assert_close(st.cost(), st.cost_from_scratch());
    }

    #[test]
    fn delta_predicts_flip_outcome() {
        let mrf = network();
        let mut st = MrfState::new(&mrf);
        for atom in 0..mrf.atom_count() as u32 {
            let before = st.cost();
            let delta = st.delta(atom);
            st.flip(atom);
            assert_close(st.cost() - before, delta);
        }
    }

    #[test]
    fn no_drift_after_random_flips() {
        let mrf = network();
        let mut st = MrfState::new(&mrf);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let atom = rng.gen_range(0..mrf.atom_count() as u32);
            st.flip(atom);
            assert_close(st.cost(), st.cost_from_scratch());
        }
        let incremental: Vec<(f64, f64)> = (0..mrf.atom_count() as u32)
            .map(|a| (st.make_cost(a), st.break_cost(a)))
            .collect();
        let mut fresh = st.clone();
        fresh.recompute();
        for (a, (make, brk)) in incremental.into_iter().enumerate() {
            assert_close(make, fresh.make_cost(a as u32));
            assert_close(brk, fresh.break_cost(a as u32));
        }
        let violated_cost: f64 = st.violated().iter().map(|&c| mrf.cost_weight(c)).sum();
        assert_close(violated_cost, st.cost());
    }

    #[test]
    fn breaking_hard_constraint_is_critical() {
        let mrf = network();
        let mut st = MrfState::new(&mrf);
        let a2 = mrf.index_of(2).unwrap();
        let a4 = mrf.index_of(4).unwrap();
        st.flip(a2);
        // !2 v !4 is now satisfied only by !4.
        assert!(st.is_critical(a4));
        assert!(!st.is_critical(a2));
        st.fix(a2, false);
        assert!(st.is_critical(a2));
        assert!(!st.value(a2));
    }

    #[test]
    fn inactive_constraints_do_not_cost() {
        let mrf = network();
        let mut st = MrfState::new(&mrf);
        let violated: Vec<u32> = st.violated().to_vec();
        assert!(!violated.is_empty());
        for &c in &violated {
            st.set_inactive(c, true);
        }
        assert_close(st.cost(), 0.0);
        assert_close(st.cost_from_scratch(), 0.0);
        for &c in &violated {
            st.set_inactive(c, false);
        }
        assert_close(st.cost(), mrf.evaluate(st.state()));
    }

    #[test]
    fn low_state_and_true_counts() {
        let mrf = network();
        let mut st = MrfState::new(&mrf);
        st.save_low();
        let low = st.low_cost();
        st.flip(0);
        st.count_states();
        st.count_states();
        assert_eq!(st.true_count(0), 2);
        assert_close(st.probability(0, 4), 0.5);
        st.restore_low();
        assert_close(st.cost(), low);
        assert!(!st.value(0));
    }
}
