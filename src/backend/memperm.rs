//! MemPerm resolution (spec.md §4.10, third paragraph): realize an
//! arbitrary permutation of stack slots — the allocator's answer to "these
//! values must end up in these slots, simultaneously" — as a sequence of
//! loads and stores through at most two reserved temporary registers.
//!
//! The permutation's dependency graph (dst needs src's current value) has
//! out-degree at most 1 per slot (each dst has exactly one src) and
//! in-degree at most 1 per slot (each src feeds at most one dst), so it
//! decomposes into disjoint chains (a path ending at a slot nothing else
//! writes) and cycles. A chain is realized with one temp, processed from
//! its least-depended-upon end forward. A cycle needs a second temp to
//! save its first slot's original value before that slot gets overwritten,
//! closing the loop once every other slot in the cycle has been moved
//! (spec.md: "one initial allocation of two aligned slots and matching
//! deallocation").

use std::collections::{BTreeMap, HashMap, HashSet};

/// A stack slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(pub u32);

/// One step of the realized permutation: load a slot's value into a
/// temporary register, or store a temporary register's value into a slot.
/// Exactly two temp numbers are ever used: `0` for the chain/cycle-body
/// moves in progress, `1` to hold a cycle's saved first value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemPermStep {
    LoadIntoTemp { temp: u8, from: Slot },
    StoreFromTemp { temp: u8, to: Slot },
}

/// Resolve `mapping` (dst slot -> the slot whose current value it must
/// receive) into a step sequence. Self-maps (`dst == src`) are dropped as
/// no-ops; `mapping` need not be a full permutation, only injective among
/// the slots it lists.
#[must_use]
pub fn resolve(mapping: &BTreeMap<Slot, Slot>) -> Vec<MemPermStep> {
    let pending: HashMap<Slot, Slot> =
        mapping.iter().filter(|(d, s)| d != s).map(|(&d, &s)| (d, s)).collect();

    let mut in_degree: HashMap<Slot, usize> = HashMap::new();
    for &src in pending.values() {
        *in_degree.entry(src).or_insert(0) += 1;
    }

    let mut visited: HashSet<Slot> = HashSet::new();
    let mut steps = Vec::new();

    // Chains: start at a dst nothing else depends on, walk forward to a
    // terminal slot this move set never overwrites.
    let chain_starts: Vec<Slot> = pending
        .keys()
        .copied()
        .filter(|d| in_degree.get(d).copied().unwrap_or(0) == 0)
        .collect();
    for start in chain_starts {
        let path = walk(&pending, start);
        for &n in &path {
            visited.insert(n);
        }
        emit_chain(&path, &mut steps);
    }

    // Whatever remains is one or more pure cycles (every slot in them has
    // in-degree and out-degree exactly 1 within `pending`).
    let mut remaining: Vec<Slot> = pending.keys().copied().filter(|d| !visited.contains(d)).collect();
    remaining.sort();
    for start in remaining {
        if visited.contains(&start) {
            continue;
        }
        let path = walk_cycle(&pending, start);
        for &n in &path {
            visited.insert(n);
        }
        emit_cycle(&path, &mut steps);
    }

    steps
}

/// Follow `dst -> pending[dst]` edges from `start` until reaching a slot
/// with no entry in `pending` (a stable source for this move set).
fn walk(pending: &HashMap<Slot, Slot>, start: Slot) -> Vec<Slot> {
    let mut path = vec![start];
    let mut cur = start;
    while let Some(&next) = pending.get(&cur) {
        path.push(next);
        cur = next;
    }
    path
}

/// Follow `dst -> pending[dst]` edges from `start` until the edge closes
/// back on `start`, without re-including `start` at the end.
fn walk_cycle(pending: &HashMap<Slot, Slot>, start: Slot) -> Vec<Slot> {
    let mut path = vec![start];
    let mut cur = start;
    loop {
        let next = pending[&cur];
        if next == start {
            break;
        }
        path.push(next);
        cur = next;
    }
    path
}

/// `path = [d0, d1, ..., dn]` with `dn` a stable source: process forward,
/// `d_i := d_{i+1}`, so each slot is read (as someone's source) before it
/// is overwritten.
fn emit_chain(path: &[Slot], steps: &mut Vec<MemPermStep>) {
    for w in path.windows(2) {
        steps.push(MemPermStep::LoadIntoTemp { temp: 0, from: w[1] });
        steps.push(MemPermStep::StoreFromTemp { temp: 0, to: w[0] });
    }
}

/// `path = [d0, d1, ..., dk]` with the implicit closing edge `dk := d0`:
/// save `d0`'s original value in the spare temp before `d0` is overwritten,
/// run the chain body `d0 := d1, ..., d_{k-1} := dk`, then close by writing
/// the saved value into `dk`.
fn emit_cycle(path: &[Slot], steps: &mut Vec<MemPermStep>) {
    if path.len() < 2 {
        return;
    }
    steps.push(MemPermStep::LoadIntoTemp { temp: 1, from: path[0] });
    for w in path.windows(2) {
        steps.push(MemPermStep::LoadIntoTemp { temp: 0, from: w[1] });
        steps.push(MemPermStep::StoreFromTemp { temp: 0, to: w[0] });
    }
    steps.push(MemPermStep::StoreFromTemp { temp: 1, to: *path.last().unwrap() });
}

/// Simulate `steps` against an in-memory slot environment; used by tests to
/// confirm the realized sequence produces the permutation it was asked for.
#[cfg(test)]
fn apply(steps: &[MemPermStep], env: &mut HashMap<Slot, i64>) {
    let mut temps: [Option<i64>; 2] = [None, None];
    for step in steps {
        match *step {
            MemPermStep::LoadIntoTemp { temp, from } => {
                temps[temp as usize] = Some(env[&from]);
            }
            MemPermStep::StoreFromTemp { temp, to } => {
                env.insert(to, temps[temp as usize].expect("store from an unset temp"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_chain_resolves_without_touching_the_cycle_temp() {
        let mut mapping = BTreeMap::new();
        mapping.insert(Slot(2), Slot(1)); // c := b
        mapping.insert(Slot(1), Slot(0)); // b := a
        let steps = resolve(&mapping);
        assert!(steps.iter().all(|s| matches!(
            s,
            MemPermStep::LoadIntoTemp { temp: 0, .. } | MemPermStep::StoreFromTemp { temp: 0, .. }
        )));

        let mut env = HashMap::from([(Slot(0), 10), (Slot(1), 20), (Slot(2), 30)]);
        apply(&steps, &mut env);
        assert_eq!(env[&Slot(1)], 10);
        assert_eq!(env[&Slot(2)], 20);
    }

    #[test]
    fn a_three_cycle_swaps_through_two_temporaries() {
        let mut mapping = BTreeMap::new();
        mapping.insert(Slot(0), Slot(1));
        mapping.insert(Slot(1), Slot(2));
        mapping.insert(Slot(2), Slot(0));
        let steps = resolve(&mapping);

        let mut env = HashMap::from([(Slot(0), 1), (Slot(1), 2), (Slot(2), 3)]);
        apply(&steps, &mut env);
        assert_eq!(env[&Slot(0)], 2);
        assert_eq!(env[&Slot(1)], 3);
        assert_eq!(env[&Slot(2)], 1);
    }

    #[test]
    fn self_maps_produce_no_steps() {
        let mut mapping = BTreeMap::new();
        mapping.insert(Slot(0), Slot(0));
        assert!(resolve(&mapping).is_empty());
    }

    #[test]
    fn a_two_cycle_and_an_independent_chain_both_resolve() {
        let mut mapping = BTreeMap::new();
        mapping.insert(Slot(0), Slot(1));
        mapping.insert(Slot(1), Slot(0));
        mapping.insert(Slot(5), Slot(4));
        let steps = resolve(&mapping);

        let mut env = HashMap::from([(Slot(0), 1), (Slot(1), 2), (Slot(4), 9), (Slot(5), 0)]);
        apply(&steps, &mut env);
        assert_eq!(env[&Slot(0)], 2);
        assert_eq!(env[&Slot(1)], 1);
        assert_eq!(env[&Slot(5)], 9);
    }
}
