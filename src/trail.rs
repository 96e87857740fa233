//! Append-only undo log with decision-level markers.
//!
//! Every mutating subsystem records, per mutation, enough information to reverse it. Popping `n`
//! levels replays entries in exact reverse chronological order until `n` markers have been
//! consumed; each subsystem's restore action may assume its own immediately-preceding mutation is
//! the one being undone.

use crate::quokka_assert_simple;

#[derive(Clone, Debug)]
enum TrailEntry<Op> {
    LevelMark,
    Op(Op),
}

#[derive(Clone, Debug)]
pub(crate) struct Trail<Op> {
    entries: Vec<TrailEntry<Op>>,
    num_levels: usize,
}

impl<Op> Default for Trail<Op> {
    fn default() -> Self {
        Trail {
            entries: Vec::default(),
            num_levels: 0,
        }
    }
}

impl<Op> Trail<Op> {
    pub(crate) fn push(&mut self, op: Op) {
        self.entries.push(TrailEntry::Op(op));
    }

    /// Append a level marker, opening a new push/pop bracket.
    pub(crate) fn mark(&mut self) {
        self.entries.push(TrailEntry::LevelMark);
        self.num_levels += 1;
    }

    /// The number of level markers currently on the trail, which equals the push depth.
    pub(crate) fn num_levels(&self) -> usize {
        self.num_levels
    }

    pub(crate) fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Pop entries until `n` level markers have been consumed, dispatching each non-marker entry
    /// to `undo` in reverse order of creation. Popping more levels than were pushed is a usage
    /// error.
    pub(crate) fn pop_levels(&mut self, n: usize, mut undo: impl FnMut(Op)) {
        quokka_assert_simple!(
            n <= self.num_levels,
            "cannot pop {n} levels from a trail with {} markers",
            self.num_levels
        );
        let mut remaining = n;
        while remaining > 0 {
            match self.entries.pop() {
                Some(TrailEntry::LevelMark) => {
                    remaining -= 1;
                    self.num_levels -= 1;
                }
                Some(TrailEntry::Op(op)) => undo(op),
                None => unreachable!("trail exhausted with {remaining} markers left to consume"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Trail;

    #[test]
    fn entries_are_undone_in_reverse_order() {
        let mut trail: Trail<u32> = Trail::default();
        trail.mark();
        trail.push(1);
        trail.push(2);
        trail.mark();
        trail.push(3);

        let mut undone = Vec::new();
        trail.pop_levels(2, |op| undone.push(op));

        assert_eq!(undone, vec![3, 2, 1]);
        assert_eq!(trail.num_levels(), 0);
        assert_eq!(trail.num_entries(), 0);
    }

    #[test]
    fn popping_one_level_stops_at_the_matching_marker() {
        let mut trail: Trail<u32> = Trail::default();
        trail.push(1);
        trail.mark();
        trail.push(2);

        let mut undone = Vec::new();
        trail.pop_levels(1, |op| undone.push(op));

        assert_eq!(undone, vec![2]);
        assert_eq!(trail.num_levels(), 0);
        assert_eq!(trail.num_entries(), 1);
    }

    #[test]
    #[should_panic]
    fn popping_more_levels_than_pushed_is_rejected() {
        let mut trail: Trail<u32> = Trail::default();
        trail.mark();
        trail.pop_levels(2, |_| {});
    }
}
