//! Authoritative occupancy index over sections and blocks.
//!
//! Sections are the atomic unit: at most one wagon per section. Blocks
//! aggregate sections: at most one train per block. The block table is
//! derived state — every [`release`](ReservationTable::release) recounts
//! the block's holder from its per-section entries so the two can never
//! drift apart.

use stellwerk_core::{BlockId, SectionId, TrainId};
use stellwerk_topology::Topology;

/// Dense occupancy tables keyed by section index and block id.
#[derive(Clone, Debug)]
pub struct ReservationTable {
    sections: Vec<Option<TrainId>>,
    blocks: Vec<Option<TrainId>>,
}

impl ReservationTable {
    /// An empty table sized for the given topology.
    pub fn new(topology: &Topology) -> Self {
        Self {
            sections: vec![None; topology.section_count()],
            blocks: vec![None; topology.block_count()],
        }
    }

    /// Reserve a section for a train.
    ///
    /// Succeeds only if the section is free and its block is free or
    /// already held by the same train. On success the block is marked
    /// held too.
    pub fn try_reserve(
        &mut self,
        topology: &Topology,
        train: TrainId,
        section: SectionId,
    ) -> bool {
        let Some(idx) = topology.index_of(section) else {
            return false;
        };
        if self.sections[idx].is_some() {
            return false;
        }
        let Some(block) = topology.block_of(section) else {
            return false;
        };
        match self.blocks[block.0 as usize] {
            Some(holder) if holder != train => false,
            _ => {
                self.sections[idx] = Some(train);
                self.blocks[block.0 as usize] = Some(train);
                true
            }
        }
    }

    /// Release a train's hold on a section.
    ///
    /// If the released section was the train's last presence in its
    /// block, the block is released too. The block holder is recounted
    /// from the per-section entries rather than decremented.
    pub fn release(&mut self, topology: &Topology, train: TrainId, section: SectionId) {
        let Some(idx) = topology.index_of(section) else {
            return;
        };
        if self.sections[idx] != Some(train) {
            return;
        }
        self.sections[idx] = None;
        if let Some(block) = topology.block_of(section) {
            let holder = topology
                .sections_of(block)
                .iter()
                .filter_map(|&s| topology.index_of(s))
                .find_map(|i| self.sections[i]);
            self.blocks[block.0 as usize] = holder;
        }
    }

    /// The train holding a section, if any.
    pub fn peek(&self, topology: &Topology, section: SectionId) -> Option<TrainId> {
        topology
            .index_of(section)
            .and_then(|i| self.sections[i])
    }

    /// The train holding a block, if any.
    pub fn peek_block(&self, block: BlockId) -> Option<TrainId> {
        self.blocks.get(block.0 as usize).copied().flatten()
    }

    /// Whether a section is free.
    pub fn is_free(&self, topology: &Topology, section: SectionId) -> bool {
        self.peek(topology, section).is_none()
    }

    /// Whether a block is free or already held by the given train.
    pub fn block_free_or_held_by(&self, block: BlockId, train: TrainId) -> bool {
        match self.peek_block(block) {
            None => true,
            Some(holder) => holder == train,
        }
    }

    /// Release everything.
    pub fn clear(&mut self) {
        self.sections.fill(None);
        self.blocks.fill(None);
    }

    /// Number of sections currently reserved.
    pub fn occupied_sections(&self) -> usize {
        self.sections.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellwerk_topology::demo::demo_station;

    const T1: TrainId = TrainId(1);
    const T2: TrainId = TrainId(2);

    #[test]
    fn reserve_and_release_round_trip() {
        let topo = demo_station();
        let mut res = ReservationTable::new(&topo);

        assert!(res.try_reserve(&topo, T1, SectionId(31)));
        assert_eq!(res.peek(&topo, SectionId(31)), Some(T1));
        let block = topo.block_of(SectionId(31)).unwrap();
        assert_eq!(res.peek_block(block), Some(T1));

        res.release(&topo, T1, SectionId(31));
        assert!(res.is_free(&topo, SectionId(31)));
        assert_eq!(res.peek_block(block), None);
        assert_eq!(res.occupied_sections(), 0);
    }

    #[test]
    fn section_conflict_is_refused() {
        let topo = demo_station();
        let mut res = ReservationTable::new(&topo);
        assert!(res.try_reserve(&topo, T1, SectionId(10)));
        assert!(!res.try_reserve(&topo, T2, SectionId(10)));
        assert!(!res.try_reserve(&topo, T1, SectionId(10)), "even same train");
    }

    #[test]
    fn block_conflict_is_refused_across_sections() {
        let topo = demo_station();
        let mut res = ReservationTable::new(&topo);
        // 30 and 31 share the track-1 block.
        assert!(res.try_reserve(&topo, T1, SectionId(30)));
        assert!(!res.try_reserve(&topo, T2, SectionId(31)));
        // The holder itself may extend into the block.
        assert!(res.try_reserve(&topo, T1, SectionId(31)));
    }

    #[test]
    fn block_held_until_last_section_released() {
        let topo = demo_station();
        let mut res = ReservationTable::new(&topo);
        let block = topo.block_of(SectionId(30)).unwrap();

        assert!(res.try_reserve(&topo, T1, SectionId(30)));
        assert!(res.try_reserve(&topo, T1, SectionId(31)));
        res.release(&topo, T1, SectionId(30));
        assert_eq!(res.peek_block(block), Some(T1), "31 still held");
        res.release(&topo, T1, SectionId(31));
        assert_eq!(res.peek_block(block), None);
    }

    #[test]
    fn release_by_non_holder_is_a_no_op() {
        let topo = demo_station();
        let mut res = ReservationTable::new(&topo);
        assert!(res.try_reserve(&topo, T1, SectionId(20)));
        res.release(&topo, T2, SectionId(20));
        assert_eq!(res.peek(&topo, SectionId(20)), Some(T1));
    }
}
