//! The organism interface seen from inside one cell.

use super::{neighbor_index, Resident, INBOX_CAPACITY, NUM_DIRECTIONS};
use crate::model::environment::LogicEnvironment;
use rand::{Rng, RngCore};
use replicon_core::{Environment, Message, OrganismInterface, Phenotype, Sequence, TaskOutcome};

/// Read-only view of the world taken at the start of an update.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub width: u16,
    pub height: u16,
    /// Organism id per cell.
    pub ids: Vec<Option<u64>>,
    /// Genome per cell; only filled when horizontal transfer is enabled.
    pub genomes: Vec<Option<Sequence>>,
    pub resources: Vec<f64>,
}

impl Snapshot {
    fn neighbor(&self, cell: usize, facing: usize) -> usize {
        neighbor_index(self.width, self.height, cell, facing)
    }
}

/// An offspring waiting to be placed.
#[derive(Debug, Clone)]
pub struct PendingBirth {
    pub parent_cell: usize,
    pub parent_id: u64,
    pub parent: Phenotype,
    pub genome: Sequence,
}

/// Everything a slice wants to do outside its own cell.
#[derive(Debug, Clone, Default)]
pub struct CellEffects {
    pub births: Vec<PendingBirth>,
    /// Target cell and message.
    pub outbox: Vec<(usize, Message)>,
    /// Requested destination cell.
    pub move_to: Option<usize>,
    /// Signed changes to the shared resource pool.
    pub resource_deltas: Vec<f64>,
}

/// Borrowed view of one cell, its resident's mobile state and the shared
/// snapshot.
pub struct CellInterface<'a> {
    pub cell: usize,
    pub env: &'a LogicEnvironment,
    pub snapshot: &'a Snapshot,
    pub facing: &'a mut usize,
    pub inbox: &'a mut std::collections::VecDeque<Message>,
    pub group: &'a mut Option<i32>,
    pub inputs: [i32; 3],
    pub next_input: &'a mut usize,
    pub effects: &'a mut CellEffects,
    /// Free cells left this update under the empty-only birth policy.
    pub empty_slots: Option<&'a mut usize>,
}

impl<'a> CellInterface<'a> {
    /// Splits a resident into the pieces the interface borrows. The
    /// organism itself stays free for the caller to run.
    pub fn for_resident(
        cell: usize,
        resident: &'a mut Resident,
        env: &'a LogicEnvironment,
        snapshot: &'a Snapshot,
        effects: &'a mut CellEffects,
        empty_slots: Option<&'a mut usize>,
    ) -> (&'a mut replicon_core::Organism, Self) {
        let Resident {
            organism,
            facing,
            inbox,
            group,
            inputs,
            next_input,
        } = resident;
        let interface = Self {
            cell,
            env,
            snapshot,
            facing,
            inbox,
            group,
            inputs: *inputs,
            next_input,
            effects,
            empty_slots,
        };
        (organism, interface)
    }

    fn faced_cell(&self) -> usize {
        self.snapshot.neighbor(self.cell, *self.facing)
    }
}

impl OrganismInterface for CellInterface<'_> {
    fn divide(&mut self, parent_id: u64, parent: &Phenotype, offspring: &Sequence) -> bool {
        if let Some(slots) = self.empty_slots.as_deref_mut() {
            if *slots == 0 {
                return false;
            }
            *slots -= 1;
        }
        self.effects.births.push(PendingBirth {
            parent_cell: self.cell,
            parent_id,
            parent: parent.clone(),
            genome: offspring.clone(),
        });
        true
    }

    fn input(&mut self) -> i32 {
        let value = self.inputs[*self.next_input % self.inputs.len()];
        *self.next_input = (*self.next_input + 1) % self.inputs.len();
        value
    }

    fn test_output(&mut self, inputs: &[i32], output: i32, task_counts: &[u32]) -> TaskOutcome {
        self.env.evaluate(inputs, output, task_counts)
    }

    fn test_on_divide(&mut self, task_counts: &[u32]) -> TaskOutcome {
        self.env.evaluate_on_divide(task_counts)
    }

    fn neighbor(&self) -> Option<u64> {
        self.snapshot.ids.get(self.faced_cell()).copied().flatten()
    }

    fn rotate(&mut self, direction: i32) {
        let turned = *self.facing as i32 + direction;
        *self.facing = turned.rem_euclid(NUM_DIRECTIONS as i32) as usize;
    }

    fn move_forward(&mut self) -> bool {
        let target = self.faced_cell();
        if self.effects.move_to.is_some() || target == self.cell || self.neighbor().is_some() {
            return false;
        }
        self.effects.move_to = Some(target);
        true
    }

    fn resources(&self) -> Vec<f64> {
        self.snapshot
            .resources
            .iter()
            .zip(self.effects.resource_deltas.iter().chain(std::iter::repeat(&0.0)))
            .map(|(level, delta)| (level + delta).max(0.0))
            .collect()
    }

    fn update_resources(&mut self, deltas: &[f64]) {
        if self.effects.resource_deltas.len() < deltas.len() {
            self.effects.resource_deltas.resize(deltas.len(), 0.0);
        }
        for (acc, delta) in self.effects.resource_deltas.iter_mut().zip(deltas) {
            *acc += delta;
        }
    }

    fn send_message(&mut self, message: Message) -> bool {
        if self.neighbor().is_none() {
            return false;
        }
        let target = self.faced_cell();
        self.effects.outbox.push((target, message));
        true
    }

    fn receive_message(&mut self) -> Option<Message> {
        self.inbox.pop_front()
    }

    fn donor_fragment(&mut self, rng: &mut dyn RngCore) -> Option<Sequence> {
        let donors: Vec<&Sequence> = self
            .snapshot
            .genomes
            .iter()
            .enumerate()
            .filter(|&(idx, g)| idx != self.cell && g.as_ref().is_some_and(|g| !g.is_empty()))
            .filter_map(|(_, g)| g.as_ref())
            .collect();
        if donors.is_empty() {
            return None;
        }
        let donor = donors[rng.gen_range(0..donors.len())];
        let max_len = (donor.len() / 4).max(1);
        let len = rng.gen_range(1..=max_len);
        let start = rng.gen_range(0..=donor.len() - len);
        Some(donor.slice(start..start + len))
    }

    fn join_group(&mut self, group: i32) {
        *self.group = Some(group);
    }

    fn group(&self) -> Option<i32> {
        *self.group
    }

    fn environment(&self) -> Option<&dyn Environment> {
        Some(self.env)
    }
}

/// Queues `message` in a resident's inbox, dropping the oldest when full.
pub(crate) fn deliver(inbox: &mut std::collections::VecDeque<Message>, message: Message) {
    if inbox.len() >= INBOX_CAPACITY {
        inbox.pop_front();
    }
    inbox.push_back(message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::VecDeque;

    fn snapshot() -> Snapshot {
        let mut ids = vec![None; 9];
        ids[1] = Some(7);
        Snapshot {
            width: 3,
            height: 3,
            ids,
            genomes: vec![None; 9],
            resources: vec![10.0],
        }
    }

    struct Parts {
        facing: usize,
        inbox: VecDeque<Message>,
        group: Option<i32>,
        next_input: usize,
        effects: CellEffects,
    }

    impl Parts {
        fn new() -> Self {
            Self {
                facing: 0,
                inbox: VecDeque::new(),
                group: None,
                next_input: 0,
                effects: CellEffects::default(),
            }
        }

        fn interface<'a>(
            &'a mut self,
            env: &'a LogicEnvironment,
            snapshot: &'a Snapshot,
            slots: Option<&'a mut usize>,
        ) -> CellInterface<'a> {
            CellInterface {
                cell: 4,
                env,
                snapshot,
                facing: &mut self.facing,
                inbox: &mut self.inbox,
                group: &mut self.group,
                inputs: [1, 2, 3],
                next_input: &mut self.next_input,
                effects: &mut self.effects,
                empty_slots: slots,
            }
        }
    }

    #[test]
    fn test_inputs_rotate() {
        let env = LogicEnvironment::new();
        let snap = snapshot();
        let mut parts = Parts::new();
        let mut iface = parts.interface(&env, &snap, None);
        let values: Vec<i32> = (0..4).map(|_| iface.input()).collect();
        assert_eq!(values, vec![1, 2, 3, 1]);
    }

    #[test]
    fn test_facing_and_neighbor() {
        let env = LogicEnvironment::new();
        let snap = snapshot();
        let mut parts = Parts::new();
        let mut iface = parts.interface(&env, &snap, None);
        assert_eq!(iface.neighbor(), Some(7));
        assert!(!iface.move_forward());
        iface.rotate(-1);
        assert_eq!(*iface.facing, 7);
        assert_eq!(iface.neighbor(), None);
        assert!(iface.move_forward());
        assert!(!iface.move_forward());
        assert_eq!(parts.effects.move_to, Some(0));
    }

    #[test]
    fn test_empty_only_refuses_when_full() {
        let env = LogicEnvironment::new();
        let snap = snapshot();
        let mut parts = Parts::new();
        let mut slots = 1;
        let mut iface = parts.interface(&env, &snap, Some(&mut slots));
        let parent = Phenotype::new(0, 0, 3);
        let genome = Sequence::from_symbols("abc").unwrap();
        assert!(iface.divide(1, &parent, &genome));
        assert!(!iface.divide(1, &parent, &genome));
        assert_eq!(parts.effects.births.len(), 1);
        assert_eq!(slots, 0);
    }

    #[test]
    fn test_resource_deltas_accumulate() {
        let env = LogicEnvironment::new();
        let snap = snapshot();
        let mut parts = Parts::new();
        let mut iface = parts.interface(&env, &snap, None);
        iface.update_resources(&[-1.5]);
        iface.update_resources(&[-0.5]);
        assert_eq!(iface.resources(), vec![8.0]);
    }

    #[test]
    fn test_messages_need_a_neighbor() {
        let env = LogicEnvironment::new();
        let snap = snapshot();
        let mut parts = Parts::new();
        let mut iface = parts.interface(&env, &snap, None);
        let msg = Message {
            sender: 3,
            label: 1,
            data: 2,
        };
        assert!(iface.send_message(msg));
        iface.rotate(1);
        assert!(!iface.send_message(msg));
        assert_eq!(parts.effects.outbox, vec![(1, msg)]);
    }

    #[test]
    fn test_donor_fragment_skips_self() {
        let env = LogicEnvironment::new();
        let mut snap = snapshot();
        snap.genomes[4] = Some(Sequence::from_symbols("zzzz").unwrap());
        let mut parts = Parts::new();
        let mut iface = parts.interface(&env, &snap, None);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(iface.donor_fragment(&mut rng).is_none());

        snap.genomes[0] = Some(Sequence::from_symbols("abcdefgh").unwrap());
        let mut parts = Parts::new();
        let mut iface = parts.interface(&env, &snap, None);
        let fragment = iface.donor_fragment(&mut rng).unwrap();
        assert!((1..=2).contains(&fragment.len()));
    }

    #[test]
    fn test_inbox_drops_oldest() {
        let mut inbox = VecDeque::new();
        for i in 0..(INBOX_CAPACITY as i32 + 2) {
            deliver(
                &mut inbox,
                Message {
                    sender: 0,
                    label: i,
                    data: 0,
                },
            );
        }
        assert_eq!(inbox.len(), INBOX_CAPACITY);
        assert_eq!(inbox.front().map(|m| m.label), Some(2));
    }
}
