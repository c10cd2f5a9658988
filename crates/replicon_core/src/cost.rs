//! Admission control for instruction execution.

use crate::config::CostConfig;
use crate::inst_set::InstSet;
use crate::phenotype::Phenotype;
use replicon_data::Instruction;

/// Stored resource drawn on by instruction resource costs.
pub const COST_RESOURCE: usize = 0;

/// Countdown state for the additive cost model.
///
/// Each thread owns a cycle countdown; each opcode owns a one-time
/// countdown for its first execution. A positive countdown means the
/// instruction at the thread's IP is still being paid for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostState {
    active: Vec<u32>,
    first_time: Vec<u32>,
}

impl CostState {
    #[must_use]
    pub fn new(inst_set: &InstSet, config: &CostConfig) -> Self {
        let first_time = if config.first_time {
            inst_set.entries().map(|(_, e)| e.ft_cost).collect()
        } else {
            vec![0; inst_set.len()]
        };
        Self {
            active: vec![0],
            first_time,
        }
    }

    /// Restores the single-thread, nothing-paid state.
    pub fn reset(&mut self, inst_set: &InstSet, config: &CostConfig) {
        *self = Self::new(inst_set, config);
    }

    pub fn add_thread(&mut self) {
        self.active.push(0);
    }

    pub fn remove_thread(&mut self, thread: usize) {
        if thread < self.active.len() {
            self.active.remove(thread);
        }
    }

    #[must_use]
    pub fn is_paying_active_cost(&self, thread: usize) -> bool {
        self.active.get(thread).is_some_and(|&c| c > 0)
    }

    /// Decides whether `inst` may run on `thread` this cycle.
    ///
    /// Energy and resource sufficiency are checked first and never consume
    /// anything. Then the opcode's first-time countdown and the thread's
    /// per-cycle countdown must both be exhausted. `false` means the caller
    /// retries the same instruction next cycle.
    pub fn pay_pre_cost(
        &mut self,
        thread: usize,
        inst: Instruction,
        num_threads: usize,
        inst_set: &InstSet,
        config: &CostConfig,
        phenotype: &Phenotype,
    ) -> bool {
        let Some(entry) = inst_set.get(inst) else {
            return true;
        };

        if config.energy && entry.energy_cost > phenotype.energy_store {
            return false;
        }
        if config.resource && entry.res_cost > phenotype.stored_resource(COST_RESOURCE) {
            return false;
        }

        if let Some(ft) = self.first_time.get_mut(inst.index()) {
            if *ft > 1 {
                *ft -= 1;
                return false;
            }
            *ft = 0;
        }

        let mut base = 0;
        if config.per_inst {
            base += entry.cost;
        }
        if config.per_thread && num_threads > 1 {
            base += config.thread_cost;
        }

        let Some(active) = self.active.get_mut(thread) else {
            return true;
        };
        if *active > 0 {
            *active -= 1;
            if *active > 0 {
                return false;
            }
        } else if base > 1 {
            *active = base - 1;
            return false;
        }
        true
    }

    /// Deducts deferred energy and resource costs after `inst` ran.
    pub fn pay_post_cost(
        &mut self,
        inst: Instruction,
        inst_set: &InstSet,
        config: &CostConfig,
        phenotype: &mut Phenotype,
    ) {
        let Some(entry) = inst_set.get(inst) else {
            return;
        };
        if config.energy && entry.energy_cost > 0.0 {
            phenotype.energy_store = (phenotype.energy_store - entry.energy_cost).max(0.0);
        }
        if config.resource && entry.res_cost > 0.0 {
            phenotype.add_resource(COST_RESOURCE, -entry.res_cost);
        }
    }
}
