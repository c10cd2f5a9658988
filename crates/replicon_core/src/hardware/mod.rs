//! The heads CPU: memory spaces, cooperative threads and the step cycle.

mod instructions;
pub mod thread;

use crate::config::{AppConfig, ThreadSlicing};
use crate::cost::CostState;
use crate::divide;
use crate::head::{Head, Label, HEAD_IP, HEAD_READ, HEAD_WRITE};
use crate::inst_set::InstSet;
use crate::interface::{ExecContext, InterruptKind};
use crate::organism::OrganismState;
use rand::Rng;
use replicon_data::{GenomeBuffer, Instruction, Sequence};
use std::sync::Arc;
pub use thread::{CpuThread, Stack, REG_AX, REG_BX, REG_CX};

/// Parent genome.
pub const SPACE_PARENT: usize = 0;
/// Offspring under construction.
pub const SPACE_OFFSPRING: usize = 1;

/// Result of one call to [`HeadsCpu::single_process`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// An instruction ran (possibly as a no-op).
    Executed,
    /// Cost accounting refused the instruction; it is retried next cycle.
    Blocked,
    /// The instruction's failure roll fired; it was skipped.
    Failed,
    /// An offspring was accepted by the host.
    Divided,
}

/// Virtual CPU owned by one organism.
#[derive(Debug, Clone)]
pub struct HeadsCpu {
    inst_set: Arc<InstSet>,
    memory: Vec<GenomeBuffer>,
    threads: Vec<CpuThread>,
    cur_thread: usize,
    next_thread_id: u32,
    global_stack: Stack,
    cost: CostState,
    mal_active: bool,
    advance_ip: bool,
    thread_selected: bool,
    errors: u64,
}

impl HeadsCpu {
    #[must_use]
    pub fn new(inst_set: Arc<InstSet>, genome: &Sequence, config: &AppConfig) -> Self {
        let cost = CostState::new(&inst_set, &config.cost);
        Self {
            inst_set,
            memory: vec![GenomeBuffer::new(genome.clone()), GenomeBuffer::default()],
            threads: vec![CpuThread::new(0)],
            cur_thread: 0,
            next_thread_id: 1,
            global_stack: Stack::default(),
            cost,
            mal_active: false,
            advance_ip: true,
            thread_selected: false,
            errors: 0,
        }
    }

    /// Back to a single fresh thread at the start of the parent genome.
    /// Memory contents are kept; flags and the offspring space are cleared.
    pub fn reset(&mut self, config: &AppConfig) {
        self.memory[SPACE_PARENT].clear_flags();
        self.memory[SPACE_OFFSPRING] = GenomeBuffer::default();
        self.threads = vec![CpuThread::new(0)];
        self.cur_thread = 0;
        self.next_thread_id = 1;
        self.global_stack.clear();
        self.cost.reset(&self.inst_set, &config.cost);
        self.mal_active = false;
        self.advance_ip = false;
        self.thread_selected = true;
    }

    #[must_use]
    pub fn inst_set(&self) -> &Arc<InstSet> {
        &self.inst_set
    }

    #[must_use]
    pub fn memory(&self) -> &[GenomeBuffer] {
        &self.memory
    }

    /// Parent memory space.
    #[must_use]
    pub fn genome(&self) -> &GenomeBuffer {
        &self.memory[SPACE_PARENT]
    }

    #[must_use]
    pub fn offspring(&self) -> &GenomeBuffer {
        &self.memory[SPACE_OFFSPRING]
    }

    #[must_use]
    pub fn threads(&self) -> &[CpuThread] {
        &self.threads
    }

    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    #[must_use]
    pub fn cur_thread(&self) -> usize {
        self.cur_thread
    }

    #[must_use]
    pub fn thread(&self) -> &CpuThread {
        &self.threads[self.cur_thread]
    }

    #[must_use]
    pub fn ip(&self) -> Head {
        self.thread().heads[HEAD_IP]
    }

    #[must_use]
    pub fn errors(&self) -> u64 {
        self.errors
    }

    #[must_use]
    pub fn mal_active(&self) -> bool {
        self.mal_active
    }

    #[must_use]
    pub fn global_stack(&self) -> &Stack {
        &self.global_stack
    }

    #[must_use]
    pub fn is_paying_active_cost(&self, thread: usize) -> bool {
        self.cost.is_paying_active_cost(thread)
    }

    pub(crate) fn write_head(&self) -> Head {
        self.thread().heads[HEAD_WRITE]
    }

    /// Allocates an offspring space `ratio` times the parent length, capped
    /// at `max_len`. Fails while an allocation is active.
    pub(crate) fn allocate(&mut self, ratio: f64, max_len: usize) -> Option<usize> {
        if self.mal_active {
            return None;
        }
        let parent_len = self.memory[SPACE_PARENT].len();
        let size = ((parent_len as f64 * ratio).ceil() as usize)
            .min(max_len.max(parent_len))
            .max(1);
        self.memory[SPACE_OFFSPRING] = GenomeBuffer::with_len(size);
        self.mal_active = true;

        let thread = &mut self.threads[self.cur_thread];
        thread.heads[HEAD_WRITE] = Head::new(SPACE_OFFSPRING, 0);
        Some(size)
    }

    /// Frees the offspring space; heads pointing into it return to the
    /// parent space.
    pub(crate) fn clear_offspring(&mut self) {
        self.memory[SPACE_OFFSPRING] = GenomeBuffer::default();
        self.mal_active = false;
        for thread in &mut self.threads {
            for head in &mut thread.heads {
                if head.space() == SPACE_OFFSPRING {
                    head.set_space(SPACE_PARENT, &self.memory);
                }
            }
        }
    }

    /// Runs one instruction on the current thread.
    pub fn single_process<R: Rng>(
        &mut self,
        state: &mut OrganismState,
        ctx: &mut ExecContext<'_, R>,
    ) -> StepOutcome {
        state.phenotype.cpu_cycles += 1;
        self.advance_ip = true;
        self.thread_selected = false;

        let thread = self.cur_thread;
        let ip = self.threads[thread].heads[HEAD_IP];
        let inst = ip.inst(&self.memory);

        if ctx.tracing() {
            let line = self.status_line(inst);
            ctx.emit(&line);
        }

        if !self.cost.pay_pre_cost(
            thread,
            inst,
            self.threads.len(),
            &self.inst_set,
            &ctx.config.cost,
            &state.phenotype,
        ) {
            self.rotate_threads(ctx.config);
            return StepOutcome::Blocked;
        }

        let prob_fail = self.inst_set.get(inst).map_or(0.0, |e| e.prob_fail);
        let failed = prob_fail > 0.0 && ctx.rng.gen_bool(prob_fail);

        ip.mark_executed(&mut self.memory);
        let ip_at_end = ip.space() == SPACE_PARENT && ip.at_end(&self.memory);

        let mut outcome = if failed {
            StepOutcome::Failed
        } else {
            match self.inst_set.op(inst) {
                Some(op) => self.execute(op, state, ctx),
                None => {
                    self.errors += 1;
                    state.phenotype.cur_num_errors += 1;
                    StepOutcome::Executed
                }
            }
        };

        let mut wrapped = false;
        if self.advance_ip && thread < self.threads.len() {
            let ip = &mut self.threads[thread].heads[HEAD_IP];
            ip.advance(1, &self.memory);
            wrapped = ip_at_end && ip.space() == SPACE_PARENT && ip.position() == 0;
        }

        self.cost
            .pay_post_cost(inst, &self.inst_set, &ctx.config.cost, &mut state.phenotype);

        if outcome != StepOutcome::Divided && self.implicit_repro_due(state, ctx.config, wrapped) {
            if divide::implicit_repro(self, state, ctx).is_ok() {
                outcome = StepOutcome::Divided;
            }
        }

        self.rotate_threads(ctx.config);
        outcome
    }

    fn implicit_repro_due(&self, state: &OrganismState, config: &AppConfig, wrapped: bool) -> bool {
        let by_cycles = config.cpu.implicit_repro_cycles.is_some_and(|n| {
            n > 0 && state.phenotype.cpu_cycles - state.phenotype.gestation_start >= n
        });
        by_cycles || (config.cpu.implicit_repro_end && wrapped)
    }

    fn rotate_threads(&mut self, config: &AppConfig) {
        if self.thread_selected || self.threads.len() <= 1 {
            return;
        }
        if config.cpu.thread_slicing == ThreadSlicing::RoundRobin {
            self.cur_thread = (self.cur_thread + 1) % self.threads.len();
        }
    }

    /// Makes the thread with `id` current. Returns `false` if none matches.
    pub fn thread_select(&mut self, id: u32) -> bool {
        match self.threads.iter().position(|t| t.id == id) {
            Some(idx) => {
                self.cur_thread = idx;
                self.thread_selected = true;
                true
            }
            None => false,
        }
    }

    /// Selects by label, read as a base-3 thread id.
    pub fn thread_select_label(&mut self, label: &Label) -> bool {
        label
            .as_int()
            .and_then(|id| u32::try_from(id).ok())
            .is_some_and(|id| self.thread_select(id))
    }

    pub fn thread_next(&mut self) {
        self.cur_thread = (self.cur_thread + 1) % self.threads.len();
        self.thread_selected = true;
    }

    pub fn thread_prev(&mut self) {
        self.cur_thread = (self.cur_thread + self.threads.len() - 1) % self.threads.len();
        self.thread_selected = true;
    }

    /// Clones the current thread. The clone is appended and is not selected.
    pub fn fork_thread(&mut self, max_threads: usize) -> bool {
        if self.threads.len() >= max_threads {
            return false;
        }
        let clone = self.threads[self.cur_thread].fork(self.next_thread_id);
        self.next_thread_id += 1;
        self.threads.push(clone);
        self.cost.add_thread();
        true
    }

    /// Removes the current thread. The last thread cannot be killed.
    pub fn kill_thread(&mut self) -> bool {
        if self.threads.len() <= 1 {
            return false;
        }
        self.threads.remove(self.cur_thread);
        self.cost.remove_thread(self.cur_thread);
        if self.cur_thread >= self.threads.len() {
            self.cur_thread = 0;
        }
        self.advance_ip = false;
        self.thread_selected = true;
        true
    }

    /// Spawns a handler thread for an external event. The handler starts
    /// just after its label in the parent genome and becomes current; no
    /// other thread is touched. Returns `false` when interrupts are off, the
    /// thread limit is reached or the genome has no handler.
    pub fn interrupt_thread(&mut self, kind: InterruptKind, config: &AppConfig) -> bool {
        if !config.cpu.interrupts_enabled || self.threads.len() >= config.cpu.max_threads {
            return false;
        }
        let Some(label) = Label::from_values(&kind.handler_label()).to_insts(&self.inst_set) else {
            return false;
        };
        let parent = &self.memory[SPACE_PARENT];
        if parent.is_empty() {
            return false;
        }
        let scan_from = Head::new(SPACE_PARENT, parent.len() - 1);
        let Some(found) = scan_from.find_label(&label, &self.memory) else {
            return false;
        };

        let mut handler = CpuThread::new(self.next_thread_id);
        self.next_thread_id += 1;
        handler.is_interrupt = true;
        let mut start = found;
        start.advance(1, &self.memory);
        handler.heads = [start, start, start, start];
        if let InterruptKind::Message(message) = kind {
            handler.regs[REG_BX] = message.label;
            handler.regs[REG_CX] = message.data;
        }

        tracing::debug!(thread = handler.id, ?kind, "Interrupt handler spawned");
        self.threads.push(handler);
        self.cost.add_thread();
        self.cur_thread = self.threads.len() - 1;
        true
    }

    /// One-line summary of the current thread, as sent to trace sinks.
    #[must_use]
    pub fn status_line(&self, inst: Instruction) -> String {
        let thread = self.thread();
        let ip = thread.heads[HEAD_IP];
        format!(
            "T{} IP {}:{} {} AX={} BX={} CX={} R={} W={}:{}",
            thread.id,
            ip.space(),
            ip.position(),
            self.inst_set.name(inst),
            thread.regs[REG_AX],
            thread.regs[REG_BX],
            thread.regs[REG_CX],
            thread.heads[HEAD_READ].position(),
            thread.heads[HEAD_WRITE].space(),
            thread.heads[HEAD_WRITE].position(),
        )
    }
}
