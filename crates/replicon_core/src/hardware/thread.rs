use crate::head::{Head, Label, NUM_HEADS};
use serde::{Deserialize, Serialize};

pub const STACK_DEPTH: usize = 10;
pub const NUM_REGISTERS: usize = 3;

pub const REG_AX: usize = 0;
pub const REG_BX: usize = 1;
pub const REG_CX: usize = 2;

/// Fixed-depth circular stack. Pushing onto a full stack overwrites the
/// oldest value; popping an empty slot yields 0.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Stack {
    values: [i32; STACK_DEPTH],
    top: usize,
}

impl Stack {
    pub fn push(&mut self, value: i32) {
        self.top = (self.top + STACK_DEPTH - 1) % STACK_DEPTH;
        self.values[self.top] = value;
    }

    pub fn pop(&mut self) -> i32 {
        let value = self.values[self.top];
        self.values[self.top] = 0;
        self.top = (self.top + 1) % STACK_DEPTH;
        value
    }

    #[must_use]
    pub fn peek(&self) -> i32 {
        self.values[self.top]
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// One cooperative execution context: registers, heads, a local stack and
/// label scratch space. Memory and the global stack belong to the hardware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuThread {
    pub id: u32,
    pub regs: [i32; NUM_REGISTERS],
    pub heads: [Head; NUM_HEADS],
    pub stack: Stack,
    /// 0 selects the local stack, 1 the hardware's global stack.
    pub cur_stack: usize,
    /// Label most recently passed over by `h-copy`.
    pub read_label: Label,
    /// Label most recently read after the IP.
    pub next_label: Label,
    /// Spawned by an interrupt; `return` ends it.
    pub is_interrupt: bool,
}

impl CpuThread {
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self {
            id,
            regs: [0; NUM_REGISTERS],
            heads: [Head::new(0, 0); NUM_HEADS],
            stack: Stack::default(),
            cur_stack: 0,
            read_label: Label::new(),
            next_label: Label::new(),
            is_interrupt: false,
        }
    }

    /// Copy of this thread under a new id, as produced by `fork-th`.
    #[must_use]
    pub fn fork(&self, id: u32) -> Self {
        Self {
            id,
            is_interrupt: false,
            ..self.clone()
        }
    }
}
