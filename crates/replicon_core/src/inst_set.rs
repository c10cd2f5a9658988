//! Read-only instruction table consumed by the hardware engine.

use rand::Rng;
use replicon_data::Instruction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Semantic operation behind an opcode. The engine dispatches on this with a
/// single `match`; the opcode number itself carries no meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstOp {
    NopA,
    NopB,
    NopC,
    /// Nop that is not part of the label alphabet.
    NopX,
    IfNEqu,
    IfEqu,
    IfLess,
    IfGrt,
    IfBit1,
    IfLabel,
    MovHead,
    JmpHead,
    GetHead,
    SetFlow,
    ShiftR,
    ShiftL,
    Inc,
    Dec,
    Zero,
    Push,
    Pop,
    SwapStk,
    Swap,
    Add,
    Sub,
    Nand,
    #[serde(rename = "IO")]
    IO,
    HAlloc,
    HDivide,
    HCopy,
    HSearch,
    HRead,
    HWrite,
    ForkTh,
    KillTh,
    IdTh,
    NextTh,
    PrevTh,
    SelectTh,
    SendMsg,
    RetrieveMsg,
    Rotate,
    Move,
    Collect,
    Return,
    JoinGroup,
}

impl InstOp {
    /// Position in the label alphabet (`nop-A` = 0, `nop-B` = 1, `nop-C` = 2).
    #[must_use]
    pub const fn label_value(self) -> Option<usize> {
        match self {
            InstOp::NopA => Some(0),
            InstOp::NopB => Some(1),
            InstOp::NopC => Some(2),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_nop(self) -> bool {
        matches!(
            self,
            InstOp::NopA | InstOp::NopB | InstOp::NopC | InstOp::NopX
        )
    }
}

fn default_cost() -> u32 {
    1
}

fn default_redundancy() -> u32 {
    1
}

/// One row of the instruction table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstEntry {
    pub name: String,
    pub op: InstOp,
    /// Cycles charged per execution.
    #[serde(default = "default_cost")]
    pub cost: u32,
    /// Cycles charged the first time the opcode runs in a hardware instance.
    #[serde(default)]
    pub ft_cost: u32,
    #[serde(default)]
    pub energy_cost: f64,
    #[serde(default)]
    pub res_cost: f64,
    #[serde(default)]
    pub prob_fail: f64,
    /// Weight used when drawing a random instruction for mutation.
    #[serde(default = "default_redundancy")]
    pub redundancy: u32,
}

impl InstEntry {
    #[must_use]
    pub fn new(name: &str, op: InstOp) -> Self {
        Self {
            name: name.to_string(),
            op,
            cost: default_cost(),
            ft_cost: 0,
            energy_cost: 0.0,
            res_cost: 0.0,
            prob_fail: 0.0,
            redundancy: default_redundancy(),
        }
    }
}

#[derive(Deserialize)]
struct InstSetFile {
    name: String,
    inst: Vec<InstEntry>,
}

const UNKNOWN_NAME: &str = "unknown";

const HEADS_DEFAULT: [(&str, InstOp); 26] = [
    ("nop-A", InstOp::NopA),
    ("nop-B", InstOp::NopB),
    ("nop-C", InstOp::NopC),
    ("if-n-equ", InstOp::IfNEqu),
    ("if-less", InstOp::IfLess),
    ("if-label", InstOp::IfLabel),
    ("mov-head", InstOp::MovHead),
    ("jmp-head", InstOp::JmpHead),
    ("get-head", InstOp::GetHead),
    ("set-flow", InstOp::SetFlow),
    ("shift-r", InstOp::ShiftR),
    ("shift-l", InstOp::ShiftL),
    ("inc", InstOp::Inc),
    ("dec", InstOp::Dec),
    ("push", InstOp::Push),
    ("pop", InstOp::Pop),
    ("swap-stk", InstOp::SwapStk),
    ("swap", InstOp::Swap),
    ("add", InstOp::Add),
    ("sub", InstOp::Sub),
    ("nand", InstOp::Nand),
    ("h-copy", InstOp::HCopy),
    ("h-alloc", InstOp::HAlloc),
    ("h-divide", InstOp::HDivide),
    ("IO", InstOp::IO),
    ("h-search", InstOp::HSearch),
];

const HEADS_EXTENSIONS: [(&str, InstOp); 20] = [
    ("nop-X", InstOp::NopX),
    ("if-equ", InstOp::IfEqu),
    ("if-grt", InstOp::IfGrt),
    ("if-bit-1", InstOp::IfBit1),
    ("zero", InstOp::Zero),
    ("h-read", InstOp::HRead),
    ("h-write", InstOp::HWrite),
    ("fork-th", InstOp::ForkTh),
    ("kill-th", InstOp::KillTh),
    ("id-th", InstOp::IdTh),
    ("next-th", InstOp::NextTh),
    ("prev-th", InstOp::PrevTh),
    ("select-th", InstOp::SelectTh),
    ("send-msg", InstOp::SendMsg),
    ("retrieve-msg", InstOp::RetrieveMsg),
    ("rotate", InstOp::Rotate),
    ("move", InstOp::Move),
    ("collect", InstOp::Collect),
    ("return", InstOp::Return),
    ("join-group", InstOp::JoinGroup),
];

/// Immutable opcode table. Opcode `n` is row `n`; built once and shared
/// behind an `Arc` by every organism.
#[derive(Debug, Clone)]
pub struct InstSet {
    name: String,
    entries: Vec<InstEntry>,
    by_name: HashMap<String, Instruction>,
    total_redundancy: u64,
}

impl InstSet {
    /// Builds and validates a table.
    pub fn new(name: &str, entries: Vec<InstEntry>) -> anyhow::Result<Self> {
        anyhow::ensure!(!entries.is_empty(), "Instruction set {} is empty", name);
        anyhow::ensure!(
            entries.len() <= usize::from(Instruction::MAX_SYMBOLIC) + 1,
            "Instruction set {} has {} entries; at most {} are addressable",
            name,
            entries.len(),
            usize::from(Instruction::MAX_SYMBOLIC) + 1
        );

        let mut by_name = HashMap::with_capacity(entries.len());
        for (idx, entry) in entries.iter().enumerate() {
            anyhow::ensure!(
                (0.0..=1.0).contains(&entry.prob_fail),
                "{}: prob_fail must be in [0.0, 1.0]",
                entry.name
            );
            anyhow::ensure!(
                entry.energy_cost >= 0.0 && entry.res_cost >= 0.0,
                "{}: energy and resource costs must be non-negative",
                entry.name
            );
            let previous = by_name.insert(entry.name.clone(), Instruction::new(idx as u8));
            anyhow::ensure!(
                previous.is_none(),
                "Duplicate instruction name {} in {}",
                entry.name,
                name
            );
        }

        let total_redundancy = entries.iter().map(|e| u64::from(e.redundancy)).sum();
        anyhow::ensure!(
            total_redundancy > 0,
            "Instruction set {} has no instruction with positive redundancy",
            name
        );

        Ok(Self {
            name: name.to_string(),
            entries,
            by_name,
            total_redundancy,
        })
    }

    fn from_table(name: &str, table: &[(&str, InstOp)]) -> Self {
        let entries: Vec<InstEntry> = table
            .iter()
            .map(|(inst_name, op)| InstEntry::new(inst_name, *op))
            .collect();
        let by_name = entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.name.clone(), Instruction::new(idx as u8)))
            .collect();
        Self {
            name: name.to_string(),
            total_redundancy: entries.len() as u64,
            entries,
            by_name,
        }
    }

    /// The 26-instruction heads set (symbols `a` through `z`).
    #[must_use]
    pub fn heads_default() -> Self {
        Self::from_table("heads_default", &HEADS_DEFAULT)
    }

    /// The default heads set followed by threading, messaging, movement and
    /// extra arithmetic instructions.
    #[must_use]
    pub fn heads_extended() -> Self {
        let table: Vec<(&str, InstOp)> = HEADS_DEFAULT
            .iter()
            .chain(HEADS_EXTENSIONS.iter())
            .copied()
            .collect();
        Self::from_table("heads_extended", &table)
    }

    /// Built-in set by configuration name.
    #[must_use]
    pub fn by_set_name(name: &str) -> Option<Self> {
        match name {
            "heads_default" => Some(Self::heads_default()),
            "heads_extended" => Some(Self::heads_extended()),
            _ => None,
        }
    }

    /// Parses a table of the form:
    ///
    /// ```toml
    /// name = "custom"
    /// [[inst]]
    /// name = "nop-A"
    /// op = "nop-a"
    /// cost = 1
    /// ```
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let file: InstSetFile = toml::from_str(content)?;
        Self::new(&file.name, file.inst)
    }

    #[must_use]
    pub fn set_name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (Instruction, &InstEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (Instruction::new(idx as u8), e))
    }

    /// Row for `inst`, or `None` for an opcode outside the table.
    #[must_use]
    pub fn get(&self, inst: Instruction) -> Option<&InstEntry> {
        self.entries.get(inst.index())
    }

    #[must_use]
    pub fn name(&self, inst: Instruction) -> &str {
        self.get(inst).map_or(UNKNOWN_NAME, |e| e.name.as_str())
    }

    #[must_use]
    pub fn op(&self, inst: Instruction) -> Option<InstOp> {
        self.get(inst).map(|e| e.op)
    }

    #[must_use]
    pub fn cost(&self, inst: Instruction) -> u32 {
        self.get(inst).map_or(0, |e| e.cost)
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<Instruction> {
        self.by_name.get(name).copied()
    }

    /// First opcode bound to `op`.
    #[must_use]
    pub fn inst_for_op(&self, op: InstOp) -> Option<Instruction> {
        self.entries
            .iter()
            .position(|e| e.op == op)
            .map(|idx| Instruction::new(idx as u8))
    }

    /// True for label nops (`nop-A`, `nop-B`, `nop-C`).
    #[must_use]
    pub fn is_nop(&self, inst: Instruction) -> bool {
        self.nop_mod(inst).is_some()
    }

    /// Register or head index selected by a label nop.
    #[must_use]
    pub fn nop_mod(&self, inst: Instruction) -> Option<usize> {
        self.op(inst).and_then(InstOp::label_value)
    }

    /// Opcode for label value `value` (0..3).
    #[must_use]
    pub fn nop_for(&self, value: usize) -> Option<Instruction> {
        let op = match value {
            0 => InstOp::NopA,
            1 => InstOp::NopB,
            2 => InstOp::NopC,
            _ => return None,
        };
        self.inst_for_op(op)
    }

    /// Draws an opcode with probability proportional to its redundancy.
    pub fn random_inst<R: Rng + ?Sized>(&self, rng: &mut R) -> Instruction {
        let draw = rng.gen_range(0..self.total_redundancy);
        self.pick(draw, None)
    }

    /// Draws an opcode other than `current`, weighted by redundancy. Returns
    /// `current` when no alternative has positive weight.
    pub fn random_inst_excluding<R: Rng + ?Sized>(
        &self,
        current: Instruction,
        rng: &mut R,
    ) -> Instruction {
        let excluded = self.get(current).map_or(0, |e| u64::from(e.redundancy));
        let total = self.total_redundancy - excluded;
        if total == 0 {
            return current;
        }
        let draw = rng.gen_range(0..total);
        self.pick(draw, Some(current))
    }

    fn pick(&self, mut draw: u64, skip: Option<Instruction>) -> Instruction {
        for (idx, entry) in self.entries.iter().enumerate() {
            if skip.is_some_and(|s| s.index() == idx) {
                continue;
            }
            let weight = u64::from(entry.redundancy);
            if draw < weight {
                return Instruction::new(idx as u8);
            }
            draw -= weight;
        }
        Instruction::new((self.entries.len() - 1) as u8)
    }
}
