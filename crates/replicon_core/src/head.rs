//! Circular cursors into the hardware's memory spaces, and nop labels.

use crate::inst_set::InstSet;
use replicon_data::{GenomeBuffer, Instruction, SiteFlags};
use serde::{Deserialize, Serialize};

/// Head slots carried by every thread.
pub const HEAD_IP: usize = 0;
pub const HEAD_READ: usize = 1;
pub const HEAD_WRITE: usize = 2;
pub const HEAD_FLOW: usize = 3;
pub const NUM_HEADS: usize = 4;

/// A memory-space index plus a position kept in `[0, len)` of that space.
///
/// Heads do not borrow memory; every operation that reads or wraps takes the
/// memory spaces explicitly. A head whose space does not exist is a caller
/// bug and panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Head {
    space: usize,
    pos: usize,
}

fn wrap(pos: i64, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        pos.rem_euclid(len as i64) as usize
    }
}

fn buffer(memory: &[GenomeBuffer], space: usize) -> &GenomeBuffer {
    memory.get(space).unwrap_or_else(|| {
        panic!(
            "head references memory space {} but only {} exist",
            space,
            memory.len()
        )
    })
}

fn buffer_mut(memory: &mut [GenomeBuffer], space: usize) -> &mut GenomeBuffer {
    let spaces = memory.len();
    memory.get_mut(space).unwrap_or_else(|| {
        panic!(
            "head references memory space {} but only {} exist",
            space, spaces
        )
    })
}

impl Head {
    #[must_use]
    pub const fn new(space: usize, pos: usize) -> Self {
        Self { space, pos }
    }

    #[must_use]
    pub const fn space(&self) -> usize {
        self.space
    }

    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Stores `pos` modulo the length of the current space.
    pub fn set_position(&mut self, pos: i64, memory: &[GenomeBuffer]) {
        self.pos = wrap(pos, buffer(memory, self.space).len());
    }

    /// Moves by `delta` sites, wrapping in either direction.
    pub fn advance(&mut self, delta: i64, memory: &[GenomeBuffer]) {
        self.set_position(self.pos as i64 + delta, memory);
    }

    /// Takes over the space and position of `target`.
    pub fn jump(&mut self, target: Head) {
        *self = target;
    }

    /// Re-points the head at another space, re-wrapping the position.
    pub fn set_space(&mut self, space: usize, memory: &[GenomeBuffer]) {
        self.space = space;
        self.set_position(self.pos as i64, memory);
    }

    /// True when the head sits on the last site of its space.
    #[must_use]
    pub fn at_end(&self, memory: &[GenomeBuffer]) -> bool {
        self.pos + 1 >= buffer(memory, self.space).len()
    }

    #[must_use]
    pub fn inst(&self, memory: &[GenomeBuffer]) -> Instruction {
        buffer(memory, self.space).inst(self.pos)
    }

    #[must_use]
    pub fn flags(&self, memory: &[GenomeBuffer]) -> SiteFlags {
        buffer(memory, self.space).flags(self.pos)
    }

    pub fn set_inst(&self, memory: &mut [GenomeBuffer], inst: Instruction) {
        buffer_mut(memory, self.space).set_inst(self.pos, inst);
    }

    pub fn set_flag(&self, memory: &mut [GenomeBuffer], flag: SiteFlags) {
        buffer_mut(memory, self.space).set_flag(self.pos, flag);
    }

    pub fn mark_executed(&self, memory: &mut [GenomeBuffer]) {
        self.set_flag(memory, SiteFlags::EXECUTED);
    }

    pub fn mark_copied(&self, memory: &mut [GenomeBuffer]) {
        self.set_flag(memory, SiteFlags::COPIED);
    }

    /// Circular forward scan, starting just after this head, for `label`.
    /// Returns a head on the last instruction of the first match.
    #[must_use]
    pub fn find_label(&self, label: &[Instruction], memory: &[GenomeBuffer]) -> Option<Head> {
        let buf = buffer(memory, self.space);
        let len = buf.len();
        if label.is_empty() || label.len() > len {
            return None;
        }
        (1..=len)
            .map(|offset| (self.pos + offset) % len)
            .find(|&start| {
                label
                    .iter()
                    .enumerate()
                    .all(|(i, inst)| buf.inst((start + i) % len) == *inst)
            })
            .map(|start| Head::new(self.space, (start + label.len() - 1) % len))
    }
}

/// A run of label nops, stored as their values (`nop-A` = 0 .. `nop-C` = 2).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Label {
    nops: Vec<usize>,
}

/// Size of the label alphabet.
pub const NUM_NOPS: usize = 3;

impl Label {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_values(values: &[usize]) -> Self {
        Self {
            nops: values.iter().map(|v| v % NUM_NOPS).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nops.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nops.is_empty()
    }

    pub fn clear(&mut self) {
        self.nops.clear();
    }

    /// Appends a nop value; ignored once `max_size` is reached.
    pub fn push(&mut self, value: usize, max_size: usize) {
        if self.nops.len() < max_size {
            self.nops.push(value % NUM_NOPS);
        }
    }

    #[must_use]
    pub fn values(&self) -> &[usize] {
        &self.nops
    }

    /// Each nop replaced by its successor: A->B, B->C, C->A.
    #[must_use]
    pub fn complement(&self) -> Label {
        Self {
            nops: self.nops.iter().map(|v| (v + 1) % NUM_NOPS).collect(),
        }
    }

    /// Base-3 reading of the label, first nop most significant. `None` when
    /// the value does not fit in a `usize`.
    #[must_use]
    pub fn as_int(&self) -> Option<usize> {
        self.nops
            .iter()
            .try_fold(0usize, |acc, &v| acc.checked_mul(NUM_NOPS)?.checked_add(v))
    }

    /// Opcodes of the label in `inst_set`; `None` if the set lacks a nop.
    #[must_use]
    pub fn to_insts(&self, inst_set: &InstSet) -> Option<Vec<Instruction>> {
        self.nops.iter().map(|&v| inst_set.nop_for(v)).collect()
    }

    /// Reads the label starting at `head`'s next site. Returns the label and
    /// the number of nops consumed.
    #[must_use]
    pub fn read_after(
        head: &Head,
        memory: &[GenomeBuffer],
        inst_set: &InstSet,
        max_size: usize,
    ) -> (Label, usize) {
        let mut label = Label::new();
        let mut cursor = *head;
        let len = buffer(memory, head.space()).len();
        while label.len() < max_size.min(len) {
            cursor.advance(1, memory);
            match inst_set.nop_mod(cursor.inst(memory)) {
                Some(value) => label.push(value, max_size),
                None => break,
            }
        }
        let consumed = label.len();
        (label, consumed)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for v in &self.nops {
            let c = (b'A' + *v as u8) as char;
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replicon_data::Sequence;

    fn memory(s: &str) -> Vec<GenomeBuffer> {
        vec![GenomeBuffer::new(Sequence::from_symbols(s).unwrap())]
    }

    #[test]
    fn test_advance_wraps_both_ways() {
        let mem = memory("abcde");
        let mut head = Head::new(0, 0);
        head.advance(7, &mem);
        assert_eq!(head.position(), 2);
        head.advance(-3, &mem);
        assert_eq!(head.position(), 4);
        head.advance(-10, &mem);
        assert_eq!(head.position(), 4);
    }

    #[test]
    fn test_set_space_rewraps() {
        let mut mem = memory("abcdef");
        mem.push(GenomeBuffer::new(Sequence::from_symbols("ab").unwrap()));
        let mut head = Head::new(0, 5);
        head.set_space(1, &mem);
        assert_eq!(head.space(), 1);
        assert_eq!(head.position(), 1);
    }

    #[test]
    fn test_flag_helpers_touch_one_site() {
        let mut mem = memory("abcd");
        let head = Head::new(0, 2);
        head.mark_executed(&mut mem);
        head.mark_copied(&mut mem);
        assert_eq!(mem[0].flags(2), SiteFlags::EXECUTED | SiteFlags::COPIED);
        assert_eq!(mem[0].count_flag(SiteFlags::COPIED), 1);
    }

    #[test]
    #[should_panic(expected = "memory space")]
    fn test_missing_space_panics() {
        let mem = memory("abc");
        let head = Head::new(3, 0);
        let _ = head.inst(&mem);
    }

    #[test]
    fn test_find_label_wraps() {
        // c b ... b c: searching "bc" from position 2 wraps to the end.
        let mem = memory("cbxxbc");
        let head = Head::new(0, 2);
        let label = Sequence::from_symbols("bc").unwrap();
        let found = head.find_label(label.as_slice(), &mem).unwrap();
        assert_eq!(found.position(), 5);

        let head = Head::new(0, 5);
        let found = head.find_label(&[Instruction::new(1)], &mem).unwrap();
        assert_eq!(found.position(), 1);
    }

    #[test]
    fn test_find_label_missing() {
        let mem = memory("aaaa");
        let head = Head::new(0, 0);
        assert!(head.find_label(&[Instruction::new(2)], &mem).is_none());
        assert!(head.find_label(&[], &mem).is_none());
    }

    #[test]
    fn test_long_label_has_no_int() {
        assert_eq!(Label::from_values(&[2; 45]).as_int(), None);
        assert_eq!(Label::from_values(&[0; 45]).as_int(), Some(0));
    }

    #[test]
    fn test_label_complement_and_int() {
        let label = Label::from_values(&[0, 2, 1]);
        assert_eq!(label.complement().values(), &[1, 0, 2]);
        assert_eq!(label.as_int(), Some(7));
        assert_eq!(label.to_string(), "ACB");
    }

    #[test]
    fn test_read_after_stops_at_non_nop() {
        let set = InstSet::heads_default();
        // h-search nop-A nop-C inc
        let mem = memory("zacm");
        let (label, consumed) = Label::read_after(&Head::new(0, 0), &mem, &set, 10);
        assert_eq!(label.values(), &[0, 2]);
        assert_eq!(consumed, 2);
    }
}
