use super::instruction::Instruction;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// An ordered, editable list of instructions.
///
/// Capacity policy: a sequence may carry a *reserve*. Storage for at least
/// `reserve` sites is allocated up front and never released by truncation or
/// [`Sequence::shrink_to_fit`], so site indices stay stable without
/// reallocation until the sequence grows past its reserve.
///
/// Serialized (serde) as its symbol string; the reserve is a runtime policy
/// and is not persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Archive, RkyvSerialize, RkyvDeserialize)]
#[serde(into = "String", try_from = "String")]
#[archive(check_bytes)]
pub struct Sequence {
    insts: Vec<Instruction>,
    reserve: usize,
}

impl Sequence {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty sequence whose capacity never drops below `reserve`.
    #[must_use]
    pub fn with_reserve(reserve: usize) -> Self {
        Self {
            insts: Vec::with_capacity(reserve),
            reserve,
        }
    }

    #[must_use]
    pub fn from_insts(insts: Vec<Instruction>) -> Self {
        Self { insts, reserve: 0 }
    }

    /// Parses the compact symbol form produced by [`Sequence::to_symbols`].
    pub fn from_symbols(symbols: &str) -> anyhow::Result<Self> {
        let insts = symbols
            .trim()
            .chars()
            .enumerate()
            .map(|(i, c)| {
                Instruction::from_symbol(c)
                    .ok_or_else(|| anyhow::anyhow!("Invalid instruction symbol {:?} at {}", c, i))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self::from_insts(insts))
    }

    #[must_use]
    pub fn to_symbols(&self) -> String {
        self.insts.iter().map(|inst| inst.symbol()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.insts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    #[must_use]
    pub fn reserve(&self) -> usize {
        self.reserve
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.insts.capacity()
    }

    /// Changes the reserve; grows the allocation if needed.
    pub fn set_reserve(&mut self, reserve: usize) {
        self.reserve = reserve;
        if self.insts.capacity() < reserve {
            self.insts.reserve(reserve.saturating_sub(self.insts.len()));
        }
    }

    /// Releases spare capacity beyond the larger of the length and the reserve.
    pub fn shrink_to_fit(&mut self) {
        self.insts.shrink_to(self.reserve.max(self.insts.len()));
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Instruction] {
        &self.insts
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.insts.iter()
    }

    /// Instruction at `pos`.
    ///
    /// # Panics
    /// Panics when `pos` is out of range; callers own index validity.
    #[must_use]
    pub fn get(&self, pos: usize) -> Instruction {
        self.check_index(pos);
        self.insts[pos]
    }

    pub fn set(&mut self, pos: usize, inst: Instruction) {
        self.check_index(pos);
        self.insts[pos] = inst;
    }

    pub fn push(&mut self, inst: Instruction) {
        self.insts.push(inst);
    }

    /// Inserts before `pos`; `pos == len` appends.
    pub fn insert(&mut self, pos: usize, inst: Instruction) {
        self.check_insert_pos(pos);
        self.insts.insert(pos, inst);
    }

    pub fn insert_seq(&mut self, pos: usize, seq: &Sequence) {
        self.check_insert_pos(pos);
        self.insts.splice(pos..pos, seq.insts.iter().copied());
    }

    /// Removes `count` sites starting at `pos`.
    pub fn remove(&mut self, pos: usize, count: usize) {
        self.check_range(pos, count);
        self.insts.drain(pos..pos + count);
    }

    /// Replaces `count` sites starting at `pos` with `seq` (lengths may differ).
    pub fn replace(&mut self, pos: usize, count: usize, seq: &Sequence) {
        self.check_range(pos, count);
        self.insts
            .splice(pos..pos + count, seq.insts.iter().copied());
    }

    /// Truncates or extends with the default instruction.
    pub fn resize(&mut self, len: usize) {
        self.insts.resize(len, Instruction::default());
    }

    /// Copy of the sites in `range`.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Sequence {
        assert!(
            range.start <= range.end && range.end <= self.len(),
            "slice {:?} out of range for sequence of length {}",
            range,
            self.len()
        );
        Self::from_insts(self.insts[range].to_vec())
    }

    fn check_index(&self, pos: usize) {
        assert!(
            pos < self.insts.len(),
            "site {} out of range for sequence of length {}",
            pos,
            self.insts.len()
        );
    }

    fn check_insert_pos(&self, pos: usize) {
        assert!(
            pos <= self.insts.len(),
            "insert position {} out of range for sequence of length {}",
            pos,
            self.insts.len()
        );
    }

    fn check_range(&self, pos: usize, count: usize) {
        assert!(
            pos.checked_add(count)
                .is_some_and(|end| end <= self.insts.len()),
            "range {}+{} out of range for sequence of length {}",
            pos,
            count,
            self.insts.len()
        );
    }
}

impl PartialEq for Sequence {
    fn eq(&self, other: &Self) -> bool {
        self.insts == other.insts
    }
}

impl Eq for Sequence {}

impl std::ops::Index<usize> for Sequence {
    type Output = Instruction;

    fn index(&self, pos: usize) -> &Instruction {
        self.check_index(pos);
        &self.insts[pos]
    }
}

impl FromIterator<Instruction> for Sequence {
    fn from_iter<T: IntoIterator<Item = Instruction>>(iter: T) -> Self {
        Self::from_insts(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Sequence {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.insts.iter()
    }
}

impl From<Vec<Instruction>> for Sequence {
    fn from(insts: Vec<Instruction>) -> Self {
        Self::from_insts(insts)
    }
}

impl From<Sequence> for String {
    fn from(seq: Sequence) -> Self {
        seq.to_symbols()
    }
}

impl TryFrom<String> for Sequence {
    type Error = anyhow::Error;

    fn try_from(symbols: String) -> anyhow::Result<Self> {
        Self::from_symbols(&symbols)
    }
}

impl FromStr for Sequence {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Self::from_symbols(s)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_symbols())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(s: &str) -> Sequence {
        Sequence::from_symbols(s).unwrap()
    }

    #[test]
    fn test_insert_remove_replace() {
        let mut s = seq("abcd");
        s.insert(2, Instruction::new(25));
        assert_eq!(s.to_symbols(), "abzcd");
        s.remove(1, 2);
        assert_eq!(s.to_symbols(), "acd");
        s.replace(0, 1, &seq("xyz"));
        assert_eq!(s.to_symbols(), "xyzcd");
        s.insert_seq(5, &seq("qq"));
        assert_eq!(s.to_symbols(), "xyzcdqq");
    }

    #[test]
    fn test_resize_zero_extends() {
        let mut s = seq("bc");
        s.resize(4);
        assert_eq!(s.to_symbols(), "bcaa");
        s.resize(1);
        assert_eq!(s.to_symbols(), "b");
    }

    #[test]
    fn test_reserve_is_kept_on_shrink() {
        let mut s = Sequence::with_reserve(64);
        for _ in 0..10 {
            s.push(Instruction::new(1));
        }
        s.resize(2);
        s.shrink_to_fit();
        assert!(s.capacity() >= 64);
        assert_eq!(s.len(), 2);

        s.set_reserve(128);
        s.shrink_to_fit();
        assert!(s.capacity() >= 128);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_get_panics() {
        let s = seq("ab");
        let _ = s.get(2);
    }

    #[test]
    fn test_invalid_symbol_rejected() {
        assert!(Sequence::from_symbols("ab?c").is_err());
    }

    #[test]
    fn test_serde_uses_symbol_string() {
        let s = seq("hello");
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, "\"hello\"");
        let back: Sequence = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
