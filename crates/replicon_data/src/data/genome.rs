use super::flags::SiteFlags;
use super::instruction::Instruction;
use super::sequence::Sequence;
use serde::{Deserialize, Serialize};

/// CPU memory: a [`Sequence`] paired site-for-site with provenance flags.
///
/// Every structural edit goes through this type so that
/// `flags.len() == sequence.len()` holds after each public call. Positions
/// are validated; an out-of-range position is a caller bug and panics.
///
/// Serializes as the bare sequence: flags are execution history and are
/// re-derived after a reload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Sequence", into = "Sequence")]
pub struct GenomeBuffer {
    seq: Sequence,
    flags: Vec<SiteFlags>,
}

impl GenomeBuffer {
    /// Wraps a sequence with all flags cleared.
    #[must_use]
    pub fn new(seq: Sequence) -> Self {
        let flags = vec![SiteFlags::EMPTY; seq.len()];
        Self { seq, flags }
    }

    /// `len` default instructions with cleared flags.
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        let mut seq = Sequence::new();
        seq.resize(len);
        Self::new(seq)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seq.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    #[must_use]
    pub fn sequence(&self) -> &Sequence {
        &self.seq
    }

    #[must_use]
    pub fn into_sequence(self) -> Sequence {
        self.seq
    }

    #[must_use]
    pub fn inst(&self, pos: usize) -> Instruction {
        self.seq.get(pos)
    }

    /// Overwrites the instruction at `pos`, leaving its flags untouched.
    pub fn set_inst(&mut self, pos: usize, inst: Instruction) {
        self.seq.set(pos, inst);
    }

    #[must_use]
    pub fn flags(&self, pos: usize) -> SiteFlags {
        self.check_index(pos);
        self.flags[pos]
    }

    pub fn set_flag(&mut self, pos: usize, flag: SiteFlags) {
        self.check_index(pos);
        self.flags[pos].insert(flag);
    }

    pub fn clear_flag(&mut self, pos: usize, flag: SiteFlags) {
        self.check_index(pos);
        self.flags[pos].remove(flag);
    }

    /// Number of sites carrying every bit of `flag`.
    #[must_use]
    pub fn count_flag(&self, flag: SiteFlags) -> usize {
        self.flags.iter().filter(|f| f.contains(flag)).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Instruction, SiteFlags)> + '_ {
        self.seq.iter().copied().zip(self.flags.iter().copied())
    }

    /// Inserts one site with cleared flags before `pos`.
    pub fn insert(&mut self, pos: usize, inst: Instruction) {
        self.seq.insert(pos, inst);
        self.flags.insert(pos, SiteFlags::EMPTY);
    }

    /// Inserts `seq` before `pos`; new sites get cleared flags.
    pub fn insert_seq(&mut self, pos: usize, seq: &Sequence) {
        self.seq.insert_seq(pos, seq);
        self.flags
            .splice(pos..pos, std::iter::repeat(SiteFlags::EMPTY).take(seq.len()));
    }

    pub fn remove(&mut self, pos: usize, count: usize) {
        self.seq.remove(pos, count);
        self.flags.drain(pos..pos + count);
    }

    /// Replaces `count` sites at `pos` with `seq`; replacement sites get
    /// cleared flags.
    pub fn replace(&mut self, pos: usize, count: usize, seq: &Sequence) {
        self.seq.replace(pos, count, seq);
        self.flags.splice(
            pos..pos + count,
            std::iter::repeat(SiteFlags::EMPTY).take(seq.len()),
        );
    }

    /// Truncates, or extends with default instructions and cleared flags.
    pub fn resize(&mut self, len: usize) {
        self.seq.resize(len);
        self.flags.resize(len, SiteFlags::EMPTY);
    }

    /// Copies site `from` onto site `to` within this buffer. The destination
    /// is a fresh copy: only its `COPIED` bit is set.
    pub fn copy(&mut self, to: usize, from: usize) {
        let inst = self.inst(from);
        self.write_copied(to, inst);
    }

    /// Writes `inst` at `pos` as a fresh copy (flags become exactly `COPIED`).
    pub fn write_copied(&mut self, pos: usize, inst: Instruction) {
        self.seq.set(pos, inst);
        self.flags[pos] = SiteFlags::COPIED;
    }

    /// Zeroes every flag; the instructions are kept.
    pub fn clear_flags(&mut self) {
        self.flags.fill(SiteFlags::EMPTY);
    }

    /// Replaces the whole content with `seq` and clears all flags.
    pub fn reset(&mut self, seq: &Sequence) {
        self.seq = seq.clone();
        self.flags.clear();
        self.flags.resize(seq.len(), SiteFlags::EMPTY);
    }

    /// Copy of `len` sites from `pos`, flags included.
    #[must_use]
    pub fn extract(&self, pos: usize, len: usize) -> GenomeBuffer {
        let seq = self.seq.slice(pos..pos + len);
        let flags = self.flags[pos..pos + len].to_vec();
        Self { seq, flags }
    }

    fn check_index(&self, pos: usize) {
        assert!(
            pos < self.flags.len(),
            "site {} out of range for genome buffer of length {}",
            pos,
            self.flags.len()
        );
    }

    #[cfg(test)]
    fn coherent(&self) -> bool {
        self.seq.len() == self.flags.len()
    }
}

impl From<Sequence> for GenomeBuffer {
    fn from(seq: Sequence) -> Self {
        Self::new(seq)
    }
}

impl From<GenomeBuffer> for Sequence {
    fn from(buf: GenomeBuffer) -> Self {
        buf.seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(s: &str) -> GenomeBuffer {
        GenomeBuffer::new(Sequence::from_symbols(s).unwrap())
    }

    #[test]
    fn test_structural_edits_keep_flags_aligned() {
        let mut buf = buffer("abcdef");
        buf.set_flag(4, SiteFlags::EXECUTED);

        buf.insert(1, Instruction::new(25));
        assert!(buf.coherent());
        assert!(buf.flags(5).contains(SiteFlags::EXECUTED));

        buf.remove(0, 2);
        assert!(buf.coherent());
        assert!(buf.flags(3).contains(SiteFlags::EXECUTED));

        buf.replace(0, 1, &Sequence::from_symbols("xyz").unwrap());
        assert!(buf.coherent());
        assert_eq!(buf.sequence().to_symbols(), "xyzcdef");
        assert!(buf.flags(5).contains(SiteFlags::EXECUTED));

        buf.resize(10);
        assert!(buf.coherent());
        assert!(buf.flags(9).is_empty());

        buf.resize(3);
        assert!(buf.coherent());
    }

    #[test]
    fn test_copy_rederives_flags() {
        let mut buf = buffer("abcd");
        buf.set_flag(2, SiteFlags::MUTATED | SiteFlags::EXECUTED);
        buf.copy(2, 0);
        assert_eq!(buf.inst(2), Instruction::new(0));
        assert_eq!(buf.flags(2), SiteFlags::COPIED);
    }

    #[test]
    fn test_clear_zeroes_flags_only() {
        let mut buf = buffer("abc");
        buf.set_flag(0, SiteFlags::BREAKPOINT);
        buf.set_flag(1, SiteFlags::BREAKPOINT | SiteFlags::EXECUTED);
        buf.clear_flag(1, SiteFlags::BREAKPOINT);
        assert_eq!(buf.flags(1), SiteFlags::EXECUTED);
        buf.clear_flags();
        assert_eq!(buf.count_flag(SiteFlags::BREAKPOINT), 0);
        assert_eq!(buf.sequence().to_symbols(), "abc");
    }

    #[test]
    fn test_extract_keeps_flags() {
        let mut buf = buffer("abcd");
        buf.set_flag(2, SiteFlags::COPIED);
        let part = buf.extract(1, 2);
        assert_eq!(part.sequence().to_symbols(), "bc");
        assert_eq!(part.flags(1), SiteFlags::COPIED);
    }

    #[test]
    fn test_serialization_drops_flags() {
        let mut buf = buffer("abc");
        buf.set_flag(1, SiteFlags::INJECTED);
        let json = serde_json::to_string(&buf).unwrap();
        let back: GenomeBuffer = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sequence(), buf.sequence());
        assert_eq!(back.count_flag(SiteFlags::INJECTED), 0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_flag_out_of_range_panics() {
        let buf = buffer("ab");
        let _ = buf.flags(5);
    }
}
