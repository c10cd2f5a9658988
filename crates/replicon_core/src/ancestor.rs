//! Hand-written seed genomes.

use crate::inst_set::{InstOp, InstSet};
use replicon_data::{Instruction, Sequence};

/// Fewest sites [`default_ancestor`] can be built with.
pub const MIN_ANCESTOR_LEN: usize = 10;

/// The classic heads self-replicator, padded with `nop-C` to `len` sites:
///
/// ```text
/// h-alloc
/// nop-C x (len - 10)
/// h-search          flow head marks the copy loop
/// h-copy
/// if-label nop-C nop-A
/// h-divide
/// mov-head          back to the copy loop
/// nop-A nop-B       end label; nop-A also selects the IP for mov-head
/// ```
///
/// Instructions the set lacks are skipped, so a set without the heads
/// operations yields a non-replicating genome rather than an error.
#[must_use]
pub fn default_ancestor(inst_set: &InstSet, len: usize) -> Sequence {
    let filler = len.max(MIN_ANCESTOR_LEN) - MIN_ANCESTOR_LEN;
    let mut ops = vec![InstOp::HAlloc];
    ops.extend(std::iter::repeat(InstOp::NopC).take(filler));
    ops.extend([
        InstOp::HSearch,
        InstOp::HCopy,
        InstOp::IfLabel,
        InstOp::NopC,
        InstOp::NopA,
        InstOp::HDivide,
        InstOp::MovHead,
        InstOp::NopA,
        InstOp::NopB,
    ]);
    ops.into_iter()
        .filter_map(|op| inst_set.inst_for_op(op))
        .collect::<Vec<Instruction>>()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ancestor_length() {
        let set = InstSet::heads_default();
        assert_eq!(default_ancestor(&set, 50).len(), 50);
        assert_eq!(default_ancestor(&set, 3).len(), MIN_ANCESTOR_LEN);
    }

    #[test]
    fn test_ancestor_symbols() {
        let set = InstSet::heads_default();
        let genome = default_ancestor(&set, 12);
        assert_eq!(genome.to_symbols(), "wcczvfcaxgab");
    }
}
