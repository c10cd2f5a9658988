//! Stochastic operators that edit a genome buffer.
//!
//! Every operator takes its random source explicitly and draws nothing
//! when its rate is zero, so a run with mutations disabled consumes the
//! same random stream as one that never calls these functions. All edits go
//! through [`GenomeBuffer`] paired operations, keeping flags aligned.

use crate::inst_set::InstSet;
use rand::Rng;
use replicon_data::{GenomeBuffer, Instruction, Sequence, SiteFlags};
use serde::{Deserialize, Serialize};

/// Mutation operators. The divide-time subset can be ordered through
/// `mutation.divide_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    /// One substitution per divide with `divide_mut_prob`.
    Substitution,
    /// One insertion per divide with `divide_ins_prob`.
    Insertion,
    /// One deletion per divide with `divide_del_prob`.
    Deletion,
    /// One substitution, insertion or deletion with `divide_uniform_prob`.
    Uniform,
    Slip,
    Translocation,
    /// Per-site substitution with `divide_site_mut_prob`.
    SiteSubstitution,
    SiteInsertion,
    SiteDeletion,
    /// Per-site point mutation with `point_mut_prob`.
    Point,
    Hgt,
    /// Substitution while copying.
    Copy,
    CopyInsertion,
    CopyDeletion,
    /// Fixed-count substitution.
    Exact,
}

impl MutationKind {
    pub const DEFAULT_DIVIDE_ORDER: [MutationKind; 11] = [
        MutationKind::Substitution,
        MutationKind::Insertion,
        MutationKind::Deletion,
        MutationKind::Uniform,
        MutationKind::Slip,
        MutationKind::Translocation,
        MutationKind::SiteSubstitution,
        MutationKind::SiteInsertion,
        MutationKind::SiteDeletion,
        MutationKind::Point,
        MutationKind::Hgt,
    ];

    /// True for operators applied to the finished offspring at divide.
    #[must_use]
    pub const fn is_divide_step(self) -> bool {
        !matches!(
            self,
            MutationKind::Copy
                | MutationKind::CopyInsertion
                | MutationKind::CopyDeletion
                | MutationKind::Exact
        )
    }
}

/// What one operator did: the kind, the first touched site and the span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub site: usize,
    pub len: usize,
}

impl MutationRecord {
    #[must_use]
    pub const fn new(kind: MutationKind, site: usize, len: usize) -> Self {
        Self { kind, site, len }
    }
}

fn fires<R: Rng + ?Sized>(rate: f64, rng: &mut R) -> bool {
    rate > 0.0 && rng.gen_bool(rate.min(1.0))
}

fn flag_span(buf: &mut GenomeBuffer, start: usize, len: usize, flag: SiteFlags) {
    for site in start..start + len {
        buf.set_flag(site, flag);
    }
}

/// Replaces the instruction at `site` with `inst`, marking the site
/// `POINT_MUTATED` and `MUTATED`.
pub fn point_mutate_site(
    buf: &mut GenomeBuffer,
    site: usize,
    inst: Instruction,
    kind: MutationKind,
) -> MutationRecord {
    buf.set_inst(site, inst);
    buf.set_flag(site, SiteFlags::POINT_MUTATED | SiteFlags::MUTATED);
    MutationRecord::new(kind, site, 1)
}

/// Independently substitutes each site with probability `rate`.
pub fn point_mutations<R: Rng + ?Sized>(
    buf: &mut GenomeBuffer,
    rate: f64,
    kind: MutationKind,
    inst_set: &InstSet,
    rng: &mut R,
) -> Vec<MutationRecord> {
    if rate <= 0.0 {
        return Vec::new();
    }
    let mut records = Vec::new();
    for site in 0..buf.len() {
        if fires(rate, rng) {
            let inst = inst_set.random_inst_excluding(buf.inst(site), rng);
            records.push(point_mutate_site(buf, site, inst, kind));
        }
    }
    records
}

/// Substitutes exactly `count` distinct sites (capped at the length),
/// drawn without replacement.
pub fn exact_point_mutations<R: Rng + ?Sized>(
    buf: &mut GenomeBuffer,
    count: usize,
    inst_set: &InstSet,
    rng: &mut R,
) -> Vec<MutationRecord> {
    let count = count.min(buf.len());
    if count == 0 {
        return Vec::new();
    }
    let mut sites = rand::seq::index::sample(rng, buf.len(), count).into_vec();
    sites.sort_unstable();
    sites
        .into_iter()
        .map(|site| {
            let inst = inst_set.random_inst_excluding(buf.inst(site), rng);
            point_mutate_site(buf, site, inst, MutationKind::Exact)
        })
        .collect()
}

/// Replacement for an instruction being copied, if a copy error fires.
pub fn copy_mutation<R: Rng + ?Sized>(
    inst: Instruction,
    rate: f64,
    inst_set: &InstSet,
    rng: &mut R,
) -> Option<Instruction> {
    fires(rate, rng).then(|| inst_set.random_inst_excluding(inst, rng))
}

/// Inserts a random instruction at a random position (`0..=len`).
pub fn insertion_mutation<R: Rng + ?Sized>(
    buf: &mut GenomeBuffer,
    kind: MutationKind,
    inst_set: &InstSet,
    rng: &mut R,
) -> MutationRecord {
    let site = rng.gen_range(0..=buf.len());
    let inst = inst_set.random_inst(rng);
    insert_at(buf, site, inst, kind)
}

/// Inserts `inst` at `site`, flagged `MUTATED`.
pub fn insert_at(
    buf: &mut GenomeBuffer,
    site: usize,
    inst: Instruction,
    kind: MutationKind,
) -> MutationRecord {
    buf.insert(site, inst);
    buf.set_flag(site, SiteFlags::MUTATED);
    MutationRecord::new(kind, site, 1)
}

/// Deletes a random site. Genomes of length one or less are left alone.
pub fn deletion_mutation<R: Rng + ?Sized>(
    buf: &mut GenomeBuffer,
    kind: MutationKind,
    rng: &mut R,
) -> Option<MutationRecord> {
    if buf.len() <= 1 {
        return None;
    }
    let site = rng.gen_range(0..buf.len());
    buf.remove(site, 1);
    Some(MutationRecord::new(kind, site, 1))
}

/// Per-site insertions: each original site contributes one insertion with
/// probability `rate`.
pub fn site_insertions<R: Rng + ?Sized>(
    buf: &mut GenomeBuffer,
    rate: f64,
    inst_set: &InstSet,
    rng: &mut R,
) -> Vec<MutationRecord> {
    if rate <= 0.0 {
        return Vec::new();
    }
    let hits = (0..buf.len()).filter(|_| fires(rate, rng)).count();
    (0..hits)
        .map(|_| insertion_mutation(buf, MutationKind::SiteInsertion, inst_set, rng))
        .collect()
}

/// Per-site deletions: each original site contributes one deletion with
/// probability `rate`, stopping at a single remaining site.
pub fn site_deletions<R: Rng + ?Sized>(
    buf: &mut GenomeBuffer,
    rate: f64,
    rng: &mut R,
) -> Vec<MutationRecord> {
    if rate <= 0.0 {
        return Vec::new();
    }
    let hits = (0..buf.len()).filter(|_| fires(rate, rng)).count();
    (0..hits)
        .map_while(|_| deletion_mutation(buf, MutationKind::SiteDeletion, rng))
        .collect()
}

/// One substitution, insertion or deletion, chosen in proportion to the
/// number of ways each can happen (`len` substitutions, `len` deletions,
/// one insertion).
pub fn uniform_mutation<R: Rng + ?Sized>(
    buf: &mut GenomeBuffer,
    inst_set: &InstSet,
    rng: &mut R,
) -> Option<MutationRecord> {
    let len = buf.len();
    let draw = rng.gen_range(0..=2 * len);
    if draw < len {
        let inst = inst_set.random_inst_excluding(buf.inst(draw), rng);
        Some(point_mutate_site(buf, draw, inst, MutationKind::Uniform))
    } else if draw < 2 * len {
        if len <= 1 {
            return None;
        }
        buf.remove(draw - len, 1);
        Some(MutationRecord::new(MutationKind::Uniform, draw - len, 1))
    } else {
        Some(insertion_mutation(buf, MutationKind::Uniform, inst_set, rng))
    }
}

/// Picks a split point in `1..len`; with `p_dup` appends a copy of the
/// tail, with `p_del` removes the tail, otherwise does nothing.
pub fn slip_mutation<R: Rng + ?Sized>(
    buf: &mut GenomeBuffer,
    p_dup: f64,
    p_del: f64,
    rng: &mut R,
) -> Option<MutationRecord> {
    let len = buf.len();
    if len < 2 {
        return None;
    }
    let split = rng.gen_range(1..len);
    let tail = len - split;
    let u: f64 = rng.gen();

    if u < p_dup {
        let segment = buf.sequence().slice(split..len);
        buf.insert_seq(len, &segment);
        flag_span(buf, len, tail, SiteFlags::MUTATED);
        Some(MutationRecord::new(MutationKind::Slip, len, tail))
    } else if u < p_dup + p_del {
        buf.remove(split, tail);
        buf.set_flag(split - 1, SiteFlags::MUTATED);
        Some(MutationRecord::new(MutationKind::Slip, split, tail))
    } else {
        None
    }
}

/// Moves a random span to a different random position. Length is
/// preserved; the source junction and the whole destination span are
/// flagged `MUTATED`.
pub fn translocation_mutation<R: Rng + ?Sized>(
    buf: &mut GenomeBuffer,
    rng: &mut R,
) -> Option<MutationRecord> {
    let len = buf.len();
    if len < 2 {
        return None;
    }
    let start = rng.gen_range(0..len);
    let max_span = (len - start).min(len - 1);
    let span = rng.gen_range(1..=max_span);

    let segment = buf.extract(start, span).into_sequence();
    buf.remove(start, span);
    let remaining = buf.len();

    let mut dest = rng.gen_range(0..=remaining);
    if dest == start {
        dest = (start + 1) % (remaining + 1);
    }

    let mut junction = start.min(remaining - 1);
    buf.insert_seq(dest, &segment);
    if dest <= junction {
        junction += span;
    }
    flag_span(buf, dest, span, SiteFlags::MUTATED);
    buf.set_flag(junction, SiteFlags::MUTATED);
    Some(MutationRecord::new(MutationKind::Translocation, dest, span))
}

/// Splices a foreign fragment in before `site`, flagged `INJECTED`.
pub fn hgt_mutation(buf: &mut GenomeBuffer, site: usize, fragment: &Sequence) -> MutationRecord {
    let site = site.min(buf.len());
    buf.insert_seq(site, fragment);
    flag_span(
        buf,
        site,
        fragment.len(),
        SiteFlags::INJECTED | SiteFlags::MUTATED,
    );
    MutationRecord::new(MutationKind::Hgt, site, fragment.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn buffer(s: &str) -> GenomeBuffer {
        GenomeBuffer::new(Sequence::from_symbols(s).unwrap())
    }

    #[test]
    fn test_forced_point_mutation() {
        let mut buf = buffer("aaaa");
        let rec = point_mutate_site(&mut buf, 2, Instruction::new(1), MutationKind::Point);
        assert_eq!(buf.sequence().to_symbols(), "aaba");
        assert_eq!(rec.site, 2);
        for site in 0..4 {
            assert_eq!(
                buf.flags(site).contains(SiteFlags::POINT_MUTATED),
                site == 2
            );
        }
    }

    #[test]
    fn test_zero_rates_draw_nothing() {
        let set = InstSet::heads_default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut reference = ChaCha8Rng::seed_from_u64(1);
        let mut buf = buffer("abcdefgh");
        assert!(point_mutations(&mut buf, 0.0, MutationKind::Point, &set, &mut rng).is_empty());
        assert!(site_insertions(&mut buf, 0.0, &set, &mut rng).is_empty());
        assert!(site_deletions(&mut buf, 0.0, &mut rng).is_empty());
        assert!(copy_mutation(Instruction::new(0), 0.0, &set, &mut rng).is_none());
        assert_eq!(rng.gen::<u64>(), reference.gen::<u64>());
    }

    #[test]
    fn test_exact_mutations_hit_distinct_sites() {
        let set = InstSet::heads_default();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut buf = buffer("aaaaaaaaaaaaaaaaaaaa");
        let records = exact_point_mutations(&mut buf, 7, &set, &mut rng);
        assert_eq!(records.len(), 7);
        assert_eq!(buf.count_flag(SiteFlags::POINT_MUTATED), 7);
        let changed = buf.iter().filter(|(inst, _)| inst.op() != 0).count();
        assert_eq!(changed, 7);
    }

    #[test]
    fn test_exact_mutations_capped_at_length() {
        let set = InstSet::heads_default();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut buf = buffer("abc");
        assert_eq!(exact_point_mutations(&mut buf, 10, &set, &mut rng).len(), 3);
    }

    #[test]
    fn test_deletion_keeps_one_site() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut buf = buffer("a");
        assert!(deletion_mutation(&mut buf, MutationKind::Deletion, &mut rng).is_none());
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_slip_duplicates_tail() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut buf = buffer("abcdef");
        let rec = slip_mutation(&mut buf, 1.0, 0.0, &mut rng).unwrap();
        let symbols = buf.sequence().to_symbols();
        assert_eq!(buf.len(), 6 + rec.len);
        assert!(symbols.starts_with("abcdef"));
        assert_eq!(&symbols[6..], &"abcdef"[6 - rec.len..]);
        assert_eq!(buf.count_flag(SiteFlags::MUTATED), rec.len);
    }

    #[test]
    fn test_slip_deletes_tail() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut buf = buffer("abcdef");
        let rec = slip_mutation(&mut buf, 0.0, 1.0, &mut rng).unwrap();
        assert_eq!(buf.len(), 6 - rec.len);
        assert!(buf.flags(buf.len() - 1).contains(SiteFlags::MUTATED));
    }

    #[test]
    fn test_slip_neither() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let mut buf = buffer("abcdef");
        assert!(slip_mutation(&mut buf, 0.0, 0.0, &mut rng).is_none());
        assert_eq!(buf.sequence().to_symbols(), "abcdef");
    }

    #[test]
    fn test_translocation_preserves_content() {
        for seed in 0..50 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let mut buf = buffer("abcdefghij");
            let rec = translocation_mutation(&mut buf, &mut rng).unwrap();
            assert_eq!(buf.len(), 10);
            let mut sorted: Vec<char> = buf.sequence().to_symbols().chars().collect();
            sorted.sort_unstable();
            assert_eq!(sorted.into_iter().collect::<String>(), "abcdefghij");
            for site in rec.site..rec.site + rec.len {
                assert!(buf.flags(site).contains(SiteFlags::MUTATED));
            }
            assert!(buf.count_flag(SiteFlags::MUTATED) >= rec.len);
        }
    }

    #[test]
    fn test_hgt_flags_injected() {
        let mut buf = buffer("aaaa");
        let rec = hgt_mutation(&mut buf, 2, &Sequence::from_symbols("zz").unwrap());
        assert_eq!(buf.sequence().to_symbols(), "aazzaa");
        assert_eq!(rec.len, 2);
        assert!(buf.flags(2).contains(SiteFlags::INJECTED));
        assert!(buf.flags(3).contains(SiteFlags::INJECTED));
        assert_eq!(buf.count_flag(SiteFlags::INJECTED), 2);
    }

    #[test]
    fn test_point_mutation_rate_mean() {
        let set = InstSet::heads_default();
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let trials = 400;
        let total: usize = (0..trials)
            .map(|_| {
                let mut buf = GenomeBuffer::with_len(100);
                point_mutations(&mut buf, 0.05, MutationKind::Point, &set, &mut rng).len()
            })
            .sum();
        let mean = total as f64 / trials as f64;
        assert!((mean - 5.0).abs() < 0.5, "mean = {mean}");
    }
}
