use proptest::prelude::*;
use replicon_core::head::Head;
use replicon_lib::model::genome::{GenomeBuffer, Instruction, Sequence, SiteFlags};

prop_compose! {
    fn arb_sequence(max_len: usize)(
        ops in prop::collection::vec(0u8..26, 1..max_len)
    ) -> Sequence {
        Sequence::from_insts(ops.into_iter().map(Instruction::new).collect())
    }
}

prop_compose! {
    fn arb_buffer()(seq in arb_sequence(64), marks in prop::collection::vec(any::<bool>(), 64)) -> GenomeBuffer {
        let mut buf = GenomeBuffer::new(seq);
        for site in 0..buf.len() {
            if marks[site] {
                buf.set_flag(site, SiteFlags::EXECUTED);
            }
        }
        buf
    }
}

fn lengths_agree(buf: &GenomeBuffer) -> bool {
    buf.iter().count() == buf.len() && buf.sequence().len() == buf.len()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn test_flags_track_every_edit(
        mut buf in arb_buffer(),
        insert in arb_sequence(8),
        at in any::<prop::sample::Index>(),
        count in 0usize..4,
    ) {
        let pos = at.index(buf.len() + 1);
        buf.insert_seq(pos, &insert);
        prop_assert!(lengths_agree(&buf));

        buf.insert(pos, Instruction::new(3));
        prop_assert!(lengths_agree(&buf));

        let count = count.min(buf.len() - pos);
        buf.remove(pos, count);
        prop_assert!(lengths_agree(&buf));

        buf.resize(buf.len() + 2);
        prop_assert!(lengths_agree(&buf));
    }

    #[test]
    fn test_insert_then_remove_restores(
        buf in arb_buffer(),
        insert in arb_sequence(8),
        at in any::<prop::sample::Index>(),
    ) {
        let pos = at.index(buf.len() + 1);
        let mut edited = buf.clone();
        edited.insert_seq(pos, &insert);
        prop_assert_eq!(edited.len(), buf.len() + insert.len());
        edited.remove(pos, insert.len());
        prop_assert_eq!(edited, buf);
    }

    #[test]
    fn test_inserted_sites_have_no_flags(
        buf in arb_buffer(),
        insert in arb_sequence(8),
        at in any::<prop::sample::Index>(),
    ) {
        let pos = at.index(buf.len() + 1);
        let mut edited = buf.clone();
        edited.insert_seq(pos, &insert);
        for site in pos..pos + insert.len() {
            prop_assert!(edited.flags(site).is_empty());
        }
        for site in 0..pos {
            prop_assert_eq!(edited.flags(site), buf.flags(site));
        }
    }

    #[test]
    fn test_head_advance_wraps(
        len in 1usize..200,
        start in any::<prop::sample::Index>(),
        delta in -1000i64..1000,
    ) {
        let memory = vec![GenomeBuffer::with_len(len)];
        let p = start.index(len);
        let mut head = Head::new(0, p);
        head.advance(delta, &memory);
        let l = len as i64;
        let expected = (((p as i64 + delta) % l) + l) % l;
        prop_assert_eq!(head.position() as i64, expected);
        prop_assert!(head.position() < len);
    }

    #[test]
    fn test_symbols_round_trip(seq in arb_sequence(100)) {
        let text = seq.to_symbols();
        prop_assert_eq!(Sequence::from_symbols(&text).unwrap(), seq);
    }
}
