mod common;

use common::{ancestor, heads_set, quiet_config, run_alone};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use replicon_core::hardware::SPACE_OFFSPRING;
use replicon_core::head::HEAD_WRITE;
use replicon_core::{ExecContext, NullInterface, Organism, StepOutcome};
use replicon_lib::model::genome::{Sequence, SiteFlags};

#[test]
fn test_zero_cost_program_wraps_ip() {
    let config = quiet_config();
    let genome = Sequence::from_symbols("abc").unwrap();
    let mut org = Organism::new(0, genome, heads_set(), &config, 0, 0);
    let (steps, offspring) = run_alone(&mut org, &config, 0, 3);
    assert_eq!(steps, 3);
    assert!(offspring.is_empty());
    assert_eq!(org.hardware.ip().position(), 0);
}

#[test]
fn test_ancestor_copies_exactly_without_mutation() {
    let config = quiet_config();
    let parent = ancestor();
    let mut org = Organism::new(0, parent.clone(), heads_set(), &config, 0, 0);
    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let mut iface = NullInterface::default();

    let mut divided = false;
    for _ in 0..2_000 {
        let outcome = {
            let mut ctx = ExecContext::new(&config, &mut rng, &mut iface);
            org.process(&mut ctx)
        };
        if outcome == StepOutcome::Divided {
            divided = true;
            break;
        }
        if org.hardware.mal_active() {
            let write = org.hardware.thread().heads[HEAD_WRITE];
            if write.space() == SPACE_OFFSPRING {
                let child = org.hardware.offspring();
                for site in 0..write.position() {
                    assert_eq!(child.flags(site), SiteFlags::COPIED, "site {site}");
                }
            }
        }
    }

    assert!(divided, "ancestor never divided");
    assert_eq!(iface.offspring, vec![parent.clone()]);
    assert!(org.is_alive());
    assert_eq!(org.genome(), &parent);
    assert_eq!(org.phenotype().num_divides, 1);
    assert_eq!(org.phenotype().copied_size, parent.len());
}

#[test]
fn test_gestation_is_repeatable() {
    let config = quiet_config();
    let mut first = Organism::new(0, ancestor(), heads_set(), &config, 0, 0);
    let mut second = Organism::new(0, ancestor(), heads_set(), &config, 0, 0);
    let (a, _) = run_alone(&mut first, &config, 1, 5_000);
    let (b, _) = run_alone(&mut second, &config, 2, 5_000);
    assert_eq!(a, b);
    assert_eq!(first.phenotype().gestation_time, second.phenotype().gestation_time);
}

#[test]
fn test_split_restarts_parent() {
    let config = quiet_config();
    let mut org = Organism::new(0, ancestor(), heads_set(), &config, 0, 0);
    let (_, offspring) = run_alone(&mut org, &config, 0, 5_000);
    assert_eq!(offspring.len(), 1);
    assert_eq!(org.hardware.ip().position(), 0);
    assert!(!org.hardware.mal_active());

    let (_, again) = run_alone(&mut org, &config, 0, 5_000);
    assert_eq!(again, offspring);
    assert_eq!(org.phenotype().num_divides, 2);
}
