mod common;

use common::WorldBuilder;

#[test]
fn test_determinism_consistency() {
    let mut world1 = WorldBuilder::new().with_seed(12345).with_ancestor().build();
    let mut world2 = WorldBuilder::new().with_seed(12345).with_ancestor().build();

    for _ in 0..60 {
        let a = world1.update();
        let b = world2.update();
        assert_eq!(a, b, "Update summaries diverged at update {}", world1.update);
    }

    assert_eq!(world1.population(), world2.population());
    assert_eq!(world1.to_checkpoint(), world2.to_checkpoint());
    assert_eq!(world1.stats(), world2.stats());
}

#[test]
fn test_parallel_run_matches_sequential() {
    let build = |parallel: bool| {
        WorldBuilder::new()
            .with_seed(7)
            .with_config(|c| {
                c.world.parallel = parallel;
                c.mutation.copy_mut_prob = 0.02;
            })
            .with_ancestor()
            .build()
    };
    let mut seq = build(false);
    let mut par = build(true);
    for _ in 0..60 {
        seq.update();
        par.update();
    }
    assert_eq!(seq.to_checkpoint(), par.to_checkpoint());
    assert_eq!(seq.metrics.births(), par.metrics.births());
}

#[test]
fn test_deterministic_flag_fixes_unseeded_runs() {
    let build = || {
        WorldBuilder::new()
            .with_config(|c| {
                c.world.seed = None;
                c.world.deterministic = true;
            })
            .with_ancestor()
            .build()
    };
    let mut a = build();
    let mut b = build();
    for _ in 0..30 {
        a.update();
        b.update();
    }
    assert_eq!(a.to_checkpoint(), b.to_checkpoint());
}
