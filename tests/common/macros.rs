/// Asserts that the world holds exactly the given number of organisms.
#[macro_export]
macro_rules! assert_population {
    ($world:expr, $count:expr) => {
        assert_eq!($world.population(), $count, "Population count mismatch");
    };
}

/// Asserts that every site of a genome buffer carries exactly `$flag`.
#[macro_export]
macro_rules! assert_all_flags {
    ($buf:expr, $flag:expr) => {
        for site in 0..$buf.len() {
            assert_eq!(
                $buf.flags(site),
                $flag,
                "Site {} has flags {:?}",
                site,
                $buf.flags(site)
            );
        }
    };
}
