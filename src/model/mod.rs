pub use replicon_core::{HeadsCpu, Organism, Phenotype};
pub mod config {
    pub use replicon_core::config::*;
}
pub mod inst_set {
    pub use replicon_core::inst_set::*;
}
pub mod metrics {
    pub use replicon_core::metrics::*;
}
pub mod test_cpu {
    pub use replicon_core::test_cpu::*;
}
pub mod genome {
    pub use replicon_data::*;
}

pub mod environment;
pub mod world;
