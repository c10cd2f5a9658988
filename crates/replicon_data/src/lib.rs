//! Plain data types shared across the Replicon workspace: instructions,
//! instruction sequences and the flagged genome buffer the CPU operates on.

pub mod data;

pub use data::flags::SiteFlags;
pub use data::genome::GenomeBuffer;
pub use data::instruction::Instruction;
pub use data::sequence::Sequence;
