pub mod app;
pub mod model;

pub use model::environment::LogicEnvironment;
pub use model::world::World;
