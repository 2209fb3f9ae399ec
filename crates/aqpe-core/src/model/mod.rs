pub mod belief;
pub mod circuit;
pub mod evidence;

pub use belief::Belief;
pub use circuit::CircuitParameters;
pub use evidence::Evidence;
