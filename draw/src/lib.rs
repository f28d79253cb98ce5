pub mod random;
pub mod round;

pub use random::{BoundedRandom, LocalRandom, RandomError, RandomSource, SeededRandom, DEFAULT_TIMEOUT};
pub use round::{draw, DrawError, DrawMode, DrawOutcome};
