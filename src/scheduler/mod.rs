pub mod clock;

pub use clock::{Clock, SimulatedClock, TokioClock};
