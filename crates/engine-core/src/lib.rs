pub mod constants;
pub mod driver;
pub mod duty;
pub mod envelope;
pub mod generator;
pub mod random;
pub mod simulation;
pub mod sink;
pub mod sync;
pub mod tags;
pub mod timebase;

pub use driver::{DriverConfig, DriverError, DriverStats, TickDriver, TickObserver, TickReport};
pub use duty::{DutyCycleController, DutyPhase, DutySchedule, PhaseTransition};
pub use envelope::{Envelope, EnvelopeViolation};
pub use generator::{EngineState, ReadingGenerator};
pub use random::{MidpointSource, RngSource, ScriptedSource, UniformSource};
pub use simulation::{advance, Reading, Simulation};
pub use sink::{PublishError, ReadingSink, VecSink};
pub use sync::{LatestReading, LatestReadingSink};
pub use timebase::TimeBase;
