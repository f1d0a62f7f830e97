pub mod command;
pub mod control_loop;
pub mod controller;
pub mod driver;
pub mod hal;
pub mod hal_sim;
pub mod parser;
mod parser_proptest;
pub mod profile;
pub mod safety;
pub mod shutdown;
pub mod strategy;
pub mod tachometer;
pub mod tags;
pub mod timebase;

pub use command::{Command, ControlCommand};
pub use control_loop::{ControllerContext, ExecutionStats, TickReport};
pub use controller::{
    ControlMode, ControllerConfig, ControllerState, Direction, MotorState, SpeedController,
    TickAction,
};
pub use driver::MotorDriver;
pub use hal::{EdgeHandler, HalError, Level, MotorIO, Pin, PinMap};
pub use hal_sim::{PlantModel, SimulatedRig};
pub use parser::{CommandParser, ParserState};
pub use profile::{ControlProfile, ProfileError};
pub use safety::{PowerClamp, Ramp, SafetyLimits, Setpoint, Unvalidated, Validated};
pub use shutdown::ShutdownReason;
pub use strategy::{Correction, CorrectionStrategy};
pub use tachometer::{
    DropoutPolicy, PulseCounter, ReadingVerdict, Tachometer, TachometerConfig, TachometerSample,
};
pub use timebase::TimeBase;
