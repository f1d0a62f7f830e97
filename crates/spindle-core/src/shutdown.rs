use crate::control_loop::ControllerContext;
use crate::hal::MotorIO;
use log::{info, warn};

/// Why the actuator was brought to the safe state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShutdownReason {
    Startup,
    NewConnection,
    StopCommand,
    Disconnect,
    TransportError,
    Terminate,
}

impl ShutdownReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ShutdownReason::Startup => "startup",
            ShutdownReason::NewConnection => "new_connection",
            ShutdownReason::StopCommand => "stop_command",
            ShutdownReason::Disconnect => "disconnect",
            ShutdownReason::TransportError => "transport_error",
            ShutdownReason::Terminate => "terminate",
        }
    }
}

impl<IO: MotorIO> ControllerContext<IO> {
    /// Drives every output to its safe level and zeroes control state.
    ///
    /// Safe to call repeatedly and before any client has connected. The
    /// control mode survives; everything else starts over.
    pub fn all_stop(&mut self, reason: ShutdownReason) {
        self.controller.stop(&mut self.driver);
        self.tachometer.reset();
        self.parser.reset();
        self.stats.all_stops += 1;

        match reason {
            ShutdownReason::TransportError => warn!("all stop: {}", reason.as_str()),
            _ => info!("all stop: {}", reason.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ControlMode, MotorState};
    use crate::hal::Level;
    use crate::hal_sim::{PlantModel, SimulatedRig};
    use crate::parser::ParserState;
    use crate::profile::ControlProfile;

    fn context() -> ControllerContext<SimulatedRig> {
        ControllerContext::new(
            SimulatedRig::manual(PlantModel::default()),
            &ControlProfile::default(),
        )
        .unwrap()
    }

    #[test]
    fn all_stop_clears_partial_tokens_and_filter_state() {
        let mut ctx = context();
        ctx.feed(b"csfffff");
        for _ in 0..200 {
            ctx.io_mut().step(0.01);
        }
        ctx.service_tick();
        assert!(ctx.smoothed_rpm() > 0);
        ctx.feed(b"r:12");
        assert_eq!(ctx.parser.state(), ParserState::ReadDigits);

        ctx.all_stop(ShutdownReason::Terminate);
        assert_eq!(ctx.smoothed_rpm(), 0);
        assert_eq!(ctx.parser.state(), ParserState::Normal);
        assert_eq!(ctx.tachometer.counter().pending(), 0);
    }

    #[test]
    fn repeated_all_stop_is_stable() {
        let mut ctx = context();
        ctx.feed(b"a");
        ctx.all_stop(ShutdownReason::StopCommand);
        let motor = *ctx.motor_state();
        let state = *ctx.controller_state();
        ctx.all_stop(ShutdownReason::StopCommand);
        ctx.all_stop(ShutdownReason::Disconnect);
        assert_eq!(*ctx.motor_state(), motor);
        assert_eq!(*ctx.controller_state(), state);
        assert_eq!(motor, MotorState::default());
        assert_eq!(state.mode, ControlMode::Automatic);

        let pins = *ctx.driver().pins();
        assert_eq!(ctx.io().read_digital(pins.dir_a), Level::Low);
        assert_eq!(ctx.io().read_digital(pins.dir_b), Level::Low);
        assert_eq!(ctx.io().read_digital(pins.master), Level::Low);
    }
}
