use core::fmt;

use crate::error::Error;

/// Lifecycle state of an actuator. The ordering is meaningful: requests
/// guarded by "at least configured" accept every later state too.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceState {
    #[default]
    Init,
    Acquired,
    Configured,
    Streaming,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Init => f.write_str("init"),
            DeviceState::Acquired => f.write_str("acquired"),
            DeviceState::Configured => f.write_str("configured"),
            DeviceState::Streaming => f.write_str("streaming"),
        }
    }
}

/// Request categories, used for guard checks and error reporting.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RequestKind {
    Acquire,
    Configure,
    Start,
    Stop,
    ModeControl,
    TimeSync,
    Read,
    Release,
    Query,
}

impl RequestKind {
    /// Returns `true` when the request may run in `state`.
    pub const fn allowed_in(self, state: DeviceState) -> bool {
        match self {
            RequestKind::Acquire => matches!(state, DeviceState::Init),
            RequestKind::Configure => matches!(state, DeviceState::Acquired),
            RequestKind::Start => matches!(state, DeviceState::Configured),
            RequestKind::Stop => matches!(state, DeviceState::Streaming),
            RequestKind::ModeControl | RequestKind::TimeSync | RequestKind::Read => {
                matches!(state, DeviceState::Configured | DeviceState::Streaming)
            }
            RequestKind::Release => !matches!(state, DeviceState::Init),
            RequestKind::Query => true,
        }
    }

    /// Fails with [`Error::IllegalState`] unless the request may run in `state`.
    pub const fn check(self, state: DeviceState) -> Result<(), Error> {
        if self.allowed_in(state) {
            Ok(())
        } else {
            Err(Error::IllegalState {
                state,
                request: self,
            })
        }
    }

    /// Requests that tear the device down and cancel pending idle work.
    pub const fn is_teardown(self) -> bool {
        matches!(self, RequestKind::Release)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::Acquire => "acquire",
            RequestKind::Configure => "configure",
            RequestKind::Start => "start",
            RequestKind::Stop => "stop",
            RequestKind::ModeControl => "mode-control",
            RequestKind::TimeSync => "time-sync",
            RequestKind::Read => "read",
            RequestKind::Release => "release",
            RequestKind::Query => "query",
        };
        f.write_str(name)
    }
}
