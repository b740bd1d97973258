//! # Association Status
//!
//! Network join state reported by the radio in response to the `AI` AT command.

use std::fmt;

/// Association indication of the local radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationStatus {
    /// Successfully formed or joined a network
    Joined,
    NoPansFound,
    NoValidPans,
    JoiningNotAllowed,
    NoJoinableBeacons,
    UnexpectedState,
    JoinFailed,
    CoordinatorStartFailed,
    CheckingForCoordinator,
    LeaveFailed,
    DeviceDidNotRespond,
    KeyReceivedUnsecured,
    KeyNotReceived,
    WrongPreconfiguredKey,
    /// Scanning for a network (routers and end devices)
    Scanning,
    Unknown(u8),
}

impl From<u8> for AssociationStatus {
    fn from(code: u8) -> Self {
        match code {
            0x00 => AssociationStatus::Joined,
            0x21 => AssociationStatus::NoPansFound,
            0x22 => AssociationStatus::NoValidPans,
            0x23 => AssociationStatus::JoiningNotAllowed,
            0x24 => AssociationStatus::NoJoinableBeacons,
            0x25 => AssociationStatus::UnexpectedState,
            0x27 => AssociationStatus::JoinFailed,
            0x2A => AssociationStatus::CoordinatorStartFailed,
            0x2B => AssociationStatus::CheckingForCoordinator,
            0x2C => AssociationStatus::LeaveFailed,
            0xAB => AssociationStatus::DeviceDidNotRespond,
            0xAC => AssociationStatus::KeyReceivedUnsecured,
            0xAD => AssociationStatus::KeyNotReceived,
            0xAF => AssociationStatus::WrongPreconfiguredKey,
            0xFF => AssociationStatus::Scanning,
            other => AssociationStatus::Unknown(other),
        }
    }
}

impl AssociationStatus {
    pub fn is_joined(self) -> bool {
        self == AssociationStatus::Joined
    }

    /// Human readable description
    pub fn description(self) -> &'static str {
        match self {
            AssociationStatus::Joined => "Successfully formed or joined a network",
            AssociationStatus::NoPansFound => "Scan found no PANs",
            AssociationStatus::NoValidPans => {
                "Scan found no valid PANs based on current SC and ID settings"
            }
            AssociationStatus::JoiningNotAllowed => {
                "Valid coordinator or routers found, but they are not allowing joining"
            }
            AssociationStatus::NoJoinableBeacons => "No joinable beacons were found",
            AssociationStatus::UnexpectedState => {
                "Unexpected state, node should not be attempting to join at this time"
            }
            AssociationStatus::JoinFailed => "Node joining attempt failed",
            AssociationStatus::CoordinatorStartFailed => "Coordinator start attempt failed",
            AssociationStatus::CheckingForCoordinator => "Checking for an existing coordinator",
            AssociationStatus::LeaveFailed => "Attempt to leave the network failed",
            AssociationStatus::DeviceDidNotRespond => {
                "Attempted to join a device that did not respond"
            }
            AssociationStatus::KeyReceivedUnsecured => {
                "Secure join error: network security key received unsecured"
            }
            AssociationStatus::KeyNotReceived => {
                "Secure join error: network security key not received"
            }
            AssociationStatus::WrongPreconfiguredKey => {
                "Secure join error: joining device does not have the right preconfigured link key"
            }
            AssociationStatus::Scanning => "Scanning for a network",
            AssociationStatus::Unknown(_) => "Undefined status",
        }
    }
}

impl fmt::Display for AssociationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssociationStatus::Unknown(code) => write!(f, "Undefined status 0x{:02X}", code),
            other => f.write_str(other.description()),
        }
    }
}
