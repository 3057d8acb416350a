// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The device state register: what the host has told us about ourselves so
//! far.
//!
//! Every change goes through `DeviceState::apply`. On a part where the
//! dispatch loop can be preempted by the USB interrupt, callers must hold off
//! that interrupt around `apply`, so that a pending address and its commit can
//! never be observed half-done.

use crate::usb::UsbDir;

/// Coarse enumeration progress, as in USB 2.0 figure 9-1.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UsbState {
    Default,
    Address,
    Configured,
}

/// One mutation of the register.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StateUpdate {
    /// SET_ADDRESS accepted; the new address is held back until the
    /// transfer's status phase is done.
    PendingAddress(u8),
    /// The status phase finished: the pending address is now on the bus.
    CommitAddress,
    /// The transfer that asked for a new address was abandoned.
    DropPendingAddress,
    /// SET_CONFIGURATION accepted; 0 means unconfigured. Clears all halts.
    Configure(u8),
    RemoteWakeup(bool),
    Halt { endpoint: u8, halted: bool },
    BusReset,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceState {
    address: u8,
    pending_address: Option<u8>,
    configuration: u8,
    remote_wakeup: bool,
    /// Bit `n` is OUT endpoint `n`, bit `16 + n` is IN endpoint `n`.
    halted: u32,
}

impl DeviceState {
    pub const fn new() -> Self {
        Self {
            address: 0,
            pending_address: None,
            configuration: 0,
            remote_wakeup: false,
            halted: 0,
        }
    }

    /// The address the device currently answers to on the bus.
    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn pending_address(&self) -> Option<u8> {
        self.pending_address
    }

    /// Current `bConfigurationValue`, 0 when unconfigured.
    pub fn configuration(&self) -> u8 {
        self.configuration
    }

    pub fn remote_wakeup(&self) -> bool {
        self.remote_wakeup
    }

    pub fn is_halted(&self, endpoint: u8) -> bool {
        self.halted & halt_bit(endpoint) != 0
    }

    pub fn usb_state(&self) -> UsbState {
        if self.configuration != 0 {
            UsbState::Configured
        } else if self.address != 0 {
            UsbState::Address
        } else {
            UsbState::Default
        }
    }

    /// Applies `update`. Returns the address to put on the bus when the update
    /// commits one.
    pub fn apply(&mut self, update: StateUpdate) -> Option<u8> {
        match update {
            StateUpdate::PendingAddress(a) => {
                self.pending_address = Some(a);
            }
            StateUpdate::CommitAddress => {
                let a = self.pending_address.take()?;
                self.address = a;
                return Some(a);
            }
            StateUpdate::DropPendingAddress => {
                self.pending_address = None;
            }
            StateUpdate::Configure(value) => {
                self.configuration = value;
                self.halted = 0;
            }
            StateUpdate::RemoteWakeup(on) => {
                self.remote_wakeup = on;
            }
            StateUpdate::Halt { endpoint, halted } => {
                if halted {
                    self.halted |= halt_bit(endpoint);
                } else {
                    self.halted &= !halt_bit(endpoint);
                }
            }
            StateUpdate::BusReset => {
                *self = Self::new();
                return Some(0);
            }
        }
        None
    }
}

fn halt_bit(endpoint: u8) -> u32 {
    let dir = match UsbDir::of_endpoint_addr(endpoint) {
        UsbDir::Out => 0,
        UsbDir::In => 16,
    };
    1 << (u32::from(endpoint & 0x0F) + dir)
}
