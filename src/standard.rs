// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Standard device requests (USB 2.0 section 9.4).
//!
//! Requests are checked against the descriptor set and the device state
//! register; the register is only changed through `DeviceState::apply`.
//! Anything this module doesn't know is reported as `Reply::Unrecognized`,
//! which is the caller's cue to try the vendor handler.

use log::{debug, warn};
use num_traits::FromPrimitive;

use crate::bus::Ep0Bus;
use crate::descriptor::{is_control_endpoint, DescriptorSet};
use crate::server::serve_descriptor;
use crate::setup::SetupRequest;
use crate::state::{DeviceState, StateUpdate, UsbState};
use crate::usb::{
    UsbDir, UsbFeature, UsbRecipient, UsbSetupRequest, ATTR_REMOTE_WAKEUP, ATTR_SELF_POWERED,
};

/// Outcome of the SETUP phase.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Send the first `n` bytes of the transfer buffer.
    Data(usize),
    /// Receive `wLength` bytes into the transfer buffer.
    Receive,
    /// No data phase; go straight to the status phase.
    Status,
    Stall,
    /// Not a request this handler knows.
    Unrecognized,
}

/// Handles `req`, writing any IN data into `buf`.
pub fn handle<B: Ep0Bus>(
    req: &SetupRequest,
    descriptors: &DescriptorSet,
    state: &mut DeviceState,
    bus: &mut B,
    buf: &mut [u8],
) -> Reply {
    let Some(code) = req.standard() else {
        return Reply::Unrecognized;
    };
    let expected_dir = match code {
        UsbSetupRequest::GetStatus
        | UsbSetupRequest::GetDescriptor
        | UsbSetupRequest::GetConfiguration
        | UsbSetupRequest::GetInterface => UsbDir::In,
        UsbSetupRequest::ClearFeature
        | UsbSetupRequest::SetFeature
        | UsbSetupRequest::SetAddress
        | UsbSetupRequest::SetConfiguration
        | UsbSetupRequest::SetInterface => UsbDir::Out,
        UsbSetupRequest::SetDescriptor | UsbSetupRequest::SynchFrame => {
            return Reply::Unrecognized
        }
    };
    if req.direction != expected_dir {
        warn!("{:?} with wrong direction", code);
        return Reply::Stall;
    }
    // None of the standard OUT requests we handle has a data stage.
    if req.direction == UsbDir::Out && req.length != 0 {
        warn!("{:?} with wLength {}", code, req.length);
        return Reply::Stall;
    }
    let expected_recipient = match code {
        UsbSetupRequest::SetAddress
        | UsbSetupRequest::GetConfiguration
        | UsbSetupRequest::SetConfiguration => Some(UsbRecipient::Device),
        UsbSetupRequest::GetInterface | UsbSetupRequest::SetInterface => {
            Some(UsbRecipient::Interface)
        }
        _ => None,
    };
    if expected_recipient.is_some_and(|r| r != req.recipient) {
        warn!("{:?} to {:?}", code, req.recipient);
        return Reply::Stall;
    }

    match code {
        UsbSetupRequest::GetStatus => get_status(req, descriptors, state, buf),
        UsbSetupRequest::ClearFeature => set_feature(req, descriptors, state, bus, false),
        UsbSetupRequest::SetFeature => set_feature(req, descriptors, state, bus, true),
        UsbSetupRequest::SetAddress => {
            let address = req.value;
            if address > 127 || req.index != 0 {
                warn!("bad SetAddress {}", address);
                return Reply::Stall;
            }
            if state.usb_state() == UsbState::Configured {
                warn!("SetAddress while configured");
                return Reply::Stall;
            }
            // Goes on the bus once the status phase is through.
            state.apply(StateUpdate::PendingAddress(address as u8));
            Reply::Status
        }
        UsbSetupRequest::GetDescriptor => {
            let Some(ty) = req.descriptor_type() else {
                return Reply::Stall;
            };
            match serve_descriptor(descriptors, ty, req.descriptor_index(), req.index, req.length) {
                Ok(desc) => reply_with(buf, desc.as_bytes()),
                Err(_) => {
                    debug!("no descriptor {:?}/{}", ty, req.descriptor_index());
                    Reply::Stall
                }
            }
        }
        UsbSetupRequest::GetConfiguration => reply_with(buf, &[state.configuration()]),
        UsbSetupRequest::SetConfiguration => {
            // Upper byte is reserved.
            let Ok(value) = u8::try_from(req.value) else {
                return Reply::Stall;
            };
            if state.usb_state() == UsbState::Default {
                warn!("SetConfiguration before SetAddress");
                return Reply::Stall;
            }
            if value != 0 && descriptors.configuration_by_value(value).is_none() {
                warn!("no configuration {}", value);
                return Reply::Stall;
            }
            state.apply(StateUpdate::Configure(value));
            bus.reset_endpoints();
            debug!("configuration {}", value);
            Reply::Status
        }
        UsbSetupRequest::GetInterface => {
            if !interface_exists(req.index, descriptors, state) {
                return Reply::Stall;
            }
            // We never have alternate settings.
            reply_with(buf, &[0])
        }
        UsbSetupRequest::SetInterface => {
            if req.value != 0 || !interface_exists(req.index, descriptors, state) {
                return Reply::Stall;
            }
            Reply::Status
        }
        UsbSetupRequest::SetDescriptor | UsbSetupRequest::SynchFrame => Reply::Unrecognized,
    }
}

fn get_status(
    req: &SetupRequest,
    descriptors: &DescriptorSet,
    state: &DeviceState,
    buf: &mut [u8],
) -> Reply {
    let status: u16 = match req.recipient {
        UsbRecipient::Device => {
            let mut status = 0;
            if device_attributes(descriptors, state) & ATTR_SELF_POWERED != 0 {
                status |= 1 << 0;
            }
            if state.remote_wakeup() {
                status |= 1 << 1;
            }
            status
        }
        UsbRecipient::Interface if interface_exists(req.index, descriptors, state) => 0,
        UsbRecipient::Endpoint if endpoint_exists(req.index, descriptors, state) => {
            u16::from(state.is_halted(req.index as u8))
        }
        _ => return Reply::Stall,
    };
    reply_with(buf, &status.to_le_bytes())
}

fn set_feature<B: Ep0Bus>(
    req: &SetupRequest,
    descriptors: &DescriptorSet,
    state: &mut DeviceState,
    bus: &mut B,
    on: bool,
) -> Reply {
    match (req.recipient, UsbFeature::from_u16(req.value)) {
        (UsbRecipient::Device, Some(UsbFeature::DeviceRemoteWakeup)) => {
            if device_attributes(descriptors, state) & ATTR_REMOTE_WAKEUP == 0 {
                return Reply::Stall;
            }
            state.apply(StateUpdate::RemoteWakeup(on));
            Reply::Status
        }
        (UsbRecipient::Endpoint, Some(UsbFeature::EndpointHalt)) => {
            if !endpoint_exists(req.index, descriptors, state) {
                return Reply::Stall;
            }
            let endpoint = req.index as u8;
            if !is_control_endpoint(endpoint) {
                state.apply(StateUpdate::Halt { endpoint, halted: on });
                bus.set_halt(endpoint, on);
            }
            Reply::Status
        }
        _ => Reply::Stall,
    }
}

/// `bmAttributes` of the active configuration, or of the first one while
/// unconfigured.
fn device_attributes(descriptors: &DescriptorSet, state: &DeviceState) -> u8 {
    descriptors
        .configuration_by_value(state.configuration())
        .or_else(|| descriptors.configurations.first())
        .map_or(0, |config| config.attributes)
}

fn interface_exists(index: u16, descriptors: &DescriptorSet, state: &DeviceState) -> bool {
    state.usb_state() == UsbState::Configured
        && descriptors
            .configuration_by_value(state.configuration())
            .and_then(|config| config.interface(index))
            .is_some()
}

/// EP0 always exists; anything else only within the active configuration.
fn endpoint_exists(index: u16, descriptors: &DescriptorSet, state: &DeviceState) -> bool {
    let Ok(address) = u8::try_from(index) else {
        return false;
    };
    if is_control_endpoint(address) {
        return true;
    }
    state.usb_state() == UsbState::Configured
        && descriptors
            .configuration_by_value(state.configuration())
            .and_then(|config| config.endpoint(address))
            .is_some()
}

fn reply_with(buf: &mut [u8], data: &[u8]) -> Reply {
    match buf.get_mut(..data.len()) {
        Some(dst) => {
            dst.copy_from_slice(data);
            Reply::Data(data.len())
        }
        None => Reply::Stall,
    }
}
