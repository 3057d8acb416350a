// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! USB device control endpoint.
//!
//! This is the part of a USB device every device has: EP0, the control
//! endpoint, answering the host's SETUP requests well enough to get
//! enumerated. It is split into:
//!
//! - `descriptor`: the device's descriptor table, checked for consistency at
//!   compile time (or at the latest in `UsbDevice::new`).
//! - `server`: GET_DESCRIPTOR lookups.
//! - `standard`: the standard requests of USB 2.0 chapter 9.
//! - `control`: the SETUP / DATA / STATUS state machine.
//! - `device`: the loop that feeds hardware events to the state machine.
//!
//! Hardware lives behind the `Ep0Bus` trait, and requests that aren't
//! standard go to a `VendorHandler`. No allocation happens anywhere; the
//! largest buffer is `descriptor::DESCRIPTOR_CAPACITY` bytes, owned by the
//! control pipe.

#![cfg_attr(not(test), no_std)]

pub mod bus;
pub mod control;
pub mod descriptor;
pub mod device;
pub mod server;
pub mod setup;
pub mod standard;
pub mod state;
pub mod usb;
pub mod vendor;

pub use bus::Ep0Bus;
pub use control::{ControlPipe, Phase};
pub use descriptor::{ConfigError, DescriptorSet, NotFound};
pub use device::{Options, UsbDevice};
pub use setup::SetupRequest;
pub use state::{DeviceState, UsbState};
pub use vendor::{Decline, UnhandledPolicy, VendorHandler, VendorResponse};
