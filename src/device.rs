// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The dispatch loop.

use log::{error, info};

use crate::bus::Ep0Bus;
use crate::control::ControlPipe;
use crate::descriptor::{ConfigError, DescriptorSet};
use crate::vendor::{UnhandledPolicy, VendorHandler};

/// Largest EP0 packet any device can have.
const MAX_PACKET_SIZE0: usize = 64;

/// Runtime knobs.
#[derive(Copy, Clone, Debug, Default)]
pub struct Options {
    pub unhandled: UnhandledPolicy,
}

/// A USB device: the bus, and the control pipe answering the host through
/// it.
pub struct UsbDevice<B, V> {
    bus: B,
    pipe: ControlPipe<V>,
    scratch: [u8; MAX_PACKET_SIZE0],
}

impl<B: Ep0Bus, V: VendorHandler> UsbDevice<B, V> {
    /// Checks `descriptors` and sets up the device. On error the device must
    /// not be presented to the host at all.
    pub fn new(
        bus: B,
        descriptors: &'static DescriptorSet,
        vendor: V,
        options: Options,
    ) -> Result<Self, ConfigError> {
        if let Err(e) = descriptors.validate() {
            error!("refusing to enumerate: {}", e);
            return Err(e);
        }
        info!(
            "USB device {:04x}:{:04x} ready",
            descriptors.device.vendor, descriptors.device.product
        );
        Ok(Self {
            bus,
            pipe: ControlPipe::new(descriptors, vendor, options.unhandled),
            scratch: [0; MAX_PACKET_SIZE0],
        })
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn pipe(&self) -> &ControlPipe<V> {
        &self.pipe
    }

    /// Services whatever the hardware has latched: at most one bus reset,
    /// one SETUP or one IN completion plus one OUT packet. Returns whether
    /// anything happened.
    pub fn poll(&mut self) -> bool {
        let mut busy = false;

        if self.bus.take_bus_reset() {
            self.pipe.bus_reset(&mut self.bus);
            busy = true;
        }

        if self.bus.setup_pending() {
            let raw = self.bus.read_setup();
            // Anything latched next to a new SETUP belongs to the transfer it
            // replaces.
            let _ = self.bus.take_in_complete();
            let _ = self.bus.take_out(&mut self.scratch);
            self.pipe.setup(&mut self.bus, &raw);
            // Acknowledge only once the packet has been dispatched.
            self.bus.clear_setup_pending();
            return true;
        }

        if self.bus.take_in_complete() {
            self.pipe.in_complete(&mut self.bus);
            busy = true;
        }
        if let Some(len) = self.bus.take_out(&mut self.scratch) {
            let len = len.min(MAX_PACKET_SIZE0);
            self.pipe.out_packet(&mut self.bus, &self.scratch[..len]);
            busy = true;
        }
        busy
    }

    /// Polls forever.
    pub fn run(&mut self) -> ! {
        loop {
            self.poll();
        }
    }
}
