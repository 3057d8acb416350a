// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The hardware underneath EP0.
//!
//! Implementations wrap a real USB device controller. Events are latched by
//! the hardware and consumed by the `take_*` methods, so a caller that polls
//! sees each one exactly once.

pub trait Ep0Bus {
    /// Whether a SETUP packet is waiting. Stays set until
    /// `clear_setup_pending`.
    fn setup_pending(&self) -> bool;

    /// Copies out the waiting SETUP packet.
    fn read_setup(&mut self) -> [u8; 8];

    /// Acknowledges the SETUP packet read by `read_setup`.
    fn clear_setup_pending(&mut self);

    /// Consumes the "IN packet collected by the host" event for EP0.
    fn take_in_complete(&mut self) -> bool;

    /// Consumes a received EP0 OUT packet, copying it into `buf` and
    /// returning its length.
    fn take_out(&mut self, buf: &mut [u8]) -> Option<usize>;

    /// Consumes the bus reset event.
    fn take_bus_reset(&mut self) -> bool;

    /// Queues one packet, at most `bMaxPacketSize0` long, for the host's next
    /// IN on EP0. An empty slice sends a zero-length packet.
    fn start_in(&mut self, data: &[u8]);

    /// Arms EP0 to accept the host's next OUT packet.
    fn start_out(&mut self);

    /// Answers the host's next EP0 token with STALL, in either direction,
    /// until the next SETUP.
    fn stall(&mut self);

    /// Moves the device to bus address `address`.
    fn set_address(&mut self, address: u8);

    /// Returns every endpoint other than EP0 to its idle state: data toggle
    /// back to DATA0, no halt, nothing queued.
    fn reset_endpoints(&mut self);

    /// Sets or clears the halt condition of a non-control endpoint.
    fn set_halt(&mut self, endpoint: u8, halted: bool);
}
