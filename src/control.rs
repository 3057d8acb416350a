// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The control transfer state machine.
//!
//! A control transfer is a SETUP packet, an optional data phase in the
//! direction the SETUP names, and a zero-length status packet going the other
//! way:
//!
//! ```text
//! Idle -> SetupReceived -+-> StatusIn ----------------> Idle   (no data)
//!                        +-> DataIn  -> StatusOut ----> Idle   (control read)
//!                        +-> DataOut -> StatusIn -----> Idle   (control write)
//! ```
//!
//! Any phase can end in `Stalled`, which lasts until the next SETUP. A SETUP
//! is accepted in every phase: the host is allowed to give up on a transfer
//! at any point by starting another one, so whatever was in flight is simply
//! dropped.

use log::{debug, trace, warn};

use crate::bus::Ep0Bus;
use crate::descriptor::{DescriptorSet, DESCRIPTOR_CAPACITY};
use crate::setup::SetupRequest;
use crate::standard::{self, Reply};
use crate::state::{DeviceState, StateUpdate};
use crate::usb::UsbDir;
use crate::vendor::{UnhandledPolicy, VendorHandler, VendorResponse};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    SetupReceived,
    /// Sending data to the host.
    DataIn,
    /// Receiving data from the host.
    DataOut,
    /// Waiting for the host to collect our zero-length status packet.
    StatusIn,
    /// Waiting for the host's zero-length status packet.
    StatusOut,
    Stalled,
}

/// State of the one control transfer in flight.
struct Transfer {
    phase: Phase,
    request: Option<SetupRequest>,
    /// Data phase contents, in either direction.
    buf: [u8; DESCRIPTOR_CAPACITY],
    /// Bytes of `buf` that are meaningful: the reply for IN, what has
    /// arrived so far for OUT.
    len: usize,
    /// IN only: bytes of `buf` already handed to the bus.
    cursor: usize,
    /// Size of the last IN packet queued; decides whether a zero-length
    /// packet has to close the data phase.
    last_packet: usize,
}

impl Transfer {
    const fn new() -> Self {
        Self {
            phase: Phase::Idle,
            request: None,
            buf: [0; DESCRIPTOR_CAPACITY],
            len: 0,
            cursor: 0,
            last_packet: 0,
        }
    }

    fn reset(&mut self, phase: Phase, request: Option<SetupRequest>) {
        self.phase = phase;
        self.request = request;
        self.len = 0;
        self.cursor = 0;
        self.last_packet = 0;
    }
}

/// EP0 control pipe: sequences transfers and owns the device state register.
pub struct ControlPipe<V> {
    descriptors: &'static DescriptorSet,
    state: DeviceState,
    transfer: Transfer,
    vendor: V,
    unhandled: UnhandledPolicy,
}

impl<V: VendorHandler> ControlPipe<V> {
    pub fn new(descriptors: &'static DescriptorSet, vendor: V, unhandled: UnhandledPolicy) -> Self {
        Self {
            descriptors,
            state: DeviceState::new(),
            transfer: Transfer::new(),
            vendor,
            unhandled,
        }
    }

    pub fn phase(&self) -> Phase {
        self.transfer.phase
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// The request of the transfer in flight, if any.
    pub fn request(&self) -> Option<&SetupRequest> {
        self.transfer.request.as_ref()
    }

    pub fn vendor(&self) -> &V {
        &self.vendor
    }

    pub fn vendor_mut(&mut self) -> &mut V {
        &mut self.vendor
    }

    fn max_packet(&self) -> usize {
        self.descriptors.max_packet_size0()
    }

    /// Starts a new transfer, abandoning the current one whatever state it is
    /// in.
    pub fn setup<B: Ep0Bus>(&mut self, bus: &mut B, raw: &[u8]) {
        match self.transfer.phase {
            Phase::Idle | Phase::Stalled => {}
            phase => debug!("abandoning transfer in {:?}", phase),
        }
        if self.state.pending_address().is_some() {
            self.state.apply(StateUpdate::DropPendingAddress);
        }
        self.transfer.reset(Phase::SetupReceived, None);

        let Some(req) = SetupRequest::parse(raw) else {
            warn!("malformed SETUP");
            return self.stall(bus);
        };
        trace!("SETUP {:?}", req);
        self.transfer.request = Some(req);

        let reply = match standard::handle(
            &req,
            self.descriptors,
            &mut self.state,
            bus,
            &mut self.transfer.buf,
        ) {
            Reply::Unrecognized => self.ask_vendor(&req),
            reply => reply,
        };

        match reply {
            Reply::Data(len) => self.start_data_in(bus, &req, len),
            Reply::Receive => self.start_data_out(bus, &req),
            Reply::Status => self.start_status_in(bus),
            Reply::Stall => self.stall(bus),
            Reply::Unrecognized => match self.unhandled {
                UnhandledPolicy::Stall => self.stall(bus),
                UnhandledPolicy::Nak => {
                    debug!("ignoring request {:#04x}", req.request);
                    self.transfer.reset(Phase::Idle, None);
                }
            },
        }
    }

    /// The host collected the IN packet we queued last.
    pub fn in_complete<B: Ep0Bus>(&mut self, bus: &mut B) {
        match self.transfer.phase {
            Phase::DataIn => {
                if self.transfer.cursor < self.transfer.len {
                    self.send_next(bus);
                } else if self.needs_zlp() {
                    trace!("closing data phase with ZLP");
                    self.transfer.last_packet = 0;
                    bus.start_in(&[]);
                } else {
                    self.transfer.phase = Phase::StatusOut;
                    bus.start_out();
                }
            }
            Phase::StatusIn => {
                if let Some(address) = self.state.apply(StateUpdate::CommitAddress) {
                    debug!("address {}", address);
                    bus.set_address(address);
                }
                self.finish();
            }
            // Leftover from an abandoned transfer.
            phase => trace!("stray IN completion in {:?}", phase),
        }
    }

    /// The host sent us an OUT packet.
    pub fn out_packet<B: Ep0Bus>(&mut self, bus: &mut B, data: &[u8]) {
        match self.transfer.phase {
            Phase::DataOut => self.receive(bus, data),
            // A host that has read enough may end the data phase early by
            // moving on to the status phase.
            Phase::StatusOut | Phase::DataIn => {
                if data.is_empty() {
                    self.finish();
                } else {
                    warn!("{} bytes where a status packet was due", data.len());
                    self.stall(bus);
                }
            }
            phase => trace!("stray OUT packet in {:?}", phase),
        }
    }

    /// Host reset the bus: forget everything.
    pub fn bus_reset<B: Ep0Bus>(&mut self, bus: &mut B) {
        debug!("bus reset");
        self.transfer.reset(Phase::Idle, None);
        if let Some(address) = self.state.apply(StateUpdate::BusReset) {
            bus.set_address(address);
        }
        bus.reset_endpoints();
    }

    fn ask_vendor(&mut self, req: &SetupRequest) -> Reply {
        let room = usize::from(req.length).min(DESCRIPTOR_CAPACITY);
        match self.vendor.control(req, &mut self.transfer.buf[..room]) {
            VendorResponse::In(len) if req.direction == UsbDir::In && len <= room => Reply::Data(len),
            VendorResponse::Accept if req.direction == UsbDir::Out => {
                if req.has_data() {
                    Reply::Receive
                } else {
                    Reply::Status
                }
            }
            VendorResponse::Decline => Reply::Unrecognized,
            response => {
                warn!("vendor answered {:?} to {:?}", response, req.direction);
                Reply::Stall
            }
        }
    }

    fn start_data_in<B: Ep0Bus>(&mut self, bus: &mut B, req: &SetupRequest, len: usize) {
        if req.direction != UsbDir::In {
            return self.stall(bus);
        }
        if !req.has_data() {
            return self.start_status_in(bus);
        }
        // Never more than the host asked for.
        self.transfer.len = len.min(usize::from(req.length));
        self.transfer.phase = Phase::DataIn;
        self.send_next(bus);
    }

    fn start_data_out<B: Ep0Bus>(&mut self, bus: &mut B, req: &SetupRequest) {
        if req.direction != UsbDir::Out || usize::from(req.length) > DESCRIPTOR_CAPACITY {
            warn!("cannot take {} bytes", req.length);
            return self.stall(bus);
        }
        self.transfer.phase = Phase::DataOut;
        bus.start_out();
    }

    fn start_status_in<B: Ep0Bus>(&mut self, bus: &mut B) {
        self.transfer.phase = Phase::StatusIn;
        bus.start_in(&[]);
    }

    fn send_next<B: Ep0Bus>(&mut self, bus: &mut B) {
        let t = &mut self.transfer;
        let start = t.cursor;
        let end = t.len.min(start + self.descriptors.max_packet_size0());
        trace!("IN {}..{}", start, end);
        bus.start_in(&t.buf[start..end]);
        t.cursor = end;
        t.last_packet = end - start;
    }

    /// A data phase shorter than `wLength` ends with a short packet. If the
    /// last real packet was full-sized, that short packet has to be an extra
    /// empty one.
    fn needs_zlp(&self) -> bool {
        let t = &self.transfer;
        let requested = t.request.map_or(0, |req| usize::from(req.length));
        t.last_packet == self.max_packet() && t.len < requested
    }

    fn receive<B: Ep0Bus>(&mut self, bus: &mut B, data: &[u8]) {
        let Some(req) = self.transfer.request else {
            return self.stall(bus);
        };
        let expected = usize::from(req.length);
        let t = &mut self.transfer;
        let end = t.len + data.len();
        if end > expected {
            warn!("host sent {} bytes, {} expected", end, expected);
            return self.stall(bus);
        }
        t.buf[t.len..end].copy_from_slice(data);
        t.len = end;
        trace!("OUT {} of {}", end, expected);

        if end < expected && data.len() == self.max_packet() {
            bus.start_out();
            return;
        }
        if self.vendor.control_out(&req, &self.transfer.buf[..end]) {
            self.start_status_in(bus);
        } else {
            debug!("vendor refused OUT data");
            self.stall(bus);
        }
    }

    fn finish(&mut self) {
        trace!("transfer complete");
        self.transfer.reset(Phase::Idle, None);
    }

    fn stall<B: Ep0Bus>(&mut self, bus: &mut B) {
        self.transfer.phase = Phase::Stalled;
        bus.stall();
    }
}
