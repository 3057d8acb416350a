// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Hook for class and vendor requests.

use crate::setup::SetupRequest;

/// What a `VendorHandler` makes of a request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VendorResponse {
    /// IN request: the first `n` bytes of the buffer are the reply.
    In(usize),
    /// OUT request: the data phase (if any) is wanted, and will be delivered
    /// through `VendorHandler::control_out`. For requests without data this
    /// simply acknowledges them.
    Accept,
    /// Not ours.
    Decline,
}

/// Called with every request the standard request handler doesn't recognise.
pub trait VendorHandler {
    /// `buf` is where an IN reply goes; its length is the most the
    /// transfer can carry.
    fn control(&mut self, request: &SetupRequest, buf: &mut [u8]) -> VendorResponse;

    /// Receives the complete data phase of an accepted OUT request. Returning
    /// `false` stalls the status phase.
    fn control_out(&mut self, _request: &SetupRequest, _data: &[u8]) -> bool {
        true
    }
}

/// A handler that declines everything.
#[derive(Copy, Clone, Debug, Default)]
pub struct Decline;

impl VendorHandler for Decline {
    fn control(&mut self, _request: &SetupRequest, _buf: &mut [u8]) -> VendorResponse {
        VendorResponse::Decline
    }
}

/// What to do with a request nobody handles.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum UnhandledPolicy {
    /// Stall EP0; the host sees a request error straight away.
    #[default]
    Stall,
    /// Leave EP0 NAKing. The host keeps retrying until its own timeout,
    /// or until it sends another SETUP.
    Nak,
}
