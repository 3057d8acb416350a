// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decoded SETUP packets.

use num_traits::FromPrimitive;
use zerocopy::LayoutVerified;

use crate::usb::{UsbDescType, UsbDir, UsbRecipient, UsbRequestKind, UsbSetupPacket, UsbSetupRequest};

/// A SETUP packet with `bmRequestType` unpacked. Lives for exactly one
/// control transfer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SetupRequest {
    pub direction: UsbDir,
    pub kind: UsbRequestKind,
    pub recipient: UsbRecipient,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupRequest {
    /// Decodes a raw SETUP packet. Returns `None` unless `raw` is exactly
    /// eight bytes.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let packet = LayoutVerified::<_, UsbSetupPacket>::new(raw)?.into_ref();
        let rt = packet.request_type;
        Some(Self {
            direction: UsbDir::of_endpoint_addr(rt),
            // Two bits, every value has a variant.
            kind: UsbRequestKind::from_u8((rt >> 5) & 0b11)?,
            recipient: UsbRecipient::from_u8(rt & 0b1_1111).unwrap_or(UsbRecipient::Reserved),
            request: packet.request,
            value: packet.value.get(),
            index: packet.index.get(),
            length: packet.length.get(),
        })
    }

    /// The standard request this names, if it is a standard request at all.
    pub fn standard(&self) -> Option<UsbSetupRequest> {
        if self.kind != UsbRequestKind::Standard {
            return None;
        }
        UsbSetupRequest::from_u8(self.request)
    }

    /// For `GetDescriptor`: the descriptor type, in the high byte of `value`.
    pub fn descriptor_type(&self) -> Option<UsbDescType> {
        UsbDescType::from_u16(self.value >> 8)
    }

    /// For `GetDescriptor`: the descriptor index, in the low byte of `value`.
    pub fn descriptor_index(&self) -> u8 {
        self.value as u8
    }

    /// Whether a data phase follows this SETUP.
    pub fn has_data(&self) -> bool {
        self.length != 0
    }
}
