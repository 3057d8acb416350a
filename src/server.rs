// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Answers GET_DESCRIPTOR.

use log::trace;

use crate::descriptor::{DescriptorBuf, DescriptorSet, NotFound};
use crate::usb::UsbDescType;

/// Looks up descriptor `(descriptor_type, index)` and cuts it down to the
/// `requested_length` bytes the host is willing to take.
///
/// Only device, configuration and string descriptors can be asked for
/// directly. This is a full-speed-only device, so device qualifier and
/// other-speed requests are `NotFound` too.
pub fn serve_descriptor(
    descriptors: &DescriptorSet,
    descriptor_type: UsbDescType,
    index: u8,
    language_id: u16,
    requested_length: u16,
) -> Result<DescriptorBuf, NotFound> {
    let mut buf = match descriptor_type {
        UsbDescType::Device if index == 0 => descriptors.device_descriptor()?,
        UsbDescType::Config => descriptors.configuration_descriptor(usize::from(index))?,
        UsbDescType::String => descriptors.string_descriptor(index, language_id)?,
        _ => return Err(NotFound),
    };
    trace!(
        "descriptor {:?}/{}: {} of {} bytes",
        descriptor_type,
        index,
        buf.len().min(usize::from(requested_length)),
        buf.len()
    );
    buf.truncate(usize::from(requested_length));
    Ok(buf)
}
