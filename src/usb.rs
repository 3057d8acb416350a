// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! USB structure and constant definitions.
//!
//! Everything in here is wire format: the numeric codes from chapter 9 of the
//! USB 2.0 specification, and `#[repr(C)]` records whose bytes are exactly
//! what goes out on EP0.

use byteorder::LittleEndian;
use num_derive::FromPrimitive;
use zerocopy::{AsBytes, FromBytes, Unaligned, U16};

/// USB deals in two different transfer directions, called OUT (host-to-device)
/// and IN (device-to-host). In the vast majority of cases, OUT is represented
/// by a 0 byte, and IN by an `0x80` byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum UsbDir {
    Out = 0,
    In = 0x80,
}

impl UsbDir {
    pub const fn endpoint(self, num: u8) -> u8 {
        num | self as u8
    }

    /// Direction of an endpoint address, or of a SETUP `bmRequestType`; both
    /// keep it in bit 7.
    pub const fn of_endpoint_addr(addr: u8) -> Self {
        if addr & Self::In as u8 != 0 {
            Self::In
        } else {
            Self::Out
        }
    }
}

/// Bits 6:5 of `bmRequestType`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum UsbRequestKind {
    Standard = 0,
    Class = 1,
    Vendor = 2,
    Reserved = 3,
}

/// Bits 4:0 of `bmRequestType`. Values 4 through 31 are reserved and decode
/// as `Reserved`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum UsbRecipient {
    Device = 0,
    Interface = 1,
    Endpoint = 2,
    Other = 3,
    Reserved = 4,
}

/// Layout of an 8-byte USB SETUP packet.
#[repr(C)]
#[derive(Debug, AsBytes, FromBytes, Unaligned)]
pub struct UsbSetupPacket {
    /// Direction, kind and recipient, packed; see `SetupRequest`.
    pub request_type: u8,
    /// Request. Standard setup requests are in the `UsbSetupRequest` enum.
    /// Class and vendor requests reuse the same numbers with other meanings.
    pub request: u8,
    /// A simple argument of up to 16 bits, specific to the request.
    pub value: U16<LittleEndian>,
    /// Second argument, usually an interface or endpoint number, or a
    /// language ID for string descriptors.
    pub index: U16<LittleEndian>,
    /// If data will be transferred after this request (in the direction given
    /// by `request_type`), this gives the number of bytes (OUT) or maximum
    /// number of bytes (IN).
    pub length: U16<LittleEndian>,
}

/// The standard device requests of USB 2.0 table 9-4.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum UsbSetupRequest {
    GetStatus = 0x00,
    ClearFeature = 0x01,
    SetFeature = 0x03,
    /// Notifies the device that it's being moved to a different address on the
    /// bus. Always an OUT.
    SetAddress = 0x05,
    /// Asks the device to send a certain descriptor back to the host. Always
    /// used on an IN request.
    GetDescriptor = 0x06,
    SetDescriptor = 0x07,
    GetConfiguration = 0x08,
    /// Configures a device by choosing one of the options listed in its
    /// descriptors. Always an OUT.
    SetConfiguration = 0x09,
    GetInterface = 0x0A,
    SetInterface = 0x0B,
    SynchFrame = 0x0C,
}

/// Feature selectors for `SetFeature`/`ClearFeature`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum UsbFeature {
    EndpointHalt = 0,
    DeviceRemoteWakeup = 1,
    TestMode = 2,
}

/// Types of USB descriptor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, AsBytes)]
#[repr(u8)]
pub enum UsbDescType {
    Device = 0x01,
    Config = 0x02,
    String = 0x03,
    Interface = 0x04,
    Endpoint = 0x05,
    DeviceQualifier = 0x06,
    OtherSpeedConfig = 0x07,
    InterfacePower = 0x08,
}

/// Types of transfer that can be indicated by the `attributes` field on
/// `UsbEndpointDescriptor`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive, AsBytes)]
#[repr(u8)]
pub enum UsbTransferType {
    Control = 0,
    Isochronous = 1,
    Bulk = 2,
    Interrupt = 3,
}

/// The only language this device speaks: English (United States).
pub const LANGID_EN_US: u16 = 0x0409;

/// `bmAttributes` bit 7, which must always be set.
pub const ATTR_RESERVED_1: u8 = 1 << 7;
/// `bmAttributes` bit 6: the device can power itself.
pub const ATTR_SELF_POWERED: u8 = 1 << 6;
/// `bmAttributes` bit 5: the device can signal remote wakeup.
pub const ATTR_REMOTE_WAKEUP: u8 = 1 << 5;

/// Describes a device. This is the most broad description in USB and is
/// typically the first thing the host asks for.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct UsbDeviceDescriptor {
    /// Length of this structure, must be 18.
    pub length: u8,
    /// Type of this descriptor, must be `Device`.
    pub descriptor_type: UsbDescType,
    /// Version of the device descriptor / USB protocol, in binary-coded
    /// decimal. This is `0x02_00` for USB 2.0.
    pub bcd_usb: U16<LittleEndian>,
    /// Class of device, giving a broad functional area.
    pub device_class: u8,
    /// Subclass of device, refining the class.
    pub device_subclass: u8,
    /// Protocol within the subclass.
    pub device_protocol: u8,
    /// Largest packet EP0 can move.
    pub max_packet_size0: u8,
    /// ID of product vendor.
    pub vendor: U16<LittleEndian>,
    /// ID of product.
    pub product: U16<LittleEndian>,
    /// Device version number, as BCD again.
    pub bcd_device: U16<LittleEndian>,
    /// Index of manufacturer name in string descriptor table.
    pub manufacturer_s: u8,
    /// Index of product name in string descriptor table.
    pub product_s: u8,
    /// Index of serial number in string descriptor table.
    pub serial_s: u8,
    /// Number of configurations supported by this device.
    pub num_configurations: u8,
}

/// Description of a single available device configuration.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct UsbConfigurationDescriptor {
    /// Length of this structure, must be 9.
    pub length: u8,
    /// Type of this descriptor, must be `Config`.
    pub descriptor_type: UsbDescType,
    /// Total length of all descriptors in this configuration, concatenated.
    pub total_length: U16<LittleEndian>,
    /// Number of interfaces in this configuration.
    pub num_interfaces: u8,
    /// Number to use when requesting this configuration via a
    /// `SetConfiguration` request.
    pub configuration_value: u8,
    /// Index of this configuration's name in the string descriptor table.
    pub configuration_s: u8,
    /// See the `ATTR_*` constants.
    pub attributes: u8,
    /// Maximum device power consumption in units of 2mA.
    pub max_power: u8,
}

/// Description of an interface within a configuration.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct UsbInterfaceDescriptor {
    /// Length of this structure, must be 9.
    pub length: u8,
    /// Type of this descriptor, must be `Interface`.
    pub descriptor_type: UsbDescType,
    /// ID of this interface.
    pub interface_number: u8,
    /// Always zero here; we never offer alternate settings.
    pub alternate_setting: u8,
    /// Number of endpoint descriptors in this interface.
    pub num_endpoints: u8,
    /// Interface class code, distinguishing the type of interface.
    pub interface_class: u8,
    /// Interface subclass code, refining the class of interface.
    pub interface_subclass: u8,
    /// Protocol within the interface class/subclass.
    pub interface_protocol: u8,
    /// Index of interface name within string descriptor table.
    pub interface_s: u8,
}

/// Describes an endpoint within an interface.
#[repr(C)]
#[derive(Debug, AsBytes)]
pub struct UsbEndpointDescriptor {
    /// Length of this struct, must be 7.
    pub length: u8,
    /// Type of this descriptor, must be `Endpoint`.
    pub descriptor_type: UsbDescType,
    /// Address of this endpoint, where the bottom 4 bits give the endpoint
    /// number (0..15) and the top bit distinguishes IN (1) from OUT (0).
    pub endpoint_address: u8,
    /// Endpoint attributes; the bottom 2 bits are a `UsbTransferType`.
    pub attributes: u8,
    /// Maximum packet size this endpoint can accept/produce.
    pub max_packet_size: U16<LittleEndian>,
    /// Polling interval for interrupt/isochronous endpoints.
    pub interval: u8,
}

pub const DEVICE_DESCRIPTOR_LEN: usize = core::mem::size_of::<UsbDeviceDescriptor>();
pub const CONFIG_DESCRIPTOR_LEN: usize = core::mem::size_of::<UsbConfigurationDescriptor>();
pub const INTERFACE_DESCRIPTOR_LEN: usize = core::mem::size_of::<UsbInterfaceDescriptor>();
pub const ENDPOINT_DESCRIPTOR_LEN: usize = core::mem::size_of::<UsbEndpointDescriptor>();

const _: () = assert!(core::mem::size_of::<UsbSetupPacket>() == 8);
const _: () = assert!(DEVICE_DESCRIPTOR_LEN == 18);
const _: () = assert!(CONFIG_DESCRIPTOR_LEN == 9);
const _: () = assert!(INTERFACE_DESCRIPTOR_LEN == 9);
const _: () = assert!(ENDPOINT_DESCRIPTOR_LEN == 7);
