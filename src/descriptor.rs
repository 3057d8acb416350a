// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The descriptor table.
//!
//! A `DescriptorSet` is plain `const` data: one device descriptor, the
//! configurations it owns (each owning its interfaces, each owning its
//! endpoints), and the string table. Nothing here allocates; descriptors are
//! rendered on demand into a `DescriptorBuf`, a fixed-size arena of
//! `DESCRIPTOR_CAPACITY` bytes.
//!
//! The set is checked for internal consistency by `DescriptorSet::validate`,
//! which is a `const fn`. Building the table through `DescriptorSet::checked`
//! in a `const` item turns an inconsistent table into a compile error:
//!
//! ```compile_fail
//! use usb_ep0::descriptor::{DescriptorSet, DeviceDescriptor};
//!
//! // Claims one configuration, provides none.
//! const _: DescriptorSet = DescriptorSet {
//!     device: DeviceDescriptor {
//!         bcd_usb: 0x0200,
//!         device_class: 0,
//!         device_subclass: 0,
//!         device_protocol: 0,
//!         max_packet_size0: 64,
//!         vendor: 0x1209,
//!         product: 0x0001,
//!         bcd_device: 0,
//!         manufacturer_s: 0,
//!         product_s: 0,
//!         serial_s: 0,
//!         num_configurations: 1,
//!     },
//!     configurations: &[],
//!     strings: &[],
//! }
//! .checked();
//! ```

use core::fmt;

use zerocopy::{AsBytes, U16};

use crate::usb::{
    UsbConfigurationDescriptor, UsbDescType, UsbDeviceDescriptor, UsbDir, UsbEndpointDescriptor,
    UsbInterfaceDescriptor, CONFIG_DESCRIPTOR_LEN, DEVICE_DESCRIPTOR_LEN, ENDPOINT_DESCRIPTOR_LEN,
    INTERFACE_DESCRIPTOR_LEN, LANGID_EN_US,
};

/// Size of the one buffer any descriptor, or any control data phase, is
/// rendered into.
pub const DESCRIPTOR_CAPACITY: usize = 256;

/// The string descriptor at index 0: the list of supported language IDs.
const LANGUAGE_DESCRIPTOR: [u8; 4] = [
    4,
    UsbDescType::String as u8,
    LANGID_EN_US as u8,
    (LANGID_EN_US >> 8) as u8,
];

/// Standard device descriptor, minus the `bLength`/`bDescriptorType` header.
#[derive(Copy, Clone, Debug)]
pub struct DeviceDescriptor {
    pub bcd_usb: u16,
    pub device_class: u8,
    pub device_subclass: u8,
    pub device_protocol: u8,
    /// Must be 8, 16, 32 or 64.
    pub max_packet_size0: u8,
    pub vendor: u16,
    pub product: u16,
    pub bcd_device: u16,
    pub manufacturer_s: u8,
    pub product_s: u8,
    pub serial_s: u8,
    /// Must equal the number of configurations in the set.
    pub num_configurations: u8,
}

/// A configuration and everything nested in it.
#[derive(Copy, Clone, Debug)]
pub struct ConfigurationDescriptor {
    /// Must equal the rendered size of this configuration, including every
    /// interface, class-specific and endpoint descriptor nested in it.
    pub total_length: u16,
    /// Must equal `interfaces.len()`.
    pub num_interfaces: u8,
    /// Non-zero, and unique within the set.
    pub configuration_value: u8,
    pub configuration_s: u8,
    /// See the `usb::ATTR_*` constants.
    pub attributes: u8,
    pub max_power: u8,
    pub interfaces: &'static [InterfaceDescriptor],
}

#[derive(Copy, Clone, Debug)]
pub struct InterfaceDescriptor {
    /// Must equal the interface's position in its configuration.
    pub interface_number: u8,
    /// Must equal `endpoints.len()`.
    pub num_endpoints: u8,
    pub interface_class: u8,
    pub interface_subclass: u8,
    pub interface_protocol: u8,
    pub interface_s: u8,
    /// Class-specific descriptors, emitted verbatim between the interface
    /// descriptor and its endpoints. Must be a chain of length-prefixed
    /// descriptors.
    pub extra: &'static [u8],
    pub endpoints: &'static [EndpointDescriptor],
}

#[derive(Copy, Clone, Debug)]
pub struct EndpointDescriptor {
    /// Direction bit plus endpoint number 1..=15.
    pub endpoint_address: u8,
    pub attributes: u8,
    pub max_packet_size: u16,
    pub interval: u8,
}

/// A device's complete descriptor set.
#[derive(Copy, Clone, Debug)]
pub struct DescriptorSet {
    pub device: DeviceDescriptor,
    pub configurations: &'static [ConfigurationDescriptor],
    /// String descriptor `n` (for `n >= 1`) is `strings[n - 1]`.
    pub strings: &'static [&'static str],
}

/// Ways in which a descriptor set can contradict itself.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConfigError {
    MaxPacketSize0(u8),
    NumConfigurations { declared: u8, actual: usize },
    ConfigurationValue { configuration: usize, value: u8 },
    NumInterfaces { configuration: u8, declared: u8, actual: usize },
    InterfaceNumber { configuration: u8, position: usize, declared: u8 },
    NumEndpoints { configuration: u8, interface: u8, declared: u8, actual: usize },
    EndpointAddress { configuration: u8, interface: u8, address: u8 },
    MalformedExtra { configuration: u8, interface: u8 },
    TotalLength { configuration: u8, declared: u16, actual: usize },
    TooLarge { configuration: u8, size: usize },
    StringIndex(u8),
    StringTooLong(u8),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::MaxPacketSize0(n) => write!(f, "bMaxPacketSize0 {} is not 8, 16, 32 or 64", n),
            Self::NumConfigurations { declared, actual } => write!(
                f,
                "bNumConfigurations is {} but {} configurations are present",
                declared, actual
            ),
            Self::ConfigurationValue { configuration, value } => write!(
                f,
                "configuration {} has zero or duplicate bConfigurationValue {}",
                configuration, value
            ),
            Self::NumInterfaces { configuration, declared, actual } => write!(
                f,
                "configuration {}: bNumInterfaces is {} but {} interfaces follow",
                configuration, declared, actual
            ),
            Self::InterfaceNumber { configuration, position, declared } => write!(
                f,
                "configuration {}: interface at position {} is numbered {}",
                configuration, position, declared
            ),
            Self::NumEndpoints { configuration, interface, declared, actual } => write!(
                f,
                "configuration {} interface {}: bNumEndpoints is {} but {} endpoints follow",
                configuration, interface, declared, actual
            ),
            Self::EndpointAddress { configuration, interface, address } => write!(
                f,
                "configuration {} interface {}: bad endpoint address {:#04x}",
                configuration, interface, address
            ),
            Self::MalformedExtra { configuration, interface } => write!(
                f,
                "configuration {} interface {}: class-specific descriptors are malformed",
                configuration, interface
            ),
            Self::TotalLength { configuration, declared, actual } => write!(
                f,
                "configuration {}: wTotalLength is {} but descriptors add up to {}",
                configuration, declared, actual
            ),
            Self::TooLarge { configuration, size } => write!(
                f,
                "configuration {} is {} bytes, more than the {} byte buffer",
                configuration, size, DESCRIPTOR_CAPACITY
            ),
            Self::StringIndex(i) => write!(f, "string index {} does not exist", i),
            Self::StringTooLong(i) => write!(f, "string {} does not fit in a descriptor", i),
        }
    }
}

/// The requested descriptor doesn't exist, or wouldn't fit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NotFound;

/// Fixed-capacity buffer holding one rendered descriptor.
#[derive(Clone)]
pub struct DescriptorBuf {
    bytes: [u8; DESCRIPTOR_CAPACITY],
    len: usize,
}

impl DescriptorBuf {
    pub const fn new() -> Self {
        Self {
            bytes: [0; DESCRIPTOR_CAPACITY],
            len: 0,
        }
    }

    /// Appends `data`, or fails without writing anything if it won't fit.
    pub fn push(&mut self, data: &[u8]) -> Result<(), NotFound> {
        let end = self.len + data.len();
        self.bytes.get_mut(self.len..end).ok_or(NotFound)?.copy_from_slice(data);
        self.len = end;
        Ok(())
    }

    /// Shortens the contents to at most `len` bytes.
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for DescriptorBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DescriptorBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_bytes()).finish()
    }
}

impl DeviceDescriptor {
    fn to_wire(&self) -> UsbDeviceDescriptor {
        UsbDeviceDescriptor {
            length: DEVICE_DESCRIPTOR_LEN as u8,
            descriptor_type: UsbDescType::Device,
            bcd_usb: U16::new(self.bcd_usb),
            device_class: self.device_class,
            device_subclass: self.device_subclass,
            device_protocol: self.device_protocol,
            max_packet_size0: self.max_packet_size0,
            vendor: U16::new(self.vendor),
            product: U16::new(self.product),
            bcd_device: U16::new(self.bcd_device),
            manufacturer_s: self.manufacturer_s,
            product_s: self.product_s,
            serial_s: self.serial_s,
            num_configurations: self.num_configurations,
        }
    }
}

impl ConfigurationDescriptor {
    fn to_wire(&self) -> UsbConfigurationDescriptor {
        UsbConfigurationDescriptor {
            length: CONFIG_DESCRIPTOR_LEN as u8,
            descriptor_type: UsbDescType::Config,
            total_length: U16::new(self.total_length),
            num_interfaces: self.num_interfaces,
            configuration_value: self.configuration_value,
            configuration_s: self.configuration_s,
            attributes: self.attributes,
            max_power: self.max_power,
        }
    }

    /// Number of bytes this configuration renders to, counting everything
    /// nested in it. This is what `total_length` has to say.
    pub const fn rendered_len(&self) -> usize {
        let mut len = CONFIG_DESCRIPTOR_LEN;
        let mut i = 0;
        while i < self.interfaces.len() {
            let iface = &self.interfaces[i];
            len += INTERFACE_DESCRIPTOR_LEN
                + iface.extra.len()
                + iface.endpoints.len() * ENDPOINT_DESCRIPTOR_LEN;
            i += 1;
        }
        len
    }

    pub fn interface(&self, number: u16) -> Option<&InterfaceDescriptor> {
        self.interfaces
            .iter()
            .find(|iface| u16::from(iface.interface_number) == number)
    }

    pub fn endpoint(&self, address: u8) -> Option<&EndpointDescriptor> {
        self.interfaces
            .iter()
            .flat_map(|iface| iface.endpoints.iter())
            .find(|ep| ep.endpoint_address == address)
    }
}

impl InterfaceDescriptor {
    fn to_wire(&self) -> UsbInterfaceDescriptor {
        UsbInterfaceDescriptor {
            length: INTERFACE_DESCRIPTOR_LEN as u8,
            descriptor_type: UsbDescType::Interface,
            interface_number: self.interface_number,
            alternate_setting: 0,
            num_endpoints: self.num_endpoints,
            interface_class: self.interface_class,
            interface_subclass: self.interface_subclass,
            interface_protocol: self.interface_protocol,
            interface_s: self.interface_s,
        }
    }
}

impl EndpointDescriptor {
    fn to_wire(&self) -> UsbEndpointDescriptor {
        UsbEndpointDescriptor {
            length: ENDPOINT_DESCRIPTOR_LEN as u8,
            descriptor_type: UsbDescType::Endpoint,
            endpoint_address: self.endpoint_address,
            attributes: self.attributes,
            max_packet_size: U16::new(self.max_packet_size),
            interval: self.interval,
        }
    }
}

/// Number of UTF-16 code units needed for `s`. Works on the UTF-8 bytes so
/// that it can run at compile time.
const fn utf16_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let mut units = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0xC0 != 0x80 {
            // Four-byte sequences become surrogate pairs.
            units += if b >= 0xF0 { 2 } else { 1 };
        }
        i += 1;
    }
    units
}

/// Checks that `extra` is a chain of descriptors whose `bLength` fields
/// exactly cover it.
const fn extra_is_well_formed(extra: &[u8]) -> bool {
    let mut i = 0;
    while i < extra.len() {
        let len = extra[i] as usize;
        if len < 2 || i + len > extra.len() {
            return false;
        }
        i += len;
    }
    true
}

impl DescriptorSet {
    /// Checks every cross-reference and count in the set.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        let device = &self.device;
        match device.max_packet_size0 {
            8 | 16 | 32 | 64 => {}
            n => return Err(ConfigError::MaxPacketSize0(n)),
        }
        if device.num_configurations as usize != self.configurations.len() {
            return Err(ConfigError::NumConfigurations {
                declared: device.num_configurations,
                actual: self.configurations.len(),
            });
        }
        if let Err(e) = self.check_string(device.manufacturer_s) {
            return Err(e);
        }
        if let Err(e) = self.check_string(device.product_s) {
            return Err(e);
        }
        if let Err(e) = self.check_string(device.serial_s) {
            return Err(e);
        }

        let mut c = 0;
        while c < self.configurations.len() {
            if let Err(e) = self.check_configuration(c) {
                return Err(e);
            }
            c += 1;
        }

        let mut s = 0;
        while s < self.strings.len() {
            if 2 + 2 * utf16_len(self.strings[s]) > u8::MAX as usize {
                return Err(ConfigError::StringTooLong(s as u8 + 1));
            }
            s += 1;
        }
        Ok(())
    }

    /// `validate`, but panicking; meant for `const` items, where the panic
    /// becomes a build failure.
    pub const fn checked(self) -> Self {
        if self.validate().is_err() {
            panic!("inconsistent USB descriptor set");
        }
        self
    }

    const fn check_string(&self, index: u8) -> Result<(), ConfigError> {
        if index as usize > self.strings.len() {
            Err(ConfigError::StringIndex(index))
        } else {
            Ok(())
        }
    }

    const fn check_configuration(&self, c: usize) -> Result<(), ConfigError> {
        let config = &self.configurations[c];
        let value = config.configuration_value;
        if value == 0 {
            return Err(ConfigError::ConfigurationValue { configuration: c, value });
        }
        let mut other = 0;
        while other < c {
            if self.configurations[other].configuration_value == value {
                return Err(ConfigError::ConfigurationValue { configuration: c, value });
            }
            other += 1;
        }
        if let Err(e) = self.check_string(config.configuration_s) {
            return Err(e);
        }
        if config.num_interfaces as usize != config.interfaces.len() {
            return Err(ConfigError::NumInterfaces {
                configuration: value,
                declared: config.num_interfaces,
                actual: config.interfaces.len(),
            });
        }

        let mut i = 0;
        while i < config.interfaces.len() {
            let iface = &config.interfaces[i];
            if iface.interface_number as usize != i {
                return Err(ConfigError::InterfaceNumber {
                    configuration: value,
                    position: i,
                    declared: iface.interface_number,
                });
            }
            if let Err(e) = self.check_string(iface.interface_s) {
                return Err(e);
            }
            if iface.num_endpoints as usize != iface.endpoints.len() {
                return Err(ConfigError::NumEndpoints {
                    configuration: value,
                    interface: iface.interface_number,
                    declared: iface.num_endpoints,
                    actual: iface.endpoints.len(),
                });
            }
            if !extra_is_well_formed(iface.extra) {
                return Err(ConfigError::MalformedExtra {
                    configuration: value,
                    interface: iface.interface_number,
                });
            }
            let mut e = 0;
            while e < iface.endpoints.len() {
                let address = iface.endpoints[e].endpoint_address;
                // Number 0 is the control endpoint; bits 6:4 are reserved.
                if address & 0x0F == 0 || address & 0x70 != 0 {
                    return Err(ConfigError::EndpointAddress {
                        configuration: value,
                        interface: iface.interface_number,
                        address,
                    });
                }
                e += 1;
            }
            i += 1;
        }

        let actual = config.rendered_len();
        if actual != config.total_length as usize {
            return Err(ConfigError::TotalLength {
                configuration: value,
                declared: config.total_length,
                actual,
            });
        }
        if actual > DESCRIPTOR_CAPACITY {
            return Err(ConfigError::TooLarge { configuration: value, size: actual });
        }
        Ok(())
    }

    /// Largest packet EP0 moves.
    pub fn max_packet_size0(&self) -> usize {
        usize::from(self.device.max_packet_size0)
    }

    /// Finds a configuration by `bConfigurationValue` (not by index).
    pub fn configuration_by_value(&self, value: u8) -> Option<&ConfigurationDescriptor> {
        self.configurations
            .iter()
            .find(|config| config.configuration_value == value)
    }

    pub fn device_descriptor(&self) -> Result<DescriptorBuf, NotFound> {
        let mut buf = DescriptorBuf::new();
        buf.push(self.device.to_wire().as_bytes())?;
        Ok(buf)
    }

    /// Renders configuration `index` (0-based) followed by its interfaces,
    /// their class-specific descriptors and their endpoints, in declaration
    /// order.
    pub fn configuration_descriptor(&self, index: usize) -> Result<DescriptorBuf, NotFound> {
        let config = self.configurations.get(index).ok_or(NotFound)?;
        let mut buf = DescriptorBuf::new();
        buf.push(config.to_wire().as_bytes())?;
        for iface in config.interfaces {
            buf.push(iface.to_wire().as_bytes())?;
            buf.push(iface.extra)?;
            for ep in iface.endpoints {
                buf.push(ep.to_wire().as_bytes())?;
            }
        }
        Ok(buf)
    }

    /// Renders string descriptor `index`. Index 0 is the language list and
    /// ignores `language_id`; every other index must be asked for in US
    /// English.
    pub fn string_descriptor(&self, index: u8, language_id: u16) -> Result<DescriptorBuf, NotFound> {
        let mut buf = DescriptorBuf::new();
        if index == 0 {
            buf.push(&LANGUAGE_DESCRIPTOR)?;
            return Ok(buf);
        }
        if language_id != LANGID_EN_US {
            return Err(NotFound);
        }
        let s = self.strings.get(usize::from(index) - 1).ok_or(NotFound)?;
        let len = 2 + 2 * utf16_len(s);
        let len = u8::try_from(len).map_err(|_| NotFound)?;
        buf.push(&[len, UsbDescType::String as u8])?;
        for unit in s.encode_utf16() {
            buf.push(&unit.to_le_bytes())?;
        }
        Ok(buf)
    }
}

/// Does this endpoint address name the control endpoint?
pub(crate) fn is_control_endpoint(address: u8) -> bool {
    address & !(UsbDir::In as u8) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usb::{ATTR_RESERVED_1, ATTR_SELF_POWERED};

    const DEVICE: DeviceDescriptor = DeviceDescriptor {
        bcd_usb: 0x0200,
        device_class: 0,
        device_subclass: 0,
        device_protocol: 0,
        max_packet_size0: 64,
        vendor: 0x04b4,
        product: 0x8613,
        bcd_device: 0x0000,
        manufacturer_s: 1,
        product_s: 2,
        serial_s: 0,
        num_configurations: 1,
    };

    const BULK_PAIR: [EndpointDescriptor; 2] = [
        EndpointDescriptor {
            endpoint_address: 0x01,
            attributes: 2,
            max_packet_size: 64,
            interval: 0,
        },
        EndpointDescriptor {
            endpoint_address: 0x82,
            attributes: 2,
            max_packet_size: 64,
            interval: 0,
        },
    ];

    const IFACES: [InterfaceDescriptor; 1] = [InterfaceDescriptor {
        interface_number: 0,
        num_endpoints: 2,
        interface_class: 0xFF,
        interface_subclass: 0,
        interface_protocol: 0,
        interface_s: 0,
        extra: &[5, 0x24, 0x00, 0x10, 0x01],
        endpoints: &BULK_PAIR,
    }];

    const CONFIGS: [ConfigurationDescriptor; 1] = [ConfigurationDescriptor {
        total_length: 9 + 9 + 5 + 7 + 7,
        num_interfaces: 1,
        configuration_value: 1,
        configuration_s: 0,
        attributes: ATTR_RESERVED_1 | ATTR_SELF_POWERED,
        max_power: 50,
        interfaces: &IFACES,
    }];

    const SET: DescriptorSet = DescriptorSet {
        device: DEVICE,
        configurations: &CONFIGS,
        strings: &["Antmicro", "Test"],
    }
    .checked();

    #[test]
    fn device_descriptor_bytes() {
        let buf = SET.device_descriptor().unwrap();
        assert_eq!(
            buf.as_bytes(),
            &[18, 1, 0x00, 0x02, 0, 0, 0, 64, 0xb4, 0x04, 0x13, 0x86, 0, 0, 1, 2, 0, 1]
        );
    }

    #[test]
    fn configuration_is_concatenated_in_order() {
        let buf = SET.configuration_descriptor(0).unwrap();
        assert_eq!(buf.len(), 37);
        assert_eq!(&buf.as_bytes()[..9], &[9, 2, 37, 0, 1, 1, 0, 0xC0, 50]);
        assert_eq!(&buf.as_bytes()[9..18], &[9, 4, 0, 0, 2, 0xFF, 0, 0, 0]);
        assert_eq!(&buf.as_bytes()[18..23], &[5, 0x24, 0x00, 0x10, 0x01]);
        assert_eq!(&buf.as_bytes()[23..30], &[7, 5, 0x01, 2, 64, 0, 0]);
        assert_eq!(&buf.as_bytes()[30..], &[7, 5, 0x82, 2, 64, 0, 0]);
    }

    #[test]
    fn total_length_matches_rendering() {
        for (i, config) in SET.configurations.iter().enumerate() {
            let buf = SET.configuration_descriptor(i).unwrap();
            assert_eq!(usize::from(config.total_length), buf.len());
            assert_eq!(config.rendered_len(), buf.len());
        }
    }

    #[test]
    fn missing_configuration() {
        assert_eq!(SET.configuration_descriptor(1).unwrap_err(), NotFound);
    }

    #[test]
    fn language_list() {
        let buf = SET.string_descriptor(0, 0).unwrap();
        assert_eq!(buf.as_bytes(), &[4, 3, 0x09, 0x04]);
        // Language is ignored for index 0.
        assert_eq!(SET.string_descriptor(0, 0x0407).unwrap().as_bytes(), buf.as_bytes());
    }

    #[test]
    fn strings_are_utf16() {
        let buf = SET.string_descriptor(2, LANGID_EN_US).unwrap();
        assert_eq!(buf.as_bytes(), &[10, 3, b'T', 0, b'e', 0, b's', 0, b't', 0]);
    }

    #[test]
    fn strings_need_a_supported_language() {
        assert_eq!(SET.string_descriptor(1, 0x0407).unwrap_err(), NotFound);
        assert_eq!(SET.string_descriptor(3, LANGID_EN_US).unwrap_err(), NotFound);
    }

    #[test]
    fn utf16_length_counts_surrogates() {
        assert_eq!(utf16_len("abc"), 3);
        assert_eq!(utf16_len("é"), 1);
        assert_eq!(utf16_len("€"), 1);
        assert_eq!(utf16_len("𝄞"), 2);
    }

    fn with_configs(configs: &'static [ConfigurationDescriptor]) -> DescriptorSet {
        DescriptorSet {
            device: DeviceDescriptor {
                num_configurations: configs.len() as u8,
                ..DEVICE
            },
            configurations: configs,
            strings: &["Antmicro", "Test"],
        }
    }

    #[test]
    fn rejects_configuration_count_mismatch() {
        let set = DescriptorSet {
            device: DeviceDescriptor {
                num_configurations: 2,
                ..DEVICE
            },
            ..SET
        };
        assert_eq!(
            set.validate(),
            Err(ConfigError::NumConfigurations { declared: 2, actual: 1 })
        );
    }

    #[test]
    fn rejects_dangling_string_index() {
        let set = DescriptorSet {
            device: DeviceDescriptor {
                serial_s: 3,
                ..DEVICE
            },
            ..SET
        };
        assert_eq!(set.validate(), Err(ConfigError::StringIndex(3)));
    }

    #[test]
    fn rejects_bad_packet_size() {
        let set = DescriptorSet {
            device: DeviceDescriptor {
                max_packet_size0: 12,
                ..DEVICE
            },
            ..SET
        };
        assert_eq!(set.validate(), Err(ConfigError::MaxPacketSize0(12)));
    }

    #[test]
    fn rejects_wrong_total_length() {
        static BAD: [ConfigurationDescriptor; 1] = [ConfigurationDescriptor {
            total_length: 32,
            ..CONFIGS[0]
        }];
        assert_eq!(
            with_configs(&BAD).validate(),
            Err(ConfigError::TotalLength { configuration: 1, declared: 32, actual: 37 })
        );
    }

    #[test]
    fn rejects_wrong_interface_count() {
        static BAD: [ConfigurationDescriptor; 1] = [ConfigurationDescriptor {
            num_interfaces: 2,
            ..CONFIGS[0]
        }];
        assert_eq!(
            with_configs(&BAD).validate(),
            Err(ConfigError::NumInterfaces { configuration: 1, declared: 2, actual: 1 })
        );
    }

    #[test]
    fn rejects_wrong_endpoint_count() {
        static BAD_IFACES: [InterfaceDescriptor; 1] = [InterfaceDescriptor {
            num_endpoints: 1,
            ..IFACES[0]
        }];
        static BAD: [ConfigurationDescriptor; 1] = [ConfigurationDescriptor {
            interfaces: &BAD_IFACES,
            ..CONFIGS[0]
        }];
        assert!(matches!(
            with_configs(&BAD).validate(),
            Err(ConfigError::NumEndpoints { declared: 1, actual: 2, .. })
        ));
    }

    #[test]
    fn rejects_duplicate_configuration_value() {
        static TWICE: [ConfigurationDescriptor; 2] = [CONFIGS[0], CONFIGS[0]];
        assert_eq!(
            with_configs(&TWICE).validate(),
            Err(ConfigError::ConfigurationValue { configuration: 1, value: 1 })
        );
    }

    #[test]
    fn rejects_malformed_class_descriptors() {
        static BAD_IFACES: [InterfaceDescriptor; 1] = [InterfaceDescriptor {
            extra: &[6, 0x24, 0x00, 0x10, 0x01],
            ..IFACES[0]
        }];
        static BAD: [ConfigurationDescriptor; 1] = [ConfigurationDescriptor {
            interfaces: &BAD_IFACES,
            ..CONFIGS[0]
        }];
        assert_eq!(
            with_configs(&BAD).validate(),
            Err(ConfigError::MalformedExtra { configuration: 1, interface: 0 })
        );
    }

    #[test]
    fn rejects_control_endpoint_in_interface() {
        static EPS: [EndpointDescriptor; 2] = [
            EndpointDescriptor {
                endpoint_address: 0x80,
                ..BULK_PAIR[0]
            },
            BULK_PAIR[1],
        ];
        static BAD_IFACES: [InterfaceDescriptor; 1] = [InterfaceDescriptor {
            endpoints: &EPS,
            ..IFACES[0]
        }];
        static BAD: [ConfigurationDescriptor; 1] = [ConfigurationDescriptor {
            interfaces: &BAD_IFACES,
            ..CONFIGS[0]
        }];
        assert!(matches!(
            with_configs(&BAD).validate(),
            Err(ConfigError::EndpointAddress { address: 0x80, .. })
        ));
    }

    #[test]
    fn rejects_oversized_configuration() {
        static MANY: [EndpointDescriptor; 15] = [BULK_PAIR[0]; 15];
        static BIG_IFACES: [InterfaceDescriptor; 3] = [
            InterfaceDescriptor {
                interface_number: 0,
                num_endpoints: 15,
                endpoints: &MANY,
                extra: &[],
                ..IFACES[0]
            },
            InterfaceDescriptor {
                interface_number: 1,
                num_endpoints: 15,
                endpoints: &MANY,
                extra: &[],
                ..IFACES[0]
            },
            InterfaceDescriptor {
                interface_number: 2,
                num_endpoints: 15,
                endpoints: &MANY,
                extra: &[],
                ..IFACES[0]
            },
        ];
        static BIG: [ConfigurationDescriptor; 1] = [ConfigurationDescriptor {
            total_length: 9 + 3 * (9 + 15 * 7),
            num_interfaces: 3,
            interfaces: &BIG_IFACES,
            ..CONFIGS[0]
        }];
        assert_eq!(
            with_configs(&BIG).validate(),
            Err(ConfigError::TooLarge { configuration: 1, size: 351 })
        );
    }

    #[test]
    fn rejects_overlong_string() {
        const LONG: &str = "0123456789012345678901234567890123456789012345678901234567890123456789012345678901234567890123456789012345678901234567890123456789";
        let set = DescriptorSet {
            strings: &["Antmicro", LONG],
            ..SET
        };
        assert_eq!(set.validate(), Err(ConfigError::StringTooLong(2)));
        assert_eq!(set.string_descriptor(2, LANGID_EN_US).unwrap_err(), NotFound);
    }

    #[test]
    fn control_endpoint_addresses() {
        assert!(is_control_endpoint(0x00));
        assert!(is_control_endpoint(0x80));
        assert!(!is_control_endpoint(0x81));
        assert!(!is_control_endpoint(0x02));
    }
}
