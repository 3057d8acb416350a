// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A scripted stand-in for the USB controller, and a host that drives it.

#![allow(dead_code)]

use std::collections::VecDeque;

use usb_ep0::descriptor::{
    ConfigurationDescriptor, DescriptorSet, DeviceDescriptor, EndpointDescriptor,
    InterfaceDescriptor,
};
use usb_ep0::usb::{UsbTransferType, ATTR_REMOTE_WAKEUP, ATTR_RESERVED_1, ATTR_SELF_POWERED};
use usb_ep0::{Ep0Bus, Options, SetupRequest, UsbDevice, VendorHandler, VendorResponse};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    In(Vec<u8>),
    ArmOut,
    Stall,
    SetAddress(u8),
    ResetEndpoints,
    Halt(u8, bool),
}

#[derive(Debug)]
pub struct MockBus {
    pub max_packet: usize,
    pub setup: Option<[u8; 8]>,
    pub in_complete: bool,
    pub out: VecDeque<Vec<u8>>,
    pub bus_reset: bool,
    pub ops: Vec<Op>,
    /// `ops.len()` each time the SETUP flag was cleared.
    pub setup_cleared: Vec<usize>,
}

impl MockBus {
    pub fn new(max_packet: usize) -> Self {
        Self {
            max_packet,
            setup: None,
            in_complete: false,
            out: VecDeque::new(),
            bus_reset: false,
            ops: Vec::new(),
            setup_cleared: Vec::new(),
        }
    }
}

impl Ep0Bus for MockBus {
    fn setup_pending(&self) -> bool {
        self.setup.is_some()
    }

    fn read_setup(&mut self) -> [u8; 8] {
        self.setup.unwrap_or_default()
    }

    fn clear_setup_pending(&mut self) {
        self.setup = None;
        self.setup_cleared.push(self.ops.len());
    }

    fn take_in_complete(&mut self) -> bool {
        std::mem::take(&mut self.in_complete)
    }

    fn take_out(&mut self, buf: &mut [u8]) -> Option<usize> {
        let packet = self.out.pop_front()?;
        buf[..packet.len()].copy_from_slice(&packet);
        Some(packet.len())
    }

    fn take_bus_reset(&mut self) -> bool {
        std::mem::take(&mut self.bus_reset)
    }

    fn start_in(&mut self, data: &[u8]) {
        assert!(data.len() <= self.max_packet, "IN packet of {} bytes", data.len());
        self.ops.push(Op::In(data.to_vec()));
    }

    fn start_out(&mut self) {
        self.ops.push(Op::ArmOut);
    }

    fn stall(&mut self) {
        self.ops.push(Op::Stall);
    }

    fn set_address(&mut self, address: u8) {
        self.ops.push(Op::SetAddress(address));
    }

    fn reset_endpoints(&mut self) {
        self.ops.push(Op::ResetEndpoints);
    }

    fn set_halt(&mut self, endpoint: u8, halted: bool) {
        self.ops.push(Op::Halt(endpoint, halted));
    }
}

pub const GET_STATUS: u8 = 0x00;
pub const CLEAR_FEATURE: u8 = 0x01;
pub const SET_FEATURE: u8 = 0x03;
pub const SET_ADDRESS: u8 = 0x05;
pub const GET_DESCRIPTOR: u8 = 0x06;
pub const GET_CONFIGURATION: u8 = 0x08;
pub const SET_CONFIGURATION: u8 = 0x09;
pub const GET_INTERFACE: u8 = 0x0A;
pub const SET_INTERFACE: u8 = 0x0B;

pub const IN_DEVICE: u8 = 0x80;
pub const IN_INTERFACE: u8 = 0x81;
pub const IN_ENDPOINT: u8 = 0x82;
pub const OUT_DEVICE: u8 = 0x00;
pub const OUT_INTERFACE: u8 = 0x01;
pub const OUT_ENDPOINT: u8 = 0x02;
pub const IN_VENDOR: u8 = 0xC0;
pub const OUT_VENDOR: u8 = 0x40;
pub const IN_CLASS_INTERFACE: u8 = 0xA1;

pub fn setup(request_type: u8, request: u8, value: u16, index: u16, length: u16) -> [u8; 8] {
    let mut raw = [request_type, request, 0, 0, 0, 0, 0, 0];
    raw[2..4].copy_from_slice(&value.to_le_bytes());
    raw[4..6].copy_from_slice(&index.to_le_bytes());
    raw[6..8].copy_from_slice(&length.to_le_bytes());
    raw
}

pub fn get_descriptor(ty: u8, index: u8, language: u16, length: u16) -> [u8; 8] {
    setup(IN_DEVICE, GET_DESCRIPTOR, u16::from(ty) << 8 | u16::from(index), language, length)
}

const BULK_PAIR: [EndpointDescriptor; 2] = [
    EndpointDescriptor {
        endpoint_address: 0x01,
        attributes: UsbTransferType::Bulk as u8,
        max_packet_size: 64,
        interval: 0,
    },
    EndpointDescriptor {
        endpoint_address: 0x82,
        attributes: UsbTransferType::Bulk as u8,
        max_packet_size: 64,
        interval: 0,
    },
];

const INTERFACES: [InterfaceDescriptor; 1] = [InterfaceDescriptor {
    interface_number: 0,
    num_endpoints: 2,
    interface_class: 0xFF,
    interface_subclass: 0,
    interface_protocol: 0,
    interface_s: 3,
    extra: &[],
    endpoints: &BULK_PAIR,
}];

const CONFIGS: [ConfigurationDescriptor; 1] = [ConfigurationDescriptor {
    total_length: 9 + 9 + 7 + 7,
    num_interfaces: 1,
    configuration_value: 1,
    configuration_s: 0,
    attributes: ATTR_RESERVED_1 | ATTR_SELF_POWERED | ATTR_REMOTE_WAKEUP,
    max_power: 50,
    interfaces: &INTERFACES,
}];

const BUS_POWERED_CONFIGS: [ConfigurationDescriptor; 1] = [ConfigurationDescriptor {
    attributes: ATTR_RESERVED_1,
    ..CONFIGS[0]
}];

const DEVICE: DeviceDescriptor = DeviceDescriptor {
    bcd_usb: 0x0200,
    device_class: 0,
    device_subclass: 0,
    device_protocol: 0,
    max_packet_size0: 64,
    vendor: 0x1209,
    product: 0x0001,
    bcd_device: 0x0100,
    manufacturer_s: 1,
    product_s: 2,
    serial_s: 0,
    num_configurations: 1,
};

const STRINGS: &[&str] = &["Example Corp", "EP0 test device", "Vendor interface"];

/// Self-powered, remote-wakeup capable, 64-byte EP0.
pub static DESCRIPTORS: DescriptorSet = DescriptorSet {
    device: DEVICE,
    configurations: &CONFIGS,
    strings: STRINGS,
}
.checked();

/// Bus-powered, no remote wakeup, 8-byte EP0, so that descriptors take
/// several packets.
pub static SMALL_EP0: DescriptorSet = DescriptorSet {
    device: DeviceDescriptor {
        max_packet_size0: 8,
        ..DEVICE
    },
    configurations: &BUS_POWERED_CONFIGS,
    strings: STRINGS,
}
.checked();

pub const CONFIG_TOTAL_LENGTH: usize = 32;

/// Vendor requests understood by `TestVendor`.
pub const VENDOR_HELLO: u8 = 0x01;
pub const VENDOR_STORE: u8 = 0x02;
pub const VENDOR_PICKY: u8 = 0x03;

/// Replies "hello" to `VENDOR_HELLO`, stores whatever `VENDOR_STORE` sends,
/// accepts `VENDOR_PICKY` but refuses its data, and declines the rest.
#[derive(Debug, Default)]
pub struct TestVendor {
    pub seen: Vec<SetupRequest>,
    pub stored: Vec<Vec<u8>>,
}

impl VendorHandler for TestVendor {
    fn control(&mut self, request: &SetupRequest, buf: &mut [u8]) -> VendorResponse {
        self.seen.push(*request);
        match request.request {
            VENDOR_HELLO => {
                let reply = b"hello";
                let n = reply.len().min(buf.len());
                buf[..n].copy_from_slice(&reply[..n]);
                VendorResponse::In(n)
            }
            VENDOR_STORE | VENDOR_PICKY => VendorResponse::Accept,
            _ => VendorResponse::Decline,
        }
    }

    fn control_out(&mut self, request: &SetupRequest, data: &[u8]) -> bool {
        if request.request == VENDOR_PICKY {
            return false;
        }
        self.stored.push(data.to_vec());
        true
    }
}

pub type TestDevice<V = TestVendor> = UsbDevice<MockBus, V>;

pub fn device(descriptors: &'static DescriptorSet) -> TestDevice {
    device_with(descriptors, TestVendor::default(), Options::default())
}

pub fn device_with<V: VendorHandler>(
    descriptors: &'static DescriptorSet,
    vendor: V,
    options: Options,
) -> TestDevice<V> {
    let bus = MockBus::new(usize::from(descriptors.device.max_packet_size0));
    UsbDevice::new(bus, descriptors, vendor, options).unwrap()
}

/// The device answered with STALL.
#[derive(Debug, PartialEq, Eq)]
pub struct Stalled;

/// Hands the device a SETUP packet and lets it react.
pub fn send_setup<V: VendorHandler>(dev: &mut TestDevice<V>, raw: [u8; 8]) {
    dev.bus_mut().setup = Some(raw);
    dev.poll();
}

/// Hands the device an OUT packet and lets it react.
pub fn send_out<V: VendorHandler>(dev: &mut TestDevice<V>, data: &[u8]) {
    dev.bus_mut().out.push_back(data.to_vec());
    dev.poll();
}

/// Tells the device its last IN packet was collected.
pub fn collect_in<V: VendorHandler>(dev: &mut TestDevice<V>) {
    dev.bus_mut().in_complete = true;
    dev.poll();
}

fn next_op<V: VendorHandler>(dev: &TestDevice<V>, seen: &mut usize) -> Op {
    let op = dev.bus().ops.get(*seen).cloned();
    *seen += 1;
    op.expect("device did not answer")
}

/// A transfer without data phase, as the host runs it.
pub fn control_no_data<V: VendorHandler>(dev: &mut TestDevice<V>, raw: [u8; 8]) -> Result<(), Stalled> {
    dev.bus_mut().ops.clear();
    send_setup(dev, raw);
    let mut seen = 0;
    match next_op(dev, &mut seen) {
        Op::Stall => return Err(Stalled),
        Op::In(status) => assert!(status.is_empty(), "status packet with data"),
        Op::ResetEndpoints | Op::Halt(..) => match next_op(dev, &mut seen) {
            Op::In(status) => assert!(status.is_empty(), "status packet with data"),
            op => panic!("expected status, got {:?}", op),
        },
        op => panic!("expected status, got {:?}", op),
    }
    collect_in(dev);
    Ok(())
}

/// A control read, as the host runs it: collect packets until a short one
/// or `wLength` bytes, then send the status packet.
pub fn control_in<V: VendorHandler>(dev: &mut TestDevice<V>, raw: [u8; 8]) -> Result<Vec<u8>, Stalled> {
    let requested = usize::from(u16::from_le_bytes([raw[6], raw[7]]));
    if requested == 0 {
        return control_no_data(dev, raw).map(|()| Vec::new());
    }
    let max_packet = dev.bus().max_packet;
    dev.bus_mut().ops.clear();
    send_setup(dev, raw);

    let mut seen = 0;
    let mut data = Vec::new();
    loop {
        match next_op(dev, &mut seen) {
            Op::Stall => return Err(Stalled),
            Op::In(packet) => {
                data.extend_from_slice(&packet);
                collect_in(dev);
                if packet.len() < max_packet || data.len() == requested {
                    break;
                }
            }
            op => panic!("expected data, got {:?}", op),
        }
    }
    assert_eq!(next_op(dev, &mut seen), Op::ArmOut);
    send_out(dev, &[]);
    Ok(data)
}

/// A control write, as the host runs it.
pub fn control_out<V: VendorHandler>(
    dev: &mut TestDevice<V>,
    raw: [u8; 8],
    data: &[u8],
) -> Result<(), Stalled> {
    if data.is_empty() {
        return control_no_data(dev, raw);
    }
    let max_packet = dev.bus().max_packet;
    dev.bus_mut().ops.clear();
    send_setup(dev, raw);

    let mut seen = 0;
    let mut chunks = data.chunks(max_packet);
    loop {
        match next_op(dev, &mut seen) {
            Op::Stall => return Err(Stalled),
            Op::ArmOut => match chunks.next() {
                Some(chunk) => send_out(dev, chunk),
                None => panic!("device wants more than wLength"),
            },
            Op::In(status) => {
                assert!(status.is_empty(), "status packet with data");
                collect_in(dev);
                return Ok(());
            }
            op => panic!("unexpected {:?}", op),
        }
    }
}
