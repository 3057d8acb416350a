// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! EP0 firmware for the RP2040.
//!
//! Brings the chip up from the ring oscillator to a crystal-locked 48 MHz USB
//! clock, then hands the USB controller to `usb_ep0` through `Rp2040Bus`, a
//! thin `Ep0Bus` over the controller registers. Nothing else runs: no HAL, no
//! interrupts, the main loop just polls.
//!
//! Besides the standard requests the device answers one vendor request pair:
//! a vendor OUT of up to 64 bytes is stored, and any vendor IN reads it back.
//!
//! Diagnostic GPIOs follow the bus events, so a logic analyzer on them shows
//! the flow of each transfer.
//!
//! # A note on `unsafe`
//!
//! Most of it sits inside register `write`/`modify` closures, where
//! `rp2040_pac` asks for it on raw `bits` setters. The rest is EP0's data
//! buffer in USB DPRAM, which is only touched while the controller doesn't
//! own it (AVAILABLE clear).

#![no_std]
#![no_main]

use cortex_m_rt::entry;

use usb_ep0::descriptor::{
    ConfigurationDescriptor, DescriptorSet, DeviceDescriptor, EndpointDescriptor,
    InterfaceDescriptor,
};
use usb_ep0::usb::{UsbDir, UsbRequestKind, UsbTransferType, ATTR_RESERVED_1, ATTR_SELF_POWERED};
use usb_ep0::{Ep0Bus, Options, SetupRequest, UsbDevice, VendorHandler, VendorResponse};

use panic_halt as _;

// GPIO numbers of the activity pins.
cfg_if::cfg_if! {
    if #[cfg(feature = "target-pico")] {
        const LED_PIN: u8 = 25; // any activity
        const SETUP_PIN: u8 = 0; // SETUP being dispatched
        const BUFF_PIN: u8 = 1; // EP0 buffer handed back
        const RESET_PIN: u8 = 2; // bus reset
        const EP0_PIN: u8 = 3; // EP0 packet queued
    } else if #[cfg(feature = "target-feather")] {
        const LED_PIN: u8 = 13;
        const SETUP_PIN: u8 = 0;
        const BUFF_PIN: u8 = 1;
        const RESET_PIN: u8 = 2;
        const EP0_PIN: u8 = 3;
    } else {
        compile_error!("missing or unknown target-* feature");
    }
}

const ACTIVITY_PINS: [u8; 5] = [LED_PIN, SETUP_PIN, BUFF_PIN, RESET_PIN, EP0_PIN];

/// EP0 buffer 0, fixed by the hardware at this DPRAM offset. IN and OUT share
/// it; only one of them is ever armed.
const EP0_BUFFER_OFFSET: usize = 0x100;
/// Where the other endpoints' buffers start, one 64-byte buffer each.
const EP_BUFFERS_OFFSET: usize = 0x180;
const BUFFER_LEN: usize = 64;

/// `buff_status` bits for EP0. Each endpoint has an IN/OUT pair, IN first.
const EP0_IN_BUFF: u32 = 1 << 0;
const EP0_OUT_BUFF: u32 = 1 << 1;

const ENDPOINTS: [EndpointDescriptor; 2] = [
    EndpointDescriptor {
        endpoint_address: UsbDir::Out.endpoint(1),
        attributes: UsbTransferType::Bulk as u8,
        max_packet_size: 64,
        interval: 0,
    },
    EndpointDescriptor {
        endpoint_address: UsbDir::In.endpoint(2),
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
    interface_s: 0,
    extra: &[],
    endpoints: &ENDPOINTS,
}];

const CONFIGURATIONS: [ConfigurationDescriptor; 1] = [ConfigurationDescriptor {
    total_length: 9 + 9 + 7 + 7,
    num_interfaces: 1,
    configuration_value: 1,
    configuration_s: 0,
    attributes: ATTR_RESERVED_1 | ATTR_SELF_POWERED,
    max_power: 0x32,
    interfaces: &INTERFACES,
}];

static DESCRIPTORS: DescriptorSet = DescriptorSet {
    device: DeviceDescriptor {
        bcd_usb: 0x0200,
        device_class: 0,
        device_subclass: 0,
        device_protocol: 0,
        max_packet_size0: 64,
        vendor: 0x0000,
        product: 0x0001,
        bcd_device: 0x0100,
        manufacturer_s: 1,
        product_s: 2,
        serial_s: 0,
        num_configurations: 1,
    },
    configurations: &CONFIGURATIONS,
    strings: &["Raspberry Pi", "Pico EP0 Device"],
}
.checked();

#[entry]
fn main() -> ! {
    let p = rp2040_pac::Peripherals::take().unwrap();

    // Diagnostic pins: IO bank 0 out of reset, SIO function, outputs.
    p.RESETS.reset.modify(|_, w| w.io_bank0().clear_bit());
    while !p.RESETS.reset_done.read().io_bank0().bit() {}
    for pin in ACTIVITY_PINS {
        p.IO_BANK0.gpio[usize::from(pin)].gpio_ctrl.write(|w| w.funcsel().sio());
        p.SIO.gpio_oe_set.write(|w| unsafe { w.bits(1 << pin) });
    }

    clocks_init(&p);
    usb_init(&p.RESETS, &p.USBCTRL_REGS, &p.USBCTRL_DPRAM);

    let bus = Rp2040Bus {
        regs: p.USBCTRL_REGS,
        dpram: p.USBCTRL_DPRAM,
        sio: p.SIO,
        in_pid_1: true,
        out_pid_1: true,
    };
    let mut dev = match UsbDevice::new(bus, &DESCRIPTORS, Echo::default(), Options::default()) {
        Ok(dev) => dev,
        // Stay off the bus.
        Err(_) => loop {
            cortex_m::asm::wfi();
        },
    };

    dev.bus().configure_endpoints(&DESCRIPTORS);
    // Pull-up on DP: the host sees us from here on.
    dev.bus().connect();

    loop {
        dev.poll();
        dev.bus().quiet();
    }
}

/// Switches to the 12 MHz crystal and brings up PLL_SYS (132 MHz system
/// clock) and PLL_USB (48 MHz USB clock).
fn clocks_init(p: &rp2040_pac::Peripherals) {
    // Out of the boot ROM we're on the ring oscillator, somewhere around
    // 6 MHz and not very precise about it. XOSC and CLOCKS don't need to come
    // out of reset first.
    p.XOSC.ctrl.write(|w| unsafe { w.bits(0xfab_aa0) });
    while !p.XOSC.status.read().stable().bit() {}
    // clk_sys follows clk_ref by default, so this moves the whole chip over
    // to the crystal without a glitch.
    p.CLOCKS.clk_ref_ctrl.write(|w| w.src().xosc_clksrc());
    while p.CLOCKS.clk_ref_selected.read().bits() != (1 << 2) {}
    // Nothing uses the ROSC anymore.
    p.ROSC.ctrl.write(|w| unsafe { w.bits(0xd1e_fa4) });

    // USB would work at 12 MHz too, but a faster CPU answers the host's
    // tokens a good deal sooner.
    //
    // 12 MHz * 132 = 1584 MHz VCO, / (6 * 2) = 132 MHz.
    p.RESETS.reset.modify(|_, w| w.pll_sys().clear_bit());
    while !p.RESETS.reset_done.read().pll_sys().bit() {}
    p.PLL_SYS.cs.write(|w| unsafe { w.refdiv().bits(1) });
    p.PLL_SYS.fbdiv_int.write(|w| unsafe { w.fbdiv_int().bits(132) });
    p.PLL_SYS.pwr.write(|w| w.pd().clear_bit().vcopd().clear_bit());
    while !p.PLL_SYS.cs.read().lock().bit() {}
    p.PLL_SYS.prim.write(|w| unsafe { w.postdiv1().bits(6).postdiv2().bits(2) });
    p.PLL_SYS.pwr.modify(|_, w| w.postdivpd().clear_bit());

    p.CLOCKS.clk_sys_ctrl.write(|w| w.auxsrc().clksrc_pll_sys());
    p.CLOCKS.clk_sys_ctrl.modify(|_, w| w.src().clksrc_clk_sys_aux());
    while p.CLOCKS.clk_sys_selected.read().bits() != (1 << 1) {}

    // clk_peri isn't used by USB, only by the UART. It's handy to have
    // when debugging, so it tracks clk_sys.
    p.CLOCKS.clk_peri_ctrl.write(|w| w.auxsrc().clk_sys().enable().set_bit());

    // The USB controller wants exactly 48 MHz, from its own PLL fed by the
    // 12 MHz reference we just set up.
    //
    // 12 MHz * 100 = 1200 MHz VCO, / (5 * 5) = 48 MHz.
    p.RESETS.reset.modify(|_, w| w.pll_usb().clear_bit());
    while !p.RESETS.reset_done.read().pll_usb().bit() {}
    p.PLL_USB.cs.write(|w| unsafe { w.refdiv().bits(1) });
    p.PLL_USB.fbdiv_int.write(|w| unsafe { w.fbdiv_int().bits(100) });
    p.PLL_USB.pwr.write(|w| w.pd().clear_bit().vcopd().clear_bit());
    while !p.PLL_USB.cs.read().lock().bit() {}
    p.PLL_USB.prim.write(|w| unsafe { w.postdiv1().bits(5).postdiv2().bits(5) });
    p.PLL_USB.pwr.modify(|_, w| w.postdivpd().clear_bit());

    p.CLOCKS
        .clk_usb_ctrl
        .write(|w| w.auxsrc().clksrc_pll_usb().enable().set_bit());
}

/// Resets the controller and sets it up as a device on the onboard PHY, with
/// the pull-up still off.
fn usb_init(
    resets: &rp2040_pac::RESETS,
    regs: &rp2040_pac::USBCTRL_REGS,
    dpram: &rp2040_pac::USBCTRL_DPRAM,
) {
    resets.reset.modify(|_, w| w.usbctrl().set_bit());
    resets.reset.modify(|_, w| w.usbctrl().clear_bit());
    while !resets.reset_done.read().usbctrl().bit() {}

    // The control part of DPRAM comes up holding garbage. The datasheet isn't
    // clear on whether that matters, so clear it anyway.
    dpram.setup_packet_low.write(|w| unsafe { w.bits(0) });
    dpram.setup_packet_high.write(|w| unsafe { w.bits(0) });
    for epc in &dpram.ep_control {
        epc.write(|w| unsafe { w.bits(0) });
    }
    for epb in &dpram.ep_buffer_control {
        epb.write(|w| unsafe { w.bits(0) });
    }

    // Route the controller to the onboard PHY. `softcon` is set by the SDK
    // too; the datasheet names it and says nothing more.
    regs.usb_muxing.write(|w| w.to_phy().set_bit().softcon().set_bit());
    // The Pico wires VBUS detect, other boards may not. Overriding it means
    // the controller always believes it's plugged in, which is fine for a
    // bus-attached device.
    regs.usb_pwr
        .write(|w| w.vbus_detect().set_bit().vbus_detect_override_en().set_bit());
    regs.main_ctrl
        .write(|w| w.controller_en().set_bit().host_ndevice().clear_bit());
    // Flag a `buff_status` bit every time a single EP0 buffer completes,
    // rather than waiting for both halves of a double buffer.
    regs.sie_ctrl.write(|w| w.ep0_int_1buf().set_bit());
    // We never take the interrupt, but `ints` only reflects sources enabled
    // here, and `ints` is what the main loop polls.
    regs.inte.write(|w| w.buff_status().set_bit().bus_reset().set_bit().setup_req().set_bit());
}

/// `Ep0Bus` over the RP2040 USB controller.
struct Rp2040Bus {
    regs: rp2040_pac::USBCTRL_REGS,
    dpram: rp2040_pac::USBCTRL_DPRAM,
    sio: rp2040_pac::SIO,
    /// DATA1 is next on EP0 IN (otherwise DATA0).
    in_pid_1: bool,
    /// DATA1 is next on EP0 OUT.
    out_pid_1: bool,
}

impl Rp2040Bus {
    fn connect(&self) {
        self.regs.sie_ctrl.modify(|_, w| w.pullup_en().set_bit());
    }

    /// Enables every endpoint the descriptor table names, each with its own
    /// DPRAM buffer.
    fn configure_endpoints(&self, descriptors: &DescriptorSet) {
        let endpoints = descriptors
            .configurations
            .iter()
            .flat_map(|c| c.interfaces.iter())
            .flat_map(|i| i.endpoints.iter());
        for (slot, ep) in endpoints.enumerate() {
            let Some(index) = ep_control_index(ep.endpoint_address) else {
                continue;
            };
            let offset = (EP_BUFFERS_OFFSET + slot * BUFFER_LEN) as u16;
            self.dpram.ep_control[index].write(|w| unsafe {
                w.enable()
                    .set_bit()
                    .interrupt_per_buff()
                    .set_bit()
                    .endpoint_type()
                    .bits(ep.attributes & 0b11)
                    .buffer_address()
                    .bits(offset)
            });
        }
    }

    /// Lowers the activity pins once an event has been handled.
    fn quiet(&self) {
        for pin in ACTIVITY_PINS {
            lower_pin(&self.sio, pin);
        }
    }

    fn ep0_buffer(&self) -> *mut u8 {
        let base = rp2040_pac::USBCTRL_DPRAM::ptr() as *mut u8;
        base.wrapping_add(EP0_BUFFER_OFFSET)
    }

    /// Write-one-to-clear `bit` in `buff_status` if it is set.
    fn take_buff_status(&self, bit: u32) -> bool {
        if self.regs.buff_status.read().bits() & bit == 0 {
            return false;
        }
        self.regs.buff_status.write(|w| unsafe { w.bits(bit) });
        raise_pin(&self.sio, LED_PIN);
        raise_pin(&self.sio, BUFF_PIN);
        true
    }
}

impl Ep0Bus for Rp2040Bus {
    fn setup_pending(&self) -> bool {
        self.regs.ints.read().setup_req().bit()
    }

    fn read_setup(&mut self) -> [u8; 8] {
        raise_pin(&self.sio, LED_PIN);
        raise_pin(&self.sio, SETUP_PIN);

        let mut raw = [0; 8];
        raw[..4].copy_from_slice(&self.dpram.setup_packet_low.read().bits().to_le_bytes());
        raw[4..].copy_from_slice(&self.dpram.setup_packet_high.read().bits().to_le_bytes());

        // Whatever was armed belonged to the old transfer. Data and status
        // stages after a SETUP both start at DATA1.
        self.dpram.ep_buffer_control[0].write(|w| unsafe { w.bits(0) });
        self.dpram.ep_buffer_control[1].write(|w| unsafe { w.bits(0) });
        self.in_pid_1 = true;
        self.out_pid_1 = true;
        raw
    }

    fn clear_setup_pending(&mut self) {
        self.regs.sie_status.write(|w| w.setup_rec().set_bit());
        lower_pin(&self.sio, SETUP_PIN);
    }

    fn take_in_complete(&mut self) -> bool {
        self.take_buff_status(EP0_IN_BUFF)
    }

    fn take_out(&mut self, buf: &mut [u8]) -> Option<usize> {
        if !self.take_buff_status(EP0_OUT_BUFF) {
            return None;
        }
        let bc = self.dpram.ep_buffer_control[1].read();
        let len = usize::from(bc.length_0().bits()).min(buf.len()).min(BUFFER_LEN);
        // Safety: the controller cleared AVAILABLE when it handed the buffer
        // back, and nothing is armed on EP0 until we say so.
        unsafe {
            core::ptr::copy_nonoverlapping(self.ep0_buffer(), buf.as_mut_ptr(), len);
        }
        Some(len)
    }

    fn take_bus_reset(&mut self) -> bool {
        if !self.regs.ints.read().bus_reset().bit() {
            return false;
        }
        raise_pin(&self.sio, LED_PIN);
        raise_pin(&self.sio, RESET_PIN);
        self.regs.sie_status.write(|w| w.bus_reset().set_bit());
        true
    }

    fn start_in(&mut self, data: &[u8]) {
        raise_pin(&self.sio, EP0_PIN);
        let len = data.len().min(BUFFER_LEN);
        // Safety: EP0 is not armed, see `take_out`.
        unsafe {
            core::ptr::copy_nonoverlapping(data.as_ptr(), self.ep0_buffer(), len);
        }
        let pid = self.in_pid_1;
        self.dpram.ep_buffer_control[0].write(|w| unsafe {
            w.pid_0()
                .bit(pid)
                .full_0()
                .set_bit()
                .available_0()
                .set_bit()
                .length_0()
                .bits(len as u16)
        });
        self.in_pid_1 = !pid;
    }

    fn start_out(&mut self) {
        raise_pin(&self.sio, EP0_PIN);
        let pid = self.out_pid_1;
        self.dpram.ep_buffer_control[1].write(|w| unsafe {
            w.pid_0()
                .bit(pid)
                .full_0()
                .clear_bit()
                .available_0()
                .set_bit()
                .length_0()
                .bits(BUFFER_LEN as u16)
        });
        self.out_pid_1 = !pid;
    }

    fn stall(&mut self) {
        self.regs.ep_stall_arm.write(|w| w.ep0_in().set_bit().ep0_out().set_bit());
        self.dpram.ep_buffer_control[0].write(|w| w.stall().set_bit());
        self.dpram.ep_buffer_control[1].write(|w| w.stall().set_bit());
    }

    fn set_address(&mut self, address: u8) {
        cortex_m::interrupt::free(|_| {
            self.regs.addr_endp.write(|w| unsafe { w.address().bits(address) });
        });
    }

    fn reset_endpoints(&mut self) {
        for epb in self.dpram.ep_buffer_control.iter().skip(2) {
            epb.write(|w| unsafe { w.bits(0) });
        }
    }

    fn set_halt(&mut self, endpoint: u8, halted: bool) {
        let index = buffer_control_index(endpoint);
        if let Some(epb) = self.dpram.ep_buffer_control.get(index) {
            epb.modify(|_, w| w.stall().bit(halted));
        }
    }
}

/// Index into `ep_buffer_control`: IN/OUT pairs in endpoint order.
fn buffer_control_index(endpoint_address: u8) -> usize {
    let number = usize::from(endpoint_address & 0x0F);
    let out = UsbDir::of_endpoint_addr(endpoint_address) == UsbDir::Out;
    number * 2 + usize::from(out)
}

/// Index into `ep_control`, which has no entries for EP0.
fn ep_control_index(endpoint_address: u8) -> Option<usize> {
    buffer_control_index(endpoint_address).checked_sub(2)
}

/// Vendor requests: OUT stores up to 64 bytes, IN reads them back.
#[derive(Default)]
struct Echo {
    data: [u8; BUFFER_LEN],
    len: usize,
}

impl VendorHandler for Echo {
    fn control(&mut self, request: &SetupRequest, buf: &mut [u8]) -> VendorResponse {
        if request.kind != UsbRequestKind::Vendor {
            return VendorResponse::Decline;
        }
        match request.direction {
            UsbDir::In => {
                let n = self.len.min(buf.len());
                buf[..n].copy_from_slice(&self.data[..n]);
                VendorResponse::In(n)
            }
            UsbDir::Out if usize::from(request.length) <= self.data.len() => VendorResponse::Accept,
            UsbDir::Out => VendorResponse::Decline,
        }
    }

    fn control_out(&mut self, _request: &SetupRequest, data: &[u8]) -> bool {
        self.data[..data.len()].copy_from_slice(data);
        self.len = data.len();
        true
    }
}

/// Raise the GPIO pin with index `pin`.
///
/// The pin must already be configured as an SIO output.
#[inline(always)]
fn raise_pin(sio: &rp2040_pac::SIO, pin: u8) {
    sio.gpio_out_set.write(|w| unsafe { w.bits(1 << pin) });
}

#[inline(always)]
fn lower_pin(sio: &rp2040_pac::SIO, pin: u8) {
    sio.gpio_out_clr.write(|w| unsafe { w.bits(1 << pin) });
}

// Second-stage bootloader, for the board's flash chip.
cfg_if::cfg_if! {
    if #[cfg(feature = "target-feather")] {
        #[link_section = ".boot2"]
        #[used]
        static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GD25Q64CS;
    } else {
        #[link_section = ".boot2"]
        #[used]
        static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;
    }
}
