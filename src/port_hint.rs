//! What usually lives behind a PC I/O port. Only used to annotate OUT traces.

const PORTS: &[(u16, u16, &str)] = &[
    (0x0000, 0x001F, "first legacy DMA controller, floppies"),
    (0x0020, 0x0021, "first Programmable Interrupt Controller"),
    (0x0022, 0x0023, "Model-Specific Registers of Cyrix processors"),
    (0x0040, 0x0047, "PIT (Programmable Interval Timer)"),
    (0x0060, 0x0064, "'8042' PS/2 Controller, keyboards and mice"),
    (0x0070, 0x0071, "CMOS and RTC registers"),
    (0x0080, 0x008F, "DMA (Page registers)"),
    (0x0092, 0x0092, "fast A20 gate register"),
    (0x00A0, 0x00A1, "second PIC"),
    (0x00C0, 0x00DF, "second DMA controller, soundblasters"),
    (0x00E9, 0x00E9, "Port E9 Hack"),
    (0x0170, 0x0177, "secondary ATA harddisk controller"),
    (0x01F0, 0x01F7, "primary ATA harddisk controller"),
    (0x0278, 0x027A, "Parallel port"),
    (0x02F8, 0x02FF, "Second serial port"),
    (0x03B0, 0x03DF, "VGA"),
    (0x03F0, 0x03F7, "Floppy disk controller"),
    (0x03F8, 0x03FF, "First serial port"),
];

pub fn port_hint(port: u16) -> &'static str {
    PORTS
        .iter()
        .find(|(first, last, _)| (*first..=*last).contains(&port))
        .map(|(_, _, hint)| *hint)
        .unwrap_or("???")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup() {
        assert_eq!(port_hint(0x0021), "first Programmable Interrupt Controller");
        assert_eq!(port_hint(0x03D4), "VGA");
        assert_eq!(port_hint(0x0092), "fast A20 gate register");
        assert_eq!(port_hint(0x0500), "???");
    }
}
