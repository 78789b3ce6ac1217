use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::{debug, info, trace, warn};

use super::{
    cpu::{Cpu, DecodeError, Step},
    registers::Reg16,
};
use crate::{
    config::{RegisterWidth, MEM_LAST},
    rsp::target::{self, GetRegs, Kill, Question, ReadMem, Resume, Target},
    utils::push_hex,
};

/// Stop reply for every halt: SIGTRAP.
pub const STOP_REPLY: &str = "S05";

/// Requests to stop a running `stepi`/`cont`, settable from any thread.
///
/// Both are polled before each instruction. An interrupt is consumed by the
/// run it stops; a kill stays set and keeps every later run from stepping.
#[derive(Debug, Clone, Default)]
pub struct StopFlags {
    intr: Arc<AtomicBool>,
    kill: Arc<AtomicBool>,
}

impl StopFlags {
    pub fn interrupt(&self) {
        info!("INTR requested");
        self.intr.store(true, Ordering::SeqCst);
    }

    pub fn kill(&self) {
        info!("KILL requested");
        self.kill.store(true, Ordering::SeqCst);
    }

    pub fn killed(&self) -> bool {
        self.kill.load(Ordering::SeqCst)
    }

    fn take_interrupt(&self) -> bool {
        self.intr.swap(false, Ordering::SeqCst)
    }

    fn should_stop(&self) -> bool {
        self.killed() || self.take_interrupt()
    }
}

/// Exposes a [`Cpu`] to the protocol layer.
pub struct DebugBridge {
    cpu: Cpu,
    width: RegisterWidth,
    flags: StopFlags,
}

impl DebugBridge {
    pub fn new(cpu: Cpu, width: RegisterWidth) -> DebugBridge {
        DebugBridge {
            cpu,
            width,
            flags: StopFlags::default(),
        }
    }

    /// Handle for stopping runs from another thread.
    pub fn flags(&self) -> StopFlags {
        self.flags.clone()
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn question(&self) -> String {
        STOP_REPLY.to_owned()
    }

    /// AX CX DX BX SP BP SI DI IP FLAGS CS SS DS ES FS GS, each as low byte,
    /// high byte and four zero digits, padded with `'0'` to the configured
    /// width.
    pub fn get_regs(&self) -> String {
        let r = &self.cpu.regs;
        let len = self.width.dump_len();

        let words = [
            r.get16(Reg16::Ax),
            r.get16(Reg16::Cx),
            r.get16(Reg16::Dx),
            r.get16(Reg16::Bx),
            r.get16(Reg16::Sp),
            r.get16(Reg16::Bp),
            r.get16(Reg16::Si),
            r.get16(Reg16::Di),
            r.ip,
            r.flags,
            r.cs,
            r.ss,
            r.ds,
            r.es,
            0, // fs
            0, // gs
        ];

        let mut out = String::with_capacity(len);
        for w in words {
            push_hex(&mut out, &w.to_le_bytes());
            out.push_str("0000");
        }

        out.truncate(len);
        while out.len() < len {
            out.push('0');
        }

        out
    }

    /// Hex dump of up to `len` bytes; stops at the end of the region holding
    /// `addr`.
    pub fn read_mem(&mut self, addr: usize, len: usize) -> String {
        let addr = u32::try_from(addr).unwrap_or(u32::MAX);
        let len = len.min(MEM_LAST as usize + 1);

        let data = self.cpu.bus().read(addr, len);

        let mut out = String::with_capacity(data.len() * 2);
        push_hex(&mut out, data);
        out
    }

    /// Runs until one whole instruction has executed, consuming any prefixes
    /// in front of it.
    pub fn stepi(&mut self) -> Result<(), DecodeError> {
        loop {
            if self.flags.should_stop() {
                debug!("stepi stopped before stepping");
                return Ok(());
            }

            match self.cpu.step() {
                Ok(Step::Prefix) => continue,
                Ok(Step::Executed) => return Ok(()),
                Err(e) => {
                    warn!("stepi: {} ({})", e, e.code());
                    return Err(e);
                }
            }
        }
    }

    /// Runs until a decode error or a stop request.
    pub fn cont(&mut self) -> Result<(), DecodeError> {
        loop {
            if self.flags.should_stop() {
                debug!("cont stopped at {:05x}", self.cpu.regs.pc());
                return Ok(());
            }

            trace!("\n{}", self.cpu);

            if let Err(e) = self.cpu.step() {
                info!("cont: halted by {} ({})", e, e.code());
                return Err(e);
            }
        }
    }

    pub fn kill(&self) {
        self.flags.kill();
    }

    pub fn intr(&self) {
        self.flags.interrupt();
    }
}

impl Target for DebugBridge {
    #[inline(always)]
    fn support_question(&mut self) -> Option<target::QuestionOps<'_>> {
        Some(self)
    }

    #[inline(always)]
    fn support_get_regs(&mut self) -> Option<target::GetRegsOps<'_>> {
        Some(self)
    }

    #[inline(always)]
    fn support_read_mem(&mut self) -> Option<target::ReadMemOps<'_>> {
        Some(self)
    }

    #[inline(always)]
    fn support_resume(&mut self) -> Option<target::ResumeOps<'_>> {
        Some(self)
    }

    #[inline(always)]
    fn support_kill(&mut self) -> Option<target::KillOps<'_>> {
        Some(self)
    }
}

impl Question for DebugBridge {
    fn question(&mut self) -> String {
        DebugBridge::question(self)
    }
}

impl GetRegs for DebugBridge {
    fn get_regs(&mut self) -> String {
        DebugBridge::get_regs(self)
    }
}

impl ReadMem for DebugBridge {
    fn read_mem(&mut self, addr: usize, len: usize) -> String {
        DebugBridge::read_mem(self, addr, len)
    }
}

impl Resume for DebugBridge {
    fn stepi(&mut self) -> String {
        // A decode error is already logged; the client only sees the stop.
        let _ = DebugBridge::stepi(self);
        DebugBridge::question(self)
    }

    fn cont(&mut self) -> String {
        let _ = DebugBridge::cont(self);
        DebugBridge::question(self)
    }
}

impl Kill for DebugBridge {
    fn kill(&mut self) {
        DebugBridge::kill(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bios::Bios, config::MemoryLayout, interconnect::Interconnect};

    fn bridge(code: &[u8], width: RegisterWidth) -> DebugBridge {
        let layout = MemoryLayout::default();
        let mut cpu = Cpu::new(Interconnect::new(Bios::empty(layout.bios_size()), layout));
        cpu.bus().write(0x100, code.len()).copy_from_slice(code);
        cpu.regs.cs = 0;
        cpu.regs.ip = 0x100;
        DebugBridge::new(cpu, width)
    }

    #[test]
    fn register_dump_layout() {
        let mut b = bridge(&[], RegisterWidth::Bits32);
        b.cpu_mut().regs.set16(Reg16::Ax, 0x1234);

        let regs = b.get_regs();
        assert_eq!(regs.len(), 624);
        assert!(regs.starts_with("341200000000000080040000"));
        // IP is the ninth field.
        assert_eq!(&regs[64..72], "00010000");
        assert!(regs[128..].bytes().all(|c| c == b'0'));

        let wide = bridge(&[], RegisterWidth::Bits64).get_regs();
        assert_eq!(wide.len(), 1120);
        assert_eq!(&wide[..128], &regs.replace("3412", "0000")[..128]);
    }

    #[test]
    fn read_mem_is_lowercase_and_clamped() {
        let mut b = bridge(&[0xDE, 0xAD, 0xBE, 0xEF], RegisterWidth::Bits32);
        assert_eq!(b.read_mem(0x100, 4), "deadbeef");
        assert_eq!(b.read_mem(0x7FFFF, 4).len(), 2);
    }

    #[test]
    fn stepi_swallows_prefixes() {
        // ES: nop ; nop
        let mut b = bridge(&[0x26, 0x90, 0x90], RegisterWidth::Bits32);
        assert_eq!(b.stepi(), Ok(()));
        assert_eq!(b.cpu().regs.ip, 0x102);
    }

    #[test]
    fn cont_runs_to_the_first_error() {
        let mut b = bridge(&[0x90, 0x40, 0x40, 0x0F], RegisterWidth::Bits32);
        let err = b.cont().unwrap_err();
        assert_eq!(err.code(), -2);
        assert_eq!(b.cpu().regs.ip, 0x103);
        assert_eq!(b.cpu().regs.get16(Reg16::Ax), 2);
    }

    #[test]
    fn interrupt_is_consumed_kill_is_sticky() {
        let mut b = bridge(&[0x90, 0x90, 0x90], RegisterWidth::Bits32);

        b.intr();
        assert_eq!(b.cont(), Ok(()));
        assert_eq!(b.cpu().regs.ip, 0x100);
        assert_eq!(b.stepi(), Ok(()));
        assert_eq!(b.cpu().regs.ip, 0x101);

        b.kill();
        assert_eq!(b.stepi(), Ok(()));
        assert_eq!(b.cont(), Ok(()));
        assert_eq!(b.cpu().regs.ip, 0x101);
        assert!(b.flags().killed());
    }

    #[test]
    fn resume_replies_with_stop_status() {
        let mut b = bridge(&[0x90], RegisterWidth::Bits32);
        assert_eq!(Resume::stepi(&mut b), "S05");
    }
}
