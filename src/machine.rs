use anyhow::{bail, Result};
use log::{info, warn};

use crate::{
    bios::Bios,
    config::Config,
    cpu::{
        cpu::{Cpu, DecodeError},
        gdb::{DebugBridge, StopFlags},
    },
    interconnect::Interconnect,
    rsp::RspServer,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// The protocol worker is alive and serving.
    Running,
    /// A headless run was interrupted or killed.
    Stopped,
    /// A headless run hit something the interpreter can't execute.
    Halted(DecodeError),
}

enum Mode {
    Headless(DebugBridge),
    Served(RspServer),
}

/// Host-facing entry point: owns the interpreter directly, or the protocol
/// worker that owns it.
pub struct Machine {
    mode: Mode,
    flags: StopFlags,
    verbose: bool,
}

impl Machine {
    /// Builds the memory map and CPU and, when `config.port` is set, starts
    /// the protocol worker. Returns once the worker is listening.
    pub fn init(config: &Config) -> Result<Machine> {
        let layout = config.layout;

        let bios = match &config.bios {
            Some(path) => Bios::new(path, layout.bios_size())?,
            None => Bios::empty(layout.bios_size()),
        };

        let cpu = Cpu::new(Interconnect::new(bios, layout));
        let bridge = DebugBridge::new(cpu, config.register_width);
        let flags = bridge.flags();

        let mode = match config.port {
            Some(port) => {
                let server = RspServer::start(port, bridge)?;
                info!("gdb stub on port {}", server.port());
                Mode::Served(server)
            }
            None => {
                info!("running headless");
                Mode::Headless(bridge)
            }
        };

        Ok(Machine {
            mode,
            flags,
            verbose: config.verbose,
        })
    }

    /// Bound protocol port, `None` when headless.
    pub fn port(&self) -> Option<u16> {
        match &self.mode {
            Mode::Served(server) => Some(server.port()),
            Mode::Headless(_) => None,
        }
    }

    /// Served: checks on the worker and returns at once. Headless: runs the
    /// interpreter until it halts or is stopped.
    pub fn execute(&mut self) -> Result<Status> {
        match &mut self.mode {
            Mode::Served(server) => {
                server.execute()?;
                Ok(Status::Running)
            }
            Mode::Headless(bridge) => match bridge.cont() {
                Ok(()) => Ok(Status::Stopped),
                Err(e) => {
                    info!("halted at {:05x}", bridge.cpu().regs.pc());
                    if self.verbose {
                        info!("\n{}", bridge.cpu());
                    }
                    Ok(Status::Halted(e))
                }
            },
        }
    }

    /// Pushes a framed packet to the connected debugger.
    pub fn send(&self, payload: &str) -> Result<()> {
        match &self.mode {
            Mode::Served(server) => server.send(payload),
            Mode::Headless(_) => bail!("no debugger connection when headless"),
        }
    }

    /// Handle for stopping runs from another thread.
    pub fn stop_flags(&self) -> StopFlags {
        self.flags.clone()
    }

    pub fn interrupt(&self) {
        self.flags.interrupt();
    }

    pub fn kill(&self) {
        self.flags.kill();
    }

    /// Releases the machine. A protocol worker is not joined; it keeps
    /// running detached until the process exits.
    pub fn cleanup(self) {
        if let Mode::Served(server) = &self.mode {
            warn!("leaving rsp worker on port {} running", server.port());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryLayout;

    #[test]
    fn headless_halts_on_empty_rom() {
        // Reset vector lands in zero-filled ROM: 00 00 is not implemented.
        let mut machine = Machine::init(&Config::default()).unwrap();
        assert_eq!(machine.port(), None);

        match machine.execute().unwrap() {
            Status::Halted(e) => assert_eq!(e.code(), -2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(machine.send("S05").is_err());
    }

    #[test]
    fn killed_headless_run_stops_at_once() {
        let config = Config {
            layout: MemoryLayout::compact(),
            ..Config::default()
        };
        let mut machine = Machine::init(&config).unwrap();
        machine.kill();
        assert_eq!(machine.execute().unwrap(), Status::Stopped);
        machine.cleanup();
    }
}
