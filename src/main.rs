use std::{path::PathBuf, thread, time::Duration};

use anyhow::Result;
use clap::Parser;
use log::{error, info, LevelFilter};

use xtdbg::{
    config::{Config, MemoryLayout, RegisterWidth},
    machine::{Machine, Status},
};

/// Real-mode x86 interpreter with a GDB remote stub
#[derive(Parser, Debug)]
#[clap(name = "xtdbg", version)]
struct Args {
    /// TCP port for the debugger, 0 runs without one
    #[clap(default_value_t = 1235)]
    port: u16,

    /// ROM image mapped at the top of memory
    #[clap(long)]
    bios: Option<PathBuf>,

    /// Answer `g` with the 64-bit register file layout
    #[clap(long)]
    wide_registers: bool,

    /// 256K RAM and a 32K ROM at 0xF8000
    #[clap(long)]
    compact_rom: bool,

    /// Trace every instruction
    #[clap(short, long)]
    verbose: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Config {
        Config {
            port: (args.port != 0).then(|| args.port),
            bios: args.bios,
            register_width: if args.wide_registers {
                RegisterWidth::Bits64
            } else {
                RegisterWidth::Bits32
            },
            layout: if args.compact_rom {
                MemoryLayout::compact()
            } else {
                MemoryLayout::default()
            },
            verbose: args.verbose,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.verbose {
        logger.filter_level(LevelFilter::Trace);
    }
    logger.init();

    let config = Config::from(args);
    let mut machine = Machine::init(&config)?;

    loop {
        match machine.execute()? {
            Status::Running => thread::sleep(Duration::from_secs(1)),
            Status::Stopped => {
                info!("stopped");
                break;
            }
            Status::Halted(e) => {
                error!("halted: {} ({})", e, e.code());
                break;
            }
        }
    }

    machine.cleanup();

    Ok(())
}
