use anyhow::{bail, Context, Result};
use log::info;
use std::{fs::File, io::Read, path::Path};

pub struct Bios {
    pub data: Vec<u8>,
}

impl Bios {
    /// Loads a ROM image into a `size` byte buffer, zero filling the tail.
    pub fn new(path: &Path, size: usize) -> Result<Bios> {
        let file =
            File::open(path).with_context(|| format!("open bios file {}", path.display()))?;

        let mut data = Vec::new();

        file.take(size as u64 + 1).read_to_end(&mut data)?;

        info!("reading bios file {} ({} bytes)", path.display(), data.len());

        Bios::from_bytes(data, size)
    }

    pub fn from_bytes(mut data: Vec<u8>, size: usize) -> Result<Bios> {
        if data.len() > size {
            bail!("Invalid BIOS Size: {} bytes, ROM window is {}", data.len(), size);
        }

        data.resize(size, 0);

        Ok(Bios { data })
    }

    pub fn empty(size: usize) -> Bios {
        Bios {
            data: vec![0; size],
        }
    }
}
