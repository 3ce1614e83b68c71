//! Append-only segmented block files.
//!
//! Each record is `(magic: u32, payload_len: u32, payload)`, where the
//! payload is a full canonical block. The magic distinguishes mainnet files
//! from testnet. Writers only ever append, so readers need no coordination
//! beyond per-call seeks; the active file rotates once it passes the size
//! threshold.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use cinder_core::ser::{Decodable, Encodable, SerMode};
use cinder_core::types::{Block, BlockHeader, Transaction};

use crate::error::DbError;
use crate::txdb::DiskPos;

/// Default rotation threshold (128 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 0x0800_0000;

pub struct BlockFiles {
    dir: PathBuf,
    magic: u32,
    max_file_size: u64,
    current: u32,
}

impl BlockFiles {
    /// Open the block-file set in `dir`, resuming after the highest
    /// existing file.
    pub fn open(dir: impl AsRef<Path>, magic: u32, max_file_size: u64) -> Result<Self, DbError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let mut current = 0;
        while dir.join(file_name(current + 1)).exists() {
            current += 1;
        }
        Ok(Self { dir, magic, max_file_size, current })
    }

    fn path(&self, file: u32) -> PathBuf {
        self.dir.join(file_name(file))
    }

    /// Index of the file the next block will land in.
    pub fn current_file(&self) -> u32 {
        self.current
    }

    /// Append a block, rotating the active file first if it is full.
    /// Returns `(file, payload_offset)`.
    pub fn append_block(&mut self, block: &Block) -> Result<(u32, u32), DbError> {
        let payload = block.to_vec(SerMode::Full);

        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(self.current))?;
        if handle.metadata()?.len() + payload.len() as u64 + 8 > self.max_file_size
            && handle.metadata()?.len() > 0
        {
            self.current += 1;
            handle = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path(self.current))?;
        }

        let record_start = handle.metadata()?.len();
        handle.write_u32::<LittleEndian>(self.magic)?;
        handle.write_u32::<LittleEndian>(payload.len() as u32)?;
        handle.write_all(&payload)?;
        handle.flush()?;

        Ok((self.current, (record_start + 8) as u32))
    }

    fn open_at(&self, file: u32, offset: u32) -> Result<File, DbError> {
        let mut handle = File::open(self.path(file))?;
        handle.seek(SeekFrom::Start(offset as u64))?;
        Ok(handle)
    }

    /// Read a full block from its payload offset, verifying the record
    /// envelope in front of it.
    pub fn read_block(&self, file: u32, block_pos: u32) -> Result<Block, DbError> {
        let mut handle = self.open_at(file, block_pos.checked_sub(8).ok_or(DbError::Corrupt(
            "block position before record envelope",
        ))?)?;
        let magic = handle.read_u32::<LittleEndian>()?;
        if magic != self.magic {
            return Err(DbError::Corrupt("bad block-file magic"));
        }
        let len = handle.read_u32::<LittleEndian>()?;
        let mut payload = vec![0u8; len as usize];
        handle.read_exact(&mut payload)?;
        Ok(Block::from_slice(&payload, SerMode::Full)?)
    }

    /// Read just the header of the block at the given payload offset.
    pub fn read_header(&self, file: u32, block_pos: u32) -> Result<BlockHeader, DbError> {
        let mut handle = self.open_at(file, block_pos)?;
        Ok(BlockHeader::decode(&mut handle, SerMode::Full)?)
    }

    /// Read one transaction at an absolute file position.
    pub fn read_transaction(&self, pos: &DiskPos) -> Result<Transaction, DbError> {
        if pos.is_null() {
            return Err(DbError::Corrupt("null transaction position"));
        }
        let mut handle = self.open_at(pos.file, pos.tx_pos)?;
        Ok(Transaction::decode(&mut handle, SerMode::Full)?)
    }
}

fn file_name(file: u32) -> String {
    format!("blk{:05}.dat", file)
}
