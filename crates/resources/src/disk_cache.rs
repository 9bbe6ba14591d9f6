//! The append-only on-disk archive cache (spec §4.E): a `<name>.data` file
//! of raw resource bytes and a `<name>.index` file of fixed-shape records
//! pointing into it. Advertises unbounded capacity; `resize` is a no-op.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use gapir_core::Resource;

use crate::error::{ResourceError, ResourceResult};

#[derive(Debug, Clone, Copy)]
struct IndexRecord {
    offset: u64,
    size: u32,
}

/// Two append-only files backing a durable, unbounded resource archive.
pub struct DiskCache {
    data_path: PathBuf,
    index_path: PathBuf,
    data: File,
    index: File,
    records: HashMap<String, IndexRecord>,
    data_end: u64,
}

impl DiskCache {
    /// Opens (creating if absent) `<name>.data`/`<name>.index` under
    /// `dir`, replaying the index into memory and seeking the data file
    /// to its end.
    pub fn open(dir: &Path, name: &str) -> ResourceResult<Self> {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir.join(name), e))?;
        let data_path = dir.join(format!("{name}.data"));
        let index_path = dir.join(format!("{name}.index"));

        let data = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&data_path)
            .map_err(|e| io_err(data_path.clone(), e))?;
        let mut index = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&index_path)
            .map_err(|e| io_err(index_path.clone(), e))?;

        let records = read_index(&mut index).map_err(|e| io_err(index_path.clone(), e))?;
        let data_end = data.metadata().map_err(|e| io_err(data_path.clone(), e))?.len();

        Ok(Self { data_path, index_path, data, index, records, data_end })
    }

    pub fn has_cache(&self, resource: &Resource) -> bool {
        self.records.contains_key(&resource.id)
    }

    /// Ignores the write if `resource.id` is already present. On any I/O
    /// failure, truncates both files back to their pre-write lengths so a
    /// half-written record never survives.
    pub fn put_cache(&mut self, resource: &Resource, bytes: &[u8]) -> ResourceResult<()> {
        if self.records.contains_key(&resource.id) {
            return Ok(());
        }
        let data_len_before = self.data_end;
        let index_len_before = self.index.metadata().map_err(|e| io_err(self.index_path.clone(), e))?.len();

        let result = self.try_append(resource, bytes);
        if result.is_err() {
            let _ = self.data.set_len(data_len_before);
            let _ = self.index.set_len(index_len_before);
            self.data_end = data_len_before;
        }
        result
    }

    fn try_append(&mut self, resource: &Resource, bytes: &[u8]) -> ResourceResult<()> {
        self.data.write_all(bytes).map_err(|e| io_err(self.data_path.clone(), e))?;
        self.data.flush().map_err(|e| io_err(self.data_path.clone(), e))?;

        let offset = self.data_end;
        write_record(&mut self.index, &resource.id, offset, resource.size).map_err(|e| io_err(self.index_path.clone(), e))?;
        self.index.flush().map_err(|e| io_err(self.index_path.clone(), e))?;

        self.data_end += bytes.len() as u64;
        self.records.insert(resource.id.clone(), IndexRecord { offset, size: resource.size });
        Ok(())
    }

    /// Seeks and reads by recorded size, verifying it matches the
    /// resource's expected size.
    pub fn load_cache(&mut self, resource: &Resource, dst: &mut [u8]) -> ResourceResult<bool> {
        let Some(record) = self.records.get(&resource.id).copied() else {
            return Ok(false);
        };
        if record.size != resource.size {
            return Err(ResourceError::SizeMismatch { id: resource.id.clone(), on_disk: record.size, expected: resource.size });
        }
        let size = record.size as usize;
        if dst.len() < size {
            return Err(ResourceError::DestinationTooSmall { dst_size: dst.len(), requested: size });
        }
        let mut reader = BufReader::new(&self.data);
        reader.seek(SeekFrom::Start(record.offset)).map_err(|e| io_err(self.data_path.clone(), e))?;
        reader.read_exact(&mut dst[..size]).map_err(|e| io_err(self.data_path.clone(), e))?;
        Ok(true)
    }

    /// Unbounded capacity: always a no-op.
    pub fn resize(&mut self, _new_limit: usize) {}
}

/// Reads complete `(idLen, id, offset, size)` records sequentially. A
/// truncated trailing record — EOF anywhere partway through a record, not
/// just before it — stops loading at the last complete record rather than
/// erroring (spec §6 "on-disk archive format").
fn read_index(index: &mut File) -> std::io::Result<HashMap<String, IndexRecord>> {
    index.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(&mut *index);
    let mut records = HashMap::new();
    loop {
        match read_one_record(&mut reader) {
            Ok(Some((id, record))) => {
                records.insert(id, record);
            }
            Ok(None) => break,
            Err(e) => return Err(e),
        }
    }
    index.seek(SeekFrom::End(0))?;
    Ok(records)
}

fn read_one_record(reader: &mut impl Read) -> std::io::Result<Option<(String, IndexRecord)>> {
    let id_len = match reader.read_u32::<LittleEndian>() {
        Ok(n) => n,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut id_bytes = vec![0u8; id_len as usize];
    if reader.read_exact(&mut id_bytes).is_err() {
        return Ok(None);
    }
    let offset = match reader.read_u64::<LittleEndian>() {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    let size = match reader.read_u32::<LittleEndian>() {
        Ok(v) => v,
        Err(_) => return Ok(None),
    };
    let id = String::from_utf8_lossy(&id_bytes).into_owned();
    Ok(Some((id, IndexRecord { offset, size })))
}

fn write_record(index: &mut File, id: &str, offset: u64, size: u32) -> std::io::Result<()> {
    index.write_u32::<LittleEndian>(id.len() as u32)?;
    index.write_all(id.as_bytes())?;
    index.write_u64::<LittleEndian>(offset)?;
    index.write_u32::<LittleEndian>(size)?;
    Ok(())
}

fn io_err(path: PathBuf, source: std::io::Error) -> ResourceError {
    ResourceError::Io { path, source }
}
