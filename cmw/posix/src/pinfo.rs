//! Read-only parameter files ("pinfo") attached to a component.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use cmw_core::{RtError, RtResult};

/// Reference point of [`PInfo::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Start,
    Current,
    End,
}

impl SeekOrigin {
    fn name(self) -> &'static str {
        match self {
            SeekOrigin::Start => "ORIGIN_START",
            SeekOrigin::Current => "ORIGIN_CURRENT",
            SeekOrigin::End => "ORIGIN_END",
        }
    }
}

/// An open parameter file with its size and read head.
///
/// The head never leaves `0..=size`.
#[derive(Debug)]
pub struct PInfo {
    name: String,
    file: File,
    size: u64,
    head: u64,
}

impl PInfo {
    pub fn open(path: impl AsRef<Path>, name: impl Into<String>) -> RtResult<Self> {
        let name = name.into();
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|err| {
            log::error!("Error open pinfo for {name} ({}): {err}", path.display());
            RtError::Failure
        })?;
        let size = file.seek(SeekFrom::End(0)).and_then(|size| {
            file.rewind()?;
            Ok(size)
        });
        let size = size.map_err(|err| {
            log::error!("{name}: cannot size pinfo: {err}");
            RtError::Failure
        })?;
        Ok(Self {
            name,
            file,
            size,
            head: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn head(&self) -> u64 {
        self.head
    }

    /// Reads up to `buffer.len()` bytes at the head and advances it.
    /// Returns 0 at end of file.
    pub fn read(&mut self, buffer: &mut [u8]) -> RtResult<usize> {
        let len = self.file.read(buffer).map_err(|err| {
            log::error!("Error read on {}: {err}", self.name);
            RtError::Failure
        })?;
        self.head += len as u64;
        Ok(len)
    }

    /// Moves the head to `offset` relative to `origin` and returns the new
    /// position. Targets outside `0..=size` fail and leave the head alone.
    pub fn seek(&mut self, offset: i64, origin: SeekOrigin) -> RtResult<u64> {
        let size = self.size as i128;
        let head = self.head as i128;
        let offset = offset as i128;
        let target = match origin {
            SeekOrigin::Start if (0..=size).contains(&offset) => Some(offset),
            SeekOrigin::Current if offset <= size - head && -offset <= head => Some(head + offset),
            SeekOrigin::End if offset <= 0 && -offset <= size => Some(size + offset),
            _ => None,
        };
        let Some(target) = target else {
            log::error!("{}_PINFO_seek with parameter whence {}", self.name, origin.name());
            return Err(RtError::Failure);
        };

        let target = target as u64;
        match self.file.seek(SeekFrom::Start(target)) {
            Ok(position) if position == target => {
                self.head = position;
                Ok(position)
            }
            Ok(_) | Err(_) => {
                log::error!("{}_PINFO_seek on position computation", self.name);
                Err(RtError::Failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn pinfo(content: &[u8]) -> (tempfile::NamedTempFile, PInfo) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        let pinfo = PInfo::open(file.path(), "gains").unwrap();
        (file, pinfo)
    }

    #[test]
    fn open_reports_size_and_head() {
        let (_file, pinfo) = pinfo(b"0123456789");
        assert_eq!(pinfo.size(), 10);
        assert_eq!(pinfo.head(), 0);
        assert!(PInfo::open("/nonexistent/pinfo.bin", "missing").is_err());
    }

    #[test]
    fn read_advances_head() {
        let (_file, mut pinfo) = pinfo(b"0123456789");
        let mut buf = [0u8; 4];
        assert_eq!(pinfo.read(&mut buf), Ok(4));
        assert_eq!(&buf, b"0123");
        assert_eq!(pinfo.head(), 4);
        let mut rest = [0u8; 16];
        assert_eq!(pinfo.read(&mut rest), Ok(6));
        assert_eq!(pinfo.read(&mut rest), Ok(0));
        assert_eq!(pinfo.head(), 10);
    }

    #[test]
    fn seek_range_checks() {
        let (_file, mut pinfo) = pinfo(b"0123456789");
        assert_eq!(pinfo.seek(10, SeekOrigin::Start), Ok(10));
        assert_eq!(pinfo.seek(11, SeekOrigin::Start), Err(RtError::Failure));
        assert_eq!(pinfo.seek(-1, SeekOrigin::Start), Err(RtError::Failure));

        assert_eq!(pinfo.seek(4, SeekOrigin::Start), Ok(4));
        assert_eq!(pinfo.seek(6, SeekOrigin::Current), Ok(10));
        assert_eq!(pinfo.seek(1, SeekOrigin::Current), Err(RtError::Failure));
        assert_eq!(pinfo.seek(-10, SeekOrigin::Current), Ok(0));
        assert_eq!(pinfo.seek(-1, SeekOrigin::Current), Err(RtError::Failure));
        assert_eq!(pinfo.head(), 0);

        assert_eq!(pinfo.seek(-3, SeekOrigin::End), Ok(7));
        assert_eq!(pinfo.seek(0, SeekOrigin::End), Ok(10));
        assert_eq!(pinfo.seek(1, SeekOrigin::End), Err(RtError::Failure));
        assert_eq!(pinfo.seek(-11, SeekOrigin::End), Err(RtError::Failure));
        assert_eq!(pinfo.head(), 10);
    }

    #[test]
    fn read_after_seek() {
        let (_file, mut pinfo) = pinfo(b"abcdef");
        pinfo.seek(-2, SeekOrigin::End).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(pinfo.read(&mut buf), Ok(2));
        assert_eq!(&buf[..2], b"ef");
    }
}
