//! 在设备之上提供按字节读写的流式接口
//!
//! 所有访问都经过 [`Device::submit`]，边界检查和关闭检查同样适用

use std::io;

use defines::error::{errno, KResult};

use crate::{device::Device, request::Request};

pub struct DiskCursor<'a> {
    device: &'a Device,
    queue_id: usize,
    sector: u64,
    sector_offset: usize,
}

impl<'a> DiskCursor<'a> {
    pub fn new(device: &'a Device, queue_id: usize) -> Self {
        Self {
            device,
            queue_id,
            sector: 0,
            sector_offset: 0,
        }
    }

    #[inline]
    fn sector_size(&self) -> usize {
        self.device.geometry().sector_size()
    }

    pub fn position(&self) -> u64 {
        self.sector * self.sector_size() as u64 + self.sector_offset as u64
    }

    fn remaining(&self) -> usize {
        let capacity = self.device.geometry().capacity_bytes() as u64;
        capacity.saturating_sub(self.position()) as usize
    }

    fn read_sector(&self, sector: u64) -> KResult<Vec<u8>> {
        let completion = self
            .device
            .submit(self.queue_id, Request::read(sector, self.sector_size()));
        completion.status?;
        Ok(completion.into_data())
    }

    fn write_sector(&self, sector: u64, data: Vec<u8>) -> KResult {
        self.device
            .submit(self.queue_id, Request::write(sector, data))
            .status
    }

    fn advance(&mut self, len: usize) {
        self.sector_offset += len;
        if self.sector_offset == self.sector_size() {
            self.sector_offset = 0;
            self.sector += 1;
        }
    }

    /// 读到设备末尾时返回的字节数会少于 `buf.len()`
    ///
    /// 已经读出部分数据后再出错时返回已读的字节数，错误留给下一次调用
    pub fn read(&mut self, buf: &mut [u8]) -> KResult<usize> {
        let total = usize::min(buf.len(), self.remaining());
        let mut tot_nread = 0;
        while tot_nread < total {
            let copy_len = usize::min(total - tot_nread, self.sector_size() - self.sector_offset);
            let sector_buf = match self.read_sector(self.sector) {
                Ok(sector_buf) => sector_buf,
                Err(_) if tot_nread > 0 => break,
                Err(err) => return Err(err),
            };
            buf[tot_nread..tot_nread + copy_len].copy_from_slice(
                &sector_buf[self.sector_offset..self.sector_offset + copy_len],
            );
            self.advance(copy_len);
            tot_nread += copy_len;
        }
        Ok(tot_nread)
    }

    /// 不足一个扇区的部分会先读出整个扇区再写回。
    /// 已经在设备末尾时返回 `ERANGE`。与 [`read`](Self::read) 一样，
    /// 已经写入部分数据后再出错时返回已写的字节数
    pub fn write(&mut self, buf: &[u8]) -> KResult<usize> {
        if !buf.is_empty() && self.remaining() == 0 {
            return Err(errno::ERANGE);
        }
        let total = usize::min(buf.len(), self.remaining());
        let mut tot_write = 0;
        while tot_write < total {
            let copy_len = usize::min(total - tot_write, self.sector_size() - self.sector_offset);
            match self.write_partial(&buf[tot_write..tot_write + copy_len]) {
                Ok(()) => {}
                Err(_) if tot_write > 0 => break,
                Err(err) => return Err(err),
            }
            self.advance(copy_len);
            tot_write += copy_len;
        }
        Ok(tot_write)
    }

    /// 把 `src` 写到当前扇区的当前偏移处，`src` 不会越过扇区末尾
    fn write_partial(&self, src: &[u8]) -> KResult {
        if src.len() == self.sector_size() {
            return self.write_sector(self.sector, src.to_vec());
        }
        let mut sector_buf = self.read_sector(self.sector)?;
        sector_buf[self.sector_offset..self.sector_offset + src.len()].copy_from_slice(src);
        self.write_sector(self.sector, sector_buf)
    }

    /// 不允许定位到 0 之前或设备末尾之后
    pub fn seek(&mut self, pos: SeekFrom) -> KResult<u64> {
        let capacity = self.device.geometry().capacity_bytes() as u64;
        let offset = match pos {
            SeekFrom::Start(from_start) => Some(from_start),
            SeekFrom::End(from_end) => capacity.checked_add_signed(from_end),
            SeekFrom::Current(from_current) => self.position().checked_add_signed(from_current),
        };
        let offset = offset.filter(|&off| off <= capacity).ok_or(errno::EINVAL)?;
        let sector_size = self.sector_size() as u64;
        self.sector = offset / sector_size;
        self.sector_offset = (offset % sector_size) as usize;
        Ok(offset)
    }

    /// 内存设备没有需要落盘的缓存，只检查设备是否仍然可用
    pub fn flush(&mut self) -> KResult {
        if self.device.is_shutting_down() {
            return Err(errno::ESHUTDOWN);
        }
        Ok(())
    }
}

/// Enumeration of possible methods to seek within an I/O object.
#[derive(Copy, PartialEq, Eq, Clone, Debug)]
pub enum SeekFrom {
    /// Sets the offset to the provided number of bytes.
    Start(u64),

    /// Sets the offset to the size of this object plus the specified number of
    /// bytes.
    End(i64),

    /// Sets the offset to the current position plus the specified number of
    /// bytes.
    Current(i64),
}

impl From<io::SeekFrom> for SeekFrom {
    fn from(pos: io::SeekFrom) -> Self {
        match pos {
            io::SeekFrom::Start(n) => Self::Start(n),
            io::SeekFrom::End(n) => Self::End(n),
            io::SeekFrom::Current(n) => Self::Current(n),
        }
    }
}

impl io::Read for DiskCursor<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        DiskCursor::read(self, buf).map_err(io::Error::other)
    }
}

impl io::Write for DiskCursor<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        DiskCursor::write(self, buf).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        DiskCursor::flush(self).map_err(io::Error::other)
    }
}

impl io::Seek for DiskCursor<'_> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        DiskCursor::seek(self, pos.into()).map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Seek, Write},
        thread,
        time::Duration,
    };

    use defines::error::errno;

    use crate::{device::create_device, request::Request};

    use super::{DiskCursor, SeekFrom};

    #[test]
    fn unaligned_write_preserves_neighbours() {
        let dev = create_device(4 * 512, 512, 1).unwrap();
        assert!(dev.submit(0, Request::write(0, vec![0x11; 2048])).is_ok());

        let mut cursor = DiskCursor::new(&dev, 0);
        assert_eq!(cursor.seek(SeekFrom::Start(500)), Ok(500));
        assert_eq!(cursor.write(&[0x22; 600]), Ok(600));
        assert_eq!(cursor.position(), 1100);

        let data = dev.submit(0, Request::read(0, 2048)).into_data();
        assert!(data[..500].iter().all(|&b| b == 0x11));
        assert!(data[500..1100].iter().all(|&b| b == 0x22));
        assert!(data[1100..].iter().all(|&b| b == 0x11));
    }

    #[test]
    fn read_across_sectors() {
        let dev = create_device(4 * 512, 512, 1).unwrap();
        let pattern: Vec<u8> = (0..2048).map(|i| (i % 251) as u8).collect();
        assert!(dev.submit(0, Request::write(0, pattern.clone())).is_ok());

        let mut cursor = DiskCursor::new(&dev, 0);
        cursor.seek(SeekFrom::Start(300)).unwrap();
        let mut buf = vec![0; 1000];
        assert_eq!(cursor.read(&mut buf), Ok(1000));
        assert_eq!(buf, pattern[300..1300]);
    }

    #[test]
    fn short_read_at_end() {
        let dev = create_device(2 * 512, 512, 1).unwrap();
        let mut cursor = DiskCursor::new(&dev, 0);
        cursor.seek(SeekFrom::End(-10)).unwrap();
        let mut buf = [0xff; 64];
        assert_eq!(cursor.read(&mut buf), Ok(10));
        assert!(buf[..10].iter().all(|&b| b == 0));
        assert_eq!(cursor.read(&mut buf), Ok(0));
        assert_eq!(cursor.write(&[1]), Err(errno::ERANGE));
    }

    #[test]
    fn seek_rules() {
        let dev = create_device(2 * 512, 512, 1).unwrap();
        let mut cursor = DiskCursor::new(&dev, 0);
        assert_eq!(cursor.seek(SeekFrom::End(0)), Ok(1024));
        assert_eq!(cursor.seek(SeekFrom::Current(-24)), Ok(1000));
        assert_eq!(cursor.seek(SeekFrom::Current(-1001)), Err(errno::EINVAL));
        assert_eq!(cursor.seek(SeekFrom::Start(1025)), Err(errno::EINVAL));
        assert_eq!(cursor.position(), 1000);
    }

    #[test]
    fn std_io_traits() {
        let dev = create_device(8 * 512, 512, 1).unwrap();
        let mut cursor = DiskCursor::new(&dev, 0);
        cursor.write_all(b"ram block device").unwrap();
        cursor.flush().unwrap();
        cursor.rewind().unwrap();
        let mut buf = [0; 16];
        cursor.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ram block device");
    }

    #[test]
    fn interrupted_read_keeps_progress() {
        const LEN: usize = 16 * 1024 * 1024;
        let dev = create_device(LEN, 512, 1).unwrap();
        let (result, position) = thread::scope(|s| {
            let reader = s.spawn(|| {
                let mut cursor = DiskCursor::new(&dev, 0);
                let mut buf = vec![0xff; LEN];
                let result = cursor.read(&mut buf);
                (result, cursor.position())
            });
            thread::sleep(Duration::from_millis(5));
            dev.shutdown();
            reader.join().unwrap()
        });
        // 出错时不能读出任何数据，否则返回已读出的字节数
        match result {
            Ok(n) => assert_eq!(position, n as u64),
            Err(err) => {
                assert_eq!(err, errno::ESHUTDOWN);
                assert_eq!(position, 0);
            }
        }
    }

    #[test]
    fn interrupted_write_keeps_progress() {
        const LEN: usize = 16 * 1024 * 1024;
        let dev = create_device(LEN, 512, 1).unwrap();
        let (result, position) = thread::scope(|s| {
            let writer = s.spawn(|| {
                let mut cursor = DiskCursor::new(&dev, 0);
                cursor.seek(SeekFrom::Start(100)).unwrap();
                let data = vec![0x5a; LEN - 100];
                let result = cursor.write(&data);
                (result, cursor.position())
            });
            thread::sleep(Duration::from_millis(5));
            dev.shutdown();
            writer.join().unwrap()
        });
        match result {
            Ok(n) => assert_eq!(position, 100 + n as u64),
            Err(err) => {
                assert_eq!(err, errno::ESHUTDOWN);
                assert_eq!(position, 100);
            }
        }
        // 失败的调用不移动位置
        let mut cursor = DiskCursor::new(&dev, 0);
        assert_eq!(cursor.write(&[1]), Err(errno::ESHUTDOWN));
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn fails_after_shutdown() {
        let dev = create_device(2 * 512, 512, 1).unwrap();
        dev.shutdown();
        let mut cursor = DiskCursor::new(&dev, 0);
        assert_eq!(cursor.write(&[1; 4]), Err(errno::ESHUTDOWN));
        assert_eq!(cursor.read(&mut [0; 4]), Err(errno::ESHUTDOWN));
        assert_eq!(DiskCursor::flush(&mut cursor), Err(errno::ESHUTDOWN));
    }
}
