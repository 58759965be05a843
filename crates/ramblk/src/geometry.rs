use defines::error::{errno, KResult};

/// 扇区号与字节偏移之间的换算，不持有任何状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    sector_size: usize,
    capacity_sectors: u64,
}

impl Geometry {
    /// `capacity_bytes` 必须是 `sector_size` 的正整数倍
    pub fn new(capacity_bytes: usize, sector_size: usize) -> KResult<Self> {
        if sector_size == 0 || capacity_bytes == 0 || capacity_bytes % sector_size != 0 {
            return Err(errno::EINVAL);
        }
        Ok(Self {
            sector_size,
            capacity_sectors: (capacity_bytes / sector_size) as u64,
        })
    }

    #[inline]
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    #[inline]
    pub fn capacity_sectors(&self) -> u64 {
        self.capacity_sectors
    }

    #[inline]
    pub fn capacity_bytes(&self) -> usize {
        self.capacity_sectors as usize * self.sector_size
    }

    /// 扇区的起始字节偏移，乘法溢出时返回 `None`
    pub fn offset_of(&self, sector: u64) -> Option<usize> {
        usize::try_from(sector).ok()?.checked_mul(self.sector_size)
    }

    /// `[sector * sector_size, sector * sector_size + len)` 是否完全落在设备内
    pub fn in_bounds(&self, sector: u64, len: usize) -> bool {
        self.offset_of(sector)
            .and_then(|offset| offset.checked_add(len))
            .is_some_and(|end| end <= self.capacity_bytes())
    }
}

#[cfg(test)]
mod tests {
    use defines::error::errno;

    use super::Geometry;

    #[test]
    fn rejects_bad_shapes() {
        assert_eq!(Geometry::new(1024, 0), Err(errno::EINVAL));
        assert_eq!(Geometry::new(0, 512), Err(errno::EINVAL));
        assert_eq!(Geometry::new(1000, 512), Err(errno::EINVAL));
        assert!(Geometry::new(1024, 512).is_ok());
    }

    #[test]
    fn offsets() {
        let geo = Geometry::new(4096, 512).unwrap();
        assert_eq!(geo.capacity_sectors(), 8);
        assert_eq!(geo.capacity_bytes(), 4096);
        assert_eq!(geo.offset_of(0), Some(0));
        assert_eq!(geo.offset_of(3), Some(1536));
        assert_eq!(geo.offset_of(u64::MAX), None);
    }

    #[test]
    fn bounds() {
        let geo = Geometry::new(1024, 512).unwrap();
        assert!(geo.in_bounds(0, 1024));
        assert!(geo.in_bounds(1, 512));
        assert!(geo.in_bounds(2, 0));
        assert!(!geo.in_bounds(1, 1024));
        assert!(!geo.in_bounds(2, 1));
        assert!(!geo.in_bounds(3, 0));
        assert!(!geo.in_bounds(0, usize::MAX));
        assert!(!geo.in_bounds(u64::MAX, 1));
    }
}
