use crate::constant::MiB;

/// 扇区大小的 bit 数
pub const SECTOR_SHIFT: usize = 9;
/// 扇区大小
pub const SECTOR_SIZE: usize = 1 << SECTOR_SHIFT;

/// 默认的设备容量
pub const DEFAULT_CAPACITY: usize = 256 * MiB;

/// 默认的硬件队列数量
pub const DEFAULT_NR_QUEUES: usize = 1;
/// 每个队列最多能积压的请求数，超过时提交者会被阻塞
pub const DEFAULT_QUEUE_DEPTH: usize = 128;

pub const DISK_NAME: &str = "ram_blkdev";

const _: () = assert!(DEFAULT_CAPACITY % SECTOR_SIZE == 0);
