use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use common::config::{
    DEFAULT_CAPACITY, DEFAULT_NR_QUEUES, DEFAULT_QUEUE_DEPTH, DISK_NAME, SECTOR_SIZE,
};
use defines::error::{errno, KResult};

use crate::{
    dispatcher::Dispatcher,
    geometry::Geometry,
    queue::{QueueSet, QueueStats},
    request::{Completion, Request},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceConfig {
    pub capacity_bytes: usize,
    pub sector_size: usize,
    pub nr_queues: usize,
    pub queue_depth: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CAPACITY,
            sector_size: SECTOR_SIZE,
            nr_queues: DEFAULT_NR_QUEUES,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl DeviceConfig {
    pub fn validate(&self) -> KResult {
        Geometry::new(self.capacity_bytes, self.sector_size)?;
        if self.nr_queues == 0 || self.queue_depth == 0 {
            return Err(errno::EINVAL);
        }
        Ok(())
    }
}

/// 宿主层（比如内核的块设备层）调用设备的接口
pub trait BlockOps {
    fn submit_request(&self, queue_id: usize, request: Request) -> Completion;
    fn sector_size(&self) -> usize;
    fn capacity_sectors(&self) -> u64;
}

/// 一个内存块设备
///
/// 不同队列上、扇区范围不重叠的请求可以完全并行。范围重叠的请求之间的先后顺序
/// 不作保证，需要确定顺序的调用者应当自己串行化这些请求
pub struct Device {
    geometry: Geometry,
    queues: QueueSet,
    shutting_down: AtomicBool,
}

impl Device {
    pub fn create(config: &DeviceConfig) -> KResult<Self> {
        config.validate()?;
        let geometry = Geometry::new(config.capacity_bytes, config.sector_size)?;
        let dispatcher = Dispatcher::new(geometry).inspect_err(|_| {
            error!("{DISK_NAME}: failed to allocate {} bytes", config.capacity_bytes);
        })?;
        let queues = QueueSet::new(&Arc::new(dispatcher), config.nr_queues, config.queue_depth)?;
        info!(
            "{DISK_NAME}: {} sectors of {} bytes, {} queues of depth {}",
            geometry.capacity_sectors(),
            geometry.sector_size(),
            config.nr_queues,
            config.queue_depth,
        );
        Ok(Self {
            geometry,
            queues,
            shutting_down: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    pub fn nr_queues(&self) -> usize {
        self.queues.nr_queues()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub fn submit(&self, queue_id: usize, request: Request) -> Completion {
        if self.is_shutting_down() {
            warn!("{DISK_NAME}: submission after shutdown");
            return Completion::failed(request.into_segments(), errno::ESHUTDOWN);
        }
        self.queues.submit(queue_id, request)
    }

    pub fn submit_async(
        &self,
        queue_id: usize,
        request: Request,
    ) -> impl Future<Output = Completion> + '_ {
        let rejected = self.is_shutting_down();
        async move {
            if rejected {
                warn!("{DISK_NAME}: submission after shutdown");
                return Completion::failed(request.into_segments(), errno::ESHUTDOWN);
            }
            self.queues.submit_async(queue_id, request).await
        }
    }

    pub fn stats(&self) -> Vec<QueueStats> {
        self.queues.stats()
    }

    /// 拒绝之后的提交，等待已经提交的请求全部完成
    ///
    /// 可以重复调用。并发调用时，每个调用者都要等到请求全部完成才返回
    pub fn shutdown(&self) {
        let first = !self.shutting_down.swap(true, Ordering::AcqRel);
        self.queues.shutdown();
        if first {
            info!("{DISK_NAME}: shut down");
        }
    }
}

impl BlockOps for Device {
    fn submit_request(&self, queue_id: usize, request: Request) -> Completion {
        self.submit(queue_id, request)
    }

    fn sector_size(&self) -> usize {
        self.geometry.sector_size()
    }

    fn capacity_sectors(&self) -> u64 {
        self.geometry.capacity_sectors()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 使用默认队列深度创建设备
pub fn create_device(capacity_bytes: usize, sector_size: usize, nr_queues: usize) -> KResult<Device> {
    Device::create(&DeviceConfig {
        capacity_bytes,
        sector_size,
        nr_queues,
        ..DeviceConfig::default()
    })
}

pub fn destroy_device(device: Device) {
    drop(device);
}
