//! 基于内存的块设备
//!
//! 一块固定大小、创建时清零的内存被当作按扇区寻址的磁盘，
//! 请求从一个或多个队列提交，由各队列的 worker 派发执行

#[macro_use]
extern crate log;

mod cursor;
mod device;
mod dispatcher;
mod geometry;
mod queue;
mod range_lock;
mod request;
mod store;

pub use self::{
    cursor::{DiskCursor, SeekFrom},
    device::{create_device, destroy_device, BlockOps, Device, DeviceConfig},
    dispatcher::Dispatcher,
    geometry::Geometry,
    queue::{QueueSet, QueueStats},
    request::{Completion, Direction, Request, Segment, Segments},
    store::BackingStore,
};
