//! 模仿 blk-mq 的硬件队列
//!
//! 每个队列有一个 worker 线程，同一队列中的请求按提交顺序派发，
//! 不同队列之间互不影响、可以并行

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use async_channel::{Receiver, Sender};
use common::config::DISK_NAME;
use defines::error::{errno, KResult};
use event_listener::{Event, Listener};
use klocks::SpinMutex;

use crate::{
    dispatcher::Dispatcher,
    request::{Completion, Direction, Request},
};

struct Job {
    request: Request,
    reply: Sender<Completion>,
}

/// 某个队列的统计信息快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub completed: u64,
    pub rejected: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

#[derive(Default)]
struct QueueCounters {
    completed: AtomicU64,
    rejected: AtomicU64,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
}

impl QueueCounters {
    fn record(&self, direction: Option<Direction>, completion: &Completion) {
        if completion.status.is_err() {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.completed.fetch_add(1, Ordering::Relaxed);
        let nbytes = completion.bytes_transferred as u64;
        match direction {
            Some(Direction::Read) => self.bytes_read.fetch_add(nbytes, Ordering::Relaxed),
            Some(Direction::Write) => self.bytes_written.fetch_add(nbytes, Ordering::Relaxed),
            None => 0,
        };
    }

    fn snapshot(&self) -> QueueStats {
        QueueStats {
            completed: self.completed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

struct HwQueue {
    jobs: Sender<Job>,
    counters: Arc<QueueCounters>,
}

pub struct QueueSet {
    queues: Vec<HwQueue>,
    workers: SpinMutex<Vec<JoinHandle<()>>>,
    draining: AtomicBool,
    drained: AtomicBool,
    drain_done: Event,
}

impl QueueSet {
    /// 创建 `nr_queues` 个队列，每个队列最多积压 `queue_depth` 个请求
    pub fn new(dispatcher: &Arc<Dispatcher>, nr_queues: usize, queue_depth: usize) -> KResult<Self> {
        if nr_queues == 0 || queue_depth == 0 {
            return Err(errno::EINVAL);
        }
        let mut queues = Vec::with_capacity(nr_queues);
        let mut workers = Vec::with_capacity(nr_queues);
        for id in 0..nr_queues {
            let (tx, rx) = async_channel::bounded(queue_depth);
            let counters = Arc::new(QueueCounters::default());
            let spawned = {
                let dispatcher = Arc::clone(dispatcher);
                let counters = Arc::clone(&counters);
                thread::Builder::new()
                    .name(format!("{DISK_NAME}-q{id}"))
                    .spawn(move || worker(id, &dispatcher, &rx, &counters))
            };
            match spawned {
                Ok(handle) => {
                    queues.push(HwQueue { jobs: tx, counters });
                    workers.push(handle);
                }
                Err(err) => {
                    error!("failed to spawn worker for queue {id}: {err}");
                    // 不留下半初始化的队列
                    drop(Self::with_workers(queues, workers));
                    return Err(errno::ENOMEM);
                }
            }
        }
        Ok(Self::with_workers(queues, workers))
    }

    fn with_workers(queues: Vec<HwQueue>, workers: Vec<JoinHandle<()>>) -> Self {
        Self {
            queues,
            workers: SpinMutex::new(workers),
            draining: AtomicBool::new(false),
            drained: AtomicBool::new(false),
            drain_done: Event::new(),
        }
    }

    #[inline]
    pub fn nr_queues(&self) -> usize {
        self.queues.len()
    }

    fn queue(&self, queue_id: usize) -> KResult<&HwQueue> {
        self.queues.get(queue_id).ok_or_else(|| {
            warn!("no such queue {queue_id}, only {} queues", self.queues.len());
            errno::ENXIO
        })
    }

    /// 提交请求并阻塞等待其完成
    pub fn submit(&self, queue_id: usize, request: Request) -> Completion {
        let queue = match self.queue(queue_id) {
            Ok(queue) => queue,
            Err(err) => return Completion::failed(request.into_segments(), err),
        };
        let (reply, completion) = async_channel::bounded(1);
        if let Err(closed) = queue.jobs.send_blocking(Job { request, reply }) {
            return shutdown_completion(closed.into_inner());
        }
        completion.recv_blocking().unwrap_or_else(|_closed| Completion::lost())
    }

    /// [`submit`](Self::submit) 的异步版本，队列满时让出而非阻塞线程
    pub async fn submit_async(&self, queue_id: usize, request: Request) -> Completion {
        let queue = match self.queue(queue_id) {
            Ok(queue) => queue,
            Err(err) => return Completion::failed(request.into_segments(), err),
        };
        let (reply, completion) = async_channel::bounded(1);
        if let Err(closed) = queue.jobs.send(Job { request, reply }).await {
            return shutdown_completion(closed.into_inner());
        }
        completion
            .recv()
            .await
            .unwrap_or_else(|_closed| Completion::lost())
    }

    pub fn stats(&self) -> Vec<QueueStats> {
        self.queues.iter().map(|q| q.counters.snapshot()).collect()
    }

    /// 关闭所有队列，并等待已经入队的请求全部完成
    ///
    /// 可以重复调用，也可以多个线程同时调用，每个调用者返回时 worker 都已退出
    pub fn shutdown(&self) {
        if self.draining.swap(true, Ordering::AcqRel) {
            self.wait_drained();
            return;
        }
        for queue in &self.queues {
            queue.jobs.close();
        }
        // 不要在持有自旋锁时 join
        let workers = core::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if handle.join().is_err() {
                error!("queue worker panicked");
            }
        }
        self.drained.store(true, Ordering::Release);
        self.drain_done.notify(usize::MAX);
    }

    fn wait_drained(&self) {
        while !self.drained.load(Ordering::Acquire) {
            let listener = self.drain_done.listen();
            if self.drained.load(Ordering::Acquire) {
                break;
            }
            listener.wait();
        }
    }
}

impl Drop for QueueSet {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn shutdown_completion(job: Job) -> Completion {
    warn!(
        "submission to sector {} after shutdown",
        job.request.start_sector()
    );
    Completion::failed(job.request.into_segments(), errno::ESHUTDOWN)
}

fn worker(id: usize, dispatcher: &Dispatcher, jobs: &Receiver<Job>, counters: &QueueCounters) {
    debug!("queue {id} worker started");
    // 通道关闭后仍会先取完剩余的请求
    while let Ok(Job { request, reply }) = jobs.recv_blocking() {
        let direction = request.direction();
        let completion = dispatcher.dispatch(request);
        counters.record(direction, &completion);
        // 提交者可能已经不再等待了
        let _ = reply.try_send(completion);
    }
    debug!("queue {id} worker stopped");
}
