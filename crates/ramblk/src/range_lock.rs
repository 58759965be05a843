//! 字节范围锁
//!
//! 后备内存本身不加锁。不重叠的请求可以完全并行，
//! 重叠的请求中只要有一个是写，就会按获得锁的先后串行执行，
//! 具体谁先谁后不作保证

use std::ops::Range;

use event_listener::{Event, Listener};
use klocks::SpinMutex;
use slab::Slab;

struct ActiveRange {
    range: Range<usize>,
    write: bool,
}

impl ActiveRange {
    fn conflicts(&self, range: &Range<usize>, write: bool) -> bool {
        (self.write || write) && self.range.start < range.end && range.start < self.range.end
    }
}

pub(crate) struct RangeLock {
    active: SpinMutex<Slab<ActiveRange>>,
    released: Event,
}

pub(crate) struct RangeGuard<'a> {
    lock: &'a RangeLock,
    key: usize,
}

impl RangeLock {
    pub fn new() -> Self {
        Self {
            active: SpinMutex::new(Slab::new()),
            released: Event::new(),
        }
    }

    /// 阻塞直到 `range` 与所有已持有的冲突范围都不再重叠
    pub fn lock(&self, range: Range<usize>, write: bool) -> RangeGuard<'_> {
        loop {
            if let Some(guard) = self.try_lock(&range, write) {
                return guard;
            }
            let listener = self.released.listen();
            // 建立监听之前范围可能已经被释放了，再试一次
            if let Some(guard) = self.try_lock(&range, write) {
                return guard;
            }
            listener.wait();
        }
    }

    fn try_lock(&self, range: &Range<usize>, write: bool) -> Option<RangeGuard<'_>> {
        let mut active = self.active.lock();
        if active.iter().any(|(_, held)| held.conflicts(range, write)) {
            return None;
        }
        let key = active.insert(ActiveRange {
            range: range.clone(),
            write,
        });
        Some(RangeGuard { lock: self, key })
    }

    #[cfg(test)]
    fn held(&self) -> usize {
        self.active.lock().len()
    }
}

impl Drop for RangeGuard<'_> {
    fn drop(&mut self) {
        self.lock.active.lock().remove(self.key);
        self.lock.released.notify(usize::MAX);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use super::RangeLock;

    #[test]
    fn readers_share() {
        let lock = RangeLock::new();
        let a = lock.try_lock(&(0..100), false);
        let b = lock.try_lock(&(50..150), false);
        assert!(a.is_some() && b.is_some());
        assert!(lock.try_lock(&(60..70), true).is_none());
        assert!(lock.try_lock(&(150..200), true).is_some());
    }

    #[test]
    fn disjoint_writers() {
        let lock = RangeLock::new();
        let _a = lock.try_lock(&(0..512), true).unwrap();
        let _b = lock.try_lock(&(512..1024), true).unwrap();
        assert!(lock.try_lock(&(511..513), false).is_none());
        assert!(lock.try_lock(&(0..0), true).is_some());
    }

    #[test]
    fn released_on_drop() {
        let lock = RangeLock::new();
        drop(lock.try_lock(&(0..10), true).unwrap());
        assert_eq!(lock.held(), 0);
        assert!(lock.try_lock(&(0..10), true).is_some());
    }

    #[test]
    fn waiter_wakes_up() {
        let lock = Arc::new(RangeLock::new());
        let acquired = Arc::new(AtomicBool::new(false));
        let guard = lock.lock(0..4096, true);

        let t = {
            let lock = Arc::clone(&lock);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let _guard = lock.lock(1024..2048, false);
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));
        drop(guard);
        t.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}
