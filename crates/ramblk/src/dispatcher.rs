use defines::error::{errno, KResult};

use crate::{
    geometry::Geometry,
    range_lock::RangeLock,
    request::{Completion, Direction, Request},
    store::BackingStore,
};

/// 唯一真正搬运字节的地方
///
/// 持有后备内存。多个队列的 worker 共享同一个 `Dispatcher`，
/// 最后一个引用释放时后备内存才会被释放
pub struct Dispatcher {
    geometry: Geometry,
    store: BackingStore,
    ranges: RangeLock,
}

impl Dispatcher {
    pub fn new(geometry: Geometry) -> KResult<Self> {
        let store = BackingStore::new_zeroed(geometry.capacity_bytes())?;
        Ok(Self {
            geometry,
            store,
            ranges: RangeLock::new(),
        })
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// 执行一个请求。越界的请求不会搬运任何字节
    pub fn dispatch(&self, mut request: Request) -> Completion {
        match self.transfer(&mut request) {
            Ok(nbytes) => {
                trace!(
                    "{:?} sector {}, {nbytes} bytes in {} segments",
                    request.direction(),
                    request.start_sector(),
                    request.segments().len(),
                );
                Completion::ok(request.into_segments(), nbytes)
            }
            Err(err) => Completion::failed(request.into_segments(), err),
        }
    }

    fn transfer(&self, request: &mut Request) -> KResult<usize> {
        let start_sector = request.start_sector();
        // 先检查整个请求的范围，不允许只执行一部分
        let Some(total_len) = request
            .total_len()
            .filter(|&len| self.geometry.in_bounds(start_sector, len))
        else {
            warn!(
                "request out of range: sector {start_sector}, {:?} bytes, capacity {} sectors",
                request.total_len(),
                self.geometry.capacity_sectors(),
            );
            return Err(errno::ERANGE);
        };
        // in_bounds 成立时偏移量必然可以计算
        let base = self.geometry.offset_of(start_sector).ok_or(errno::ERANGE)?;

        let Some(direction) = request.direction() else {
            warn!("unknown request op {}", request.op());
            return Err(errno::EIO);
        };

        let _range = self
            .ranges
            .lock(base..base + total_len, direction == Direction::Write);
        let mut cursor = base;
        for seg in request.segments_mut() {
            // SAFETY: 整个范围已经检查过了，并且持有该范围的锁
            unsafe {
                match direction {
                    Direction::Read => self.store.read_at(cursor, seg.as_mut_slice()),
                    Direction::Write => self.store.write_at(cursor, seg.as_slice()),
                }
            }
            cursor += seg.len();
        }
        Ok(total_len)
    }
}

#[cfg(test)]
mod tests {
    use defines::error::errno;

    use crate::{
        geometry::Geometry,
        request::{Direction, Request, Segment},
    };

    use super::Dispatcher;

    fn dispatcher(capacity: usize) -> Dispatcher {
        Dispatcher::new(Geometry::new(capacity, 512).unwrap()).unwrap()
    }

    fn read_all(d: &Dispatcher) -> Vec<u8> {
        let len = d.geometry().capacity_bytes();
        d.dispatch(Request::read(0, len)).into_data()
    }

    #[test]
    fn example_scenario() {
        let d = dispatcher(1024);
        assert!(d.dispatch(Request::write(0, vec![0xab; 512])).is_ok());
        assert!(d.dispatch(Request::write(1, vec![0xcd; 512])).is_ok());
        let completion = d.dispatch(Request::read(0, 1024));
        assert_eq!(completion.status, Ok(()));
        assert_eq!(completion.bytes_transferred, 1024);
        let data = completion.into_data();
        assert!(data[..512].iter().all(|&b| b == 0xab));
        assert!(data[512..].iter().all(|&b| b == 0xcd));
    }

    #[test]
    fn out_of_range_leaves_store_untouched() {
        let d = dispatcher(1024);
        let completion = d.dispatch(Request::write(1, vec![0x11; 1024]));
        assert_eq!(completion.status, Err(errno::ERANGE));
        assert_eq!(completion.bytes_transferred, 0);
        assert!(read_all(&d).iter().all(|&b| b == 0));

        assert_eq!(d.dispatch(Request::read(2, 1)).status, Err(errno::ERANGE));
        assert_eq!(d.dispatch(Request::read(u64::MAX, 512)).status, Err(errno::ERANGE));
    }

    #[test]
    fn multi_segment_out_of_range_is_atomic() {
        let d = dispatcher(2048);
        // 前两段在范围内，最后一段越界
        let req = Request::new(Direction::Write, 2)
            .with_segment(Segment::new(vec![1; 512]))
            .with_segment(Segment::new(vec![2; 512]))
            .with_segment(Segment::new(vec![3; 1]));
        assert_eq!(d.dispatch(req).status, Err(errno::ERANGE));
        assert!(read_all(&d).iter().all(|&b| b == 0));
    }

    #[test]
    fn segments_in_order() {
        let d = dispatcher(4096);
        let req = Request::new(Direction::Write, 1)
            .with_segment(Segment::new(vec![1; 100]))
            .with_segment(Segment::new(vec![2; 700]))
            .with_segment(Segment::new(vec![3; 224]));
        let completion = d.dispatch(req);
        assert_eq!(completion.bytes_transferred, 1024);

        let data = d.dispatch(Request::read(1, 1024)).into_data();
        let mut expected = vec![1u8; 100];
        expected.extend(vec![2; 700]);
        expected.extend(vec![3; 224]);
        assert_eq!(data, expected);

        // 读请求同样按段的顺序填充
        let req = Request::new(Direction::Read, 1)
            .with_segment(Segment::zeroed(100))
            .with_segment(Segment::zeroed(924));
        let segments = d.dispatch(req).into_segments();
        assert!(segments[0].as_slice().iter().all(|&b| b == 1));
        assert_eq!(&segments[1].as_slice()[..700], &vec![2u8; 700][..]);
    }

    #[test]
    fn unknown_direction() {
        let d = dispatcher(1024);
        let req = Request::from_raw_op(9, 0).with_segment(Segment::new(vec![0xee; 512]));
        let completion = d.dispatch(req);
        assert_eq!(completion.status, Err(errno::EIO));
        assert_eq!(completion.bytes_transferred, 0);
        assert!(read_all(&d).iter().all(|&b| b == 0));
    }

    #[test]
    fn empty_request() {
        let d = dispatcher(1024);
        let completion = d.dispatch(Request::new(Direction::Write, 2));
        assert_eq!(completion.status, Ok(()));
        assert_eq!(completion.bytes_transferred, 0);
    }
}
