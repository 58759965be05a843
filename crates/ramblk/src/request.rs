use defines::error::{errno, Error, KResult};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use smallvec::SmallVec;

/// 请求的传输方向，取值与 Linux 的 `REQ_OP_READ`/`REQ_OP_WRITE` 一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Direction {
    Read = 0,
    Write = 1,
}

/// 一段连续的缓冲区，相当于一个 scatter/gather 元素
///
/// 读请求完成后，读到的数据就在缓冲区里
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    buf: Vec<u8>,
}

impl Segment {
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf }
    }

    /// 用于读请求的空白缓冲区
    pub fn zeroed(len: usize) -> Self {
        Self { buf: vec![0; len] }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

pub type Segments = SmallVec<[Segment; 4]>;

/// 一次读或写操作
///
/// 方向以原始操作码保存，由宿主层从平台请求翻译而来，
/// 直到派发时才解析，无法识别的操作码会以 `EIO` 完成
#[derive(Debug, Clone)]
pub struct Request {
    op: u8,
    start_sector: u64,
    segments: Segments,
}

impl Request {
    pub fn new(direction: Direction, start_sector: u64) -> Self {
        Self::from_raw_op(direction.into(), start_sector)
    }

    pub fn from_raw_op(op: u8, start_sector: u64) -> Self {
        Self {
            op,
            start_sector,
            segments: SmallVec::new(),
        }
    }

    /// 从 `start_sector` 开始读 `len` 字节，只有一个段
    pub fn read(start_sector: u64, len: usize) -> Self {
        Self::new(Direction::Read, start_sector).with_segment(Segment::zeroed(len))
    }

    /// 把 `data` 写到 `start_sector` 开始处，只有一个段
    pub fn write(start_sector: u64, data: impl Into<Vec<u8>>) -> Self {
        Self::new(Direction::Write, start_sector).with_segment(Segment::new(data.into()))
    }

    #[must_use]
    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn push_segment(&mut self, segment: Segment) {
        self.segments.push(segment);
    }

    #[inline]
    pub fn op(&self) -> u8 {
        self.op
    }

    pub fn direction(&self) -> Option<Direction> {
        Direction::try_from(self.op).ok()
    }

    #[inline]
    pub fn start_sector(&self) -> u64 {
        self.start_sector
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub(crate) fn segments_mut(&mut self) -> &mut [Segment] {
        &mut self.segments
    }

    /// 所有段的长度之和，溢出时返回 `None`
    pub fn total_len(&self) -> Option<usize> {
        self.segments
            .iter()
            .try_fold(0usize, |acc, seg| acc.checked_add(seg.len()))
    }

    pub fn into_segments(self) -> Segments {
        self.segments
    }
}

/// 一个请求的完成状态，缓冲区会随之交还给提交者
#[derive(Debug)]
pub struct Completion {
    pub status: KResult,
    pub bytes_transferred: usize,
    segments: Segments,
}

impl Completion {
    pub(crate) fn ok(segments: Segments, bytes_transferred: usize) -> Self {
        Self {
            status: Ok(()),
            bytes_transferred,
            segments,
        }
    }

    pub(crate) fn failed(segments: Segments, err: Error) -> Self {
        Self {
            status: Err(err),
            bytes_transferred: 0,
            segments,
        }
    }

    /// 请求在派发途中丢失，缓冲区也无法交还
    pub(crate) fn lost() -> Self {
        Self::failed(SmallVec::new(), errno::EIO)
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn into_segments(self) -> Segments {
        self.segments
    }

    /// 各段缓冲区按顺序拼接起来的结果，对读请求来说就是读到的数据
    pub fn into_data(self) -> Vec<u8> {
        let mut segments = self.segments.into_iter();
        let Some(first) = segments.next() else {
            return Vec::new();
        };
        let mut data = first.into_inner();
        for seg in segments {
            data.extend_from_slice(seg.as_slice());
        }
        data
    }
}
