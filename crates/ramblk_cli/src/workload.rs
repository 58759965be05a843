use std::{thread, time::Instant};

use anyhow::{anyhow, ensure, Context};
use clap::Parser;
use common::constant::MiB;
use ramblk::{Device, Request};

use crate::DeviceArgs;

/// 每个队列一个提交线程，在各自独占的扇区区间内随机写入，最后读回校验
#[derive(Parser)]
pub struct RunArgs {
    /// 每个队列提交的写请求数
    #[clap(long, default_value_t = 1024)]
    requests: usize,
    /// 每个请求覆盖的扇区数
    #[clap(long, default_value_t = 8)]
    sectors_per_request: u64,
    /// 随机数种子，不指定时随机生成
    #[clap(long)]
    seed: Option<u64>,
}

/// 某个队列独占的扇区区间
#[derive(Clone, Copy)]
struct Slice {
    queue_id: usize,
    first_sector: u64,
    nr_sectors: u64,
}

impl RunArgs {
    pub fn run(self, device: &DeviceArgs) -> anyhow::Result<()> {
        let dev = device.create()?;
        let nr_queues = dev.nr_queues();
        let sectors_per_queue = dev.geometry().capacity_sectors() / nr_queues as u64;
        ensure!(
            self.sectors_per_request > 0 && self.sectors_per_request <= sectors_per_queue,
            "sectors per request must be in 1..={sectors_per_queue}"
        );
        let seed = self.seed.unwrap_or_else(|| fastrand::u64(..));
        log::info!("workload seed {seed}");

        let begin = Instant::now();
        thread::scope(|s| -> anyhow::Result<()> {
            let handles: Vec<_> = (0..nr_queues)
                .map(|queue_id| {
                    let slice = Slice {
                        queue_id,
                        first_sector: queue_id as u64 * sectors_per_queue,
                        nr_sectors: sectors_per_queue,
                    };
                    let dev = &dev;
                    let args = &self;
                    s.spawn(move || args.run_slice(dev, slice, seed))
                })
                .collect();
            for handle in handles {
                handle
                    .join()
                    .map_err(|_panic| anyhow!("submitter thread panicked"))??;
            }
            Ok(())
        })?;
        let elapsed = begin.elapsed();

        let stats = dev.stats();
        let mut total_bytes = 0;
        println!("queue  completed  rejected  read(MiB)  written(MiB)");
        for (id, stat) in stats.iter().enumerate() {
            println!(
                "{id:>5}  {:>9}  {:>8}  {:>9.2}  {:>12.2}",
                stat.completed,
                stat.rejected,
                stat.bytes_read as f64 / MiB as f64,
                stat.bytes_written as f64 / MiB as f64,
            );
            total_bytes += stat.bytes_read + stat.bytes_written;
        }
        println!(
            "{} MiB in {:.3}s, {:.2} MiB/s",
            total_bytes / MiB as u64,
            elapsed.as_secs_f64(),
            total_bytes as f64 / MiB as f64 / elapsed.as_secs_f64(),
        );
        dev.shutdown();
        Ok(())
    }

    fn run_slice(&self, dev: &Device, slice: Slice, seed: u64) -> anyhow::Result<()> {
        let Slice {
            queue_id,
            first_sector,
            nr_sectors,
        } = slice;
        let sector_size = dev.geometry().sector_size();
        let span = self.sectors_per_request;
        let mut rng = fastrand::Rng::with_seed(seed.wrapping_add(queue_id as u64));
        // 记录这个区间应有的内容
        let mut shadow = vec![0u8; nr_sectors as usize * sector_size];

        for _ in 0..self.requests {
            let rel = rng.u64(0..=nr_sectors - span);
            let mut data = vec![0; span as usize * sector_size];
            rng.fill(&mut data);
            let offset = rel as usize * sector_size;
            shadow[offset..offset + data.len()].copy_from_slice(&data);
            dev.submit(queue_id, Request::write(first_sector + rel, data))
                .status
                .with_context(|| {
                    format!("queue {queue_id}: write at sector {}", first_sector + rel)
                })?;
        }

        for rel in (0..nr_sectors).step_by(span as usize) {
            let len = span.min(nr_sectors - rel) as usize * sector_size;
            let completion = dev.submit(queue_id, Request::read(first_sector + rel, len));
            completion.status.with_context(|| {
                format!("queue {queue_id}: read at sector {}", first_sector + rel)
            })?;
            let offset = rel as usize * sector_size;
            ensure!(
                completion.into_data() == shadow[offset..offset + len],
                "queue {queue_id}: data mismatch at sector {}",
                first_sector + rel
            );
        }
        log::debug!("queue {queue_id}: {} sectors verified", nr_sectors);
        Ok(())
    }
}
