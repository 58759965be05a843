use anyhow::{ensure, Context};
use clap::Parser;
use defines::error::errno;
use ramblk::{create_device, destroy_device, Request};

use crate::DeviceArgs;

/// 在一个两扇区大小的设备上检查基本的读写、越界和关闭语义
///
/// 只使用设备参数中的扇区大小和队列数量
#[derive(Parser)]
pub struct VerifyArgs {}

impl VerifyArgs {
    pub fn run(self, device: &DeviceArgs) -> anyhow::Result<()> {
        let sector_size = device.sector_size;
        let last_queue = device.queues.saturating_sub(1);
        let dev = create_device(2 * sector_size, sector_size, device.queues)
            .context("failed to create device")?;

        // 越界的写入被整体拒绝，设备内容保持为零
        let completion = dev.submit(0, Request::write(1, vec![0xee; 2 * sector_size]));
        ensure!(
            completion.status == Err(errno::ERANGE),
            "out-of-range write completed with {:?}",
            completion.status
        );
        let data = dev.submit(last_queue, Request::read(0, 2 * sector_size)).into_data();
        ensure!(data.iter().all(|&b| b == 0), "rejected write modified the device");

        dev.submit(0, Request::write(0, vec![0xab; sector_size]))
            .status
            .context("write sector 0")?;
        dev.submit(last_queue, Request::write(1, vec![0xcd; sector_size]))
            .status
            .context("write sector 1")?;
        let completion = dev.submit(0, Request::read(0, 2 * sector_size));
        completion.status.context("read sectors [0, 2)")?;
        let data = completion.into_data();
        ensure!(
            data[..sector_size].iter().all(|&b| b == 0xab)
                && data[sector_size..].iter().all(|&b| b == 0xcd),
            "read back unexpected data"
        );

        dev.shutdown();
        let completion = dev.submit(0, Request::read(0, sector_size));
        ensure!(
            completion.status == Err(errno::ESHUTDOWN),
            "submission after shutdown completed with {:?}",
            completion.status
        );
        destroy_device(dev);

        println!("verify: ok");
        Ok(())
    }
}
