mod verify;
mod workload;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use common::{config, constant::MiB};
use log::LevelFilter;
use ramblk::{Device, DeviceConfig};
use verify::VerifyArgs;
use workload::RunArgs;

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    #[clap(flatten)]
    device: DeviceArgs,
    /// 日志级别，不指定时由编译期的 `RAMBLK_CLOG` 环境变量决定
    #[clap(long, global = true)]
    log: Option<LevelFilter>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Args)]
pub struct DeviceArgs {
    /// 设备容量，单位 MiB
    #[clap(long, default_value_t = config::DEFAULT_CAPACITY / MiB)]
    capacity_mib: usize,
    /// 扇区大小，单位字节
    #[clap(long, default_value_t = config::SECTOR_SIZE)]
    sector_size: usize,
    /// 硬件队列数量，每个队列一个 worker 线程
    #[clap(long, default_value_t = config::DEFAULT_NR_QUEUES)]
    queues: usize,
    /// 每个队列最多积压的请求数
    #[clap(long, default_value_t = config::DEFAULT_QUEUE_DEPTH)]
    depth: usize,
}

impl DeviceArgs {
    fn config(&self) -> anyhow::Result<DeviceConfig> {
        let capacity_bytes = self
            .capacity_mib
            .checked_mul(MiB)
            .context("capacity is too large")?;
        Ok(DeviceConfig {
            capacity_bytes,
            sector_size: self.sector_size,
            nr_queues: self.queues,
            queue_depth: self.depth,
        })
    }

    pub fn create(&self) -> anyhow::Result<Device> {
        let config = self.config()?;
        Device::create(&config).with_context(|| format!("failed to create device {config:?}"))
    }
}

#[derive(Subcommand)]
enum Commands {
    Run(RunArgs),
    Verify(VerifyArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    simple_logger::init_with_level(cli.log.unwrap_or(simple_logger::DEFAULT_LEVEL))?;
    match cli.command {
        Commands::Run(args) => args.run(&cli.device),
        Commands::Verify(args) => args.run(&cli.device),
    }
}
