//! Consumer-role demo: prints a per-rank checksum of the bytes it
//! received instead of rendering them - graphics output is left to
//! whatever application embeds this crate.
//!
//! Runs `consumers` consumer ranks in-process over [`LocalGroupComm`],
//! each connecting to the same producer master endpoint, reading frames,
//! and selecting the portion of the `pixels` global array its own
//! connections cover. With the default of one consumer rank this covers
//! the whole image; with more than one, each rank only fills the
//! sub-window its own connections own, since merging windows across
//! consumer ranks would need a redistribution kernel coordinating across
//! ranks too.

use clap::Parser;
use streammesh::comm::LocalGroupComm;
use streammesh::config::ConsumerConfig;
use streammesh::mesh::Consumer;
use streammesh::Result;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone)]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    master_host: String,
    #[arg(long)]
    master_port: u16,
    #[arg(long, default_value_t = 1)]
    consumers: usize,
    #[arg(long, default_value_t = 5)]
    frames: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let group = LocalGroupComm::new_group(args.consumers);

    let mut handles = Vec::with_capacity(args.consumers);
    for comm in group {
        let args = args.clone();
        handles.push(tokio::spawn(async move { run_rank(args, comm).await }));
    }
    for handle in handles {
        handle.await.expect("consumer rank task panicked")?;
    }
    Ok(())
}

async fn run_rank(args: Args, comm: LocalGroupComm) -> Result<()> {
    let config = ConsumerConfig {
        master_host: args.master_host.clone(),
        master_port: args.master_port,
    };

    let mut consumer =
        Consumer::connect(&config.master_host, config.master_port, &comm).await?;

    let rank = comm.rank();
    for frame in 0..args.frames {
        consumer.read().await?;

        let mut global_size = [0u32; 2];
        consumer.global_size_for("pixels", &mut global_size)?;
        let [width, height] = global_size;

        if width > 0 && height > 0 {
            let selection =
                consumer.create_global_array_selection("pixels", &[width, height], &[0, 0])?;
            let mut buf = vec![0u8; (width * height) as usize];
            consumer.fill_selection(&selection, &mut buf)?;

            let checksum: u64 = buf.iter().map(|&b| b as u64).sum();
            println!(
                "rank {rank}: frame {frame}: {width}x{height} window, checksum {checksum}"
            );
        }

        consumer.release_time_step().await?;
    }
    Ok(())
}
