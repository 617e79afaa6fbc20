//! Producer-role demo: synthesizes a tile pattern in memory instead of
//! decoding a real image - pixel decode and graphics output are left to
//! whatever application embeds this crate.
//!
//! Runs a `rows x cols` grid of producer ranks in-process over
//! [`LocalGroupComm`], each binding its own TCP listener and owning one
//! tile of a `cols*tile_width x rows*tile_height` global image. Every
//! tile is filled with its producing rank's byte value so a consumer can
//! check which producer a pixel came from.

use clap::Parser;
use streammesh::comm::LocalGroupComm;
use streammesh::config::ProducerConfig;
use streammesh::flow::StreamBehavior;
use streammesh::mesh::Producer;
use streammesh::wire::BaseType;
use streammesh::Result;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone)]
struct Args {
    /// Network interface each producer rank binds its listener on.
    #[arg(long, default_value = "lo")]
    interface: String,
    #[arg(long, default_value_t = 9000)]
    port_min: u16,
    #[arg(long, default_value_t = 9999)]
    port_max: u16,
    /// Tile grid shape: `cols * rows` producer ranks total.
    #[arg(long, default_value_t = 2)]
    cols: u32,
    #[arg(long, default_value_t = 2)]
    rows: u32,
    #[arg(long, default_value_t = 160)]
    tile_width: u32,
    #[arg(long, default_value_t = 90)]
    tile_height: u32,
    #[arg(long, default_value_t = 5)]
    frames: usize,
    /// Number of consumer connections `var_definitions_complete` waits
    /// for before the first frame is sent.
    #[arg(long, default_value_t = 1)]
    initial_wait_count: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let rank_count = (args.cols * args.rows) as usize;
    let group = LocalGroupComm::new_group(rank_count);

    let mut handles = Vec::with_capacity(rank_count);
    for comm in group {
        let args = args.clone();
        handles.push(tokio::spawn(async move { run_rank(args, comm).await }));
    }
    for handle in handles {
        handle.await.expect("producer rank task panicked")?;
    }
    Ok(())
}

async fn run_rank(args: Args, comm: LocalGroupComm) -> Result<()> {
    let config = ProducerConfig {
        interface: args.interface.clone(),
        port_min: args.port_min,
        port_max: args.port_max,
        stream_behavior: StreamBehavior::WaitForAll,
        initial_wait_count: args.initial_wait_count,
    };

    let (mut producer, listener) =
        Producer::bind(&config.interface, config.port_min, config.port_max, &comm).await?;

    if let (Some(ip), Some(port)) = (producer.master_ip_address(), producer.master_port()) {
        println!("producer master listening on {ip}:{port}");
    }

    let col = comm.rank() as u32 % args.cols;
    let row = comm.rank() as u32 / args.cols;

    producer.define_var("global_width", BaseType::ArraySize, &[], &[], &[])?;
    producer.define_var("global_height", BaseType::ArraySize, &[], &[], &[])?;
    producer.define_var("local_width", BaseType::ArraySize, &[], &[], &[])?;
    producer.define_var("local_height", BaseType::ArraySize, &[], &[], &[])?;
    producer.define_var("offset_x", BaseType::ArraySize, &[], &[], &[])?;
    producer.define_var("offset_y", BaseType::ArraySize, &[], &[], &[])?;
    producer.define_var(
        "pixels",
        BaseType::U8,
        &["global_width", "global_height"],
        &["local_width", "local_height"],
        &["offset_x", "offset_y"],
    )?;

    producer.set_value(
        "global_width",
        &(args.cols * args.tile_width).to_ne_bytes(),
    )?;
    producer.set_value(
        "global_height",
        &(args.rows * args.tile_height).to_ne_bytes(),
    )?;
    producer.set_value("local_width", &args.tile_width.to_ne_bytes())?;
    producer.set_value("local_height", &args.tile_height.to_ne_bytes())?;
    producer.set_value("offset_x", &(col * args.tile_width).to_ne_bytes())?;
    producer.set_value("offset_y", &(row * args.tile_height).to_ne_bytes())?;

    producer
        .var_definitions_complete(config.stream_behavior, config.initial_wait_count, listener)
        .await?;

    let tile = vec![comm.rank() as u8; (args.tile_width * args.tile_height) as usize];
    for frame in 0..args.frames {
        producer.set_value("pixels", &tile)?;
        producer.write().await?;
        producer.advance_time_step().await?;
        println!("rank {}: sent frame {frame}", comm.rank());
    }

    Ok(())
}
