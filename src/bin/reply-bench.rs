use clap::{Parser, ValueEnum};
use feox_reply::io::StreamSink;
use feox_reply::reply::GetResp;
use feox_reply::{
    stats, McReplyBuilder, MGetResponse, RedisReplyBuilder, ReplyBuilder, ReplyConfig,
};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Protocol {
    Redis,
    Memcache,
}

/// Drive multi-get pipelines through a reply builder
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Wire protocol to encode
    #[arg(short, long, value_enum, default_value_t = Protocol::Redis)]
    protocol: Protocol,

    /// Use RESP3 framing (redis only)
    #[arg(long)]
    resp3: bool,

    /// Total number of multi-get requests
    #[arg(short = 'n', long, default_value_t = 100_000)]
    requests: usize,

    /// Keys per request
    #[arg(short, long, default_value_t = 16)]
    keys: usize,

    /// Value size in bytes
    #[arg(long, default_value_t = 64)]
    value_size: usize,

    /// Requests coalesced per batch (1 disables batch mode)
    #[arg(long, default_value_t = 32)]
    pipeline: usize,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn build_response(keys: usize, value: &[u8]) -> MGetResponse {
    let mut resp = MGetResponse::new(keys);
    let block = resp.alloc_storage(keys * value.len());
    for i in 0..keys {
        // Every fourth key misses
        if i % 4 == 3 {
            continue;
        }
        let Some(value_ref) = resp.store(block, value) else {
            continue;
        };
        if let Some(slot) = resp.set(i, GetResp::new(format!("key:{}", i), value_ref)) {
            slot.mc_flag = i as u32;
        }
    }
    resp
}

fn run(rb: &mut dyn ReplyBuilder, args: &Args) -> anyhow::Result<()> {
    let value = vec![b'x'; args.value_size];
    let batching = args.pipeline > 1;

    for start in (0..args.requests).step_by(args.pipeline.max(1)) {
        if batching {
            rb.set_batch_mode(true)?;
        }
        let end = (start + args.pipeline.max(1)).min(args.requests);
        for _ in start..end {
            rb.expect_reply();
            rb.send_mget_response(build_response(args.keys, &value));
        }
        if batching {
            rb.set_batch_mode(false)?;
        }
        if let Some(kind) = rb.get_error() {
            anyhow::bail!("sink failed: {:?}", kind);
        }
    }

    rb.close_connection()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let log_level = if args.verbose {
        "debug"
    } else {
        &args.log_level
    };
    tracing_subscriber::fmt()
        .with_env_filter(format!("feox_reply={},reply_bench={}", log_level, log_level))
        .init();

    let mut config = match args.config {
        Some(ref path) => ReplyConfig::from_file(path)?,
        None => ReplyConfig::default(),
    };
    if args.resp3 {
        config.resp3 = true;
    }
    config.validate()?;
    debug!("Using configuration {:?}", config);

    info!(
        "Encoding {} {:?} multi-get replies ({} keys x {} bytes, pipeline {})",
        args.requests, args.protocol, args.keys, args.value_size, args.pipeline
    );

    stats::reset_thread_local_stats();
    let sink = StreamSink::new(std::io::sink());
    let started = Instant::now();
    match args.protocol {
        Protocol::Redis => run(&mut RedisReplyBuilder::with_config(sink, &config), &args)?,
        Protocol::Memcache => run(&mut McReplyBuilder::with_config(sink, &config), &args)?,
    }
    let elapsed = started.elapsed();

    let stats = stats::thread_local_stats();
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    info!(
        "Done in {:.3}s: {:.0} replies/s, {} writes, {:.1} MB/s",
        secs,
        args.requests as f64 / secs,
        stats.io_write_cnt,
        stats.io_write_bytes as f64 / secs / (1024.0 * 1024.0)
    );
    debug!("Reply stats: {:?}", stats);

    Ok(())
}
