//! Example: Light-pen monitor on a simulated raster
//!
//! Two threads play the role of the interrupt sources: one fires vsync once
//! per field and flips the odd/even line, the other fires the light-pen line
//! when the simulated beam passes the pen. The main thread opens both
//! endpoints, waits on them with a `Poller` and prints every record.
//!
//! Usage:
//!   cargo run --example raster_monitor -- --pen-x 40 --pen-y 150 -n 20
//!
//! With NTSC-ish timing and the button held:
//!   cargo run --example raster_monitor -- \
//!       --line-length-us 63 --field-us 16683 --button -n 10

use clap::Parser;
use lightpen::{
    Config, EdgeClock, Endpoint, LightPen, LineId, Poller, ReadError, ReadMode, Readiness,
    SimulatedEdgeClock,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Light-pen sensor line
    #[arg(long, default_value = "17")]
    light_pen_line: u32,

    /// Vertical sync line
    #[arg(long, default_value = "18")]
    vsync_line: u32,

    /// Pen button line
    #[arg(long, default_value = "22")]
    button_line: u32,

    /// Odd/even field indicator line
    #[arg(long, default_value = "23")]
    parity_line: u32,

    /// Scan line period in microseconds
    #[arg(long, default_value = "64")]
    line_length_us: u32,

    /// Light-pen debounce window in microseconds
    #[arg(long, default_value = "128")]
    debounce_us: u64,

    /// Field period in microseconds
    #[arg(long, default_value = "20000")]
    field_us: u64,

    /// Simulated pen column (microseconds into the line)
    #[arg(long, default_value = "40")]
    pen_x: u64,

    /// Simulated pen row (lines after vsync)
    #[arg(long, default_value = "150")]
    pen_y: u64,

    /// Hold the pen button
    #[arg(long)]
    button: bool,

    /// Number of records to print (0 = unlimited)
    #[arg(short, long, default_value = "20")]
    n: usize,
}

/// Fire vsync every field and flip the field indicator, until `stop` is set
fn run_vsync(
    clock: Arc<SimulatedEdgeClock>,
    args: &Args,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    let vsync = LineId(args.vsync_line);
    let parity = LineId(args.parity_line);
    let field = Duration::from_micros(args.field_us);
    thread::spawn(move || {
        let mut odd = false;
        while !stop.load(Ordering::Relaxed) {
            odd = !odd;
            clock.set_level(parity, odd);
            clock.fire_now(vsync);
            thread::sleep(field);
        }
    })
}

/// Fire the pen line once per field at the pen position, until `stop` is set
fn run_pen(
    clock: Arc<SimulatedEdgeClock>,
    args: &Args,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    let light_pen = LineId(args.light_pen_line);
    let offset = Duration::from_micros(args.pen_y * u64::from(args.line_length_us) + args.pen_x);
    let field = Duration::from_micros(args.field_us);
    thread::spawn(move || {
        thread::sleep(offset);
        while !stop.load(Ordering::Relaxed) {
            clock.fire_now(light_pen);
            thread::sleep(field);
        }
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    info!("=== Light Pen Raster Monitor ===");
    info!(
        "Pen at x={}us y={} lines, field {}us, button {}",
        args.pen_x, args.pen_y, args.field_us, args.button
    );

    let clock = Arc::new(SimulatedEdgeClock::new(28));
    clock.set_level(LineId(args.button_line), args.button);

    let config = Config::new(
        LineId(args.light_pen_line),
        LineId(args.vsync_line),
        LineId(args.button_line),
        LineId(args.parity_line),
    )
    .with_line_length_us(args.line_length_us)
    .with_debounce_us(args.debounce_us);

    let pen = LightPen::start(config, Arc::clone(&clock) as Arc<dyn EdgeClock>)?;
    let lp = pen.open(Endpoint::LightPen)?;
    let vsync = pen.open(Endpoint::VSync)?;

    let stop = Arc::new(AtomicBool::new(false));
    let threads = [
        run_vsync(Arc::clone(&clock), &args, Arc::clone(&stop)),
        run_pen(Arc::clone(&clock), &args, Arc::clone(&stop)),
    ];

    let poller = Poller::new();
    let mut count = 0usize;
    let mut buf = [0u8; 64];

    while args.n == 0 || count < args.n {
        let ready = poller.wait(&[&lp, &vsync], Duration::from_millis(100));
        if ready.is_empty() {
            continue;
        }

        for (endpoint, readiness) in ready {
            if readiness.contains(Readiness::HANGUP) {
                warn!("{} hung up", endpoint);
                continue;
            }
            let session = if endpoint == Endpoint::LightPen { &lp } else { &vsync };
            match session.read_into(&mut buf, ReadMode::NonBlocking) {
                Ok(len) => {
                    count += 1;
                    info!(
                        "#{} {}: {}",
                        count,
                        endpoint,
                        String::from_utf8_lossy(&buf[..len]).trim_end()
                    );
                }
                Err(ReadError::WouldBlock) => {}
                Err(e) => warn!("{}: read failed: {}", endpoint, e),
            }
        }
    }

    stop.store(true, Ordering::Relaxed);
    for handle in threads {
        let _ = handle.join();
    }

    let stats = pen.stats();
    info!(
        "{} samples accepted, {} debounced, {} wrong field",
        stats.accepted, stats.debounced, stats.wrong_parity
    );
    pen.shutdown();

    Ok(())
}
