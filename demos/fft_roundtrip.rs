//! Example: FFT round trips through a chain of blocks
//!
//! Streams arrays of ones through pairs of forward/inverse 2-D FFT blocks and prints
//! the last array to arrive, which should still be all ones.
//!
//! Usage:
//!   cargo run --release --example fft_roundtrip -- \
//!       --arrays 10 --pairs 10 --size 100
//!
//! Single-threaded:
//!   cargo run --release --example fft_roundtrip -- --cooperative

use blockflow::blocks::{ComplexArray, Fft2Block, SourceBlock};
use blockflow::runtime::{
    Block, ExecutionMode, Pipeline, PipelineConfig, PortDirection, PortMap, PortSchema, Step,
    WorkResult,
};
use clap::Parser;
use ndarray::Array2;
use rustfft::num_complex::Complex32;
use std::time::Instant;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of arrays the source emits
    #[arg(short, long, default_value = "10")]
    arrays: usize,

    /// Number of forward/inverse FFT pairs in the chain
    #[arg(short, long, default_value = "10")]
    pairs: usize,

    /// Side length of each square array
    #[arg(short, long, default_value = "100")]
    size: usize,

    /// Channel capacity
    #[arg(long, default_value = "4")]
    capacity: usize,

    /// Run every block on the calling thread
    #[arg(long)]
    cooperative: bool,
}

/// Sink that prints the array arriving as occurrence number `print_at`
struct ArrayPrinter {
    occurrences: usize,
    print_at: usize,
}

impl ArrayPrinter {
    fn new(print_at: usize) -> Self {
        Self {
            occurrences: 0,
            print_at,
        }
    }
}

impl Block<ComplexArray> for ArrayPrinter {
    fn name(&self) -> &str {
        "printer"
    }

    fn input_schema(&self) -> Vec<PortSchema> {
        PortSchema::numbered(PortDirection::Input, 1)
    }

    fn output_schema(&self) -> Vec<PortSchema> {
        vec![]
    }

    fn step(&mut self, inputs: Vec<ComplexArray>) -> WorkResult<Step<ComplexArray>> {
        for array in inputs {
            if self.occurrences + 1 == self.print_at {
                println!("{}", array);
            }
            self.occurrences += 1;
        }
        Ok(Step::Consumed)
    }
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

    info!("=== FFT Round Trip Example ===");
    info!(
        "{} arrays of {}x{}, {} fft/ifft pairs",
        args.arrays, args.size, args.size, args.pairs
    );

    let mode = if args.cooperative {
        ExecutionMode::Cooperative
    } else {
        ExecutionMode::Threaded
    };
    let config = PipelineConfig::new()
        .with_default_capacity(args.capacity)
        .with_mode(mode);

    let mut pipeline = Pipeline::new().with_config(config);

    let size = args.size;
    let ones = (0..args.arrays)
        .map(move |_| Array2::from_elem((size, size), Complex32::new(1.0, 0.0)));
    pipeline.add(SourceBlock::new("ones", ones), PortMap::from([("out_1", 0)]))?;

    for i in 0..args.pairs {
        pipeline.add(
            Fft2Block::forward(format!("fft2_{}", i)),
            PortMap::from([("in_1", 2 * i), ("out_1", 2 * i + 1)]),
        )?;
        pipeline.add(
            Fft2Block::inverse(format!("ifft2_{}", i)),
            PortMap::from([("in_1", 2 * i + 1), ("out_1", 2 * i + 2)]),
        )?;
    }

    pipeline.add(
        ArrayPrinter::new(args.arrays),
        PortMap::from([("in_1", 2 * args.pairs)]),
    )?;

    info!("Running {:?}...", mode);
    let start = Instant::now();
    let report = pipeline.run()?;
    let elapsed = start.elapsed();

    print!("{}", report);
    info!("Done in {:.3?}", elapsed);

    Ok(())
}
