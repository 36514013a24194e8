//! Connect to a streaming server, subscribe to two channels and print the
//! first samples.
//!
//! Run with:
//!   cargo run --example stream-samples -- 127.0.0.1:28000

use std::sync::atomic::AtomicBool;

use e4link::session::{
    connect_with_config, Channel, ChannelSpec, NoSelector, SampleSink, SessionConfig,
};

struct Printer {
    remaining: usize,
    stop: &'static AtomicBool,
}

impl SampleSink for Printer {
    fn publish(&mut self, values: &[f64], timestamp: f64) {
        println!("{timestamp:.3} {values:?}");
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.stop.store(true, std::sync::atomic::Ordering::Relaxed);
        }
    }
}

static STOP: AtomicBool = AtomicBool::new(false);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:28000".to_string());

    let config = SessionConfig {
        channels: ChannelSpec::new([Channel::Bvp, Channel::Gsr]).ok_or("no channels")?,
        ..SessionConfig::default()
    };
    let mut session = connect_with_config(&addr, &config)?;
    eprintln!("Connected to {addr}");

    let mut sink = Printer {
        remaining: 20,
        stop: &STOP,
    };
    let outcome = session.run(&mut sink, &mut NoSelector, &STOP)?;
    eprintln!("Session ended: {outcome:?}, stats: {:?}", session.stats());
    Ok(())
}
