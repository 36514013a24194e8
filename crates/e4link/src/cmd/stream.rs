use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use e4link_session::{
    connect_with_config, slot_layout, PromptSelector, SampleSink, SessionOutcome,
    StreamDescription,
};
use e4link_transport::E4Stream;

use crate::cmd::StreamArgs;
use crate::exit::{session_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS};
use crate::output::{OutputFormat, SamplePrinter};

/// Prints every sample and raises the stop flag once `limit` is reached.
struct PrintSink {
    printer: SamplePrinter,
    limit: Option<u64>,
    printed: u64,
    stop: Arc<AtomicBool>,
}

impl SampleSink for PrintSink {
    fn has_active_subscriber(&self) -> bool {
        !self.stop.load(Ordering::SeqCst)
    }

    fn stream_started(&mut self, description: &StreamDescription) {
        self.printer.set_device(Some(description.serial.clone()));
    }

    fn publish(&mut self, values: &[f64], timestamp: f64) {
        self.printer.print(values, timestamp);
        self.printed = self.printed.saturating_add(1);
        if self.limit.is_some_and(|limit| self.printed >= limit) {
            self.stop.store(true, Ordering::SeqCst);
        }
    }
}

pub fn run(args: StreamArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.session_config()?;
    let mut session = connect_with_config(&args.server.addr, &config)
        .map_err(|err| session_error("connect failed", err))?;

    let stop = Arc::new(AtomicBool::new(false));
    let shutdown = session
        .shutdown_handle()
        .map_err(|err| session_error("connect failed", err))?;
    install_ctrlc_handler(stop.clone(), shutdown)?;

    let mut sink = PrintSink {
        printer: SamplePrinter::new(format, &slot_layout()),
        limit: args.count,
        printed: 0,
        stop: stop.clone(),
    };
    let mut selector = PromptSelector::stdio();

    let outcome = session.run(&mut sink, &mut selector, &stop);
    let stats = session.stats();
    tracing::info!(
        frames = stats.frames,
        published = stats.samples_published,
        decode_errors = stats.decode_errors,
        unrecognized = stats.unrecognized,
        "session finished"
    );

    match outcome {
        Ok(SessionOutcome::Stopped) => Ok(SUCCESS),
        Ok(SessionOutcome::NoDevicesFound) => {
            Err(CliError::new(FAILURE, "server reported no devices"))
        }
        Err(err) => Err(session_error("stream failed", err)),
    }
}

fn install_ctrlc_handler(stop: Arc<AtomicBool>, stream: E4Stream) -> CliResult<()> {
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
        // Unblocks the pending read.
        let _ = stream.shutdown();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
