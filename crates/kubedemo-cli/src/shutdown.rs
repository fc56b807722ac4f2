//! Interrupt handling
//!
//! The first SIGINT/SIGTERM sets the run's cancellation flag; the
//! orchestrator notices it at the next phase boundary, dumps status and
//! stops background helpers. A second signal kills the helpers and exits
//! immediately.

use kubedemo_core::{CancellationFlag, ProcessRegistry, SharedReporter};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{info, warn};

use crate::exit_codes;

/// Forward every SIGINT or SIGTERM (Ctrl+C elsewhere) until the receiver is gone
async fn forward_signals(tx: UnboundedSender<&'static str>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "could not install signal handlers");
                    return;
                }
            };

        loop {
            let name = tokio::select! {
                Some(()) = sigterm.recv() => "SIGTERM",
                Some(()) = sigint.recv() => "SIGINT",
                else => return,
            };
            if tx.send(name).is_err() {
                return;
            }
        }
    }

    #[cfg(not(unix))]
    {
        loop {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "could not install Ctrl+C handler");
                return;
            }
            if tx.send("Ctrl+C").is_err() {
                return;
            }
        }
    }
}

/// React to the signals arriving on `signals`
///
/// Returns true when a second signal asked for an immediate exit; the
/// tracked processes are already terminated at that point.
async fn escalate(
    signals: &mut UnboundedReceiver<&'static str>,
    flag: &CancellationFlag,
    reporter: &SharedReporter,
    processes: &ProcessRegistry,
) -> bool {
    let Some(first) = signals.recv().await else {
        return false;
    };
    info!(signal = first, "received signal");
    flag.cancel();
    reporter.warn(
        "Interrupt received, stopping after the current phase (interrupt again to force)",
    );

    let Some(second) = signals.recv().await else {
        return false;
    };
    info!(signal = second, "received second signal");
    reporter.error("Interrupted again, exiting now");
    for label in processes.terminate_all().await {
        reporter.info(&format!("Stopped {}", label));
    }
    true
}

/// Cancel `flag` on the first signal; kill `processes` and exit on the second
pub fn cancel_on_signal(
    flag: CancellationFlag,
    reporter: SharedReporter,
    processes: ProcessRegistry,
) -> tokio::task::JoinHandle<()> {
    let (tx, mut rx) = unbounded_channel();
    tokio::spawn(forward_signals(tx));
    tokio::spawn(async move {
        if escalate(&mut rx, &flag, &reporter, &processes).await {
            std::process::exit(exit_codes::ERROR);
        }
    })
}
