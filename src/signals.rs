//! Routes OS signals delivered to the executor itself into the same
//! finalization path as a normal exit, so the executor's own death never
//! orphans an in-flight child.

use nix::sys::signal::Signal;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

use crate::driver::OrchestratorClient;
use crate::supervisor::Supervisor;

/// Signals routed to the finalization path.
const ROUTED_SIGNALS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGTERM,
    Signal::SIGABRT,
    Signal::SIGPIPE,
    Signal::SIGSEGV,
];

/// Exit code convention for signal-triggered exits.
pub fn exit_code(signum: i32) -> i32 {
    128 + signum
}

/// Install a listener per routed signal. On receipt, the supervisor's
/// finalization runs with exit code `128 + n`, which triggers the
/// termination coordinator before the process exits.
///
/// A signal the registry refuses to hook (SIGSEGV cannot be handled
/// safely from here) is logged and left unrouted; the rest still are.
pub fn install_signal_router<C: OrchestratorClient>(supervisor: Supervisor<C>) {
    for sig in ROUTED_SIGNALS {
        let mut stream = match signal(SignalKind::from_raw(sig as i32)) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(signal = sig.as_str(), error = %e, "Could not install handler, signal will not be routed");
                continue;
            }
        };

        let supervisor = supervisor.clone();
        tokio::spawn(async move {
            if stream.recv().await.is_some() {
                info!(signal = sig.as_str(), "Received signal, initiating shutdown");
                supervisor.finalize_from_signal(sig as i32).await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_exits_use_128_plus_signal_number() {
        assert_eq!(exit_code(Signal::SIGINT as i32), 130);
        assert_eq!(exit_code(Signal::SIGTERM as i32), 143);
    }

    #[test]
    fn routed_signals_cover_the_contract() {
        assert!(ROUTED_SIGNALS.contains(&Signal::SIGINT));
        assert!(ROUTED_SIGNALS.contains(&Signal::SIGTERM));
        assert!(ROUTED_SIGNALS.contains(&Signal::SIGABRT));
        assert!(ROUTED_SIGNALS.contains(&Signal::SIGPIPE));
        assert!(ROUTED_SIGNALS.contains(&Signal::SIGSEGV));
    }
}
