//! Process termination signals.

use anyhow::{Context, Result};

/// Signals that stop the node: Ctrl+C everywhere, SIGTERM on unix.
///
/// Handlers are registered in [`ShutdownSignal::install`], so a signal that
/// arrives before [`ShutdownSignal::recv`] is polled is not lost.
pub struct ShutdownSignal {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    /// Register the signal handlers.
    pub fn install() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("Failed to listen for SIGTERM")?,
        })
    }

    /// Wait for the first stop signal; returns its name.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> Result<&'static str> {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl+C")?;
                Ok("SIGINT")
            }
            _ = self.terminate.recv() => Ok("SIGTERM"),
        }
    }

    /// Wait for the first stop signal; returns its name.
    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> Result<&'static str> {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        Ok("Ctrl+C")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn sigterm_is_a_stop_signal() {
        let mut signal = ShutdownSignal::install().unwrap();

        let status = std::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let name = tokio::time::timeout(Duration::from_secs(5), signal.recv())
            .await
            .expect("SIGTERM was not delivered")
            .unwrap();
        assert_eq!(name, "SIGTERM");
    }
}
