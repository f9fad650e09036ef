use super::{KioskApp, ShutdownReason};
use crate::error::{KioskError, Result};
use crate::events::KioskEvent;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

type SharedShutdown = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

impl KioskApp {
    /// Run until a signal, a quit request or the controller ends, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("Kiosk is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| KioskError::system("Shutdown sender already taken"))?;
        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| KioskError::system("Shutdown receiver already taken"))?;

        let shutdown_sender: SharedShutdown = Arc::new(Mutex::new(Some(shutdown_sender)));
        self.setup_signal_handlers(&shutdown_sender);
        self.watch_shutdown_requests(&shutdown_sender);

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| KioskError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Kiosk shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self, shutdown_sender: &SharedShutdown) {
        #[cfg(unix)]
        {
            let sender = Arc::clone(shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate())
                {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    send_shutdown(&sender, ShutdownReason::Signal("SIGTERM".to_string())).await;
                }
            });
        }

        let sender = Arc::clone(shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                send_shutdown(&sender, ShutdownReason::Signal("SIGINT".to_string())).await;
            }
        });
    }

    /// Quit requests on the event bus and a controller that stopped on its own
    fn watch_shutdown_requests(&self, shutdown_sender: &SharedShutdown) {
        let sender = Arc::clone(shutdown_sender);
        let mut events = self.event_bus.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(KioskEvent::ShutdownRequested { reason, .. }) => {
                        send_shutdown(&sender, ShutdownReason::UserRequest(reason)).await;
                        break;
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let sender = Arc::clone(shutdown_sender);
        let exited = self.controller_exited.clone();
        tokio::spawn(async move {
            exited.cancelled().await;
            send_shutdown(&sender, ShutdownReason::ControllerExited).await;
        });
    }
}

async fn send_shutdown(sender: &SharedShutdown, reason: ShutdownReason) {
    if let Some(sender) = sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}
