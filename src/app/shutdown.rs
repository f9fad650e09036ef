use super::{ComponentState, KioskApp};
use crate::error::{KioskError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

const KEYBOARD_STOP_TIMEOUT: Duration = Duration::from_secs(2);
const CONTROLLER_STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl KioskApp {
    /// Stop everything in reverse start order. Returns the process exit code.
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();
        let mut exit_code = 0;

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                let result = self
                    .stop_component("keyboard", KEYBOARD_STOP_TIMEOUT, keyboard_handler.stop())
                    .await;
                if let Err(e) = result {
                    error!("Error stopping keyboard: {}", e);
                    exit_code = 1;
                }
            }
        }

        if let Some(task) = self.controller_task.take() {
            let abort = task.abort_handle();
            let result = self
                .stop_component("controller", CONTROLLER_STOP_TIMEOUT, async {
                    task.await
                        .map_err(|e| KioskError::system(format!("Controller task failed: {}", e)))
                })
                .await;

            match result {
                Ok(controller) => self.controller = Some(controller),
                Err(e) => {
                    error!("Error stopping controller: {}", e);
                    abort.abort();
                    exit_code = 1;
                }
            }
        }

        if let Some(task) = self.logger_task.take() {
            if let Err(e) = task.await {
                error!("Event logger task failed: {}", e);
            }
            self.set_component_state("events", ComponentState::Stopped);
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_component<T, F>(&self, component: &str, limit: Duration, stop: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping);

        match timeout(limit, stop).await {
            Ok(Ok(value)) => {
                self.set_component_state(component, ComponentState::Stopped);
                info!("{} component stopped", component);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed);
                Err(e)
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed);
                Err(KioskError::system(format!("{} component stop timeout", component)))
            }
        }
    }
}
