use crate::prelude::*;

use tokio::time::MissedTickBehavior;

/// Ticks the coordinator at the configured poll interval.
pub struct Scheduler {
    config: ConfigWrapper,
    channels: Channels,
}

impl Scheduler {
    pub fn new(config: ConfigWrapper, channels: Channels) -> Self {
        Self { config, channels }
    }

    pub async fn start(&self) -> Result<()> {
        let period = self.config.bms().poll_interval();
        let mut interval = tokio::time::interval(period);
        // a slow cycle pushes the next one back rather than bursting
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut shutdown = self.channels.to_coordinator.subscribe();

        info!("polling every {}s", period.as_secs());

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self
                        .channels
                        .to_coordinator
                        .send(coordinator::ChannelData::Poll)
                        .is_err()
                    {
                        bail!("send(to_coordinator) failed - channel closed?");
                    }
                }
                message = shutdown.recv() => {
                    use tokio::sync::broadcast::error::RecvError;
                    match message {
                        Ok(coordinator::ChannelData::Shutdown) | Err(RecvError::Closed) => break,
                        _ => {}
                    }
                }
            }
        }

        debug!("scheduler stopped");
        Ok(())
    }
}
