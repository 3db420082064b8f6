//! Periodic background refresh.
//!
//! One task per [`AggregationLayer`]. It ticks at the configured period
//! while the application is active and runs the refresh chain strictly in
//! sequence. Period changes arrive through the config `watch` channel;
//! teardown arrives through the shutdown channel and also interrupts a
//! running chain.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::ReelSyncConfig;

use super::AggregationLayer;

fn ticker(period: Option<Duration>, active: bool) -> Option<Interval> {
    let period = period.filter(|_| active)?;
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Resolves on the next change; pends forever once the sender is gone.
async fn next_change<T>(rx: &mut Option<watch::Receiver<T>>) {
    let Some(receiver) = rx.as_mut() else {
        return std::future::pending().await;
    };
    if receiver.changed().await.is_err() {
        *rx = None;
        std::future::pending::<()>().await;
    }
}

pub(super) fn spawn(
    layer: Weak<AggregationLayer>,
    config_rx: watch::Receiver<ReelSyncConfig>,
    active_rx: watch::Receiver<bool>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut period = config_rx.borrow().background_period();
        let mut active = *active_rx.borrow();
        let mut config_rx = Some(config_rx);
        let mut active_rx = Some(active_rx);
        let mut interval = ticker(period, active);
        info!(?period, active, "background refresh started");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            tokio::select! {
                _ = shutdown_rx.changed() => break,
                () = next_change(&mut config_rx) => {
                    let next = config_rx.as_ref().and_then(|rx| rx.borrow().background_period());
                    if next != period {
                        info!(?next, "background refresh period changed");
                        period = next;
                        interval = ticker(period, active);
                    }
                }
                () = next_change(&mut active_rx) => {
                    let next = active_rx.as_ref().is_some_and(|rx| *rx.borrow());
                    if next != active {
                        debug!(active = next, "background refresh activity changed");
                        active = next;
                        interval = ticker(period, active);
                    }
                }
                () = next_tick(&mut interval) => {
                    let Some(layer) = layer.upgrade() else { break };
                    tokio::select! {
                        _ = shutdown_rx.changed() => break,
                        () = layer.background_tick() => {}
                    }
                }
            }
        }
        info!("background refresh stopped");
    })
}
