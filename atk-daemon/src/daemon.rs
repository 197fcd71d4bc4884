//! Daemon control loop
//!
//! Single cooperative task that owns the session. Suspends only at channel
//! receives and the timer tick; command handlers run to completion before
//! the next message is taken, so responses go out in dispatch order.

use atk_common::protocol::Request;
use crate::engine::EngineNotice;
use crate::ipc::Outbound;
use crate::session::Session;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

pub struct Daemon {
    session: Session,
    req_rx: mpsc::Receiver<Request>,
    notices: mpsc::UnboundedReceiver<EngineNotice>,
    outbound: Outbound,
    shutdown: Arc<Notify>,
}

impl Daemon {
    pub fn new(
        session: Session,
        req_rx: mpsc::Receiver<Request>,
        notices: mpsc::UnboundedReceiver<EngineNotice>,
        outbound: Outbound,
        shutdown: Arc<Notify>,
    ) -> Self {
        Self {
            session,
            req_rx,
            notices,
            outbound,
            shutdown,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run until shutdown is requested (signal or `shutdown` command).
    pub async fn run(&mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("Shutdown requested");
                    break;
                }
                request = self.req_rx.recv() => match request {
                    Some(request) => {
                        debug!("Dispatching {} ({})", request.cmd, request.id);
                        let response = self.session.handle_request(request).await;
                        self.outbound.send_response(&response).await;
                    }
                    None => {
                        warn!("Request channel closed");
                        break;
                    }
                },
                notice = self.notices.recv() => match notice {
                    Some(EngineNotice::TrackEnded) => self.session.handle_track_end().await,
                    None => {
                        warn!("Engine notice channel closed");
                        break;
                    }
                },
                _ = ticker.tick() => self.session.tick(),
            }
        }
    }
}
