//! Process-wide GCS state and the link manager
//!
//! # Initialization order
//!
//! 1. [`GcsShared`] (queues and configuration), once per process
//! 2. [`Gcs`] with the vehicle, then one [`GcsLink`] per channel via
//!    [`Gcs::add_link`]
//! 3. [`spawn_background_worker`] with the parameter store and the FTP file
//!    system; it publishes the parameter count when created
//!
//! Links run in the real-time context and never touch the store or the file
//! system. The background worker never touches a link.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use mavlink::common::{MavMessage, MavResult};
use mavlink::MavHeader;

use crate::communication::mavlink::handlers::ftp::{FileSystem, FtpService, FtpWorker, MAX_FTP_CHANNELS};
use crate::communication::mavlink::handlers::param::ParamQueue;
use crate::communication::mavlink::link::GcsLink;
use crate::communication::mavlink::transport::LinkTransport;
use crate::communication::mavlink::vehicle::VehicleCapabilities;
use crate::config::{GcsConfig, LinkConfig};
use crate::core::traits::TimeSource;
use crate::error::GcsError;
use crate::parameters::ParameterStore;
use crate::{log_error, log_info};

/// Parameter requests resolved per background pass
pub const PARAM_REQUESTS_PER_PASS: usize = 10;

/// FTP worker steps per background pass
pub const FTP_STEPS_PER_PASS: usize = 8;

/// State shared by every link and the background worker
pub struct GcsShared {
    config: GcsConfig,
    params: ParamQueue,
    ftp: Arc<FtpService>,
}

impl GcsShared {
    pub fn new(config: GcsConfig) -> Self {
        let params = ParamQueue::new(config.allow_param_set);
        Self {
            config,
            params,
            ftp: Arc::new(FtpService::new()),
        }
    }

    pub fn config(&self) -> &GcsConfig {
        &self.config
    }

    pub fn params(&self) -> &ParamQueue {
        &self.params
    }

    pub fn ftp(&self) -> &Arc<FtpService> {
        &self.ftp
    }
}

/// Owner of all GCS links
pub struct Gcs<V: VehicleCapabilities> {
    shared: Arc<GcsShared>,
    vehicle: Arc<V>,
    links: Vec<GcsLink<V>>,
}

impl<V: VehicleCapabilities> Gcs<V> {
    pub fn new(config: GcsConfig, vehicle: Arc<V>) -> Self {
        log_info!(
            "GCS sysid {} compid {} for {}",
            config.system_id,
            config.component_id,
            vehicle.name()
        );
        Self {
            shared: Arc::new(GcsShared::new(config)),
            vehicle,
            links: Vec::new(),
        }
    }

    pub fn shared(&self) -> &Arc<GcsShared> {
        &self.shared
    }

    pub fn vehicle(&self) -> &Arc<V> {
        &self.vehicle
    }

    /// Add a link; channels are numbered in the order links are added.
    ///
    /// # Returns
    ///
    /// The new link's channel, or `GcsError::TooManyLinks`.
    pub fn add_link<T>(&mut self, config: LinkConfig, transport: T) -> Result<u8, GcsError>
    where
        T: LinkTransport + 'static,
    {
        let max = self.shared.config().max_links.min(MAX_FTP_CHANNELS);
        if self.links.len() >= max {
            return Err(GcsError::TooManyLinks { max });
        }

        let channel = self.links.len() as u8;
        self.links.push(GcsLink::new(
            channel,
            config,
            Box::new(transport),
            Arc::clone(&self.vehicle),
            Arc::clone(&self.shared),
        ));
        Ok(channel)
    }

    pub fn links(&self) -> &[GcsLink<V>] {
        &self.links
    }

    pub fn link(&self, channel: u8) -> Option<&GcsLink<V>> {
        self.links.get(usize::from(channel))
    }

    pub fn link_mut(&mut self, channel: u8) -> Option<&mut GcsLink<V>> {
        self.links.get_mut(usize::from(channel))
    }

    /// Route an inbound message to the link it arrived on
    pub fn handle_message(
        &mut self,
        channel: u8,
        header: &MavHeader,
        message: &MavMessage,
        now_ms: u64,
    ) -> Result<Option<MavResult>, GcsError> {
        let link = self
            .link_mut(channel)
            .ok_or(GcsError::NoSuchLink(channel))?;
        Ok(link.handle_message(header, message, now_ms))
    }

    /// Tick every link
    pub fn update_send<T: TimeSource>(&mut self, time: &T) {
        for link in &mut self.links {
            link.update_send(time);
        }
    }
}

/// Parameter resolution and FTP execution, off the real-time path
pub struct BackgroundWorker<S: ParameterStore, F: FileSystem> {
    shared: Arc<GcsShared>,
    store: S,
    ftp: FtpWorker<F>,
}

impl<S: ParameterStore, F: FileSystem> BackgroundWorker<S, F> {
    pub fn new(shared: Arc<GcsShared>, store: S, fs: F) -> Self {
        let ftp = FtpWorker::new(Arc::clone(shared.ftp()), fs)
            .with_session_timeout(shared.config().ftp_session_timeout_ms);
        shared.params().set_param_count(store.count());
        Self { shared, store, ftp }
    }

    /// One bounded pass over both queues.
    ///
    /// # Returns
    ///
    /// `true` if any work was done.
    pub fn run_once(&mut self, now_ms: u64) -> bool {
        let served = self
            .shared
            .params()
            .service_requests(&mut self.store, PARAM_REQUESTS_PER_PASS);

        let mut ftp_busy = false;
        for _ in 0..FTP_STEPS_PER_PASS {
            if !self.ftp.poll(now_ms) {
                break;
            }
            ftp_busy = true;
        }
        served > 0 || ftp_busy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ftp(&self) -> &FtpWorker<F> {
        &self.ftp
    }
}

/// Running background worker thread; stopped on drop
pub struct BackgroundHandle {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundHandle {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the worker and wait for it to exit
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log_error!("GCS background worker panicked");
            }
        }
    }
}

impl Drop for BackgroundHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Run a [`BackgroundWorker`] on its own thread.
///
/// The worker loops while it finds work and sleeps `idle_period` when both
/// queues are empty.
pub fn spawn_background_worker<S, F, T>(
    shared: Arc<GcsShared>,
    store: S,
    fs: F,
    time: T,
    idle_period: Duration,
) -> io::Result<BackgroundHandle>
where
    S: ParameterStore + 'static,
    F: FileSystem + 'static,
    T: TimeSource + 'static,
{
    let running = Arc::new(AtomicBool::new(true));
    let running_loop = Arc::clone(&running);
    let mut worker = BackgroundWorker::new(shared, store, fs);

    let handle = thread::Builder::new()
        .name("gcs-background".into())
        .spawn(move || {
            while running_loop.load(Ordering::SeqCst) {
                if !worker.run_once(time.now_ms()) {
                    thread::sleep(idle_period);
                }
            }
        })?;
    log_info!("GCS background worker started");

    Ok(BackgroundHandle {
        running,
        handle: Some(handle),
    })
}
