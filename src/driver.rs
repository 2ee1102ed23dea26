//! Light-pen device: wires the edge clock, decoder and sessions together
//!
//! [`LightPen::start`] validates the configuration, creates both endpoint
//! channels, subscribes the light-pen and vsync lines on the edge clock and
//! returns the running device. [`LightPen::shutdown`] (or dropping it)
//! unsubscribes, wakes every blocked reader with `Closed` and refuses further
//! sessions.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use tracing::{error, info};

use crate::config::Config;
use crate::nodes::{DecoderStats, EdgeCallback, EdgeClock, PositionDecoder};
use crate::runtime::{Endpoint, OpenError, Session, SessionManager, Watchdog};

/// A running light pen
pub struct LightPen {
    config: Config,
    clock: Arc<dyn EdgeClock>,
    sessions: SessionManager,
    decoder: Arc<PositionDecoder>,
    /// Set first during shutdown; edge callbacks return immediately once set.
    unloading: Arc<AtomicBool>,
    watchdog: Option<Watchdog>,
    watchdog_thread: Mutex<Option<JoinHandle<()>>>,
}

impl LightPen {
    /// Validate `config`, subscribe both edge lines and start decoding.
    ///
    /// On error nothing stays subscribed.
    pub fn start(config: Config, clock: Arc<dyn EdgeClock>) -> crate::Result<Self> {
        if let Err(e) = config.validate(&*clock) {
            error!("Invalid configuration: {}", e);
            return Err(e.into());
        }

        let watchdog = config.read_stall_warning.map(Watchdog::new);
        let mut sessions = SessionManager::new();
        if let Some(wd) = &watchdog {
            sessions = sessions.with_watchdog(wd.clone());
        }

        // The decoder only borrows the light-pen channel; the vsync channel is never written.
        let decoder = Arc::new(PositionDecoder::new(
            &config,
            Arc::clone(&clock),
            sessions.channel(Endpoint::LightPen),
        ));
        let unloading = Arc::new(AtomicBool::new(false));

        let on_light_pen: EdgeCallback = {
            let decoder = Arc::clone(&decoder);
            let unloading = Arc::clone(&unloading);
            Arc::new(move |timestamp_us: u64| {
                if !unloading.load(Ordering::Acquire) {
                    decoder.on_light_pen(timestamp_us);
                }
            })
        };
        let on_vsync: EdgeCallback = {
            let decoder = Arc::clone(&decoder);
            let unloading = Arc::clone(&unloading);
            Arc::new(move |timestamp_us: u64| {
                if !unloading.load(Ordering::Acquire) {
                    decoder.on_vsync(timestamp_us);
                }
            })
        };

        clock.subscribe(config.light_pen_line, on_light_pen)?;
        if let Err(e) = clock.subscribe(config.vsync_line, on_vsync) {
            clock.unsubscribe(config.light_pen_line);
            return Err(e.into());
        }

        for (role, line) in config.lines() {
            info!("Line {} allocated for {}", line, role);
        }
        info!(
            "Light pen started: line length {}us, debounce {}us",
            config.line_length_us, config.debounce_us
        );

        let watchdog_thread = watchdog.as_ref().map(|wd| {
            info!(
                "Watchdog enabled - will report reads blocked >{:.1}s",
                wd.threshold().as_secs_f64()
            );
            wd.start_monitoring_thread()
        });

        Ok(Self {
            config,
            clock,
            sessions,
            decoder,
            unloading,
            watchdog,
            watchdog_thread: Mutex::new(watchdog_thread),
        })
    }

    /// Open an exclusive session on `endpoint`
    pub fn open(&self, endpoint: Endpoint) -> Result<Session, OpenError> {
        if self.unloading.load(Ordering::Acquire) {
            return Err(OpenError::ShutDown);
        }
        self.sessions.open(endpoint)
    }

    /// Configuration the device was started with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether a vsync edge has been seen since start
    pub fn is_synced(&self) -> bool {
        self.decoder.is_synced()
    }

    /// Light-pen edge counters
    pub fn stats(&self) -> DecoderStats {
        self.decoder.stats()
    }

    /// Stop decoding and tear down both endpoints. Idempotent.
    pub fn shutdown(&self) {
        if self.unloading.swap(true, Ordering::AcqRel) {
            return;
        }

        self.clock.unsubscribe(self.config.light_pen_line);
        self.clock.unsubscribe(self.config.vsync_line);
        info!(
            "Released lines {} and {}",
            self.config.light_pen_line, self.config.vsync_line
        );

        self.sessions.shutdown();

        if let Some(wd) = &self.watchdog {
            wd.stop();
        }
        let watchdog_thread = self
            .watchdog_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = watchdog_thread {
            let _ = handle.join();
        }

        let stats = self.decoder.stats();
        info!(
            "Light pen shut down: {} samples from {} edges \
             ({} debounced, {} wrong field, {} before sync)",
            stats.accepted,
            stats.light_pen_edges(),
            stats.debounced,
            stats.wrong_parity,
            stats.unsynced
        );
    }
}

impl Drop for LightPen {
    fn drop(&mut self) {
        self.shutdown();
    }
}
