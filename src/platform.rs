//! # Platform Services
//!
//! The state machine needs a wall clock, the device's network address (shown
//! on the configuration splash) and a configuration server it can start and
//! stop. These sit behind [`Platform`] and [`ConfigPortal`].
//!
//! On the host, the configuration "server" is the config file itself:
//! [`FileConfigPortal`] watches `bcp-clock.toml` while it runs and reports a
//! save as soon as the file changes on disk.

use chrono::{DateTime, Utc};
use log::{debug, info};
use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::path::PathBuf;
use std::time::SystemTime;

/// Wall clock and network identity
pub trait Platform {
    fn now(&self) -> DateTime<Utc>;

    /// Dotted address shown on the configuration splash
    fn network_address(&self) -> String;
}

/// Configuration server with a saved flag
pub trait ConfigPortal {
    /// Start serving; starting a running portal is a no-op
    fn start(&mut self) -> io::Result<()>;

    fn stop(&mut self);

    /// Return and clear the saved flag
    fn take_saved(&mut self) -> bool;
}

/// The real system clock and primary IPv4 address
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemPlatform;

impl SystemPlatform {
    /// Address of the interface that routes to the internet.
    ///
    /// Connecting a UDP socket sends nothing, it only selects a route.
    fn primary_address() -> io::Result<IpAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        Ok(socket.local_addr()?.ip())
    }
}

impl Platform for SystemPlatform {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn network_address(&self) -> String {
        match Self::primary_address() {
            Ok(ip) => ip.to_string(),
            Err(e) => {
                debug!("No route to determine local address: {e}");
                Ipv4Addr::LOCALHOST.to_string()
            }
        }
    }
}

/// Config file watcher standing in for the configuration web form
pub struct FileConfigPortal {
    path: PathBuf,
    /// Modification time seen at start or at the last reported save
    seen: Option<Option<SystemTime>>,
}

impl FileConfigPortal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seen: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.seen.is_some()
    }

    fn modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok()
    }
}

impl ConfigPortal for FileConfigPortal {
    fn start(&mut self) -> io::Result<()> {
        if self.is_running() {
            return Ok(());
        }
        self.seen = Some(self.modified());
        info!(
            "Configuration portal open: edit {} to reconfigure",
            self.path.display()
        );
        Ok(())
    }

    fn stop(&mut self) {
        if self.seen.take().is_some() {
            info!("Configuration portal closed");
        }
    }

    fn take_saved(&mut self) -> bool {
        let Some(seen) = self.seen else {
            return false;
        };
        let current = self.modified();
        if current.is_some() && current != seen {
            self.seen = Some(current);
            info!("Configuration saved to {}", self.path.display());
            return true;
        }
        false
    }
}
