//! Push-style progress and status notifications for controllers.

use crossbeam::channel::Sender;
use log::{debug, info};

use crate::collectors::status::ModuleStatus;

/// Receives progress and status changes from running modules.
///
/// Calls happen on the acquisition worker thread; implementations must be
/// cheap and must not block on the controller.
#[cfg_attr(test, mockall::automock)]
pub trait ProgressSink: Send + Sync {
    /// New progress value in percent, in `[0, 100]`.
    fn progress(&self, module: &str, percent: f64);

    /// The module's status changed.
    fn status_changed(&self, module: &str, status: ModuleStatus, percent: f64);
}

/// Writes notifications to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgressSink;

impl ProgressSink for LogProgressSink {
    fn progress(&self, module: &str, percent: f64) {
        debug!("{}: {:.2}%", module, percent);
    }

    fn status_changed(&self, module: &str, status: ModuleStatus, percent: f64) {
        info!("{}: {} ({:.2}%)", module, status, percent);
    }
}

/// Notification forwarded over a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleEvent {
    Progress {
        module: String,
        percent: f64,
    },
    StatusChanged {
        module: String,
        status: ModuleStatus,
        percent: f64,
    },
}

/// Forwards notifications to a controller thread over a crossbeam channel.
///
/// A disconnected receiver is ignored; acquisition never depends on the
/// controller being present.
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    sender: Sender<ModuleEvent>,
}

impl ChannelProgressSink {
    pub fn new(sender: Sender<ModuleEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn progress(&self, module: &str, percent: f64) {
        let _ = self.sender.send(ModuleEvent::Progress {
            module: module.to_string(),
            percent,
        });
    }

    fn status_changed(&self, module: &str, status: ModuleStatus, percent: f64) {
        let _ = self.sender.send(ModuleEvent::StatusChanged {
            module: module.to_string(),
            status,
            percent,
        });
    }
}
