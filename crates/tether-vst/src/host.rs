//! Callbacks into the host application.

use tether_core::position::TimeInfo;

/// Host side of the wrapper.
///
/// Every method is called from the context that drives the corresponding
/// wrapper entry point: [`Host::time_info`] and [`Host::io_changed`] from the
/// render context, [`Host::size_window`] from the UI context.
pub trait Host {
    /// Current transport information, or `None` if the host cannot provide
    /// it right now.
    fn time_info(&self) -> Option<TimeInfo>;

    /// The plugin's I/O configuration or latency changed.
    fn io_changed(&mut self) {}

    /// Ask the host to resize the editor window. Returns `true` if accepted.
    fn size_window(&mut self, _width: i32, _height: i32) -> bool {
        false
    }
}

/// Host that reports no transport and ignores notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {
    fn time_info(&self) -> Option<TimeInfo> {
        None
    }
}
