//! Fetch drivers for pulso.
//!
//! - [`HttpDriver`]: `simple-http`, one GET per call via reqwest
//! - [`BrowserDriver`]: `rendered-browser`, headless Chrome via chromiumoxide
//!   (behind the `render` feature)

pub mod fetch;
#[cfg(feature = "render")]
pub mod render;

use std::sync::Arc;

use pulso_core::{AppConfig, DriverSet, Error};

pub use fetch::{FetchConfig, HttpDriver};
#[cfg(feature = "render")]
pub use render::{BrowserDriver, RenderError, RenderOptions};

/// Drivers enabled by `config`.
///
/// `simple-http` is always installed; `rendered-browser` only when the
/// `render` feature is compiled in and `render_enabled` is set.
pub fn default_drivers(config: &AppConfig) -> Result<DriverSet, Error> {
    let mut drivers = DriverSet::new().with(Arc::new(HttpDriver::from_config(config)?));
    if config.render_enabled {
        drivers = with_browser(drivers);
    }

    tracing::debug!(available = ?drivers.available(), "installed fetch drivers");
    Ok(drivers)
}

#[cfg(feature = "render")]
fn with_browser(drivers: DriverSet) -> DriverSet {
    drivers.with(Arc::new(BrowserDriver::default()))
}

#[cfg(not(feature = "render"))]
fn with_browser(drivers: DriverSet) -> DriverSet {
    tracing::warn!("render_enabled is set but the render feature is not compiled in");
    drivers
}
