//! nss and data-ready lines over the GPIO character device
//!
//! nss is an output that idles high; asserting it drives the line low.
//! data-ready is an input read on demand. Line I/O errors are logged and
//! data-ready then reads as low, so a broken line stalls the channel
//! instead of producing garbage.

use crate::error::{LinuxBusError, Result};

use bufspi_core::flow::FlowControlLine;

use gpiocdev::line::{Offset, Value};
use gpiocdev::request::{Config, Request};

/// GPIO lines used for flow control
pub struct LinuxGpioLines {
    request: Request,
    nss: Offset,
    data_ready: Offset,
    selected: bool,
}

impl LinuxGpioLines {
    /// Request the nss and data-ready lines on a GPIO chip
    pub fn open(chip: &str, nss: Offset, data_ready: Offset) -> Result<Self> {
        if nss == data_ready {
            return Err(LinuxBusError::InvalidParameter(format!(
                "nss and drdy must be different lines (both {})",
                nss
            )));
        }

        log::debug!("linux_gpio: Opening {}", chip);

        let mut req_config = Config::default();
        req_config.with_line(nss).as_output(Value::Active); // nss starts high (inactive)
        req_config.with_line(data_ready).as_input();

        let request = Request::from_config(req_config)
            .on_chip(chip)
            .with_consumer("bufspi")
            .request()
            .map_err(|e| LinuxBusError::LineRequestFailed {
                path: chip.to_string(),
                source: e,
            })?;

        log::info!(
            "linux_gpio: Opened {} (nss={}, drdy={})",
            chip,
            nss,
            data_ready
        );

        Ok(Self {
            request,
            nss,
            data_ready,
            selected: false,
        })
    }

    fn set_nss(&mut self, value: Value) {
        if let Err(e) = self.request.set_value(self.nss, value) {
            log::error!("linux_gpio: Failed to set nss: {}", e);
        }
    }
}

impl FlowControlLine for LinuxGpioLines {
    fn assert_select(&mut self) {
        self.set_nss(Value::Inactive);
        self.selected = true;
    }

    fn deassert_select(&mut self) {
        self.set_nss(Value::Active);
        self.selected = false;
    }

    fn is_selected(&self) -> bool {
        self.selected
    }

    fn peer_has_data(&mut self) -> bool {
        match self.request.value(self.data_ready) {
            Ok(value) => value == Value::Active,
            Err(e) => {
                log::error!("linux_gpio: Failed to read drdy: {}", e);
                false
            }
        }
    }
}
