use serde::Serialize;
use tokio_serial::{SerialPortBuilderExt, SerialPortType, SerialStream};
use tracing::{error, info};

use super::link::LineLink;
use crate::error::{AcquisitionError, Result};

/// A serial port as seen by the device scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortInfo {
    pub name: String,
    pub manufacturer: Option<String>,
    pub description: Option<String>,
}

impl PortInfo {
    pub fn new(name: impl Into<String>, manufacturer: Option<&str>) -> Self {
        Self {
            name: name.into(),
            manufacturer: manufacturer.map(String::from),
            description: None,
        }
    }
}

impl From<&tokio_serial::SerialPortInfo> for PortInfo {
    fn from(info: &tokio_serial::SerialPortInfo) -> Self {
        let (manufacturer, description) = match &info.port_type {
            SerialPortType::UsbPort(usb) => (usb.manufacturer.clone(), usb.product.clone()),
            _ => (None, None),
        };
        Self {
            // This is necessary on linux
            name: info.port_name.replace("/sys/class/tty/", "/dev/"),
            manufacturer,
            description,
        }
    }
}

pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = tokio_serial::available_ports().map_err(|source| {
        AcquisitionError::PortUnavailable {
            port: "(port scan)".to_string(),
            source,
        }
    })?;
    Ok(ports.iter().map(PortInfo::from).collect())
}

/// Picks the first port whose USB manufacturer is one of `manufacturers`
/// (case-insensitive).
pub fn select_device<'a>(ports: &'a [PortInfo], manufacturers: &[String]) -> Result<&'a PortInfo> {
    info!(
        "Available ports: {:?}",
        ports
            .iter()
            .map(|p| (p.name.as_str(), p.manufacturer.as_deref().unwrap_or("?")))
            .collect::<Vec<_>>()
    );

    let found = ports.iter().find(|port| {
        port.manufacturer.as_deref().is_some_and(|m| {
            manufacturers
                .iter()
                .any(|wanted| wanted.eq_ignore_ascii_case(m.trim()))
        })
    });

    match found {
        Some(port) => {
            info!(
                "Port successfully located: {} ({}, {})",
                port.name,
                port.manufacturer.as_deref().unwrap_or_default(),
                port.description.as_deref().unwrap_or("no description")
            );
            Ok(port)
        }
        None => {
            error!("EPG device could not be found among {} port(s)", ports.len());
            Err(AcquisitionError::DeviceNotFound {
                scanned: ports.len(),
            })
        }
    }
}

/// Opens `port` for read/write line traffic.
pub fn open_port(port: &PortInfo, baud_rate: u32) -> Result<LineLink<SerialStream>> {
    info!("Opening serial port {} at {} baud", port.name, baud_rate);

    let unavailable = |source| AcquisitionError::PortUnavailable {
        port: port.name.clone(),
        source,
    };

    #[allow(unused_mut)]
    let mut stream = tokio_serial::new(&port.name, baud_rate)
        .open_native_async()
        .map_err(unavailable)?;

    #[cfg(unix)]
    stream.set_exclusive(false).map_err(unavailable)?;

    Ok(LineLink::new(stream))
}

/// Scans, selects and opens the acquisition device.
pub fn open_device(
    manufacturers: &[String],
    baud_rate: u32,
) -> Result<(PortInfo, LineLink<SerialStream>)> {
    info!("Setting up serial...");
    let ports = list_ports()?;
    let port = select_device(&ports, manufacturers)?.clone();
    let link = open_port(&port, baud_rate)?;
    Ok((port, link))
}
