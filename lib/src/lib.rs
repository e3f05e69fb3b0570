// Copyright (c) 2024 The ledger-ergo-rs Authors

//! Ergo Ledger API Library
//!
//! Host-side client for the [Ledger Ergo application](https://github.com/LedgerHQ/app-ergo):
//! device discovery, USB HID and speculos TCP transports, and a typed
//! [DeviceHandle] covering every app operation including the box
//! attestation and transaction signing flows.
//!
//! ```no_run
//! use ledger_ergo::{DeviceHandle, Filter, LedgerProvider};
//!
//! # fn main() -> Result<(), ledger_ergo::Error> {
//! let provider = LedgerProvider::new()?;
//! let devices = provider.list_devices(Filter::Any);
//!
//! let handle = DeviceHandle::from(provider.connect(&devices[0])?);
//! println!("app version: {}", handle.app_version()?);
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "transport_hid")]
use std::sync::{Arc, Mutex};

#[cfg(feature = "transport_hid")]
use hidapi::{DeviceInfo, HidApi};

/// Re-export transports for consumer use
pub mod transport;
use transport::*;

/// Re-export `ledger-ergo-apdu` for consumers
pub use ledger_ergo_apdu as apdu;

mod handle;
pub use handle::DeviceHandle;

mod error;
pub use error::Error;

/// Ledger USB vendor id
pub const LEDGER_VENDOR_ID: u16 = 0x2c97;

/// Known Ledger USB product ids and model names
pub const LEDGER_PRODUCT_IDS: &[(u16, &str)] = &[
    (0x0011, "Ledger Blue"),
    (0x1011, "Ledger Nano S"),
    (0x4011, "Ledger Nano X"),
    (0x5011, "Ledger Nano S Plus"),
    (0x6011, "Ledger Stax"),
    (0x7011, "Ledger Flex"),
];

/// Check whether a vendor/product id pair is a known Ledger device.
/// Product ids are matched on their upper byte, the lower byte varies
/// with the active USB interface.
pub fn is_ledger_device(vendor_id: u16, product_id: u16) -> bool {
    vendor_id == LEDGER_VENDOR_ID
        && LEDGER_PRODUCT_IDS
            .iter()
            .any(|(id, _)| id & 0xff00 == product_id & 0xff00)
}

/// Fetch the model name for a product id, if known
pub fn product_name(product_id: u16) -> Option<&'static str> {
    LEDGER_PRODUCT_IDS
        .iter()
        .find(|(id, _)| id & 0xff00 == product_id & 0xff00)
        .map(|(_, name)| *name)
}

/// Ledger provider manages ledger device discovery and connections
pub struct LedgerProvider {
    #[cfg(feature = "transport_hid")]
    hid_api: Arc<Mutex<HidApi>>,
}

/// Device discovery filter
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::Display)]
#[non_exhaustive]
pub enum Filter {
    /// List all devices available using supported transports
    Any,
    /// List only HID devices
    Hid,
    /// List only TCP (speculos) devices
    Tcp,
}

/// Ledger device information for listing, used by connect
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum LedgerInfo {
    #[cfg(feature = "transport_hid")]
    Hid(DeviceInfo),
    #[cfg(feature = "transport_tcp")]
    Tcp(TcpOptions),
}

impl LedgerProvider {
    /// Create a new ledger provider.
    /// NOTE: only one provider may exist at a time (workaround for
    /// global HID context errors on macos/m1)
    pub fn new() -> Result<Self, Error> {
        #[cfg(feature = "transport_hid")]
        return Ok(Self {
            hid_api: Arc::new(Mutex::new(
                HidApi::new().map_err(TransportError::from)?,
            )),
        });

        #[cfg(not(feature = "transport_hid"))]
        return Ok(Self {});
    }

    /// List available ledger devices
    pub fn list_devices(&self, filter: Filter) -> Vec<LedgerInfo> {
        let mut devices = vec![];

        #[cfg(feature = "transport_hid")]
        if filter == Filter::Any || filter == Filter::Hid {
            let mut api = self.hid_api.lock().unwrap_or_else(|e| e.into_inner());

            // Ignore enumeration errors, a stale list is still usable
            let _ = api.refresh_devices();

            for d in api.device_list() {
                if is_ledger_device(d.vendor_id(), d.product_id()) {
                    devices.push(LedgerInfo::Hid(d.clone()));
                }
            }
        }

        #[cfg(feature = "transport_tcp")]
        if filter == Filter::Any || filter == Filter::Tcp {
            // Probe the default speculos port
            let o = TcpOptions::default();
            if std::net::TcpStream::connect(o.socket_addr()).is_ok() {
                devices.push(LedgerInfo::Tcp(o));
            }
        }

        log::debug!("Found {} devices: {:?}", devices.len(), devices);

        devices
    }

    /// Connect to a listed device, returning an opened transport
    pub fn connect(&self, info: &LedgerInfo) -> Result<GenericTransport, Error> {
        let t: GenericTransport = match info {
            #[cfg(feature = "transport_hid")]
            LedgerInfo::Hid(d) => {
                HidTransport::new(self.hid_api.clone(), d.path().to_owned()).into()
            }
            #[cfg(feature = "transport_tcp")]
            LedgerInfo::Tcp(o) => SpeculosTransport::new(*o).into(),
        };

        t.open()?;

        Ok(t)
    }
}

/// Generic ledger device handle (abstract over transport types)
pub type GenericHandle = DeviceHandle<GenericTransport>;

impl GenericHandle {
    /// Create a new generic device handle
    pub fn new(d: impl Into<GenericTransport>) -> Self {
        Self::from(d.into())
    }
}

impl std::fmt::Display for LedgerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "transport_hid")]
            LedgerInfo::Hid(hid_info) => {
                write!(
                    f,
                    "{:16} (USB, {:04x}:{:04x})",
                    product_name(hid_info.product_id()).unwrap_or("UNKNOWN"),
                    hid_info.vendor_id(),
                    hid_info.product_id(),
                )
            }
            #[cfg(feature = "transport_tcp")]
            LedgerInfo::Tcp(tcp_info) => {
                write!(f, "{:16} (TCP, {}:{})", "Speculos", tcp_info.addr, tcp_info.port)
            }
        }
    }
}
