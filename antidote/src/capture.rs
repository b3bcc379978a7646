//! Live capture: interface selection, BPF filtering and the observation
//! loop.
//!
//! Single-threaded and blocking by design. One frame is dequeued, driven
//! through decode → audit → alert to completion, and only then is the
//! next frame read. Initialization failures are fatal and map to
//! distinct error kinds; read timeouts just continue the loop.

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use pcap::{Active, Capture, Device};
use tracing::{debug, info, warn};

use crate::alert::{AlertSink, Severity};
use crate::audit::Auditor;
use crate::config::Options;
use crate::error::Error;
use crate::wire;

/// Kernel read timeout in milliseconds. Old libpcap releases reject -1,
/// so a short positive timeout it is.
const READ_TIMEOUT_MS: i32 = 10;

/// An open, filtered capture handle.
pub struct CaptureDriver {
    capture: Capture<Active>,
}

impl CaptureDriver {
    /// Open the configured interface and install the ARP filter.
    pub fn open(opts: &Options) -> Result<Self, Error> {
        let device = select_device(&opts.device)?;
        // The compiled filter ignores them, but an interface that cannot
        // report its network and mask is not usable for live capture.
        let (network, netmask) = lookup_net(&device)?;
        debug!(device = %device.name, %network, %netmask, "capture interface selected");

        let mut capture = Capture::from_device(device)
            .map_err(Error::InterfaceOpen)?
            .promisc(opts.promiscuous)
            .timeout(READ_TIMEOUT_MS)
            .open()
            .map_err(Error::InterfaceOpen)?;
        capture
            .compile(&opts.bpf_filter, true)
            .map_err(Error::FilterCompile)?;
        capture
            .filter(&opts.bpf_filter, true)
            .map_err(Error::FilterInstall)?;

        info!(filter = %opts.bpf_filter, promiscuous = opts.promiscuous, "capture started");
        Ok(CaptureDriver { capture })
    }

    /// Block on the capture, feeding each frame through the audit
    /// engine. Returns only on a fatal capture failure.
    pub fn run(
        mut self,
        auditor: &mut Auditor,
        opts: &Options,
        sink: &mut dyn AlertSink,
    ) -> Result<(), Error> {
        loop {
            match self.capture.next_packet() {
                Ok(packet) => {
                    let obs = wire::decode(packet.data);
                    if let Err(err) = auditor.observe(&obs, unix_now(), opts, sink) {
                        match err {
                            // drop the observation, keep watching
                            Error::OutOfMemory => {
                                sink.alert(Severity::Highest, "Out of memory for IP details");
                            }
                            other => return Err(other),
                        }
                    }
                    if let Some(path) = &opts.dump_file {
                        if let Err(e) = auditor.table().dump_to_file(Path::new(path)) {
                            warn!(error = %e, path = %path, "state dump failed");
                        }
                    }
                }
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(pcap::Error::NoMorePackets) => return Err(Error::EndOfFile),
                Err(e) => {
                    warn!(error = %e, "capture read failed");
                    return Err(Error::EndOfFile);
                }
            }
        }
    }
}

/// Named interface, or the first non-loopback one when the name is empty.
fn select_device(name: &str) -> Result<Device, Error> {
    let devices = Device::list().map_err(|_| Error::InterfaceLookup)?;
    if name.is_empty() {
        devices
            .into_iter()
            .find(|device| !device.flags.is_loopback())
            .ok_or(Error::InterfaceLookup)
    } else {
        devices
            .into_iter()
            .find(|device| device.name == name)
            .ok_or(Error::InterfaceLookup)
    }
}

/// First IPv4 address/netmask pair the interface reports.
fn lookup_net(device: &Device) -> Result<(Ipv4Addr, Ipv4Addr), Error> {
    device
        .addresses
        .iter()
        .find_map(|address| match (address.addr, address.netmask) {
            (std::net::IpAddr::V4(addr), Some(std::net::IpAddr::V4(mask))) => Some((addr, mask)),
            _ => None,
        })
        .ok_or(Error::NetworkLookup)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
