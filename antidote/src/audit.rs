//! The audit engine: decides, for each decoded observation, whether the
//! traffic pattern warrants an operator alert.
//!
//! Rules, in order: age check (stale records are evicted at lookup and
//! re-seeded by the evicting observation), MAC bookkeeping on replies
//! (first-reply pinning, change detection, Ethernet/ARP cross-check),
//! counter update, and finally the request/reply imbalance verdict. A
//! stale record never feeds the imbalance verdict.

use tracing::debug;

use crate::alert::{AlertSink, Severity};
use crate::config::Options;
use crate::error::Error;
use crate::table::{IpRecord, IpTable};
use crate::wire::{ArpObservation, ArpOp, UNKNOWN_MAC, format_mac};

/// Owns the state table and applies the rule set to each observation.
pub struct Auditor {
    table: IpTable,
}

impl Default for Auditor {
    fn default() -> Self {
        Auditor::new()
    }
}

impl Auditor {
    pub fn new() -> Self {
        Auditor {
            table: IpTable::new(),
        }
    }

    /// Read-only view of the state table, for the debug dump.
    pub fn table(&self) -> &IpTable {
        &self.table
    }

    /// Run one observation through the rule set. `now` is wall-clock
    /// seconds. `Err(OutOfMemory)` means the observation was dropped and
    /// the table is unchanged; the caller decides how loudly to complain.
    pub fn observe(
        &mut self,
        obs: &ArpObservation,
        now: u64,
        opts: &Options,
        sink: &mut dyn AlertSink,
    ) -> Result<(), Error> {
        let key = match obs.op {
            // requests file under the asked-about address,
            // replies under the claimed sender
            ArpOp::Request => obs.target_ip,
            ArpOp::Reply => obs.sender_ip,
            ArpOp::Other => {
                sink.alert(
                    Severity::Notice,
                    "Unrecognised ARP type detected (RARP not currently supported)",
                );
                return Ok(());
            }
        };

        // Stale records are dropped the moment they are next examined;
        // the observation that drops one re-seeds the address fresh.
        self.table.evict_if_expired(key, now, opts.timeout);

        if self.table.lookup(key).is_none() {
            let mac = match obs.op {
                ArpOp::Reply => obs.sender_mac_eth,
                _ => UNKNOWN_MAC,
            };
            self.table.insert(key, mac, now)?;
            debug!(ip = %key, "tracking new address");
        }
        let Some(record) = self.table.lookup(key) else {
            return Ok(());
        };

        if obs.op == ArpOp::Reply {
            if record.mac == UNKNOWN_MAC {
                // first reply from this address pins its MAC
                record.mac = obs.sender_mac_eth;
            } else if check_mac_change(record, obs, opts, sink).is_err() {
                record.mac = obs.sender_mac_eth;
            }
            if obs.sender_mac_eth != obs.sender_mac_arp {
                sink.alert(
                    Severity::Highest,
                    &format!(
                        "{} gives conflicting MAC details. Ethernet MAC: {} ARP body MAC: {}",
                        key,
                        format_mac(&obs.sender_mac_eth),
                        format_mac(&obs.sender_mac_arp)
                    ),
                );
            }
        }

        match obs.op {
            ArpOp::Request => record.requests += 1,
            ArpOp::Reply => record.replies += 1,
            ArpOp::Other => {}
        }

        // The eager eviction above is the age check: by this point the
        // record is either freshly seeded or younger than the timeout,
        // so only current counters reach the imbalance verdict.
        let net = record.replies as i64 - record.requests as i64;
        if net > opts.poison_threshold {
            sink.alert(
                Severity::Highest,
                &format!("Suspected poisoner impersonating IP address: {key}"),
            );
        } else if net < opts.badnet_threshold {
            sink.alert(
                Severity::Highest,
                &format!("An unusual number of ARP requests for {key} have not been replied to"),
            );
        }
        if net > opts.poison_threshold || net < opts.badnet_threshold {
            record.requests = 0;
            record.replies = 0;
            record.last_reset = now;
        }
        Ok(())
    }
}

/// Compare the stored MAC against the ARP body's sender hardware
/// address. `Err(MacChanged)` tells the caller the stored MAC is out of
/// date; the alert itself only fires when change checking is enabled.
fn check_mac_change(
    record: &IpRecord,
    obs: &ArpObservation,
    opts: &Options,
    sink: &mut dyn AlertSink,
) -> Result<(), Error> {
    if record.mac != obs.sender_mac_arp {
        if opts.check_mac_changes {
            sink.alert(
                Severity::Highest,
                &format!(
                    "{} has different MAC details. Previous MAC: {} New MAC: {}",
                    record.ip,
                    format_mac(&record.mac),
                    format_mac(&obs.sender_mac_arp)
                ),
            );
        }
        return Err(Error::MacChanged);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use smoltcp::wire::{EthernetAddress, Ipv4Address};

    #[derive(Default)]
    struct Recorder {
        alerts: Vec<(Severity, String)>,
    }

    impl AlertSink for Recorder {
        fn alert(&mut self, severity: Severity, message: &str) {
            self.alerts.push((severity, message.to_string()));
        }
    }

    const IP: Ipv4Address = Ipv4Address::new(10, 0, 0, 9);
    const MAC: EthernetAddress = EthernetAddress([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]);
    const MAC2: EthernetAddress = EthernetAddress([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x02]);

    fn reply(mac: EthernetAddress) -> ArpObservation {
        ArpObservation {
            op: ArpOp::Reply,
            sender_mac_eth: mac,
            sender_mac_arp: mac,
            sender_ip: IP,
            target_ip: Ipv4Address::UNSPECIFIED,
        }
    }

    fn request(target: Ipv4Address) -> ArpObservation {
        ArpObservation {
            op: ArpOp::Request,
            sender_mac_eth: MAC,
            sender_mac_arp: MAC,
            sender_ip: Ipv4Address::new(10, 0, 0, 250),
            target_ip: target,
        }
    }

    #[test]
    fn test_identical_replies_never_fire_change_alert() {
        let opts = Options::default();
        let mut auditor = Auditor::new();
        let mut rec = Recorder::default();

        auditor.observe(&reply(MAC), 0, &opts, &mut rec).unwrap();
        auditor.observe(&reply(MAC), 1, &opts, &mut rec).unwrap();
        assert!(rec.alerts.is_empty());
        assert_eq!(auditor.table().get(IP).unwrap().replies, 2);
    }

    #[test]
    fn test_request_seeds_unknown_mac_then_reply_pins_it() {
        let opts = Options::default();
        let mut auditor = Auditor::new();
        let mut rec = Recorder::default();

        auditor.observe(&request(IP), 0, &opts, &mut rec).unwrap();
        assert_eq!(auditor.table().get(IP).unwrap().mac, UNKNOWN_MAC);

        auditor.observe(&reply(MAC), 1, &opts, &mut rec).unwrap();
        let record = auditor.table().get(IP).unwrap();
        assert_eq!(record.mac, MAC);
        assert_eq!(record.requests, 1);
        assert_eq!(record.replies, 1);
        assert!(rec.alerts.is_empty());
    }

    #[test]
    fn test_mac_change_alert_carries_both_macs() {
        let opts = Options::default();
        let mut auditor = Auditor::new();
        let mut rec = Recorder::default();

        auditor.observe(&reply(MAC), 0, &opts, &mut rec).unwrap();
        auditor.observe(&reply(MAC2), 1, &opts, &mut rec).unwrap();

        assert_eq!(rec.alerts.len(), 1);
        let (severity, message) = &rec.alerts[0];
        assert_eq!(*severity, Severity::Highest);
        assert!(message.contains("different MAC details"));
        assert!(message.contains("aa:bb:cc:dd:ee:01"));
        assert!(message.contains("aa:bb:cc:dd:ee:02"));
        assert_eq!(auditor.table().get(IP).unwrap().mac, MAC2);
    }

    #[test]
    fn test_mac_change_disabled_updates_silently() {
        let opts = Options {
            check_mac_changes: false,
            ..Options::default()
        };
        let mut auditor = Auditor::new();
        let mut rec = Recorder::default();

        auditor.observe(&reply(MAC), 0, &opts, &mut rec).unwrap();
        auditor.observe(&reply(MAC2), 1, &opts, &mut rec).unwrap();

        assert!(rec.alerts.is_empty());
        assert_eq!(auditor.table().get(IP).unwrap().mac, MAC2);
    }

    #[test]
    fn test_poison_threshold_is_strict() {
        let opts = Options::default();
        let mut auditor = Auditor::new();
        let mut rec = Recorder::default();

        // net == 10 after the 10th reply: nothing fires
        for _ in 0..10 {
            auditor.observe(&reply(MAC), 0, &opts, &mut rec).unwrap();
        }
        assert!(rec.alerts.is_empty());

        // 11th pushes net to 11 > 10
        auditor.observe(&reply(MAC), 0, &opts, &mut rec).unwrap();
        assert_eq!(rec.alerts.len(), 1);
        assert!(rec.alerts[0].1.contains("Suspected poisoner"));

        // counters were reset together
        let record = auditor.table().get(IP).unwrap();
        assert_eq!(record.requests, 0);
        assert_eq!(record.replies, 0);
    }

    #[test]
    fn test_badnet_threshold_is_strict() {
        let opts = Options::default();
        let mut auditor = Auditor::new();
        let mut rec = Recorder::default();
        let target = Ipv4Address::new(10, 0, 0, 4);

        for _ in 0..10 {
            auditor.observe(&request(target), 0, &opts, &mut rec).unwrap();
        }
        assert!(rec.alerts.is_empty());

        auditor.observe(&request(target), 0, &opts, &mut rec).unwrap();
        assert_eq!(rec.alerts.len(), 1);
        assert!(rec.alerts[0].1.contains("have not been replied to"));
        assert_eq!(auditor.table().get(target).unwrap().requests, 0);
    }

    #[test]
    fn test_rarp_observation_is_a_notice() {
        let opts = Options::default();
        let mut auditor = Auditor::new();
        let mut rec = Recorder::default();
        let obs = ArpObservation {
            op: ArpOp::Other,
            ..reply(MAC)
        };

        auditor.observe(&obs, 0, &opts, &mut rec).unwrap();
        assert_eq!(rec.alerts.len(), 1);
        assert_eq!(rec.alerts[0].0, Severity::Notice);
        assert!(rec.alerts[0].1.contains("RARP"));
        assert!(auditor.table().is_empty());
    }

    #[test]
    fn test_last_reset_moves_forward_on_threshold_reset() {
        let opts = Options::default();
        let mut auditor = Auditor::new();
        let mut rec = Recorder::default();

        for t in 0..11 {
            auditor.observe(&reply(MAC), t, &opts, &mut rec).unwrap();
        }
        assert_eq!(auditor.table().get(IP).unwrap().last_reset, 10);
    }
}
