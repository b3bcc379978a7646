//! Per-IP observation state.
//!
//! The table is the only mutable state in the monitor. It owns every
//! record; the audit engine gets transient borrows that end with the
//! observation being processed. Records age out lazily: there is no
//! background sweeper, an expired record is dropped when next examined.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use smoltcp::wire::{EthernetAddress, Ipv4Address};

use crate::error::Error;
use crate::wire::format_mac;

/// Everything the monitor remembers about one IPv4 address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpRecord {
    pub ip: Ipv4Address,
    /// Known MAC for this address, or [`crate::wire::UNKNOWN_MAC`] until
    /// a reply pins it.
    pub mac: EthernetAddress,
    /// ARP requests naming this address as target since the last reset.
    pub requests: u64,
    /// ARP replies naming this address as sender since the last reset.
    pub replies: u64,
    /// Wall-clock second of creation or last counter reset.
    pub last_reset: u64,
}

/// Outcome of an age check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eviction {
    Kept,
    Evicted,
}

/// In-memory set of [`IpRecord`]s keyed by address.
#[derive(Debug, Default)]
pub struct IpTable {
    records: HashMap<Ipv4Address, IpRecord>,
}

impl IpTable {
    pub fn new() -> Self {
        IpTable {
            records: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Read-only view of one record.
    pub fn get(&self, ip: Ipv4Address) -> Option<&IpRecord> {
        self.records.get(&ip)
    }

    pub fn lookup(&mut self, ip: Ipv4Address) -> Option<&mut IpRecord> {
        self.records.get_mut(&ip)
    }

    /// Create a record for `ip` with zeroed counters and `last_reset = now`.
    /// Keeps the existing record when one is already present; `ip` is
    /// unique across the table.
    pub fn insert(
        &mut self,
        ip: Ipv4Address,
        mac: EthernetAddress,
        now: u64,
    ) -> Result<&mut IpRecord, Error> {
        self.records.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
        Ok(self.records.entry(ip).or_insert(IpRecord {
            ip,
            mac,
            requests: 0,
            replies: 0,
            last_reset: now,
        }))
    }

    /// Drop the record for `ip` when its age exceeds `timeout` seconds.
    /// The comparison is strict: a record exactly `timeout` old is kept.
    pub fn evict_if_expired(&mut self, ip: Ipv4Address, now: u64, timeout: u64) -> Eviction {
        let expired = match self.records.get(&ip) {
            Some(record) => now.saturating_sub(record.last_reset) > timeout,
            None => false,
        };
        if expired {
            self.records.remove(&ip);
            Eviction::Evicted
        } else {
            Eviction::Kept
        }
    }

    /// Debug dump: header plus one row per record, MAC as colon-separated
    /// hex, IP as dotted decimal, last reset as seconds since the epoch.
    pub fn dump_csv<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "\"IP Address\",\"MAC Address\",\"Requests\",\"Replies\",\"Last Reset\""
        )?;
        for record in self.records.values() {
            writeln!(
                out,
                "\"{}\",\"{}\",{},{},{}",
                record.ip,
                format_mac(&record.mac),
                record.requests,
                record.replies,
                record.last_reset
            )?;
        }
        Ok(())
    }

    pub fn dump_to_file(&self, path: &Path) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        self.dump_csv(&mut out)?;
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::UNKNOWN_MAC;

    const IP: Ipv4Address = Ipv4Address::new(10, 0, 0, 1);
    const MAC: EthernetAddress = EthernetAddress([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]);

    #[test]
    fn test_insert_then_lookup() {
        let mut table = IpTable::new();
        assert!(table.lookup(IP).is_none());

        table.insert(IP, MAC, 100).unwrap();
        let record = table.lookup(IP).unwrap();
        assert_eq!(record.ip, IP);
        assert_eq!(record.mac, MAC);
        assert_eq!(record.requests, 0);
        assert_eq!(record.replies, 0);
        assert_eq!(record.last_reset, 100);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_insert_existing_keeps_record() {
        let mut table = IpTable::new();
        table.insert(IP, MAC, 100).unwrap();
        table.lookup(IP).unwrap().replies = 3;

        table.insert(IP, UNKNOWN_MAC, 200).unwrap();
        let record = table.get(IP).unwrap();
        assert_eq!(record.mac, MAC);
        assert_eq!(record.replies, 3);
        assert_eq!(record.last_reset, 100);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_eviction_boundary_is_strict() {
        let mut table = IpTable::new();
        table.insert(IP, MAC, 0).unwrap();

        // exactly timeout old: kept
        assert_eq!(table.evict_if_expired(IP, 1500, 1500), Eviction::Kept);
        assert!(table.get(IP).is_some());

        // one second past: evicted
        assert_eq!(table.evict_if_expired(IP, 1501, 1500), Eviction::Evicted);
        assert!(table.get(IP).is_none());

        // absent records have nothing to evict
        assert_eq!(table.evict_if_expired(IP, 9999, 1500), Eviction::Kept);
    }

    #[test]
    fn test_dump_csv_format() {
        let mut table = IpTable::new();
        table.insert(IP, MAC, 42).unwrap();
        table.lookup(IP).unwrap().requests = 2;
        table.lookup(IP).unwrap().replies = 5;

        let mut out = Vec::new();
        table.dump_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "\"IP Address\",\"MAC Address\",\"Requests\",\"Replies\",\"Last Reset\""
        );
        assert_eq!(
            lines.next().unwrap(),
            "\"10.0.0.1\",\"aa:bb:cc:dd:ee:01\",2,5,42"
        );
        assert!(lines.next().is_none());
    }
}
