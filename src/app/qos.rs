//! IPv4 LPM forwarding for the QoS topology. s1 and s3 reach each other
//! through port 4.

use super::{default_switches, entry};
use crate::config::{Entry, RuleSet};
use crate::util::value::*;

fn ipv4_forward(
    switch: &str,
    dst_eth_addr: &str,
    dst_ip_addr: &str,
    port: u32,
    prefix_len: i32,
) -> Entry {
    entry(
        switch,
        flow! {
            table = "MyIngress.ipv4_lpm";
            key = { "hdr.ipv4.dstAddr" => lpm(dst_ip_addr, prefix_len) };
            action = "MyIngress.ipv4_forward";
            params = { "port" => port, "dstAddr" => dst_eth_addr };
        },
    )
}

pub fn rule_set() -> RuleSet {
    RuleSet {
        switches: default_switches(),
        entries: vec![
            ipv4_forward("s2", "08:00:00:00:03:00", "10.0.3.0", 4, 24),
            ipv4_forward("s2", "08:00:00:00:01:00", "10.0.1.0", 3, 24),
            ipv4_forward("s2", "08:00:00:00:02:22", "10.0.2.22", 1, 32),
            ipv4_forward("s2", "08:00:00:00:02:02", "10.0.2.2", 2, 32),
            ipv4_forward("s1", "08:00:00:00:01:11", "10.0.1.11", 1, 32),
            ipv4_forward("s1", "08:00:00:00:01:01", "10.0.1.1", 2, 32),
            ipv4_forward("s1", "08:00:00:00:02:00", "10.0.2.0", 3, 24),
            ipv4_forward("s1", "08:00:00:00:03:00", "10.0.3.0", 4, 24),
            ipv4_forward("s3", "08:00:00:00:03:03", "10.0.3.3", 1, 32),
            ipv4_forward("s3", "08:00:00:00:01:00", "10.0.1.0", 2, 24),
            ipv4_forward("s3", "08:00:00:00:02:00", "10.0.2.0", 3, 24),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2_entries_are_written_first() {
        let rules = rule_set();
        assert_eq!(rules.entries.len(), 11);
        let switches: Vec<&str> = rules.entries.iter().map(|e| e.switch.as_str()).collect();
        assert_eq!(&switches[..4], &["s2"; 4]);
        assert_eq!(&switches[4..8], &["s1"; 4]);
        assert_eq!(&switches[8..], &["s3"; 3]);
    }
}
