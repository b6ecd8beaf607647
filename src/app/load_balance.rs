//! ECMP load balancing: `ecmp_group` picks a hash range per destination,
//! `ecmp_nhop` maps the hash to a next hop, `send_frame` rewrites the source
//! MAC on egress.

use super::{default_switches, entry};
use crate::config::{Entry, RuleSet};
use crate::util::value::*;

fn ecmp_group(switch: &str, dst_ip_addr: &str, ecmp_count: u32) -> Entry {
    entry(
        switch,
        flow! {
            table = "MyIngress.ecmp_group";
            key = { "hdr.ipv4.dstAddr" => lpm(dst_ip_addr, 32) };
            action = "MyIngress.set_ecmp_select";
            params = { "ecmp_base" => 0u32, "ecmp_count" => ecmp_count };
        },
    )
}

fn ecmp_nhop(
    switch: &str,
    ecmp_select: u32,
    nhop_dmac: &str,
    nhop_ipv4: &str,
    port: u32,
) -> Entry {
    entry(
        switch,
        flow! {
            table = "MyIngress.ecmp_nhop";
            key = { "meta.ecmp_select" => exact(ecmp_select) };
            action = "MyIngress.set_nhop";
            params = { "port" => port, "nhop_dmac" => nhop_dmac, "nhop_ipv4" => nhop_ipv4 };
        },
    )
}

fn send_frame(switch: &str, egress_port: u32, smac: &str) -> Entry {
    entry(
        switch,
        flow! {
            table = "MyEgress.send_frame";
            key = { "standard_metadata.egress_port" => exact(egress_port) };
            action = "MyEgress.rewrite_mac";
            params = { "smac" => smac };
        },
    )
}

pub fn rule_set() -> RuleSet {
    RuleSet {
        switches: default_switches(),
        entries: vec![
            ecmp_group("s1", "10.0.0.1", 2),
            ecmp_group("s2", "10.0.2.2", 1),
            ecmp_group("s3", "10.0.3.3", 1),
            ecmp_nhop("s1", 0, "00:00:00:00:01:02", "10.0.2.2", 2),
            ecmp_nhop("s1", 1, "00:00:00:00:01:03", "10.0.3.3", 3),
            ecmp_nhop("s2", 0, "00:00:00:00:02:02", "10.0.2.2", 1),
            ecmp_nhop("s3", 0, "00:00:00:00:03:03", "10.0.3.3", 1),
            send_frame("s1", 2, "00:00:00:01:02:00"),
            send_frame("s1", 3, "00:00:00:01:03:00"),
            send_frame("s2", 1, "00:00:00:02:01:00"),
            send_frame("s3", 1, "00:00:00:03:01:00"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_come_before_next_hops_and_egress_rewrites() {
        let rules = rule_set();
        assert_eq!(rules.entries.len(), 11);
        let tables: Vec<&str> = rules
            .entries
            .iter()
            .map(|e| e.flow.table.name.as_str())
            .collect();
        assert_eq!(&tables[..3], &["MyIngress.ecmp_group"; 3]);
        assert_eq!(&tables[3..7], &["MyIngress.ecmp_nhop"; 4]);
        assert_eq!(&tables[7..], &["MyEgress.send_frame"; 4]);
        assert_eq!(rules.entries_for("s1").count(), 5);
    }
}
