//! `ovs-ofctl` verbs.

use super::Command;

/// `dump-flows <bridge>`
pub fn dump_flows(bridge: &str) -> Command {
    Command::new("dump-flows").arg(bridge)
}

/// Count flow entries in `dump-flows` output, skipping the reply header.
pub fn count_flows(output: &str) -> usize {
    output
        .lines()
        .filter(|line| line.contains("actions="))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_count_flows() {
        let out = "NXST_FLOW reply (xid=0x4):\n \
                   cookie=0x0, duration=1.2s, table=0, priority=100,in_port=1 actions=resubmit(,8)\n \
                   cookie=0x0, duration=1.2s, table=8, priority=0 actions=drop\n";
        assert_eq!(count_flows(out), 2);
        assert_eq!(count_flows(""), 0);
    }

    #[test]
    fn test_dump_flows() {
        assert_eq!(dump_flows("br-int").render(), "dump-flows br-int");
    }
}
