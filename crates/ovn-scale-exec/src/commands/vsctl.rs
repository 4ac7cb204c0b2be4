//! `ovs-vsctl` verbs.

use super::db::{self, ColumnValue, DbValue};
use super::Command;

/// `[--may-exist] add-port <bridge> <port>`
pub fn add_port(bridge: &str, port: &str, may_exist: bool) -> Command {
    Command::new("add-port")
        .opt_if(may_exist, "--may-exist")
        .args([bridge, port])
}

/// `--if-exists del-port <port>`
pub fn del_port(port: &str) -> Command {
    Command::new("del-port").opt("--if-exists").arg(port)
}

/// Tag an interface as bound to logical port `port` and bring it up,
/// optionally as an internal interface.
pub fn bind_interface(port: &str, internal: bool) -> Command {
    let mut values = vec![
        ColumnValue::eq(
            "external_ids",
            DbValue::Map(vec![
                ("iface-id".to_string(), port.into()),
                ("iface-status".to_string(), "active".into()),
            ]),
        ),
        ColumnValue::eq("admin_state", "up"),
    ];
    if internal {
        values.push(ColumnValue::eq("type", "internal"));
    }
    db::set("Interface", port, &values)
}

/// Names of internal interfaces on the switch.
pub fn find_internal_interfaces() -> Command {
    db::find("Interface", &["name"], &[ColumnValue::eq("type", "internal")])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_port() {
        assert_eq!(
            add_port("br-int", "lp_1", true).render(),
            "--may-exist add-port br-int lp_1"
        );
        assert_eq!(add_port("br-int", "lp_1", false).render(), "add-port br-int lp_1");
    }

    #[test]
    fn test_bind_interface() {
        assert_eq!(
            bind_interface("lp_1", false).render(),
            "set Interface lp_1 external_ids:iface-id=lp_1 \
             external_ids:iface-status=active admin_state=up"
        );
        assert!(bind_interface("lp_1", true).render().ends_with(" type=internal"));
    }
}
