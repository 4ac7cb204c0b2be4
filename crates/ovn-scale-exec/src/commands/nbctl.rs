//! `ovn-nbctl` verbs.

use super::db::{self, ColumnValue, DbValue};
use super::{quote, Command};

/// `ls-add <switch>`
pub fn ls_add(switch: &str) -> Command {
    Command::new("ls-add").arg(switch)
}

/// `--if-exists ls-del <switch>`
pub fn ls_del(switch: &str) -> Command {
    Command::new("ls-del").opt("--if-exists").arg(switch)
}

/// `ls-list`
pub fn ls_list() -> Command {
    Command::new("ls-list")
}

/// `lsp-add <switch> <port>`
pub fn lsp_add(switch: &str, port: &str) -> Command {
    Command::new("lsp-add").args([switch, port])
}

/// `--if-exists lsp-del <port>`
pub fn lsp_del(port: &str) -> Command {
    Command::new("lsp-del").opt("--if-exists").arg(port)
}

/// `lsp-list <switch>`
pub fn lsp_list(switch: &str) -> Command {
    Command::new("lsp-list").arg(switch)
}

/// Join the parts of one address entry with an escaped space, skipping
/// empty parts, so `["aa:..", "10.0.0.1"]` stays a single shell word.
fn address_entry(parts: &[&str]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\\ ")
}

/// `lsp-set-addresses <port> <entry>...`, each entry `mac\ ip...`.
pub fn lsp_set_addresses(port: &str, entries: &[&[&str]]) -> Command {
    Command::new("lsp-set-addresses")
        .arg(port)
        .args(entries.iter().map(|e| address_entry(e)))
}

/// `lsp-set-port-security <port> <entry>...`
pub fn lsp_set_port_security(port: &str, entries: &[&[&str]]) -> Command {
    Command::new("lsp-set-port-security")
        .arg(port)
        .args(entries.iter().map(|e| address_entry(e)))
}

/// `lsp-set-type <port> <type>`
pub fn lsp_set_type(port: &str, port_type: &str) -> Command {
    Command::new("lsp-set-type").args([port, port_type])
}

/// `lsp-set-options <port> <key=value>...`
pub fn lsp_set_options(port: &str, options: &[(&str, &str)]) -> Command {
    Command::new("lsp-set-options")
        .arg(port)
        .args(options.iter().map(|(k, v)| format!("{k}={v}")))
}

/// `lr-add <router>`
pub fn lr_add(router: &str) -> Command {
    Command::new("lr-add").arg(router)
}

/// `--if-exists lr-del <router>`
pub fn lr_del(router: &str) -> Command {
    Command::new("lr-del").opt("--if-exists").arg(router)
}

/// `lr-list`
pub fn lr_list() -> Command {
    Command::new("lr-list")
}

/// `lrp-add <router> <port> <mac> <network>...`
pub fn lrp_add(router: &str, port: &str, mac: &str, networks: &[&str]) -> Command {
    Command::new("lrp-add")
        .args([router, port, mac])
        .args(networks.iter().copied())
}

/// `lr-route-add <router> <prefix> <nexthop>`
pub fn lr_route_add(router: &str, prefix: &str, nexthop: &str) -> Command {
    Command::new("lr-route-add").args([router, prefix, nexthop])
}

/// `lr-policy-add <router> <priority> '<match>' <action> [<nexthop>]`
pub fn lr_policy_add(
    router: &str,
    priority: u32,
    matches: &str,
    action: &str,
    nexthop: Option<&str>,
) -> Command {
    Command::new("lr-policy-add")
        .arg(router)
        .arg(priority.to_string())
        .arg(quote(matches))
        .arg(action)
        .args(nexthop)
}

/// `lr-nat-add <router> <type> <external_ip> <logical_ip>`
pub fn lr_nat_add(router: &str, nat_type: &str, external_ip: &str, logical_ip: &str) -> Command {
    Command::new("lr-nat-add").args([router, nat_type, external_ip, logical_ip])
}

/// `[--log] acl-add <switch> <direction> <priority> '<match>' <action>`
pub fn acl_add(
    switch: &str,
    direction: &str,
    priority: u32,
    matches: &str,
    action: &str,
    log: bool,
) -> Command {
    Command::new("acl-add")
        .opt_if(log, "--log")
        .args([switch, direction])
        .arg(priority.to_string())
        .arg(quote(matches))
        .arg(action)
}

/// `acl-del <switch>`
pub fn acl_del(switch: &str) -> Command {
    Command::new("acl-del").arg(switch)
}

/// `acl-list <switch>`
pub fn acl_list(switch: &str) -> Command {
    Command::new("acl-list").arg(switch)
}

const ADDRESS_SET: &str = "Address_Set";

fn addresses(addrs: &[&str]) -> Vec<DbValue> {
    addrs.iter().map(|a| db::literal(a)).collect()
}

/// `create Address_Set name=<name> addresses=<addr>,...`
pub fn address_set_create(name: &str, addrs: &[&str]) -> Command {
    db::create(
        ADDRESS_SET,
        &[
            ColumnValue::eq("name", db::literal(name)),
            ColumnValue::eq("addresses", DbValue::List(addresses(addrs))),
        ],
    )
}

/// `add Address_Set <name> addresses <addr>...`
pub fn address_set_add(name: &str, addrs: &[&str]) -> Command {
    db::add(ADDRESS_SET, &quote(name), "addresses", &addresses(addrs))
}

/// `remove Address_Set <name> addresses <addr>...`
pub fn address_set_remove(name: &str, addrs: &[&str]) -> Command {
    db::remove(ADDRESS_SET, &quote(name), "addresses", &addresses(addrs))
}

/// `get Address_Set <name> addresses`
pub fn address_set_get(name: &str) -> Command {
    db::get(ADDRESS_SET, &quote(name), &["addresses"])
}

/// `--bare --columns=name list Address_Set`, one name per line.
pub fn address_set_list() -> Command {
    db::list(ADDRESS_SET, &[])
        .global("--bare")
        .global("--columns=name")
}

/// `--if-exists destroy Address_Set <name>`
pub fn address_set_destroy(name: &str) -> Command {
    db::destroy(ADDRESS_SET, &quote(name))
}

/// `pg-add <group> [<port>...]`
pub fn pg_add(group: &str, ports: &[&str]) -> Command {
    Command::new("pg-add")
        .arg(group)
        .args(ports.iter().copied())
}

/// `pg-set-ports <group> <port>...`, replacing the group's members.
pub fn pg_set_ports(group: &str, ports: &[&str]) -> Command {
    Command::new("pg-set-ports")
        .arg(group)
        .args(ports.iter().copied())
}

/// `add Port_Group <group> ports <uuid>`
pub fn pg_add_port_uuid(group: &str, port_uuid: &str) -> Command {
    db::add("Port_Group", group, "ports", &[port_uuid.into()])
}

/// `pg-del <group>`
pub fn pg_del(group: &str) -> Command {
    Command::new("pg-del").arg(group)
}

/// `get Logical_Switch_Port <port> _uuid`
pub fn lsp_uuid(port: &str) -> Command {
    db::get("Logical_Switch_Port", port, &["_uuid"])
}

/// `--wait=<target> sync`, blocking until `target` (`hv` or `sb`) caught up.
pub fn sync(target: &str) -> Command {
    Command::new("sync").global(format!("--wait={target}"))
}

/// `show [<switch>]`
pub fn show(switch: Option<&str>) -> Command {
    Command::new("show").args(switch)
}

/// TLS material for the northbound connection.
#[derive(Debug, Clone, Copy)]
pub struct SslFiles<'a> {
    /// Private key.
    pub private_key: &'a str,
    /// Certificate.
    pub certificate: &'a str,
    /// CA certificate.
    pub ca_cert: &'a str,
}

/// `ovn-nbctl --detach --pidfile --log-file [--db=<db>] [-p .. -c .. -C ..]`.
///
/// Starts a persistent nbctl daemon; its control socket path is printed on
/// stdout.
pub fn start_daemon(db: Option<&str>, ssl: Option<SslFiles<'_>>) -> Command {
    let mut cmd = Command::new("")
        .global("--detach")
        .global("--pidfile")
        .global("--log-file");
    if let Some(db) = db {
        cmd = cmd.global(format!("--db={db}"));
    }
    if let Some(ssl) = ssl {
        cmd = cmd
            .global(format!("-p {}", ssl.private_key))
            .global(format!("-c {}", ssl.certificate))
            .global(format!("-C {}", ssl.ca_cert));
    }
    cmd
}

/// Parse `ls-list` / `lr-list` output, `<uuid> (<name>)` per line.
pub fn parse_list_names(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let start = line.find('(')?;
            let end = line.rfind(')')?;
            (end > start + 1).then(|| line[start + 1..end].to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lsp_set_addresses_escapes_space() {
        let cmd = lsp_set_addresses("lp_10.0.0.1", &[&["0a:00:00:00:00:01", "10.0.0.1"]]);
        assert_eq!(
            cmd.render(),
            r"lsp-set-addresses lp_10.0.0.1 0a:00:00:00:00:01\ 10.0.0.1"
        );
    }

    #[test]
    fn test_lsp_set_addresses_skips_empty_parts() {
        let cmd = lsp_set_addresses("p", &[&["0a:00:00:00:00:01", ""]]);
        assert_eq!(cmd.render(), "lsp-set-addresses p 0a:00:00:00:00:01");
        let cmd = lsp_set_addresses("rp-x", &[&["router"]]);
        assert_eq!(cmd.render(), "lsp-set-addresses rp-x router");
    }

    #[test]
    fn test_acl_add_quotes_match() {
        let cmd = acl_add("sw0", "to-lport", 1000, "outport == \"lp1\" && ip4", "allow-related", true);
        assert_eq!(
            cmd.render(),
            "--log acl-add sw0 to-lport 1000 'outport == \"lp1\" && ip4' allow-related"
        );
    }

    #[test]
    fn test_policy_add() {
        let cmd = lr_policy_add("r0", 10, "ip4.src == 10.0.0.0/24", "reroute", Some("192.168.1.253"));
        assert_eq!(
            cmd.render(),
            "lr-policy-add r0 10 'ip4.src == 10.0.0.0/24' reroute 192.168.1.253"
        );
    }

    #[test]
    fn test_lrp_add() {
        let cmd = lrp_add("r0", "lrp-sw0", "0a:01:02:aa:bb:cc", &["10.0.0.254/24"]);
        assert_eq!(cmd.render(), "lrp-add r0 lrp-sw0 0a:01:02:aa:bb:cc 10.0.0.254/24");
    }

    #[test]
    fn test_sync_uses_global_wait() {
        let cmd = sync("hv");
        assert_eq!(cmd.render(), "sync");
        assert_eq!(cmd.globals(), ["--wait=hv"]);
    }

    #[test]
    fn test_start_daemon_is_options_only() {
        let cmd = start_daemon(Some("tcp:192.168.0.1:6641"), None);
        assert_eq!(cmd.render(), "");
        assert_eq!(
            cmd.globals(),
            ["--detach", "--pidfile", "--log-file", "--db=tcp:192.168.0.1:6641"]
        );
    }

    #[test]
    fn test_address_set_verbs() {
        assert_eq!(
            address_set_create("as_web", &["10.0.0.1", "10.0.0.2"]).render(),
            r#"create Address_Set 'name="as_web"' 'addresses="10.0.0.1","10.0.0.2"'"#
        );
        assert_eq!(
            address_set_create("as_web", &[]).render(),
            r#"create Address_Set 'name="as_web"' 'addresses=[]'"#
        );
        assert_eq!(
            address_set_add("as_web", &["10.0.0.3"]).render(),
            r#"add Address_Set as_web addresses '"10.0.0.3"'"#
        );
        assert_eq!(
            address_set_remove("as_web", &["10.0.0.1"]).render(),
            r#"remove Address_Set as_web addresses '"10.0.0.1"'"#
        );
        assert_eq!(
            address_set_get("as_web").render(),
            "get Address_Set as_web addresses"
        );
        assert_eq!(
            address_set_destroy("as_web").render(),
            "--if-exists destroy Address_Set as_web"
        );
        let list = address_set_list();
        assert_eq!(list.render(), "list Address_Set");
        assert_eq!(list.globals(), ["--bare", "--columns=name"]);
    }

    #[test]
    fn test_port_group_verbs() {
        assert_eq!(pg_add("pg_web", &[]).render(), "pg-add pg_web");
        assert_eq!(
            pg_add("pg_web", &["lp_10.0.0.1", "lp_10.0.0.2"]).render(),
            "pg-add pg_web lp_10.0.0.1 lp_10.0.0.2"
        );
        assert_eq!(
            pg_set_ports("pg_web", &["lp_10.0.0.3"]).render(),
            "pg-set-ports pg_web lp_10.0.0.3"
        );
        assert_eq!(
            pg_add_port_uuid("pg_web", "5f8e").render(),
            "add Port_Group pg_web ports 5f8e"
        );
        assert_eq!(pg_del("pg_web").render(), "pg-del pg_web");
        assert_eq!(
            lsp_uuid("lp_10.0.0.1").render(),
            "get Logical_Switch_Port lp_10.0.0.1 _uuid"
        );
    }

    #[test]
    fn test_parse_list_names() {
        let out = "0b7e3d27-05ad-4e9f-b3a5-2b6c0e0c1e01 (lrouter_ab12cd_x1)\n\
                   9e0e5fb0-d2cf-41f1-9a0f-26a1f5de3b11 (lrouter_ab12cd_x2)\n";
        assert_eq!(parse_list_names(out), ["lrouter_ab12cd_x1", "lrouter_ab12cd_x2"]);
        assert!(parse_list_names("").is_empty());
    }
}
