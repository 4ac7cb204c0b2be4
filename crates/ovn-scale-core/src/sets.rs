//! Address sets and port groups.
//!
//! Address sets hold the addresses ACL matches refer to as `$<name>`; port
//! groups hold logical switch ports. Both live in the northbound database and
//! are managed through the controller's nbctl client.

use crate::error::{Result, ScaleError};
use crate::model::LogicalPort;
use crate::scenario::Scenario;
use ipnet::IpNet;
use ovn_scale_exec::commands::{db, nbctl};
use std::net::IpAddr;
use tracing::{debug, info};

fn check_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(ScaleError::config(format!("invalid {kind} name: {name:?}")));
    }
    Ok(())
}

fn check_addresses(addrs: &[&str]) -> Result<()> {
    for addr in addrs {
        if addr.parse::<IpAddr>().is_err() && addr.parse::<IpNet>().is_err() {
            return Err(ScaleError::config(format!("invalid address: {addr}")));
        }
    }
    Ok(())
}

/// Addresses of `ports`, without prefix length. Ports without one are skipped.
pub fn port_addresses(ports: &[LogicalPort]) -> Vec<String> {
    ports
        .iter()
        .filter_map(|p| p.ip.map(|ip| ip.addr().to_string()))
        .collect()
}

fn port_names(ports: &[LogicalPort]) -> Vec<&str> {
    ports.iter().map(|p| p.name.as_str()).collect()
}

impl Scenario {
    /// Create address set `name` holding `addrs` (addresses or prefixes).
    pub fn create_address_set(&mut self, name: &str, addrs: &[&str]) -> Result<()> {
        check_name("address set", name)?;
        check_addresses(addrs)?;
        info!(name, addresses = addrs.len(), "creating address set");
        self.nbctl()?.run(nbctl::address_set_create(name, addrs))?;
        Ok(())
    }

    /// Add `addrs` to address set `name`. No-op when `addrs` is empty.
    pub fn address_set_add_addrs(&mut self, name: &str, addrs: &[&str]) -> Result<()> {
        check_name("address set", name)?;
        check_addresses(addrs)?;
        if addrs.is_empty() {
            return Ok(());
        }
        debug!(name, addresses = addrs.len(), "adding to address set");
        self.nbctl()?.run(nbctl::address_set_add(name, addrs))?;
        Ok(())
    }

    /// Remove `addrs` from address set `name`. No-op when `addrs` is empty.
    pub fn address_set_remove_addrs(&mut self, name: &str, addrs: &[&str]) -> Result<()> {
        check_name("address set", name)?;
        check_addresses(addrs)?;
        if addrs.is_empty() {
            return Ok(());
        }
        debug!(name, addresses = addrs.len(), "removing from address set");
        self.nbctl()?.run(nbctl::address_set_remove(name, addrs))?;
        Ok(())
    }

    /// Names of every address set.
    pub fn list_address_sets(&mut self) -> Result<Vec<String>> {
        let out = self.nbctl()?.query(nbctl::address_set_list())?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Addresses held by address set `name`.
    pub fn get_address_set(&mut self, name: &str) -> Result<Vec<String>> {
        check_name("address set", name)?;
        let out = self.nbctl()?.query(nbctl::address_set_get(name))?;
        Ok(db::parse_set(&out))
    }

    /// Destroy address set `name`; a missing set is not an error.
    pub fn remove_address_set(&mut self, name: &str) -> Result<()> {
        check_name("address set", name)?;
        info!(name, "removing address set");
        self.nbctl()?.run(nbctl::address_set_destroy(name))?;
        Ok(())
    }

    /// Create address set `name` and destroy it again.
    pub fn create_and_remove_address_set(&mut self, name: &str, addrs: &[&str]) -> Result<()> {
        self.create_address_set(name, addrs)?;
        self.remove_address_set(name)
    }

    /// Create port group `group` with `ports` as members.
    pub fn create_port_group(&mut self, group: &str, ports: &[LogicalPort]) -> Result<()> {
        check_name("port group", group)?;
        info!(group, ports = ports.len(), "creating port group");
        self.nbctl()?.run(nbctl::pg_add(group, &port_names(ports)))?;
        Ok(())
    }

    /// Replace the members of port group `group` with `ports`.
    pub fn port_group_set_ports(&mut self, group: &str, ports: &[LogicalPort]) -> Result<()> {
        check_name("port group", group)?;
        info!(group, ports = ports.len(), "setting port group members");
        self.nbctl()?.run(nbctl::pg_set_ports(group, &port_names(ports)))?;
        Ok(())
    }

    /// Add `port` to port group `group`, keeping existing members.
    ///
    /// Looks up the port's row UUID first, so pending batched commands are
    /// not involved.
    pub fn port_group_add_port(&mut self, group: &str, port: &LogicalPort) -> Result<()> {
        check_name("port group", group)?;
        let client = self.nbctl()?;
        let uuid = client.query(nbctl::lsp_uuid(&port.name))?;
        let uuid = uuid.trim();
        if uuid.is_empty() {
            return Err(ScaleError::NotFound {
                kind: "logical switch port",
                name: port.name.clone(),
            });
        }
        debug!(group, port = %port.name, uuid, "adding port to group");
        client.query(nbctl::pg_add_port_uuid(group, uuid))?;
        Ok(())
    }

    /// Delete port group `group`.
    pub fn delete_port_group(&mut self, group: &str) -> Result<()> {
        check_name("port group", group)?;
        info!(group, "deleting port group");
        self.nbctl()?.run(nbctl::pg_del(group))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioContext;
    use ipnet::Ipv4Net;
    use mac_address::MacAddress;
    use ovn_scale_exec::testing::RecordingConnector;
    use ovn_scale_exec::{ClientMultiplexer, Credential};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn scenario(rec: &RecordingConnector) -> Scenario {
        let clients = ClientMultiplexer::new(
            Box::new(rec.clone()),
            Credential::new("root", "ctl"),
            HashMap::new(),
        );
        Scenario::new(clients, ScenarioContext::new(Uuid::new_v4()))
    }

    fn port(name: &str, ip: Option<&str>) -> LogicalPort {
        LogicalPort {
            name: name.to_string(),
            switch: "ls1".to_string(),
            mac: MacAddress::new([0x0a, 0, 0, 0, 0, 1]),
            ip: ip.map(|ip| ip.parse::<Ipv4Net>().unwrap()),
            gateway: None,
            external_gateway: None,
        }
    }

    #[test]
    fn test_address_set_lifecycle() {
        let rec = RecordingConnector::new();
        let mut sc = scenario(&rec);
        sc.create_address_set("as_web", &["10.0.0.1", "10.0.1.0/24"])
            .unwrap();
        sc.address_set_add_addrs("as_web", &["10.0.0.2"]).unwrap();
        sc.address_set_remove_addrs("as_web", &["10.0.0.1"]).unwrap();
        sc.remove_address_set("as_web").unwrap();

        assert_eq!(
            rec.scripts(),
            [
                r#". controller-sandbox/sandbox.rc
ovn-nbctl create Address_Set 'name="as_web"' 'addresses="10.0.0.1","10.0.1.0/24"'"#,
                r#". controller-sandbox/sandbox.rc
ovn-nbctl add Address_Set as_web addresses '"10.0.0.2"'"#,
                r#". controller-sandbox/sandbox.rc
ovn-nbctl remove Address_Set as_web addresses '"10.0.0.1"'"#,
                ". controller-sandbox/sandbox.rc\novn-nbctl --if-exists destroy Address_Set as_web",
            ]
        );
    }

    #[test]
    fn test_address_set_rejects_bad_input_before_sending() {
        let rec = RecordingConnector::new();
        let mut sc = scenario(&rec);
        assert!(matches!(
            sc.create_address_set("as_web", &["10.0.0.300"]),
            Err(ScaleError::Config(_))
        ));
        assert!(matches!(
            sc.create_address_set("", &[]),
            Err(ScaleError::Config(_))
        ));
        assert!(matches!(
            sc.address_set_add_addrs("as web", &["10.0.0.1"]),
            Err(ScaleError::Config(_))
        ));
        sc.address_set_add_addrs("as_web", &[]).unwrap();
        assert!(rec.invocations().is_empty());
    }

    #[test]
    fn test_list_and_get_address_sets() {
        let rec = RecordingConnector::new();
        rec.respond_when("list Address_Set", "as_web\n\nas_db\n");
        rec.respond_when("get Address_Set", "[\"10.0.0.1\", \"10.0.0.2\"]\n");
        let mut sc = scenario(&rec);

        assert_eq!(sc.list_address_sets().unwrap(), ["as_web", "as_db"]);
        assert_eq!(
            sc.get_address_set("as_web").unwrap(),
            ["10.0.0.1", "10.0.0.2"]
        );
        assert!(rec.scripts()[0].ends_with("ovn-nbctl --bare --columns=name list Address_Set"));
    }

    #[test]
    fn test_create_and_remove_address_set() {
        let rec = RecordingConnector::new();
        let mut sc = scenario(&rec);
        sc.create_and_remove_address_set("as_tmp", &["192.168.0.1"])
            .unwrap();
        assert_eq!(rec.invocations().len(), 2);
        assert_eq!(rec.count_containing("create Address_Set"), 1);
        assert_eq!(rec.count_containing("destroy Address_Set as_tmp"), 1);
    }

    #[test]
    fn test_port_group_membership() {
        let rec = RecordingConnector::new();
        rec.respond_when("_uuid", "5f8e0c4a-0000-0000-0000-000000000001\n");
        let mut sc = scenario(&rec);
        let ports = [port("lp_10.0.0.1", None), port("lp_10.0.0.2", None)];

        sc.create_port_group("pg_web", &ports[..1]).unwrap();
        sc.port_group_set_ports("pg_web", &ports).unwrap();
        sc.port_group_add_port("pg_web", &ports[1]).unwrap();
        sc.delete_port_group("pg_web").unwrap();

        let scripts = rec.scripts();
        assert_eq!(scripts.len(), 5);
        assert!(scripts[0].ends_with("ovn-nbctl pg-add pg_web lp_10.0.0.1"));
        assert!(scripts[1].ends_with("ovn-nbctl pg-set-ports pg_web lp_10.0.0.1 lp_10.0.0.2"));
        assert!(scripts[2].ends_with("ovn-nbctl get Logical_Switch_Port lp_10.0.0.2 _uuid"));
        assert!(scripts[3].ends_with(
            "ovn-nbctl add Port_Group pg_web ports 5f8e0c4a-0000-0000-0000-000000000001"
        ));
        assert!(scripts[4].ends_with("ovn-nbctl pg-del pg_web"));
    }

    #[test]
    fn test_port_group_add_unknown_port() {
        let rec = RecordingConnector::new();
        let mut sc = scenario(&rec);
        let err = sc
            .port_group_add_port("pg_web", &port("lp_9", None))
            .unwrap_err();
        assert!(matches!(err, ScaleError::NotFound { name, .. } if name == "lp_9"));
        assert_eq!(rec.invocations().len(), 1);
    }

    #[test]
    fn test_port_addresses_drop_prefix() {
        let ports = [
            port("lp_1", Some("10.0.0.1/24")),
            port("lp_2", None),
            port("lp_3", Some("10.0.0.3/24")),
        ];
        assert_eq!(port_addresses(&ports), ["10.0.0.1", "10.0.0.3"]);
    }
}
