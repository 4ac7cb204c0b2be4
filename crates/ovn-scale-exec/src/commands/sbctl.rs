//! `ovn-sbctl` verbs.

use super::db::{self, ColumnValue};
use super::Command;

/// `--bare --columns=name find Chassis name=<chassis>`, empty output while
/// the chassis has not registered.
pub fn find_chassis(chassis: &str) -> Command {
    db::find("Chassis", &["name"], &[ColumnValue::eq("name", chassis)])
}

/// `chassis-del <chassis>`
pub fn chassis_del(chassis: &str) -> Command {
    Command::new("chassis-del").arg(chassis)
}
