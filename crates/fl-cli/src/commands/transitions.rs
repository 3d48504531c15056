//! `fl transitions`: print the order or package status table, one edge per
//! line as `FROM --EVENT--> TO`.

use anyhow::{bail, Result};
use fl_schemas::{CanonicalStatus, OrderStatus, PackageStatus};
use fl_status::{StatusEvent, TransitionTable, ORDER_TRANSITIONS, PACKAGE_TRANSITIONS};

pub fn run(entity: &str, from: Option<&str>) -> Result<()> {
    match entity.trim().to_lowercase().as_str() {
        "order" => {
            let from = from.map(OrderStatus::parse).transpose()?;
            print_edges(&ORDER_TRANSITIONS, from);
        }
        "package" => {
            let from = from.map(PackageStatus::parse).transpose()?;
            print_edges(&PACKAGE_TRANSITIONS, from);
        }
        other => bail!("invalid entity '{}'. expected one of: order | package", other),
    }
    Ok(())
}

fn print_edges<E: StatusEvent>(table: &TransitionTable<E>, from: Option<E::Status>) {
    for (status, event) in table.edges() {
        if from.is_some_and(|f| f != *status) {
            continue;
        }
        println!(
            "{} --{}--> {}",
            status.as_str(),
            event.name(),
            event.target().as_str()
        );
    }
}
