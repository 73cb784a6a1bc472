// Licensed under the Apache-2.0 license

use anyhow::Result;
use fw_builder::PartitionTable;
use std::path::Path;

pub(crate) fn print(path: &Path) -> Result<()> {
    let table = PartitionTable::load(path)?;
    println!(
        "{:<16} {:<6} {:<10} {:>10} {:>10}  Flags",
        "Name", "Type", "SubType", "Offset", "Size"
    );
    for entry in table.iter() {
        let offset = match entry.offset() {
            Ok(offset) => format!("{offset:#x}"),
            Err(_) => entry.offset_text().to_string(),
        };
        let size = match entry.size() {
            Ok(size) => size.to_string(),
            Err(_) => entry.size_text().to_string(),
        };
        println!(
            "{:<16} {:<6} {:<10} {:>10} {:>10}  {}",
            entry.name, entry.kind, entry.subtype, offset, size, entry.flags
        );
    }
    println!("{} partition(s)", table.len());
    Ok(())
}
