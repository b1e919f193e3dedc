//! Slot command implementation.

use anyhow::Result;
use std::path::Path;

use crate::allocator::ClientSlot;
use crate::validation::validate_ipv4;

/// Print the index, rule number and private table derived for a client.
pub fn run(address: &str, config_path: &Path) -> Result<()> {
    let client = validate_ipv4(address)?;
    let config = super::load_config(config_path, false)?;
    let slot = ClientSlot::new(client, config.strict.rule_base);

    println!("Client:        {}", slot.client);
    println!("Index:         {}", slot.index);
    println!("Rule number:   {}", slot.rule_number);
    println!("Private table: {}", slot.private_set);
    println!(
        "Rules:         {} skipto {} / deny via {}",
        slot.rule_number, config.strict.allow_rule, config.strict.interface
    );

    Ok(())
}
