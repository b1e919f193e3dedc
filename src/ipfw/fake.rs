//! In-memory ipfw for tests.
//!
//! Understands the subset of ipfw syntax dynfw emits, keeps tables and rules
//! in memory and records every command line in call order.

use anyhow::Result;
use ipnet::Ipv4Net;
use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::cmd_abstraction::{CommandExecutor, CommandOutput};

#[derive(Default)]
struct FakeState {
    tables: BTreeMap<String, BTreeMap<Ipv4Net, String>>,
    rules: BTreeMap<u32, Vec<String>>,
    calls: Vec<String>,
    fail_prefixes: Vec<String>,
}

#[derive(Default)]
pub struct FakeIpfw {
    state: Mutex<FakeState>,
}

impl FakeIpfw {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with the given tables already created, as a boot script would.
    pub fn with_tables(names: &[&str]) -> Self {
        let fake = Self::new();
        {
            let mut state = fake.state.lock().unwrap();
            for name in names {
                state.tables.insert(name.to_string(), BTreeMap::new());
            }
        }
        fake
    }

    /// Make every command whose argument line starts with `prefix` fail.
    pub fn fail_when(&self, prefix: &str) {
        self.state.lock().unwrap().fail_prefixes.push(prefix.to_string());
    }

    /// Argument lines executed so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.state.lock().unwrap().tables.contains_key(name)
    }

    pub fn table_entries(&self, name: &str) -> Option<Vec<(Ipv4Net, String)>> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(name)
            .map(|t| t.iter().map(|(k, v)| (*k, v.clone())).collect())
    }

    pub fn rules_at(&self, number: u32) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .rules
            .get(&number)
            .cloned()
            .unwrap_or_default()
    }

    fn apply(state: &mut FakeState, args: &[String]) -> CommandOutput {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["table", name, "create", "type", "addr"] => {
                if state.tables.contains_key(*name) {
                    return CommandOutput::failed(71, "ipfw: Table creation failed: File exists");
                }
                state.tables.insert(name.to_string(), BTreeMap::new());
                CommandOutput::ok("")
            }
            ["table", name, "destroy"] => match state.tables.remove(*name) {
                Some(_) => CommandOutput::ok(""),
                None => not_found(),
            },
            ["table", name, "add", key, rest @ ..] => {
                let Some(table) = state.tables.get_mut(*name) else {
                    return not_found();
                };
                let Ok(net) = key.parse::<Ipv4Net>() else {
                    return CommandOutput::failed(64, "ipfw: invalid address");
                };
                let value = rest.first().copied().unwrap_or("0");
                table.insert(net, value.to_string());
                CommandOutput::ok("")
            }
            ["table", name, "delete", key] => {
                let Some(table) = state.tables.get_mut(*name) else {
                    return not_found();
                };
                match key.parse::<Ipv4Net>().ok().and_then(|net| table.remove(&net)) {
                    Some(_) => CommandOutput::ok(""),
                    None => CommandOutput::failed(71, "ipfw: Deleting record failed: No such process"),
                }
            }
            ["table", name, "list"] => match state.tables.get(*name) {
                Some(table) => {
                    let mut out = format!("--- table({}), set(0) ---\n", name);
                    for (net, value) in table {
                        out.push_str(&format!("{} {}\n", net, value));
                    }
                    CommandOutput::ok(out)
                }
                None => not_found(),
            },
            ["table", name, "flush"] => match state.tables.get_mut(*name) {
                Some(table) => {
                    table.clear();
                    CommandOutput::ok("")
                }
                None => not_found(),
            },
            ["add", number, rest @ ..] => match number.parse::<u32>() {
                Ok(number) => {
                    state.rules.entry(number).or_default().push(rest.join(" "));
                    CommandOutput::ok(format!("{:05} {}\n", number, rest.join(" ")))
                }
                Err(_) => CommandOutput::failed(64, "ipfw: invalid rule number"),
            },
            ["delete", number] => match number.parse::<u32>().ok().and_then(|n| state.rules.remove(&n)) {
                Some(_) => CommandOutput::ok(""),
                None => CommandOutput::failed(71, "ipfw: rule not found"),
            },
            _ => CommandOutput::failed(64, "ipfw: unsupported command"),
        }
    }
}

fn not_found() -> CommandOutput {
    CommandOutput::failed(71, "ipfw: table not found")
}

impl CommandExecutor for FakeIpfw {
    fn execute(&self, _cmd: &str, args: &[String]) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        let line = args.join(" ");
        state.calls.push(line.clone());

        if state.fail_prefixes.iter().any(|p| line.starts_with(p.as_str())) {
            return Ok(CommandOutput::failed(1, "ipfw: injected failure"));
        }

        Ok(Self::apply(&mut state, args))
    }
}
