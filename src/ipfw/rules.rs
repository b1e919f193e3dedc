//! Numbered ipfw rules.

use std::net::Ipv4Addr;

use super::tables::SetName;
use super::Ipfw;
use crate::error::EngineError;

/// What a matching packet does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleAction {
    /// Jump to the given rule number
    SkipTo(u32),
    Deny,
}

/// Destination match of a per-client rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    InTable(SetName),
    NotInTable(SetName),
}

/// `ipfw add <number> <action> ip from <source> to <destination> via <iface>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub number: u32,
    pub action: RuleAction,
    pub source: Ipv4Addr,
    pub destination: Destination,
    pub via: String,
}

impl Rule {
    /// Command arguments installing this rule.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["add".to_string(), self.number.to_string()];

        match self.action {
            RuleAction::SkipTo(target) => {
                args.push("skipto".to_string());
                args.push(target.to_string());
            }
            RuleAction::Deny => args.push("deny".to_string()),
        }

        args.extend(["ip", "from"].map(String::from));
        args.push(self.source.to_string());
        args.push("to".to_string());

        match &self.destination {
            Destination::InTable(set) => args.push(format!("table({})", set)),
            Destination::NotInTable(set) => {
                args.push("not".to_string());
                args.push(format!("table({})", set));
            }
        }

        args.push("via".to_string());
        args.push(self.via.clone());
        args
    }
}

/// Installs and deletes numbered rules.
#[derive(Debug, Clone)]
pub struct RuleTable {
    ipfw: Ipfw,
}

impl RuleTable {
    pub fn new(ipfw: Ipfw) -> Self {
        Self { ipfw }
    }

    pub fn install(&self, rule: &Rule) -> Result<(), EngineError> {
        self.ipfw.run(&rule.to_args()).map(|_| ())
    }

    /// Delete every rule with this number. Fails if there is none.
    pub fn delete(&self, number: u32) -> Result<(), EngineError> {
        self.ipfw
            .run(&["delete".to_string(), number.to_string()])
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd_abstraction::{CommandOutput, MockCommandExecutor};
    use std::sync::Arc;

    fn t055() -> SetName {
        SetName::new("t055").unwrap()
    }

    #[test]
    fn test_skipto_rule_args() {
        let rule = Rule {
            number: 4055,
            action: RuleAction::SkipTo(502),
            source: Ipv4Addr::new(192, 168, 10, 55),
            destination: Destination::InTable(t055()),
            via: "bridge0".to_string(),
        };
        assert_eq!(
            rule.to_args().join(" "),
            "add 4055 skipto 502 ip from 192.168.10.55 to table(t055) via bridge0"
        );
    }

    #[test]
    fn test_deny_rule_args() {
        let rule = Rule {
            number: 4055,
            action: RuleAction::Deny,
            source: Ipv4Addr::new(192, 168, 10, 55),
            destination: Destination::NotInTable(t055()),
            via: "bridge0".to_string(),
        };
        assert_eq!(
            rule.to_args().join(" "),
            "add 4055 deny ip from 192.168.10.55 to not table(t055) via bridge0"
        );
    }

    #[test]
    fn test_delete_issues_rule_number() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|_, args| args == ["delete", "4000"])
            .times(1)
            .returning(|_, _| Ok(CommandOutput::ok("")));

        let rules = RuleTable::new(Ipfw::new(Arc::new(mock), "/sbin/ipfw"));
        assert!(rules.delete(4000).is_ok());
    }

    #[test]
    fn test_delete_missing_rule_fails() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .returning(|_, _| Ok(CommandOutput::failed(71, "ipfw: rule 4001: setsockopt(IP_FW_XDEL): No such process")));

        let rules = RuleTable::new(Ipfw::new(Arc::new(mock), "/sbin/ipfw"));
        assert!(matches!(
            rules.delete(4001),
            Err(EngineError::CommandFailed { code: Some(71), .. })
        ));
    }
}
