// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mode → ruleset policy and nftables rendering.
//!
//! Rules carry stable slug ids so diffs line up across modes; emission
//! order derives from `(chain, priority, id)`.

use nos_core::{Chain, FirewallMode, Rule, RuleAction, Ruleset};

/// Network parameters the rulesets are generated from.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FirewallOptions {
    /// LAN source constraint (CIDR list, comma-joined in the rule).
    pub lan_cidrs: Vec<String>,
    /// WireGuard listen port.
    pub vpn_port: u16,
    /// WireGuard peer subnet.
    pub vpn_subnet: String,
}

impl Default for FirewallOptions {
    fn default() -> Self {
        Self {
            lan_cidrs: vec![
                "10.0.0.0/8".into(),
                "172.16.0.0/12".into(),
                "192.168.0.0/16".into(),
            ],
            vpn_port: 51820,
            vpn_subnet: "10.8.0.0/24".into(),
        }
    }
}

impl FirewallOptions {
    fn lan(&self) -> String {
        self.lan_cidrs.join(", ")
    }
}

fn rule(id: &str, priority: i32, port: Option<u16>, source: Option<String>) -> Rule {
    Rule {
        id: id.into(),
        chain: Chain::Input,
        priority,
        proto: Some("tcp".into()),
        port,
        source,
        action: RuleAction::Accept,
    }
}

/// The ruleset a mode resolves to. Pure: same inputs, same rules.
pub fn ruleset_for_mode(mode: FirewallMode, options: &FirewallOptions) -> Ruleset {
    let mut rules = vec![
        Rule {
            id: "allow-loopback".into(),
            chain: Chain::Input,
            priority: 0,
            proto: None,
            port: None,
            source: Some("lo".into()),
            action: RuleAction::Accept,
        },
        Rule {
            id: "allow-established".into(),
            chain: Chain::Input,
            priority: 1,
            proto: None,
            port: None,
            source: None,
            action: RuleAction::Accept,
        },
    ];

    match mode {
        FirewallMode::LanOnly => {
            rules.push(rule("allow-lan-http", 10, Some(80), Some(options.lan())));
            rules.push(rule("allow-lan-https", 10, Some(443), Some(options.lan())));
            rules.push(rule("allow-lan-ssh", 20, Some(22), Some(options.lan())));
        }
        FirewallMode::VpnOnly => {
            rules.push(Rule {
                id: "allow-wireguard".into(),
                chain: Chain::Input,
                priority: 5,
                proto: Some("udp".into()),
                port: Some(options.vpn_port),
                source: None,
                action: RuleAction::Accept,
            });
            rules.push(rule(
                "allow-vpn-http",
                10,
                Some(80),
                Some(options.vpn_subnet.clone()),
            ));
            rules.push(rule(
                "allow-vpn-https",
                10,
                Some(443),
                Some(options.vpn_subnet.clone()),
            ));
            rules.push(rule(
                "allow-vpn-ssh",
                20,
                Some(22),
                Some(options.vpn_subnet.clone()),
            ));
        }
        FirewallMode::Tunnel => {
            // Exposure happens through an outbound tunnel; inbound HTTP
            // stays loopback-only.
            rules.push(rule("allow-local-http", 10, Some(80), Some("127.0.0.0/8".into())));
            rules.push(rule(
                "allow-local-https",
                10,
                Some(443),
                Some("127.0.0.0/8".into()),
            ));
            rules.push(rule("allow-lan-ssh", 20, Some(22), Some(options.lan())));
        }
        FirewallMode::Direct => {
            rules.push(rule("allow-http", 10, Some(80), None));
            rules.push(rule("allow-https", 10, Some(443), None));
            rules.push(rule("allow-lan-ssh", 20, Some(22), Some(options.lan())));
        }
    }

    Ruleset { mode, rules }
}

/// Render a ruleset as an nftables script. Deterministic line order.
pub fn render_nft(ruleset: &Ruleset) -> String {
    let mut out = String::new();
    out.push_str("#!/usr/sbin/nft -f\n");
    out.push_str(&format!("# mode: {}\n", ruleset.mode));
    out.push_str("flush ruleset\n\n");
    out.push_str("table inet nos {\n");
    out.push_str("    chain input {\n");
    out.push_str("        type filter hook input priority 0; policy drop;\n");

    for rule in ruleset.sorted_rules() {
        out.push_str("        ");
        out.push_str(&render_rule(rule));
        out.push('\n');
    }

    out.push_str("    }\n");
    out.push_str("}\n");
    out
}

fn render_rule(rule: &Rule) -> String {
    let action = match rule.action {
        RuleAction::Accept => "accept",
        RuleAction::Drop => "drop",
        RuleAction::Reject => "reject",
    };

    // Structural rules render as their nft idioms.
    if rule.id == "allow-loopback" {
        return format!("iif \"lo\" {action} comment \"{}\"", rule.id);
    }
    if rule.id == "allow-established" {
        return format!("ct state established,related {action} comment \"{}\"", rule.id);
    }

    let mut parts = Vec::new();
    if let Some(source) = &rule.source {
        parts.push(format!("ip saddr {{ {source} }}"));
    }
    if let (Some(proto), Some(port)) = (&rule.proto, rule.port) {
        parts.push(format!("{proto} dport {port}"));
    }
    parts.push(action.to_string());
    parts.push(format!("comment \"{}\"", rule.id));
    parts.join(" ")
}

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
