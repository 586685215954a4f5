//! Check and Collect commands, shared with `watch`.

use std::net::IpAddr;

use anyhow::{Context, bail};

use crate::host::PluginHost;
use crate::intel::Verdict;
use crate::matcher::Matcher;

/// Answer one `<tag> <key>` query against whichever plugin owns `tag`.
pub async fn answer(host: &PluginHost, tag: &str, key: &str) -> anyhow::Result<String> {
    if let Some(set) = host.domain_set(tag) {
        return Ok(matched(set.is_match(key)));
    }

    if let Some(set) = host.ip_set(tag) {
        let addr: IpAddr = key
            .parse()
            .with_context(|| format!("'{key}' is not an IP address"))?;
        return Ok(matched(set.is_match(&addr)));
    }

    if let Some(hosts) = host.hosts(tag) {
        return Ok(match hosts.lookup(key) {
            Some(addrs) => addrs
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" "),
            None => "no entry".to_string(),
        });
    }

    if let Some(gate) = host.intel(tag) {
        return Ok(match gate.check([key]).await {
            Verdict::Block(ioc) => format!("block ({ioc})"),
            Verdict::Pass => "pass".to_string(),
        });
    }

    if let Some(action) = host.collect_action(tag) {
        return Ok(collected(action.exec(key), action.entry_for(key)));
    }

    bail!("No plugin with tag '{tag}'")
}

/// Run check command.
pub async fn run_check(host: &PluginHost, tag: &str, key: &str, json: bool) -> anyhow::Result<()> {
    let result = answer(host, tag, key).await?;
    if json {
        let out = serde_json::json!({ "tag": tag, "key": key, "result": result });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        println!("{result}");
    }
    Ok(())
}

/// Run collect command - feed one name to a collect action.
///
/// The write reaches disk once the host is closed and the store drains.
pub fn run_collect(host: &PluginHost, tag: &str, name: &str) -> anyhow::Result<()> {
    let action = host
        .collect_action(tag)
        .with_context(|| format!("No collect action with tag '{tag}'"))?;
    println!("{}", collected(action.exec(name), action.entry_for(name)));
    Ok(())
}

fn matched(hit: bool) -> String {
    let s = if hit { "match" } else { "no match" };
    s.to_string()
}

fn collected(changed: bool, entry: Option<String>) -> String {
    match (changed, entry) {
        (_, None) => "ignored (empty name)".to_string(),
        (true, Some(entry)) => format!("updated {entry}"),
        (false, Some(entry)) => format!("unchanged {entry}"),
    }
}
