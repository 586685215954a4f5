//! Watch command - keep plugins live and answer queries from stdin.

use tokio::io::{AsyncBufReadExt, BufReader};

use super::query::answer;
use crate::host::PluginHost;
use crate::log_event;

/// Split an input line into `(tag, key)`; `None` for blank or comment lines.
pub fn parse_line(line: &str) -> Option<Result<(&str, &str), String>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(tag), Some(key), None) => Some(Ok((tag, key))),
        _ => Some(Err(format!("expected `<tag> <key>`, got '{line}'"))),
    }
}

/// Run watch command until stdin closes or Ctrl-C.
pub async fn run_watch(host: &PluginHost) -> anyhow::Result<()> {
    log_event!("watch", "started", "{}", host.registry().tags().join(", "));
    eprintln!("Watching {} plugins. Enter `<tag> <key>` lines, Ctrl-C to stop.", host.registry().len());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_line(&line) {
                    None => {}
                    Some(Err(e)) => eprintln!("{e}"),
                    Some(Ok((tag, key))) => match answer(host, tag, key).await {
                        Ok(reply) => println!("{tag} {key}: {reply}"),
                        Err(e) => eprintln!("{tag} {key}: {e}"),
                    },
                }
            }
        }
    }

    log_event!("watch", "stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("  ads a.com "), Some(Ok(("ads", "a.com"))));
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("# note"), None);
        assert!(matches!(parse_line("ads"), Some(Err(_))));
        assert!(matches!(parse_line("ads a b"), Some(Err(_))));
    }
}
