//! Collect actions feeding a watched domain set through the same file.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use rulewatch::config::{CollectArgs, CollectConfig, DomainSetArgs, ReloadConfig, Settings};
use rulewatch::{CollectAction, CollectRegistry, Matcher, PluginHost};
use tempfile::TempDir;

async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..150 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

fn settings(temp_dir: &TempDir) -> Settings {
    let collected = temp_dir.path().join("collected.txt");
    Settings {
        reload: ReloadConfig {
            debounce_ms: 100,
            include_rename: true,
        },
        domain_sets: vec![DomainSetArgs {
            tag: "blocked".to_string(),
            files: vec![collected.clone()],
            auto_reload: true,
            ..Default::default()
        }],
        collect_actions: vec![
            CollectArgs {
                tag: "block".to_string(),
                file_path: collected.clone(),
                format: "full".to_string(),
                operation: "add".to_string(),
            },
            CollectArgs {
                tag: "unblock".to_string(),
                file_path: collected,
                format: "full".to_string(),
                operation: "delete".to_string(),
            },
        ],
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_collected_names_reach_the_watching_set() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("collected.txt"), "").unwrap();
    let host = PluginHost::build(&settings(&temp_dir)).unwrap();

    let blocked = Arc::clone(host.domain_set("blocked").unwrap());
    let block = host.collect_action("block").unwrap();
    let unblock = host.collect_action("unblock").unwrap();
    assert_eq!(host.collect_registry().len(), 1);

    assert!(block.exec("bad.example."));
    assert!(eventually(|| blocked.is_match("bad.example")).await);
    // full: entries do not cover subdomains
    assert!(!blocked.is_match("www.bad.example"));

    assert!(unblock.exec("bad.example."));
    assert!(eventually(|| !blocked.is_match("bad.example")).await);

    host.close();
}

#[test]
fn test_add_delete_scenario_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("entries.txt");
    fs::write(&path, "full:a.com\n").unwrap();
    let registry = CollectRegistry::new(CollectConfig::default());

    let args = |tag: &str, operation: &str| CollectArgs {
        tag: tag.to_string(),
        file_path: path.clone(),
        format: "full".to_string(),
        operation: operation.to_string(),
    };
    let add = CollectAction::new(&args("add", "add"), &registry).unwrap();
    let del = CollectAction::new(&args("del", "delete"), &registry).unwrap();

    add.exec("b.com");
    assert_eq!(
        add.handle().store().entries(),
        vec!["full:a.com", "full:b.com"]
    );
    del.exec("a.com");
    assert_eq!(del.handle().store().entries(), vec!["full:b.com"]);

    let store = Arc::clone(add.handle().store());
    add.handle().close();
    assert!(!store.is_closed());
    del.handle().close();
    assert!(store.is_closed());

    let mut lines: Vec<String> = fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    lines.sort();
    lines.dedup();
    assert_eq!(lines, vec!["full:b.com"]);
}

#[test]
fn test_concurrent_adds_deduplicate() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("dedup.txt");
    let registry = CollectRegistry::new(CollectConfig::default());
    let handle = Arc::new(registry.get_or_create(&path).unwrap());

    let threads: Vec<_> = (0..8)
        .map(|t| {
            let handle = Arc::clone(&handle);
            std::thread::spawn(move || {
                (0..50)
                    .filter(|i| handle.add(&format!("full:host{}.test", (t * 50 + i) % 100)))
                    .count()
            })
        })
        .collect();
    let inserted: usize = threads.into_iter().map(|t| t.join().unwrap()).sum();

    assert_eq!(inserted, 100);
    assert_eq!(handle.store().len(), 100);

    handle.close();
    let on_disk = fs::read_to_string(&path).unwrap();
    assert_eq!(on_disk.lines().count(), 100);
}
