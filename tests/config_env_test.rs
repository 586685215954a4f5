use rulewatch::{Matcher, PluginHost, Settings};
use std::net::IpAddr;

#[test]
fn test_env_override() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "rulewatch.toml",
            r#"
[logging]
default = "info"

[collect.add_retry]
attempts = 7
backoff_ms = 1
"#,
        )?;
        jail.set_env("RULEWATCH_LOGGING__DEFAULT", "debug");
        jail.set_env("RULEWATCH_COLLECT__DELETE_RETRY__ATTEMPTS", "9");

        let settings = Settings::load().map_err(|e| e.to_string())?;
        assert_eq!(settings.logging.default, "debug");
        assert_eq!(settings.collect.add_retry.attempts, 7);
        assert_eq!(settings.collect.delete_retry.attempts, 9);
        // Untouched nested field keeps its default
        assert_eq!(settings.collect.delete_retry.backoff_ms, 50);
        Ok(())
    });
}

#[test]
fn test_host_from_toml() {
    figment::Jail::expect_with(|jail| {
        jail.create_file("ads.txt", "# ad hosts\nregexp:^ad[0-9]+\\.\ntracker.example\n")?;
        jail.create_file("hosts.txt", "nas.home 192.168.1.5 fd00::5\n")?;
        jail.create_file(
            "rulewatch.toml",
            r#"
[[domain_set]]
tag = "ads"
files = ["ads.txt"]

[[domain_set]]
tag = "blocked"
exps = ["keyword:casino"]
sets = ["ads"]

[[ip_set]]
tag = "private"
ips = ["10.0.0.0/8", "fd00::/8"]

[[hosts]]
tag = "home"
files = ["hosts.txt"]
"#,
        )?;

        let settings = Settings::load().map_err(|e| e.to_string())?;
        let host = PluginHost::build(&settings).map_err(|e| e.to_string())?;
        assert_eq!(host.registry().tags(), vec!["ads", "blocked", "home", "private"]);

        let blocked = host.domain_set("blocked").ok_or("missing blocked")?;
        assert!(blocked.is_match("ad12.example.net"));
        assert!(blocked.is_match("cdn.tracker.example"));
        assert!(blocked.is_match("online-casino.test"));
        assert!(!blocked.is_match("example.net"));

        let private = host.ip_set("private").ok_or("missing private")?;
        let inside: IpAddr = "fd00::1".parse().map_err(|_| "addr")?;
        let outside: IpAddr = "8.8.8.8".parse().map_err(|_| "addr")?;
        assert!(private.is_match(&inside));
        assert!(!private.is_match(&outside));

        let home = host.hosts("home").ok_or("missing home")?;
        assert_eq!(home.lookup_v4("nas.home").len(), 1);
        assert_eq!(home.lookup_v6("nas.home").len(), 1);

        host.close();
        Ok(())
    });
}
