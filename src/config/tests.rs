use std::io::Write as _;
use std::time::Duration;

use super::*;

fn cli_with(overrides: ServeOverrides) -> CliArgs {
    CliArgs {
        config_file: None,
        command: Some(Command::Serve(Box::new(ServeArgs { overrides }))),
    }
}

#[test]
fn defaults_resolve_without_any_sources() {
    let settings = load(&cli_with(ServeOverrides::default())).expect("load");
    assert_eq!(settings.server.addr.port(), 3000);
    assert_eq!(settings.cache.retention, Duration::from_secs(20 * 24 * 60 * 60));
    assert_eq!(settings.cache.reconcile_interval, Duration::from_secs(60));
    assert_eq!(settings.cache.refetch_delay, Duration::from_millis(1000));
    assert!(settings.signing.enforce);
    assert_eq!(settings.platform.domain, "t.me");
    assert_eq!(settings.feeds.default_items, 50);
    assert_eq!(settings.render.title_max_chars, 51);
}

#[test]
fn cli_overrides_take_precedence() {
    let overrides = ServeOverrides {
        server_port: Some(8080),
        cache_retention_days: Some(5),
        signing_enforce: Some(false),
        platform_domain: Some("example.org".to_string()),
        ..ServeOverrides::default()
    };
    let settings = load(&cli_with(overrides)).expect("load");
    assert_eq!(settings.server.addr.port(), 8080);
    assert_eq!(settings.cache.retention, Duration::from_secs(5 * 24 * 60 * 60));
    assert!(!settings.signing.enforce);
    assert_eq!(settings.platform.domain, "example.org");
}

#[test]
fn config_file_values_are_overridden_by_cli() {
    let mut file = tempfile::NamedTempFile::with_suffix(".toml").expect("temp config");
    writeln!(
        file,
        "[server]\nport = 4000\n\n[cache]\nretention_days = 7\n"
    )
    .expect("write config");

    let cli = CliArgs {
        config_file: Some(file.path().to_path_buf()),
        command: Some(Command::Serve(Box::new(ServeArgs {
            overrides: ServeOverrides {
                server_port: Some(5000),
                ..ServeOverrides::default()
            },
        }))),
    };

    let settings = load(&cli).expect("load");
    assert_eq!(settings.server.addr.port(), 5000);
    assert_eq!(settings.cache.retention, Duration::from_secs(7 * 24 * 60 * 60));
}

#[test]
fn zero_port_is_rejected_with_key() {
    let overrides = ServeOverrides {
        server_port: Some(0),
        ..ServeOverrides::default()
    };
    let err = load(&cli_with(overrides)).expect_err("must fail");
    assert!(err.to_string().contains("server.port"), "got: {err}");
}

#[test]
fn zero_retention_is_rejected_with_key() {
    let overrides = ServeOverrides {
        cache_retention_days: Some(0),
        ..ServeOverrides::default()
    };
    let err = load(&cli_with(overrides)).expect_err("must fail");
    assert!(err.to_string().contains("cache.retention_days"), "got: {err}");
}

#[test]
fn bad_log_level_is_rejected() {
    let overrides = ServeOverrides {
        log_level: Some("chatty".to_string()),
        ..ServeOverrides::default()
    };
    let err = load(&cli_with(overrides)).expect_err("must fail");
    assert!(err.to_string().contains("logging.level"), "got: {err}");
}

#[test]
fn bad_gateway_url_is_rejected() {
    let overrides = ServeOverrides {
        platform_gateway_url: Some("not a url".to_string()),
        ..ServeOverrides::default()
    };
    let err = load(&cli_with(overrides)).expect_err("must fail");
    assert!(err.to_string().contains("platform.gateway_url"), "got: {err}");
}

#[test]
fn signing_key_defaults_inside_cache_directory() {
    let overrides = ServeOverrides {
        cache_directory: Some(PathBuf::from("/var/lib/rivista")),
        ..ServeOverrides::default()
    };
    let settings = load(&cli_with(overrides)).expect("load");
    assert_eq!(
        settings.signing.key_file,
        PathBuf::from("/var/lib/rivista/signing.key")
    );
}
