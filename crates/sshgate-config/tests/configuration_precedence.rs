//! Precedence and fail-fast behaviour of the layered configuration loader.

use std::cell::RefCell;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::{fixture, rstest};
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use sshgate_config::{Config, ListenAddress, LogFormat, default_listen_address};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const LISTEN_ENV: &str = "SSHGATE_LISTEN_ADDRESS";
const CONFIG_PATH_ENV: &str = "SSHGATE_CONFIG_PATH";

fn lock_env() -> MutexGuard<'static, ()> {
    ENV_MUTEX
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Restores an environment variable when dropped.
struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
}

impl EnvOverride {
    fn set(key: &'static str, value: &OsStr) -> Self {
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` on edition 2024; callers hold
        // `ENV_MUTEX` so no other test observes the override.
        unsafe { std::env::set_var(key, value) };
        Self { key, previous }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
    }
}

struct Harness {
    temp_dir: TempDir,
    cli_args: RefCell<Vec<OsString>>,
    overrides: RefCell<Vec<EnvOverride>>,
    loaded: RefCell<Option<Result<Config, String>>>,
    _guard: MutexGuard<'static, ()>,
}

impl Harness {
    fn new() -> Self {
        let guard = lock_env();
        Self {
            temp_dir: TempDir::new().expect("create temporary directory"),
            cli_args: RefCell::new(vec![OsString::from("sshgated")]),
            overrides: RefCell::new(Vec::new()),
            loaded: RefCell::new(None),
            _guard: guard,
        }
    }

    fn write_config(&self, contents: &str) {
        let path = self.temp_dir.path().join("sshgate.toml");
        fs::write(&path, contents).expect("write configuration");
        let mut args = self.cli_args.borrow_mut();
        args.push(OsString::from("--config-path"));
        args.push(path.into_os_string());
    }

    fn set_env(&self, key: &'static str, value: &str) {
        self.overrides
            .borrow_mut()
            .push(EnvOverride::set(key, OsStr::new(value)));
    }

    fn push_cli_arg(&self, arg: impl Into<OsString>) {
        self.cli_args.borrow_mut().push(arg.into());
    }

    fn load(&self) -> Result<Config, String> {
        if let Some(result) = self.loaded.borrow().as_ref() {
            return result.clone();
        }
        let args = self.cli_args.borrow().clone();
        let result = Config::load_from_iter(args).map_err(|error| error.to_string());
        *self.loaded.borrow_mut() = Some(result.clone());
        result
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let mut overrides = self.overrides.borrow_mut();
        while let Some(restore) = overrides.pop() {
            drop(restore);
        }
    }
}

#[fixture]
fn harness() -> Harness {
    Harness::new()
}

fn parse_address(text: &str) -> ListenAddress {
    match text.parse::<ListenAddress>() {
        Ok(address) => address,
        Err(error) => panic!("invalid listen address '{text}': {error}"),
    }
}

#[given("a configuration file setting the listen address to \"{address}\"")]
fn given_configuration_file(harness: &Harness, address: String) {
    harness.write_config(&format!("listen_address = \"{address}\"\n"));
}

#[given("the environment overrides the listen address to \"{address}\"")]
fn given_environment_override(harness: &Harness, address: String) {
    harness.set_env(LISTEN_ENV, &address);
}

#[when("the CLI sets the listen address to \"{address}\"")]
fn when_cli_override(harness: &Harness, address: String) {
    harness.push_cli_arg("--listen-address");
    harness.push_cli_arg(address);
}

#[then("loading the configuration resolves the listen address to \"{address}\"")]
fn then_resolved_address(harness: &Harness, address: String) {
    let config = match harness.load() {
        Ok(config) => config,
        Err(error) => panic!("configuration failed to load: {error}"),
    };
    assert_eq!(config.listen_address(), &parse_address(&address));
}

#[scenario(path = "tests/features/configuration_precedence.feature")]
fn configuration_precedence(#[from(harness)] harness: Harness) {
    let _ = harness;
}

#[rstest]
fn defaults_apply_without_overrides(harness: Harness) {
    let config = harness.load().expect("defaults should load");
    assert_eq!(config.listen_address(), &default_listen_address());
    assert_eq!(config.log_filter(), "info");
    assert_eq!(config.log_format(), LogFormat::Json);
    assert_eq!(config.host_key_path(), None);
}

#[rstest]
fn environment_overrides_file(harness: Harness) {
    harness.write_config("listen_address = \"127.0.0.1:4001\"\nlog_format = \"compact\"\n");
    harness.set_env(LISTEN_ENV, "127.0.0.1:4002");

    let config = harness.load().expect("configuration should load");
    assert_eq!(config.listen_address(), &parse_address("127.0.0.1:4002"));
    assert_eq!(config.log_format(), LogFormat::Compact);
}

#[rstest]
fn file_sets_optional_paths(harness: Harness) {
    harness.write_config(
        "host_key_path = \"/etc/sshgate/host_ed25519\"\n\
         authorized_keys_path = \"/etc/sshgate/authorized_keys\"\n\
         drain_timeout_ms = 250\n",
    );

    let config = harness.load().expect("configuration should load");
    assert_eq!(
        config.host_key_path().map(|path| path.as_str()),
        Some("/etc/sshgate/host_ed25519")
    );
    assert_eq!(
        config.authorized_keys_path().map(|path| path.as_str()),
        Some("/etc/sshgate/authorized_keys")
    );
    assert_eq!(config.drain_timeout_ms, 250);
}

#[rstest]
fn malformed_listen_address_fails_fast(harness: Harness) {
    let path = harness.temp_dir.path().join("broken.toml");
    fs::write(&path, "listen_address = \"no-port-here\"\n").expect("write configuration");
    harness.set_env(CONFIG_PATH_ENV, path.to_str().expect("utf8 path"));

    let error = harness.load().expect_err("loading must fail");
    assert!(
        error.contains("no-port-here"),
        "error should name the offending value: {error}"
    );
}
