
use assert_cmd::Command;
use mockito::Server;
use packer_proxy_init::{detect_platform, ApiVersion, Platform};
use predicates::prelude::*;
use std::fs;
use test_utils::{ReleaseFixture, TestWorkspace, UNREACHABLE};

/// Binary with the user's environment kept out of the way
fn proxy_init_cmd(workspace: &TestWorkspace) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_packer-proxy-init"));
    cmd.env("HOME", workspace.home())
        .env("PKR_INIT_CONFIG", workspace.home().join("absent.toml"))
        .env_remove("PACKER_PLUGIN_PATH")
        .env_remove("PKR_INIT_GITHUB_SOURCE")
        .env_remove("PKR_INIT_RELEASES_SOURCE")
        .env_remove("RUST_LOG")
        .env_remove("DEBUG");
    cmd
}

fn host_platform() -> Platform {
    let api: ApiVersion = "5.0".parse().expect("valid api version");
    detect_platform(api)
}

fn mock_release(server: &mut Server, fixture: &ReleaseFixture) {
    let prefix = "/GITHUB/acme/packer-plugin-foo/releases/download/v1.2.3";
    server
        .mock("GET", format!("{}/{}", prefix, fixture.archive_name).as_str())
        .with_body(&fixture.archive)
        .create();
    server
        .mock("GET", format!("{}/{}", prefix, fixture.sums_name).as_str())
        .with_body(&fixture.sums)
        .create();
}

#[test]
fn test_help_lists_commands() {
    let workspace = TestWorkspace::new();
    proxy_init_cmd(&workspace)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("list"));
}

#[test]
fn test_install_requires_github_source() {
    let workspace = TestWorkspace::new();
    workspace.write_template("build.pkr.hcl", &[("foo", "acme/packer-plugin-foo", "1.2.3")]);

    proxy_init_cmd(&workspace)
        .arg("install")
        .arg(&workspace.template_dir)
        .arg("--plugin-dir")
        .arg(&workspace.plugin_dir)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("github-source is required"));
}

#[test]
fn test_install_then_list() {
    let workspace = TestWorkspace::new();
    workspace.write_template("build.pkr.hcl", &[("foo", "acme/packer-plugin-foo", "1.2.3")]);
    let fixture = ReleaseFixture::new("foo", "1.2.3", &host_platform());

    let mut server = Server::new();
    mock_release(&mut server, &fixture);

    proxy_init_cmd(&workspace)
        .arg("install")
        .arg(&workspace.template_dir)
        .arg("--github-source")
        .arg(format!("{}/GITHUB", server.url()))
        .arg("--releases-source")
        .arg(UNREACHABLE)
        .arg("--plugin-dir")
        .arg(&workspace.plugin_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("1 installed, 0 already present, 0 failed"));

    let binary = workspace
        .installed_dir("acme", "foo")
        .join(&fixture.binary_name);
    assert_eq!(fs::read(&binary).unwrap(), fixture.binary);

    proxy_init_cmd(&workspace)
        .arg("list")
        .arg(&workspace.template_dir)
        .arg("--plugin-dir")
        .arg(&workspace.plugin_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("github.com/acme/foo (1.2.3):"))
        .stdout(predicate::str::contains(fixture.binary_name.as_str()));
}

#[test]
fn test_list_without_installations() {
    let workspace = TestWorkspace::new();
    workspace.write_template("build.pkr.hcl", &[("foo", "acme/packer-plugin-foo", ">= 1.0")]);

    proxy_init_cmd(&workspace)
        .arg("list")
        .arg(&workspace.template_dir)
        .arg("--plugin-dir")
        .arg(&workspace.plugin_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("github.com/acme/foo (>= 1.0): not installed"));
}

#[test]
fn test_install_reads_config_file() {
    let workspace = TestWorkspace::new();
    workspace.write_template("build.pkr.hcl", &[("foo", "acme/packer-plugin-foo", "1.2.3")]);
    let fixture = ReleaseFixture::new("foo", "1.2.3", &host_platform());

    let mut server = Server::new();
    mock_release(&mut server, &fixture);

    let config = workspace.write_config(&format!(
        "[sources]\nreleases_url = \"{}\"\ngithub_url = \"{}/GITHUB\"\n\n[install]\nplugin_directory = \"{}\"\n",
        UNREACHABLE,
        server.url(),
        workspace.plugin_dir.display()
    ));

    proxy_init_cmd(&workspace)
        .arg("install")
        .arg(&workspace.template_dir)
        .arg("--config")
        .arg(&config)
        .assert()
        .success();

    assert!(workspace
        .installed_dir("acme", "foo")
        .join(&fixture.binary_name)
        .is_file());
}

#[test]
fn test_failed_install_exits_nonzero() {
    let workspace = TestWorkspace::new();
    workspace.write_template("build.pkr.hcl", &[("foo", "acme/packer-plugin-foo", "1.2.3")]);

    let mut server = Server::new();
    server.mock("GET", mockito::Matcher::Any).with_status(404).create();

    proxy_init_cmd(&workspace)
        .arg("install")
        .arg(&workspace.template_dir)
        .arg("--github-source")
        .arg(format!("{}/GITHUB", server.url()))
        .arg("--releases-source")
        .arg(UNREACHABLE)
        .arg("--plugin-dir")
        .arg(&workspace.plugin_dir)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("0 installed, 0 already present, 1 failed"))
        .stderr(predicate::str::contains("1 of 1 plugins failed to install"));

    assert!(!workspace.installed_dir("acme", "foo").exists());
}
