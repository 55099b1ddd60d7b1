mod support;

use std::time::Duration;

use serde_json::json;

#[test]
fn test_unknown_command_is_400_naming_it() {
    let gw = support::start(Duration::from_secs(30));
    let resp = support::execute(gw.port, &json!({"command": "nonexistentcommand", "args": []}));
    assert_eq!(resp.status, 400);
    assert!(resp.text().contains("Command not found: nonexistentcommand"));
}

#[test]
fn test_missing_or_empty_command_is_400() {
    let gw = support::start(Duration::from_secs(30));
    for body in [json!({"args": ["x"]}), json!({"command": "", "args": []})] {
        let resp = support::execute(gw.port, &body);
        assert_eq!(resp.status, 400);
        assert_eq!(resp.text(), "Missing 'command' in request body");
    }
    // Validation happens before anything is allocated.
    let leftover = std::fs::read_dir(gw.temp_dir()).map(|d| d.count()).unwrap_or(0);
    assert_eq!(leftover, 0);
}

#[test]
fn test_malformed_json_is_400() {
    let gw = support::start(Duration::from_secs(30));
    let resp = support::request(gw.port, "POST", "/execute", Some(b"{invalid json"));
    assert_eq!(resp.status, 400);
    assert!(resp.text().starts_with("Invalid JSON"));
}

#[test]
fn test_unknown_endpoint_is_404() {
    let gw = support::start(Duration::from_secs(30));
    let resp = support::request(gw.port, "POST", "/run", Some(b"{}"));
    assert_eq!(resp.status, 404);
    assert_eq!(resp.text(), "Endpoint not found");

    let resp = support::get(gw.port, "/index.html");
    assert_eq!(resp.status, 404);
}

#[test]
fn test_wrong_method_is_405_with_allow() {
    let gw = support::start(Duration::from_secs(30));
    let resp = support::get(gw.port, "/execute");
    assert_eq!(resp.status, 405);
    assert_eq!(resp.header("allow"), Some("POST"));

    let resp = support::request(gw.port, "POST", "/download/ecui-x", Some(b"{}"));
    assert_eq!(resp.status, 405);
    assert_eq!(resp.header("allow"), Some("GET"));
}

#[cfg(unix)]
#[test]
fn test_unrunnable_script_is_500_not_400() {
    let gw = support::start(Duration::from_secs(30));
    let path = gw.scripts_dir().join("ecui_not_executable.sh");
    std::fs::write(&path, "#!/bin/sh\necho hi\n").expect("write");
    let resp = support::execute(gw.port, &json!({"command": "ecui_not_executable.sh"}));
    assert_eq!(resp.status, 500);
    assert!(resp.text().starts_with("An error occurred: "), "{}", resp.text());
}

#[cfg(unix)]
#[test]
fn test_missing_interpreter_is_500() {
    let gw = support::start(Duration::from_secs(30));
    support::write_script(
        &gw.scripts_dir(),
        "ecui_bad_shebang.sh",
        "#!/nonexistent/interpreter\necho hi\n",
    );
    let resp = support::execute(gw.port, &json!({"command": "ecui_bad_shebang.sh"}));
    assert_eq!(resp.status, 500);
}
