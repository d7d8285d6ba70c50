use assert_cmd::Command;
use httpmock::MockServer;
use predicates::str::contains;

const DETAIL: &str = r#"{
    "ok": true,
    "product": {
        "id": 7,
        "name": "Desk lamp",
        "price": 12000,
        "user": { "id": 3, "name": "seller" }
    },
    "relatedProduct": [],
    "isLiked": false,
    "isReserved": false
}"#;

const POSTSCRIPTS: &str = r#"{"ok":true,"postscripts":[]}"#;

fn marketsync() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("marketsync"));
    cmd.env_remove("MARKETSYNC_CONFIG_FILE")
        .env_remove("MARKETSYNC__API__BASE_URL")
        .env("RUST_LOG", "error");
    cmd
}

fn mock_page(server: &MockServer) {
    server.mock(|when, then| {
        when.method("GET").path("/api/products/7");
        then.status(200)
            .header("content-type", "application/json")
            .body(DETAIL);
    });
    server.mock(|when, then| {
        when.method("GET").path("/api/products/7/postscript");
        then.status(200)
            .header("content-type", "application/json")
            .body(POSTSCRIPTS);
    });
}

#[test]
fn product_show_prints_the_snapshot() {
    let server = MockServer::start();
    mock_page(&server);

    let assert = marketsync()
        .args(["--base-url", &server.base_url(), "product", "show", "7"])
        .assert()
        .success();

    let output = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(output.contains("\"detail_state\": \"ready\""));
    assert!(output.contains("\"name\": \"Desk lamp\""));
}

#[test]
fn product_like_prints_optimistic_then_settled() {
    let server = MockServer::start();
    mock_page(&server);
    let fav = server.mock(|when, then| {
        when.method("POST").path("/api/products/7/fav");
        then.status(200).body(r#"{"ok":true}"#);
    });

    let assert = marketsync()
        .args(["--base-url", &server.base_url(), "product", "like", "7"])
        .assert()
        .success();

    let output = String::from_utf8_lossy(&assert.get_output().stdout);
    let optimistic = output.find("\"optimistic\"").expect("optimistic stage printed");
    let settled = output.find("\"settled\"").expect("settled stage printed");
    assert!(optimistic < settled);
    assert!(output.contains("\"is_set\": true"));
    fav.assert_hits(1);
}

#[test]
fn missing_base_url_fails_fast() {
    marketsync()
        .args(["product", "show", "7"])
        .assert()
        .failure()
        .stderr(contains("api.base_url"));
}
