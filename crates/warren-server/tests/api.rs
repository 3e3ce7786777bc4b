mod common;

use axum::http::StatusCode;
use serde_json::json;
use warren_plugin::builtin::rfid::LAST_SEEN_BY;
use warren_server::http::router;

use common::{get, get_json, login, test_state, SERIAL};

const TAG: &str = "d0021fa1";

#[tokio::test]
async fn test_healthz() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path(), None).await);
    let body = get_json(&app, "/healthz").await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_unknown_path_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path(), None).await);
    let (status, _) = get(&app, "/nothing/here", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_call_names_the_request() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path(), None).await);
    let answer = get_json(&app, "/ojn/api/accounts/fly").await;
    assert_eq!(answer, json!({ "error": "Unknown api call : /ojn/api/accounts/fly" }));
    let answer = get_json(&app, "/ojn/api/nowhere/fly").await;
    assert!(answer["error"].as_str().unwrap().starts_with("Unknown api call"));
}

#[tokio::test]
async fn test_guest_without_token() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path(), None).await);
    let answer = get_json(&app, "/ojn/api/accounts/whoAmI").await;
    assert_eq!(answer["map"]["login"], "guest");
    assert_eq!(answer["map"]["admin"], "false");
    let answer = get_json(&app, "/ojn/api/plugins/getListOfPlugins").await;
    assert_eq!(answer, json!({ "error": "Access denied" }));
}

#[tokio::test]
async fn test_first_account_is_admin() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path(), None).await);
    get_json(&app, "/ojn/api/accounts/registerNewAccount?login=root&username=Root&pass=pw").await;
    get_json(&app, "/ojn/api/accounts/registerNewAccount?login=alice&username=Alice&pass=pw").await;

    let root = login(&app, "root", "pw").await;
    let answer = get_json(&app, &format!("/ojn/api/accounts/whoAmI?token={root}")).await;
    assert_eq!(answer["map"]["admin"], "true");

    let alice = login(&app, "alice", "pw").await;
    let answer = get_json(&app, &format!("/ojn/api/accounts/whoAmI?token={alice}")).await;
    assert_eq!(answer["map"]["admin"], "false");

    let answer = get_json(&app, "/ojn/api/accounts/registerNewAccount?login=alice&username=A&pass=x").await;
    assert_eq!(answer, json!({ "error": "Login 'alice' is already taken" }));
}

#[tokio::test]
async fn test_bad_password_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), None).await;
    state.entities.accounts.register("alice", "Alice", "pw").unwrap();
    let app = router(state);
    let answer = get_json(&app, "/ojn/api/accounts/auth?login=alice&pass=nope").await;
    assert_eq!(answer, json!({ "error": "Bad login or password" }));
    let answer = get_json(&app, "/ojn/api/accounts/auth?login=bob&pass=pw").await;
    assert_eq!(answer, json!({ "error": "Bad login or password" }));
}

#[tokio::test]
async fn test_alice_removes_a_ztamp() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), None).await;
    state.entities.accounts.register("root", "Root", "pw").unwrap();
    state.entities.accounts.register("alice", "Alice", "pw").unwrap();
    state.entities.ztamps.get_hex(TAG).unwrap();
    let app = router(state.clone());

    // No token: Guest has no rights on tags.
    let answer = get_json(&app, &format!("/ojn/api/ztamps/removeZtamp?serial={TAG}")).await;
    assert_eq!(answer, json!({ "error": "Access denied" }));
    assert!(state.entities.ztamps.find_hex(TAG).is_some());

    let tok = login(&app, "alice", "pw").await;
    let answer = get_json(
        &app,
        &format!("/ojn/api/ztamps/removeZtamp?serial={TAG}&token={tok}"),
    )
    .await;
    assert_eq!(answer, json!({ "ok": "Ztamp successfully deleted" }));
    assert!(state.entities.ztamps.find_hex(TAG).is_none());
    assert!(state.entities.ztamps.list().is_empty());
}

#[tokio::test]
async fn test_bearer_header_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), None).await;
    state.entities.accounts.register("root", "Root", "pw").unwrap();
    let app = router(state);
    let tok = login(&app, "root", "pw").await;
    let (status, body) = get(&app, "/ojn/api/accounts/whoAmI", Some(&tok)).await;
    assert_eq!(status, StatusCode::OK);
    let answer: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(answer["map"]["login"], "root");
}

#[tokio::test]
async fn test_ztamp_ownership() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), None).await;
    state.entities.accounts.register("root", "Root", "pw").unwrap();
    state.entities.accounts.register("alice", "Alice", "pw").unwrap();
    state.entities.accounts.register("bob", "Bob", "pw").unwrap();
    let app = router(state.clone());
    let alice = login(&app, "alice", "pw").await;
    let bob = login(&app, "bob", "pw").await;

    let answer = get_json(&app, &format!("/ojn/api/accounts/addZtamp?serial={TAG}&token={alice}")).await;
    assert_eq!(answer, json!({ "ok": "Ztamp 'd0021fa1' added" }));
    let answer = get_json(&app, &format!("/ojn/api/ztamps/getListOfZtamps?token={alice}")).await;
    assert_eq!(answer, json!({ "map": { TAG: TAG } }));

    let answer = get_json(&app, &format!("/ojn/api/accounts/addZtamp?serial={TAG}&token={bob}")).await;
    assert_eq!(answer, json!({ "error": "Ztamp 'd0021fa1' belongs to another account" }));
    let answer = get_json(&app, &format!("/ojn/api/ztamps/removeZtamp?serial={TAG}&token={bob}")).await;
    assert_eq!(answer, json!({ "error": "Access denied" }));

    let root = login(&app, "root", "pw").await;
    let answer = get_json(&app, &format!("/ojn/api/ztamps/getListOfAllZtampsOwners?token={root}")).await;
    assert_eq!(answer, json!({ "map": { TAG: "alice" } }));
}

#[tokio::test]
async fn test_plugin_listing_and_protection() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), None).await;
    state.entities.accounts.register("root", "Root", "pw").unwrap();
    let app = router(state.clone());
    let root = login(&app, "root", "pw").await;

    let answer = get_json(&app, &format!("/ojn/api/plugins/getListOfPlugins?token={root}")).await;
    let plugins = answer["map"].as_object().unwrap();
    assert!(plugins.contains_key("rfid"));
    assert!(plugins.contains_key("surprise"));

    let answer = get_json(&app, &format!("/ojn/api/plugins/getListOfRequiredPlugins?token={root}")).await;
    assert_eq!(answer, json!({ "list": ["rfid"] }));

    let answer = get_json(&app, &format!("/ojn/api/plugins/deactivatePlugin?name=rfid&token={root}")).await;
    assert_eq!(answer, json!({ "error": "Plugin 'rfid' can't be deactivated!" }));

    let answer = get_json(&app, &format!("/ojn/api/plugins/deactivatePlugin?name=surprise&token={root}")).await;
    assert_eq!(answer, json!({ "ok": "'surprise' is now disabled" }));
    let answer = get_json(&app, &format!("/ojn/api/plugins/deactivatePlugin?name=surprise&token={root}")).await;
    assert_eq!(answer, json!({ "error": "Plugin 'surprise' is already disabled!" }));

    let answer = get_json(&app, &format!("/ojn/api/plugins/loadPlugin?filename=surprise&token={root}")).await;
    assert_eq!(answer, json!({ "error": "Can't load 'surprise'!" }));
    assert!(!state.plugins.get("surprise").unwrap().is_enabled());
}

#[tokio::test]
async fn test_bunny_calls_require_ownership() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), None).await;
    state.entities.accounts.register("root", "Root", "pw").unwrap();
    state.entities.accounts.register("alice", "Alice", "pw").unwrap();
    state.entities.accounts.register("bob", "Bob", "pw").unwrap();
    let app = router(state.clone());
    let alice = login(&app, "alice", "pw").await;
    let bob = login(&app, "bob", "pw").await;

    let answer = get_json(&app, &format!("/ojn/api/accounts/addBunny?serial={SERIAL}&token={alice}")).await;
    assert_eq!(answer, json!({ "ok": "Bunny '0019db01a2b3' added" }));

    let base = format!("/ojn/api/bunny/{SERIAL}");
    let answer = get_json(&app, &format!("{base}/registerPlugin?name=surprise&token={alice}")).await;
    assert_eq!(answer, json!({ "ok": "Plugin 'surprise' is now activated" }));
    let answer = get_json(&app, &format!("{base}/getListOfActivePlugins?token={alice}")).await;
    assert_eq!(answer, json!({ "list": ["surprise"] }));
    let answer = get_json(&app, &format!("{base}/registerPlugin?name=rfid&token={alice}")).await;
    assert_eq!(answer, json!({ "error": "Plugin 'rfid' is not a bunny plugin" }));

    let answer = get_json(&app, &format!("{base}/setBunnyName?name=Nabz&token={bob}")).await;
    assert_eq!(answer, json!({ "error": "Access denied" }));
    let answer = get_json(&app, &format!("{base}/setBunnyName?name=Nabz&token={alice}")).await;
    assert_eq!(answer, json!({ "ok": "Bunny is now named 'Nabz'" }));
    assert_eq!(state.entities.bunnies.find_hex(SERIAL).unwrap().name(), "Nabz");

    let answer = get_json(&app, &format!("{base}/surprise/getFolderList?token={alice}")).await;
    assert_eq!(answer, json!({ "list": [] }));
    let answer = get_json(&app, &format!("{base}/surprise/getFolderList?token={bob}")).await;
    assert_eq!(answer, json!({ "error": "Access denied" }));
}

#[tokio::test]
async fn test_rfid_endpoint_feeds_plugins() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), None).await;
    let app = router(state.clone());

    let (status, _) = get(&app, &format!("/vl/rfid.jsp?sn={SERIAL}&t={TAG}"), None).await;
    assert_eq!(status, StatusCode::OK);
    let tag = state.entities.ztamps.find_hex(TAG).unwrap();
    assert_eq!(tag.settings().global_str(LAST_SEEN_BY).as_deref(), Some(SERIAL));

    let (status, _) = get(&app, "/vl/rfid.jsp?sn=zz&t=01", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_changes_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let state = test_state(dir.path(), None).await;
        state.entities.accounts.register("root", "Root", "pw").unwrap();
        let app = router(state.clone());
        let root = login(&app, "root", "pw").await;
        get_json(&app, &format!("/ojn/api/plugins/deactivatePlugin?name=surprise&token={root}")).await;
        state.shutdown().await.unwrap();
    }
    let state = test_state(dir.path(), None).await;
    assert!(state.entities.accounts.find_by_login("root").is_some());
    assert!(!state.plugins.get("surprise").unwrap().is_enabled());
}

#[tokio::test]
async fn test_removed_account_releases_its_ztamps() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), None).await;
    state.entities.accounts.register("root", "Root", "pw").unwrap();
    state.entities.accounts.register("alice", "Alice", "pw").unwrap();
    let app = router(state.clone());
    let root = login(&app, "root", "pw").await;
    let alice = login(&app, "alice", "pw").await;
    get_json(&app, &format!("/ojn/api/accounts/addZtamp?serial={TAG}&token={alice}")).await;

    let answer = get_json(&app, &format!("/ojn/api/accounts/removeAccount?login=alice&token={root}")).await;
    assert_eq!(answer, json!({ "ok": "Account 'alice' removed" }));
    assert_eq!(state.entities.ztamps.find_hex(TAG).unwrap().owner(), None);
    let answer = get_json(&app, &format!("/ojn/api/ztamps/getListOfAllZtampsOwners?token={root}")).await;
    assert_eq!(answer, json!({ "map": { TAG: "" } }));

    // Same login, different person.
    state.entities.accounts.register("alice", "Alice II", "pw2").unwrap();
    let alice = login(&app, "alice", "pw2").await;
    let answer = get_json(&app, &format!("/ojn/api/ztamps/getListOfZtamps?token={alice}")).await;
    assert_eq!(answer, json!({ "map": {} }));
    let answer = get_json(&app, &format!("/ojn/api/accounts/addZtamp?serial={TAG}&token={alice}")).await;
    assert_eq!(answer, json!({ "ok": "Ztamp 'd0021fa1' added" }));
}

#[tokio::test]
async fn test_denied_calls_reveal_nothing_about_targets() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path(), None).await;
    state.entities.accounts.register("root", "Root", "pw").unwrap();
    state.entities.accounts.register("alice", "Alice", "pw").unwrap();
    let app = router(state.clone());
    let root = login(&app, "root", "pw").await;
    let alice = login(&app, "alice", "pw").await;
    get_json(&app, &format!("/ojn/api/accounts/addBunny?serial={SERIAL}&token={alice}")).await;
    let base = format!("/ojn/api/bunny/{SERIAL}");
    get_json(&app, &format!("{base}/registerPlugin?name=surprise&token={alice}")).await;

    let answer = get_json(&app, "/ojn/api/bunny/ffffffffffff/getListOfActivePlugins").await;
    assert_eq!(answer, json!({ "error": "Access denied" }));
    let answer = get_json(&app, "/ojn/api/bunny/ffffffffffff/surprise/getFolderList").await;
    assert_eq!(answer, json!({ "error": "Access denied" }));
    let answer = get_json(&app, &format!("/ojn/api/bunny/ffffffffffff/getListOfActivePlugins?token={alice}")).await;
    assert_eq!(answer, json!({ "error": "Unknown bunny 'ffffffffffff'" }));

    get_json(&app, &format!("/ojn/api/plugins/deactivatePlugin?name=surprise&token={root}")).await;
    let answer = get_json(&app, &format!("{base}/surprise/getFolderList")).await;
    assert_eq!(answer, json!({ "error": "Access denied" }));
    let answer = get_json(&app, &format!("{base}/surprise/getFolderList?token={alice}")).await;
    assert_eq!(answer, json!({ "error": "Plugin 'surprise' is disabled" }));
}
