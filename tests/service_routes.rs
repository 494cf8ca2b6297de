//! Tests of the service endpoints both listeners serve.

use serde_json::{json, Value};

mod common;

use common::{client, open_session, proxy_url};

#[tokio::test]
async fn test_client_script_with_etag() {
    let proxy = common::start_proxy().await;
    let url = format!("{}/hammerhead.js", proxy.server1().domain);

    let res = client().get(&url).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "application/x-javascript");
    assert_eq!(res.headers()["cache-control"], "max-age=30, must-revalidate");
    let etag = res.headers()["etag"].to_str().unwrap().to_string();
    assert!(res.text().await.unwrap().contains("harnessProxy"));

    let res = client().get(&url).header("if-none-match", &etag).send().await.unwrap();
    assert_eq!(res.status(), 304);

    let res = client().get(&url).header("if-none-match", "\"stale\"").send().await.unwrap();
    assert_eq!(res.status(), 200);

    proxy.close().await;
}

#[tokio::test]
async fn test_client_script_override() {
    let path = std::env::temp_dir().join(format!("harness-client-{}.js", uuid::Uuid::new_v4()));
    std::fs::write(&path, "window.custom = true;").unwrap();

    let mut config = common::test_config();
    config.client.script_path = Some(path.to_string_lossy().into_owned());
    let proxy = common::start_proxy_with(config).await;

    let body = client()
        .get(format!("{}/hammerhead.js", proxy.server2().domain))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "window.custom = true;");

    proxy.close().await;
    std::fs::remove_file(path).ok();
}

#[tokio::test]
async fn test_favicon_is_404() {
    let proxy = common::start_proxy().await;
    let res = client()
        .get(format!("{}/favicon.ico", proxy.server1().domain))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 404);
    proxy.close().await;
}

async fn post_message(proxy: &harness_proxy::Proxy, body: impl Into<reqwest::Body>) -> reqwest::Response {
    client()
        .post(format!("{}/messaging", proxy.server1().domain))
        .body(body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_messaging_set_cookie() {
    let proxy = common::start_proxy().await;
    let (session, _) = open_session(&proxy, "http://example.com/");

    let msg = json!({
        "cmd": "SET_COOKIE",
        "jobUid": "sid",
        "url": proxy_url(&proxy, "http://example.com/page"),
        "cookie": "a=1; Path=/",
    });
    let res = post_message(&proxy, msg.to_string()).await;
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "application/json");
    assert_eq!(res.json::<Value>().await.unwrap(), json!("a=1"));

    let dest = harness_proxy::proxy_url::Destination::parse("http://example.com/").unwrap();
    use harness_proxy::Session;
    assert_eq!(session.cookie_header(&dest).as_deref(), Some("a=1"));

    proxy.close().await;
}

#[tokio::test]
async fn test_messaging_upload_round_trip() {
    let proxy = common::start_proxy().await;
    open_session(&proxy, "http://example.com/");

    let upload = json!({
        "cmd": "UPLOAD_FILES",
        "jobUid": "sid",
        "data": ["aGVsbG8="],
        "fileNames": ["dir/hello.txt"],
    });
    let res = post_message(&proxy, upload.to_string()).await;
    assert_eq!(res.json::<Value>().await.unwrap(), json!([{ "path": "dir/hello.txt" }]));

    let read = json!({
        "cmd": "GET_UPLOADED_FILES",
        "jobUid": "sid",
        "filePaths": ["dir/hello.txt", "missing.txt"],
    });
    let files = post_message(&proxy, read.to_string()).await.json::<Value>().await.unwrap();
    assert_eq!(files[0]["name"], "hello.txt");
    assert_eq!(files[0]["type"], "text/plain");
    assert_eq!(files[0]["data"], "aGVsbG8=");
    assert_eq!(files[1], json!({ "path": "missing.txt", "err": "File not found" }));

    proxy.close().await;
}

#[tokio::test]
async fn test_messaging_failures_are_500() {
    let proxy = common::start_proxy().await;
    open_session(&proxy, "http://example.com/");

    let res = post_message(&proxy, r#"{"cmd":"SET_COOKIE","jobUid":"other"}"#).await;
    assert_eq!(res.status(), 500);
    assert_eq!(res.text().await.unwrap(), "Session is not opened in proxy");

    let res = post_message(&proxy, "not json").await;
    assert_eq!(res.status(), 500);
    assert_eq!(res.text().await.unwrap(), "Session is not opened in proxy");

    let res = post_message(&proxy, r#"{"cmd":"NO_SUCH_COMMAND","jobUid":"sid"}"#).await;
    assert_eq!(res.status(), 500);
    assert!(res.text().await.unwrap().starts_with("Invalid service message"));

    proxy.close().await;
}

#[tokio::test]
async fn test_task_script() {
    let proxy = common::start_proxy().await;
    open_session(&proxy, "http://example.com/");
    let referer = proxy_url(&proxy, "http://example.com/page.html");

    let res = client()
        .get(format!("{}/task.js", proxy.server1().domain))
        .header("referer", &referer)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "application/x-javascript");
    assert_eq!(res.headers()["cache-control"], "no-cache, no-store, must-revalidate");
    assert_eq!(res.headers()["pragma"], "no-cache");

    let script = res.text().await.unwrap();
    assert!(script.starts_with("window.__harnessProxySettings = "));
    assert!(script.contains(r#""sessionId":"sid""#));
    assert!(script.contains(r#""originUrl":"http://example.com/page.html""#));
    assert!(script.contains(r#""isIframe":false"#));
    assert!(script.contains(&format!(r#""crossDomainPort":{}"#, proxy.server2().port)));

    let script = client()
        .get(format!("{}/iframe-task.js", proxy.server1().domain))
        .header("referer", &referer)
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(script.contains(r#""isIframe":true"#));

    proxy.close().await;
}

#[tokio::test]
async fn test_task_script_requires_known_session() {
    let proxy = common::start_proxy().await;
    open_session(&proxy, "http://example.com/");
    let url = format!("{}/task.js", proxy.server1().domain);

    let res = client().get(&url).send().await.unwrap();
    assert_eq!(res.status(), 500);
    assert!(res.bytes().await.unwrap().is_empty());

    let res = client()
        .get(&url)
        .header("referer", format!("{}/unknown/http://example.com/", proxy.server1().domain))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);

    proxy.close().await;
}

#[tokio::test]
async fn test_ie9_file_reader_shim() {
    let proxy = common::start_proxy().await;
    let body = "--B\r\nContent-Disposition: form-data; name=\"file\"; filename=\"C:\\fakepath\\a.txt\"\r\nContent-Type: text/plain\r\n\r\nhello\r\n--B--\r\n";

    let res = client()
        .post(format!(
            "{}/ie9-file-reader-shim?input-name=file&filename=C%3A%5Cfakepath%5Ca.txt",
            proxy.server1().domain
        ))
        .header("content-type", "multipart/form-data; boundary=B")
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["content-type"], "text/html");

    let file: Value = serde_json::from_str(&res.text().await.unwrap()).unwrap();
    assert_eq!(
        file,
        json!({ "data": "aGVsbG8=", "info": { "name": "a.txt", "type": "text/plain", "size": 5 } })
    );

    let res = client()
        .post(format!("{}/ie9-file-reader-shim", proxy.server1().domain))
        .header("content-type", "text/plain")
        .body("no form")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 500);

    proxy.close().await;
}
