use std::time::Duration;

use inkpost_engine::{
    Account, ApiError, ApiSettings, MediaUpload, ReqwestApiClient, StorageClass, WechatApi,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY: &str = "test-api-key";

fn client_for(server: &MockServer) -> ReqwestApiClient {
    ReqwestApiClient::new(ApiSettings {
        server_url: server.uri(),
        api_key: KEY.to_string(),
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(5),
    })
    .expect("client")
}

fn account() -> Account {
    Account {
        name: "main".into(),
        app_id: "wx123".into(),
        app_secret: "secret-value".into(),
    }
}

#[tokio::test]
async fn token_request_carries_credentials_and_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/wechat/access-token"))
        .and(header("X-API-Key", KEY))
        .and(body_partial_json(json!({"app_id": "wx123", "app_secret": "secret-value"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"access_token": "tok-1", "expires_in": 7200}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token = client_for(&server).get_token(&account()).await.unwrap();
    assert_eq!(token.access_token, "tok-1");
    assert_eq!(token.expires_in, 7200);
}

#[tokio::test]
async fn envelope_errors_are_split_by_signature() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/wechat/access-token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "success": false,
            "error": "invalid appsecret"
        })))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/wechat/access-token"))
        .respond_with(ResponseTemplate::new(502).set_body_json(json!({
            "success": false,
            "error": "fetch failed: connection refused"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let first = client.get_token(&account()).await.unwrap_err();
    assert!(
        matches!(first, ApiError::Application { code: 400, ref message, .. } if message == "invalid appsecret"),
        "{first:?}"
    );

    let second = client.get_token(&account()).await.unwrap_err();
    assert!(second.is_transport(), "{second:?}");
}

#[tokio::test]
async fn permanent_upload_is_typed_as_image() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/wechat/upload-image"))
        .and(body_partial_json(json!({
            "image_data": "aGk=",
            "filename": "a.png",
            "access_token": "tok",
            "type": "image"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"errcode": 0, "media_id": "m-1", "url": "https://mmbiz.example/a.png"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client_for(&server)
        .upload_media(&MediaUpload {
            base64: "aGk=".into(),
            filename: "a.png".into(),
            token: "tok".into(),
            storage: StorageClass::Permanent,
        })
        .await
        .unwrap();
    assert_eq!(result.media_id.as_deref(), Some("m-1"));
    assert_eq!(result.url.as_deref(), Some("https://mmbiz.example/a.png"));
}

#[tokio::test]
async fn draft_list_sends_paging_query_and_rejects_errcode() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/wechat/drafts"))
        .and(query_param("access_token", "tok"))
        .and(query_param("offset", "0"))
        .and(query_param("count", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "total_count": 1,
                "item": [{
                    "media_id": "d-1",
                    "content": {"news_item": [{"title": "Hello"}]}
                }]
            }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/wechat/drafts"))
        .and(query_param("access_token", "bad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"errcode": 40001, "errmsg": "invalid credential"}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let list = client.draft_list("tok", 0, 20).await.unwrap();
    assert_eq!(list.item.len(), 1);
    assert_eq!(list.item[0].title(), Some("Hello"));

    let err = client.draft_list("bad", 0, 20).await.unwrap_err();
    assert!(
        matches!(err, ApiError::Application { code: 40001, .. }),
        "{err:?}"
    );
}

#[tokio::test]
async fn refused_connection_is_transport() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let client = ReqwestApiClient::new(ApiSettings {
        server_url: uri,
        api_key: KEY.to_string(),
        connect_timeout: Duration::from_secs(1),
        request_timeout: Duration::from_secs(2),
    })
    .unwrap();
    let err = client.get_token(&account()).await.unwrap_err();
    assert!(err.is_transport(), "{err:?}");
}

#[tokio::test]
async fn health_check_uses_the_wechat_prefix() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/wechat/health"))
        .and(header("X-API-Key", KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;

    client_for(&server).health().await.unwrap();
}
