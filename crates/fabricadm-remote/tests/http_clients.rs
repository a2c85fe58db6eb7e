//! HTTP client tests against an in-process fake control plane.
//!
//! A `tiny_http` server answers canned responses per `METHOD path` and records
//! every request it receives so tests can assert on the wire calls.

use fabricadm_remote::imgapi::{ImgapiClient, ImportPolling, UpdatesClient};
use fabricadm_remote::napi::NapiClient;
use fabricadm_remote::papi::PapiClient;
use fabricadm_remote::sapi::SapiClient;
use fabricadm_remote::{
    ApplicationDefaults, ApplicationStore, ImageFilter, ImageImporter, ImageRegistry,
    ImageStore, NetworkApi, PackageCatalog, PackageFilter, RemoteConfig, RemoteError,
    ServiceFilter, ServiceRegistry,
};
use serde_json::{json, Map};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tiny_http::{Header, Response, Server, StatusCode};

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    url: String,
    body: String,
}

struct FakeControlPlane {
    url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
    _server: Arc<Server>,
    _handle: std::thread::JoinHandle<()>,
}

impl FakeControlPlane {
    /// Routes are keyed by `"METHOD /path"` (query string excluded).
    fn start(routes: Vec<(&str, u16, serde_json::Value)>) -> Self {
        let routes: HashMap<String, (u16, String)> = routes
            .into_iter()
            .map(|(k, status, body)| (k.to_owned(), (status, body.to_string())))
            .collect();
        let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
        let port = server.server_addr().to_ip().unwrap().port();
        let requests: Arc<Mutex<Vec<Recorded>>> = Arc::new(Mutex::new(Vec::new()));

        let srv = Arc::clone(&server);
        let reqs = Arc::clone(&requests);
        let handle = std::thread::spawn(move || {
            for mut request in srv.incoming_requests() {
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let method = request.method().to_string();
                let url = request.url().to_owned();
                let path = url.split('?').next().unwrap_or_default().to_owned();
                reqs.lock().unwrap().push(Recorded {
                    method: method.clone(),
                    url,
                    body,
                });
                let (status, payload) = routes
                    .get(&format!("{method} {path}"))
                    .cloned()
                    .unwrap_or((404, r#"{"code":"ResourceNotFound","message":"route not found"}"#.to_owned()));
                let header =
                    Header::from_bytes("Content-Type", "application/json").unwrap();
                let _ = request.respond(
                    Response::from_string(payload)
                        .with_status_code(StatusCode(status))
                        .with_header(header),
                );
            }
        });

        Self {
            url: format!("http://127.0.0.1:{port}"),
            requests,
            _server: server,
            _handle: handle,
        }
    }

    fn config(&self) -> RemoteConfig {
        RemoteConfig {
            sapi: self.url.clone(),
            napi: self.url.clone(),
            papi: self.url.clone(),
            imgapi: self.url.clone(),
            updates: self.url.clone(),
            timeout_secs: 5,
        }
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

#[test]
fn napi_nic_tag_found() {
    let fake = FakeControlPlane::start(vec![(
        "GET /nic_tags/sdc_underlay",
        200,
        json!({"name": "sdc_underlay", "uuid": "t-1", "mtu": 9000}),
    )]);
    let napi = NapiClient::new(&fake.config());
    let tag = napi.get_nic_tag("sdc_underlay").unwrap();
    assert_eq!(tag.name, "sdc_underlay");
    assert_eq!(tag.mtu, Some(9000));
}

#[test]
fn napi_missing_tag_is_not_found() {
    let fake = FakeControlPlane::start(vec![]);
    let napi = NapiClient::new(&fake.config());
    let err = napi.get_nic_tag("nope").unwrap_err();
    assert!(err.is_not_found(), "{err}");
    assert!(matches!(err, RemoteError::Api { ref service, status: 404, .. } if service == "napi"));
}

#[test]
fn napi_invalid_parameters_decoded() {
    let fake = FakeControlPlane::start(vec![(
        "GET /network_pools/bogus",
        422,
        json!({
            "code": "InvalidParameters",
            "message": "Invalid parameters",
            "errors": [{"field": "uuid", "code": "InvalidParameter", "message": "invalid UUID"}]
        }),
    )]);
    let napi = NapiClient::new(&fake.config());
    let err = napi.get_network_pool("bogus").unwrap_err();
    assert!(!err.is_not_found());
    assert_eq!(err.invalid_parameter_fields(), Some(vec!["uuid"]));
}

#[test]
fn napi_escapes_path_segments() {
    let fake = FakeControlPlane::start(vec![]);
    let napi = NapiClient::new(&fake.config());
    let _ = napi.get_network_pool("a/b");
    assert_eq!(fake.requests()[0].url, "/network_pools/a%2Fb");
}

#[test]
fn sapi_ensure_singleton_returns_existing() {
    let fake = FakeControlPlane::start(vec![(
        "GET /applications",
        200,
        json!([{"uuid": "app-1", "name": "sdc", "owner_uuid": "admin", "metadata": {}}]),
    )]);
    let sapi = SapiClient::new(&fake.config());
    let app = sapi
        .ensure_singleton(&ApplicationDefaults {
            name: "sdc".to_owned(),
            owner_uuid: "admin".to_owned(),
            params: Map::new(),
            metadata: Map::new(),
        })
        .unwrap();
    assert_eq!(app.uuid, "app-1");
    let reqs = fake.requests();
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0].url, "/applications?name=sdc");
}

#[test]
fn sapi_ensure_singleton_creates_when_absent() {
    let fake = FakeControlPlane::start(vec![
        ("GET /applications", 200, json!([])),
        (
            "POST /applications",
            200,
            json!({"uuid": "app-2", "name": "sdc", "owner_uuid": "admin"}),
        ),
    ]);
    let sapi = SapiClient::new(&fake.config());
    let app = sapi
        .ensure_singleton(&ApplicationDefaults {
            name: "sdc".to_owned(),
            owner_uuid: "admin".to_owned(),
            params: Map::new(),
            metadata: Map::new(),
        })
        .unwrap();
    assert_eq!(app.uuid, "app-2");
    let reqs = fake.requests();
    assert_eq!(reqs[1].method, "POST");
    let body: serde_json::Value = serde_json::from_str(&reqs[1].body).unwrap();
    assert_eq!(body["owner_uuid"], "admin");
}

#[test]
fn sapi_metadata_update_uses_update_action() {
    let fake = FakeControlPlane::start(vec![(
        "PUT /applications/app-1",
        200,
        json!({"uuid": "app-1", "name": "sdc", "metadata": {"fabric_cfg": {"sdc_nat_pool": "p"}}}),
    )]);
    let sapi = SapiClient::new(&fake.config());
    let mut patch = Map::new();
    patch.insert("fabric_cfg".to_owned(), json!({"sdc_nat_pool": "p"}));
    let app = sapi.update_metadata("app-1", &patch).unwrap();
    assert_eq!(app.metadata["fabric_cfg"]["sdc_nat_pool"], "p");

    let body: serde_json::Value = serde_json::from_str(&fake.requests()[0].body).unwrap();
    assert_eq!(body["action"], "update");
    assert_eq!(body["metadata"]["fabric_cfg"]["sdc_nat_pool"], "p");
}

#[test]
fn sapi_list_services_sends_filter() {
    let fake = FakeControlPlane::start(vec![(
        "GET /services",
        200,
        json!([{"uuid": "s-1", "name": "portolan", "application_uuid": "app-1"}]),
    )]);
    let sapi = SapiClient::new(&fake.config());
    let services = sapi
        .list_services(&ServiceFilter {
            name: "portolan".to_owned(),
            application_uuid: "app-1".to_owned(),
        })
        .unwrap();
    assert_eq!(services.len(), 1);
    let url = &fake.requests()[0].url;
    assert!(url.contains("name=portolan"), "{url}");
    assert!(url.contains("application_uuid=app-1"), "{url}");
}

#[test]
fn papi_lists_active_packages() {
    let fake = FakeControlPlane::start(vec![(
        "GET /packages",
        200,
        json!([{"uuid": "p-1", "name": "sdc_768", "active": true, "max_physical_memory": 768}]),
    )]);
    let papi = PapiClient::new(&fake.config());
    let pkgs = papi
        .list_packages(&PackageFilter {
            name: "sdc_768".to_owned(),
            active: true,
        })
        .unwrap();
    assert_eq!(pkgs[0].max_physical_memory, Some(768));
    assert!(fake.requests()[0].url.contains("active=true"));
}

#[test]
fn updates_lists_images() {
    let fake = FakeControlPlane::start(vec![(
        "GET /images",
        200,
        json!([{"uuid": "i-1", "name": "nat", "version": "1.0.0", "published_at": "2024-03-01T00:00:00Z"}]),
    )]);
    let updates = UpdatesClient::new(&fake.config());
    let images = updates
        .list_images(&ImageFilter {
            name: "nat".to_owned(),
        })
        .unwrap();
    assert_eq!(images[0].uuid, "i-1");
}

#[test]
fn imgapi_import_waits_for_active_image() {
    let fake = FakeControlPlane::start(vec![
        ("POST /images/i-1", 200, json!({"image_uuid": "i-1", "job_uuid": "j-1"})),
        (
            "GET /images/i-1",
            200,
            json!({"uuid": "i-1", "name": "nat", "version": "1.0.0", "state": "active"}),
        ),
    ]);
    let imgapi = ImgapiClient::new(
        &fake.config(),
        ImportPolling {
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(2),
        },
    );
    let image = imgapi.get_image("i-1").unwrap();
    imgapi.import(&[image]).unwrap();

    let reqs = fake.requests();
    let post = reqs.iter().find(|r| r.method == "POST").unwrap();
    assert!(post.url.contains("action=import-remote"), "{}", post.url);
}

#[test]
fn imgapi_import_times_out_when_never_active() {
    let fake = FakeControlPlane::start(vec![
        ("POST /images/i-2", 200, json!({})),
        (
            "GET /images/i-2",
            200,
            json!({"uuid": "i-2", "name": "nat", "state": "unactivated"}),
        ),
    ]);
    let imgapi = ImgapiClient::new(
        &fake.config(),
        ImportPolling {
            interval: Duration::from_millis(10),
            timeout: Duration::from_millis(50),
        },
    );
    let image = imgapi.get_image("i-2").unwrap();
    let err = imgapi.import(&[image]).unwrap_err();
    assert!(matches!(err, RemoteError::Timeout(_)), "{err}");
}

#[test]
fn malformed_success_body_is_serialization_error() {
    let fake = FakeControlPlane::start(vec![("GET /nic_tags/x", 200, json!("not a tag"))]);
    let napi = NapiClient::new(&fake.config());
    let err = napi.get_nic_tag("x").unwrap_err();
    assert!(matches!(err, RemoteError::Serialization(_)), "{err}");
}
