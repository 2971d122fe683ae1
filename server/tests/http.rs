//! Drives the full HTTP surface against an in-process server backed
//! by the in-memory database and document store.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::oneshot;
use warp::http::StatusCode;
use warp::Filter;

use log::initialize_logger;
use oficinas_backend::audit::MemoryAuditSink;
use oficinas_backend::db::mem::MemDb;
use oficinas_backend::documents;
use oficinas_backend::environment::{Config, Environment, Renderer, VecStore};
use oficinas_backend::routes;
use oficinas_backend::store::MemoryStore;
use oficinas_backend::urls::Urls;

const STORE_BASE: &str = "https://documents.example.org/certificates/";
const FALLBACK_BASE: &str = "https://storage.invalid/placeholders/";

struct TestServer {
    address: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let logger = Arc::new(initialize_logger());
        let config = Config::new(75.0);

        let db = Arc::new(MemDb::new(config));
        let store: Arc<VecStore<()>> =
            Arc::new(MemoryStore::new(url::Url::parse(STORE_BASE).unwrap()));
        let renderer: Arc<Renderer> = Arc::new(documents::make_text_renderer());
        let audit = Arc::new(MemoryAuditSink::default());
        let urls = Arc::new(Urls::new(
            "https://example.org/",
            "certificates",
            FALLBACK_BASE,
        ));

        let environment = Environment::new(
            logger.clone(),
            db,
            urls,
            store,
            renderer,
            audit,
            config,
        );

        let api = routes::make_learner_routes(environment.clone())
            .or(routes::make_tutor_routes(environment.clone()))
            .or(routes::make_workshop_routes(environment.clone()))
            .or(routes::make_enrollment_routes(environment.clone()))
            .or(routes::make_attendance_routes(environment.clone()))
            .or(routes::make_certificate_routes(environment.clone()))
            .or(routes::admin::make_healthz_route(environment.clone()))
            .recover(move |r| routes::format_rejection(logger.clone(), r));

        let (shutdown, rx) = oneshot::channel::<()>();
        let (address, server) =
            warp::serve(api).bind_with_graceful_shutdown(([127, 0, 0, 1], 0), async {
                rx.await.ok();
            });

        tokio::spawn(server);

        Self {
            address,
            shutdown: Some(shutdown),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

async fn post(client: &reqwest::Client, url: String, body: Value) -> (StatusCode, Value) {
    let response = client
        .post(url)
        .json(&body)
        .send()
        .await
        .expect("send request");
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    (StatusCode::from_u16(status.as_u16()).unwrap(), body)
}

async fn get(client: &reqwest::Client, url: String) -> (StatusCode, Value) {
    let response = client.get(url).send().await.expect("send request");
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    (StatusCode::from_u16(status.as_u16()).unwrap(), body)
}

async fn patch(client: &reqwest::Client, url: String, body: Value) -> (StatusCode, Value) {
    let response = client
        .patch(url)
        .json(&body)
        .send()
        .await
        .expect("send request");
    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    (StatusCode::from_u16(status.as_u16()).unwrap(), body)
}

#[tokio::test]
async fn api_works() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    // health endpoint responds with build info
    let (status, health) = get(&client, server.url("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(health.get("version").is_some());

    // set up a learner, a tutor and a workshop
    let (status, learner) = post(
        &client,
        server.url("/learners"),
        json!({ "name": " Ana Souza " }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(learner["name"], "Ana Souza");
    let learner_id = learner["id"].as_str().unwrap().to_owned();

    let (status, tutor) = post(
        &client,
        server.url("/tutors"),
        json!({ "name": "Prof. Ribeiro" }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let tutor_id = tutor["id"].as_str().unwrap().to_owned();

    let (status, workshop) = post(
        &client,
        server.url("/workshops"),
        json!({
            "title": "Intro to Robotics",
            "workload_hours": 20,
            "capacity": 10,
            "start_date": "2126-03-01",
            "end_date": "2126-03-31",
            "status": "enrollment_open",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(workshop["status"], "enrollment_open");
    let workshop_id = workshop["id"].as_str().unwrap().to_owned();

    // a workshop with an inverted period is rejected
    let (status, _) = post(
        &client,
        server.url("/workshops"),
        json!({
            "title": "Backwards",
            "workload_hours": 10,
            "capacity": 5,
            "start_date": "2126-03-31",
            "end_date": "2126-03-01",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // enroll the learner
    let (status, enrollment) = post(
        &client,
        server.url(&format!("/workshops/{}/enrollments", workshop_id)),
        json!({ "learner_id": learner_id }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(enrollment["status"], "enrolled");
    assert_eq!(enrollment["percent_attendance"], 0.0);
    let enrollment_id = enrollment["id"].as_str().unwrap().to_owned();

    // duplicate enrollment conflicts
    let (status, body) = post(
        &client,
        server.url(&format!("/workshops/{}/enrollments", workshop_id)),
        json!({ "learner_id": learner_id }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["message"].as_str().unwrap().contains("enrolled"));

    // an empty attendance batch is invalid input
    let (status, _) = post(
        &client,
        server.url(&format!("/workshops/{}/attendance", workshop_id)),
        json!({
            "class_date": "2126-03-01",
            "recorded_by": tutor_id,
            "entries": [],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // start the enrollment, then record a fully-attended class
    let (status, _) = patch(
        &client,
        server.url(&format!("/enrollments/{}/status", enrollment_id)),
        json!({ "status": "in_progress" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, records) = post(
        &client,
        server.url(&format!("/workshops/{}/attendance", workshop_id)),
        json!({
            "class_date": "2126-03-01",
            "recorded_by": tutor_id,
            "entries": [
                { "enrollment_id": enrollment_id, "present": true },
            ],
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(records.as_array().unwrap().len(), 1);
    assert_eq!(records[0]["class_date"], "2126-03-01");

    // the auto-completion policy promoted the enrollment
    let (status, enrollment) = get(
        &client,
        server.url(&format!("/enrollments/{}", enrollment_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(enrollment["status"], "completed");
    assert_eq!(enrollment["percent_attendance"], 100.0);
    assert_eq!(enrollment["eligible_for_certificate"], true);
    assert!(enrollment["completion_date"].is_number());

    // terminal states refuse further transitions
    let (status, _) = patch(
        &client,
        server.url(&format!("/enrollments/{}/status", enrollment_id)),
        json!({ "status": "in_progress" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // issue the completion certificate
    let response = client
        .post(server.url(&format!("/enrollments/{}/certificate", enrollment_id)))
        .send()
        .await
        .expect("issue certificate");
    assert_eq!(response.status().as_u16(), 201);
    let location = response
        .headers()
        .get("location")
        .expect("location header")
        .to_str()
        .unwrap()
        .to_owned();
    let certificate: Value = response.json().await.expect("certificate body");
    let certificate_id = certificate["id"].as_str().unwrap().to_owned();
    assert!(location.ends_with(&certificate_id));
    assert_eq!(certificate["kind"], "learner_completion");
    assert_eq!(certificate["certified_hours"], 20);
    assert_eq!(certificate["certified_percent"], 100.0);
    let hash = certificate["validation_hash"].as_str().unwrap().to_owned();
    let code = certificate["verification_code"].as_str().unwrap().to_owned();
    assert!(certificate["document_url"]
        .as_str()
        .unwrap()
        .starts_with(STORE_BASE));

    // issuing twice conflicts
    let response = client
        .post(server.url(&format!("/enrollments/{}/certificate", enrollment_id)))
        .send()
        .await
        .expect("issue certificate again");
    assert_eq!(response.status().as_u16(), 409);

    // the certificate verifies by hash and by code
    let (status, verified) = get(
        &client,
        server.url(&format!("/certificates/verify/{}", hash)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["id"].as_str().unwrap(), certificate_id);

    let (status, verified) = get(
        &client,
        server.url(&format!("/certificates/verify/{}", code)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["id"].as_str().unwrap(), certificate_id);

    let (status, _) = get(&client, server.url("/certificates/verify/NO-SUCH-VALUE")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // tutor participation certificate after the workshop completes
    let (status, _) = patch(
        &client,
        server.url(&format!("/workshops/{}/status", workshop_id)),
        json!({ "status": "completed" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let response = client
        .put(server.url(&format!("/workshops/{}/tutors/{}", workshop_id, tutor_id)))
        .send()
        .await
        .expect("assign tutor");
    assert_eq!(response.status().as_u16(), 204);

    let response = client
        .post(server.url(&format!(
            "/workshops/{}/tutors/{}/certificate",
            workshop_id, tutor_id
        )))
        .send()
        .await
        .expect("issue tutor certificate");
    assert_eq!(response.status().as_u16(), 201);
    let tutor_certificate: Value = response.json().await.expect("certificate body");
    assert_eq!(tutor_certificate["kind"], "tutor_participation");
    assert!(tutor_certificate["certified_percent"].is_null());

    // both certificates are listed
    let (status, listed) = get(&client, server.url("/certificates")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 2);

    // revocation flips the flag once
    let (status, revoked) = post(
        &client,
        server.url(&format!("/certificates/{}/revoke", certificate_id)),
        json!({ "reason": "issued in error" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(revoked["revoked"], true);

    let (status, _) = post(
        &client,
        server.url(&format!("/certificates/{}/revoke", certificate_id)),
        json!({}),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // unknown resources are 404s
    let (status, _) = get(
        &client,
        server.url(&format!("/workshops/{}", uuid::Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // the learner's history shows the completed enrollment
    let (status, history) = get(
        &client,
        server.url(&format!("/learners/{}/enrollments", learner_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);
    assert_eq!(history[0]["status"], "completed");
}

#[tokio::test]
async fn attendance_listing_and_mutation_round_trip() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let (_, learner) = post(&client, server.url("/learners"), json!({ "name": "Bruno" })).await;
    let (_, workshop) = post(
        &client,
        server.url("/workshops"),
        json!({
            "title": "Ceramics",
            "workload_hours": 12,
            "capacity": 5,
            "start_date": "2126-05-01",
            "end_date": "2126-05-10",
            "status": "enrollment_open",
        }),
    )
    .await;
    let workshop_id = workshop["id"].as_str().unwrap().to_owned();

    let (_, enrollment) = post(
        &client,
        server.url(&format!("/workshops/{}/enrollments", workshop_id)),
        json!({ "learner_id": learner["id"] }),
    )
    .await;
    let enrollment_id = enrollment["id"].as_str().unwrap().to_owned();

    let recorder = uuid::Uuid::new_v4();
    for (day, present) in &[("2126-05-01", true), ("2126-05-02", false)] {
        let (status, _) = post(
            &client,
            server.url(&format!("/workshops/{}/attendance", workshop_id)),
            json!({
                "class_date": day,
                "recorded_by": recorder,
                "entries": [{ "enrollment_id": enrollment_id, "present": present }],
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, filtered) = get(
        &client,
        server.url(&format!(
            "/workshops/{}/attendance?class_date=2126-05-02",
            workshop_id
        )),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(filtered.as_array().unwrap().len(), 1);
    assert_eq!(filtered[0]["present"], false);
    let absence_id = filtered[0]["id"].as_str().unwrap().to_owned();

    // a malformed filter date is rejected
    let (status, _) = get(
        &client,
        server.url(&format!(
            "/workshops/{}/attendance?class_date=05-02-2126",
            workshop_id
        )),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // flip the absence into a presence
    let (status, updated) = patch(
        &client,
        server.url(&format!("/attendance/{}", absence_id)),
        json!({ "present": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["present"], true);

    let (_, enrollment) = get(
        &client,
        server.url(&format!("/enrollments/{}", enrollment_id)),
    )
    .await;
    assert_eq!(enrollment["percent_attendance"], 100.0);
    assert_eq!(enrollment["total_presences"], 2);

    // deleting a record recomputes, keeping the watermark
    let response = client
        .delete(server.url(&format!("/attendance/{}", absence_id)))
        .send()
        .await
        .expect("delete attendance");
    assert_eq!(response.status().as_u16(), 204);

    let (_, enrollment) = get(
        &client,
        server.url(&format!("/enrollments/{}", enrollment_id)),
    )
    .await;
    assert_eq!(enrollment["total_presences"], 1);
    assert_eq!(enrollment["total_classes_expected"], 2);
}
