use std::time::Duration;

use actix_web::{
    HttpResponse, ResponseError,
    http::StatusCode,
    web::{self, Json},
};
use derive_more::derive::{Display, Error};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    coordinator::{CoordinatorClient, RestoreError},
    dimmer::DimmerOptions,
};

const REDACTED: &str = "**REDACTED**";
const TO_REDACT: [&str; 1] = ["password"];

pub fn new_routes(coordinator: CoordinatorClient) -> actix_web::Scope {
    web::scope("/api")
        .route("/diagnostics", web::get().to(get_diagnostics))
        .route("/refresh", web::post().to(post_refresh))
        .route("/backup", web::post().to(post_backup))
        .route("/restore", web::post().to(post_restore))
        .route("/options", web::put().to(put_options))
        .app_data(web::Data::new(coordinator))
}

type AdminResponse = Result<HttpResponse, AdminApiError>;

#[derive(Debug, Error, Display)]
enum AdminApiError {
    #[display("No data received from the PV dimmer yet")]
    NoData,

    #[display("No available backup to restore")]
    NoBackup,

    #[display("PV dimmer request failed: {_0}")]
    Device(#[error(not(source))] String),

    #[display("Invalid options: {_0}")]
    InvalidOptions(#[error(not(source))] String),
}

impl ResponseError for AdminApiError {
    fn status_code(&self) -> StatusCode {
        tracing::warn!("AdminApiError: {:?}", self);

        match self {
            AdminApiError::NoData => StatusCode::SERVICE_UNAVAILABLE,
            AdminApiError::NoBackup => StatusCode::CONFLICT,
            AdminApiError::Device(_) => StatusCode::BAD_GATEWAY,
            AdminApiError::InvalidOptions(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

impl From<RestoreError> for AdminApiError {
    fn from(e: RestoreError) -> Self {
        match e {
            RestoreError::NoBackup => AdminApiError::NoBackup,
            e @ RestoreError::Device { .. } => AdminApiError::Device(e.to_string()),
        }
    }
}

async fn get_diagnostics(coordinator: web::Data<CoordinatorClient>) -> AdminResponse {
    let Some(snapshot) = coordinator.snapshot().await else {
        return Err(AdminApiError::NoData);
    };

    let options = coordinator.options().await;

    Ok(HttpResponse::Ok().json(json!({
        "options": {
            "refresh_rate": options.refresh_rate.as_secs(),
            "timeout": options.timeout.as_secs(),
        },
        "last_update_success": coordinator.last_update_success().await,
        "last_backup": coordinator.last_backup().await.map(|t| t.to_rfc3339()),
        "data": redact(snapshot.to_value()),
    })))
}

async fn post_refresh(coordinator: web::Data<CoordinatorClient>) -> AdminResponse {
    coordinator
        .refresh()
        .await
        .map_err(|e| AdminApiError::Device(e.to_string()))?;

    Ok(HttpResponse::NoContent().finish())
}

async fn post_backup(coordinator: web::Data<CoordinatorClient>) -> AdminResponse {
    let time = coordinator
        .backup_device()
        .await
        .map_err(|e| AdminApiError::Device(format!("{:#}", e)))?;

    Ok(HttpResponse::Ok().json(json!({ "time": time.to_rfc3339() })))
}

async fn post_restore(coordinator: web::Data<CoordinatorClient>) -> AdminResponse {
    coordinator.restore_device().await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Debug, Deserialize)]
struct OptionsDTO {
    refresh_rate: u64,
    timeout: u64,
}

async fn put_options(coordinator: web::Data<CoordinatorClient>, Json(dto): Json<OptionsDTO>) -> AdminResponse {
    if dto.refresh_rate == 0 || dto.timeout == 0 {
        return Err(AdminApiError::InvalidOptions(
            "refresh_rate and timeout must be positive".to_string(),
        ));
    }

    coordinator
        .update_configuration(DimmerOptions {
            refresh_rate: Duration::from_secs(dto.refresh_rate),
            timeout: Duration::from_secs(dto.timeout),
        })
        .await;

    Ok(HttpResponse::NoContent().finish())
}

fn redact(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    if TO_REDACT.contains(&k.as_str()) {
                        (k, json!(REDACTED))
                    } else {
                        (k, redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(redact).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{App, test as actix_test};
    use assert_json_diff::assert_json_eq;

    use super::*;
    use crate::{coordinator::CoordinatorRunner, dimmer::DimmerSettings};

    fn runner(host: String, backup_dir: &std::path::Path) -> CoordinatorRunner {
        CoordinatorRunner::new(&DimmerSettings {
            host,
            refresh_rate: 60,
            timeout: 2,
            include_state_entities: true,
            mac_address: None,
            backup_dir: backup_dir.to_path_buf(),
        })
        .unwrap()
    }

    #[test]
    fn redacts_passwords_recursively() {
        let redacted = redact(json!({
            "mqtt": {"user": "bob", "password": "secret"},
            "config": {"items": [{"password": "x"}]}
        }));

        assert_json_eq!(
            redacted,
            json!({
                "mqtt": {"user": "bob", "password": "**REDACTED**"},
                "config": {"items": [{"password": "**REDACTED**"}]}
            })
        );
    }

    #[actix_web::test]
    async fn diagnostics_without_data_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner("127.0.0.1:9".to_string(), dir.path());
        let app = actix_test::init_service(App::new().service(new_routes(runner.client()))).await;

        let req = actix_test::TestRequest::get().uri("/api/diagnostics").to_request();
        let resp = actix_test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn restore_without_backup_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner("127.0.0.1:9".to_string(), dir.path());
        let app = actix_test::init_service(App::new().service(new_routes(runner.client()))).await;

        let req = actix_test::TestRequest::post().uri("/api/restore").to_request();
        let resp = actix_test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }

    #[actix_web::test]
    async fn rejects_zero_refresh_rate() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner("127.0.0.1:9".to_string(), dir.path());
        let app = actix_test::init_service(App::new().service(new_routes(runner.client()))).await;

        let req = actix_test::TestRequest::put()
            .uri("/api/options")
            .set_json(json!({"refresh_rate": 0, "timeout": 5}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn updates_options() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner("127.0.0.1:9".to_string(), dir.path());
        let client = runner.client();
        let app = actix_test::init_service(App::new().service(new_routes(runner.client()))).await;

        let req = actix_test::TestRequest::put()
            .uri("/api/options")
            .set_json(json!({"refresh_rate": 120, "timeout": 8}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(client.options().await.refresh_rate, Duration::from_secs(120));
        assert_eq!(client.options().await.timeout, Duration::from_secs(8));
    }
}
