use super::source_error_response;
use crate::integrations::Sources;
use crate::models::{Device, DeviceState, TaskEvent};
use crate::services::{device_state::device_state, overview::overview};
use actix_web::{HttpResponse, Responder, get, web};
use chrono::Utc;
use serde::Serialize;

#[derive(Serialize)]
pub struct OverviewResponse {
    pub device: Device,
    pub task_event: Option<TaskEvent>,
    pub state: DeviceState,
}

/// One line per device: its latest scheduled run and what the device is doing now.
#[get("")]
pub async fn get_overview(sources: web::Data<Sources>) -> impl Responder {
    let device_tasks = match sources.fetch_device_tasks().await {
        Ok(d) => d,
        Err(e) => return source_error_response(&e),
    };

    let now = Utc::now();
    let response: Vec<OverviewResponse> = overview(device_tasks)
        .into_iter()
        .map(|line| OverviewResponse {
            state: device_state(line.task_event.as_ref(), now),
            device: line.device,
            task_event: line.task_event,
        })
        .collect();

    HttpResponse::Ok().json(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api;
    use crate::integrations::fakes::FakeServer;
    use crate::integrations::SourceError;
    use crate::models::{Event, Task, TimeSpan};
    use actix_web::{App, http::StatusCode, test};
    use chrono::TimeDelta;
    use std::sync::Arc;

    fn server() -> Arc<FakeServer> {
        let start = Utc::now() + TimeDelta::hours(2);
        let span = TimeSpan {
            start,
            end: start + TimeDelta::hours(3),
        };
        Arc::new(FakeServer::new(
            vec![
                Device {
                    id: 1,
                    name: "Washer".to_string(),
                    power_watts: 2000.0,
                },
                Device {
                    id: 2,
                    name: "Dryer".to_string(),
                    power_watts: 2500.0,
                },
            ],
            vec![Task {
                id: 10,
                device_id: 1,
                time_span: span,
                duration_ms: 3_600_000,
            }],
            vec![Event {
                id: 100,
                task_id: 10,
                start_time: start,
            }],
        ))
    }

    #[actix_rt::test]
    async fn test_overview_reports_state_per_device() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(Sources::from_client(server())))
                .configure(api::config),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/overview").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        let lines = body.as_array().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["device"]["name"], "Dryer");
        assert_eq!(lines[0]["state"], "inactive");
        assert!(lines[0]["task_event"].is_null());
        assert_eq!(lines[1]["device"]["name"], "Washer");
        assert_eq!(lines[1]["state"], "scheduled");
        assert_eq!(lines[1]["task_event"]["event"]["id"], 100);
    }

    #[actix_rt::test]
    async fn test_overview_maps_source_errors() {
        let server = server();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(Sources::from_client(server.clone())))
                .configure(api::config),
        )
        .await;

        server.fail_with(Some(SourceError::NotAuthenticated));
        let req = test::TestRequest::get().uri("/api/overview").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        server.fail_with(Some(SourceError::Transport("connection refused".to_string())));
        let req = test::TestRequest::get().uri("/api/overview").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_GATEWAY);
    }
}
