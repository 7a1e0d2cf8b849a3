use crate::integrations::SourceError;
use actix_web::{HttpResponse, web};

pub mod alarms;
pub mod devices;
pub mod overview;
pub mod tasks;

/// Map a server read failure onto a response for our own clients.
pub fn source_error_response(error: &SourceError) -> HttpResponse {
    match error {
        SourceError::NotAuthenticated => {
            HttpResponse::Unauthorized().body("Not authenticated with the scheduling server")
        }
        SourceError::Transport(msg) => {
            log::warn!("Scheduling server unreachable: {}", msg);
            HttpResponse::BadGateway().body("Scheduling server unreachable")
        }
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api/overview").service(overview::get_overview));

    cfg.service(
        web::scope("/api/devices")
            .service(devices::list_device_tasks)
            .service(devices::get_device_tasks),
    );

    cfg.service(web::scope("/api/tasks").service(tasks::create_task));

    cfg.service(web::scope("/api/alarms").service(alarms::list_alarms));
}
