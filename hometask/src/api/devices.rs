use super::source_error_response;
use crate::integrations::Sources;
use actix_web::{HttpResponse, Responder, get, web};

/// Every device with its task history, latest run first.
#[get("/tasks")]
pub async fn list_device_tasks(sources: web::Data<Sources>) -> impl Responder {
    match sources.fetch_device_tasks().await {
        Ok(device_tasks) => HttpResponse::Ok().json(device_tasks),
        Err(e) => source_error_response(&e),
    }
}

#[get("/{id}/tasks")]
pub async fn get_device_tasks(sources: web::Data<Sources>, path: web::Path<i64>) -> impl Responder {
    let device_id = path.into_inner();

    let device_tasks = match sources.fetch_device_tasks().await {
        Ok(d) => d,
        Err(e) => return source_error_response(&e),
    };

    match device_tasks.into_iter().find(|dt| dt.device.id == device_id) {
        Some(device_task) => HttpResponse::Ok().json(device_task),
        None => HttpResponse::NotFound().body("Device not found"),
    }
}
