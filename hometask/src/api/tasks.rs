use super::source_error_response;
use crate::integrations::TaskWriter;
use crate::models::NewTask;
use actix_web::{HttpResponse, Responder, post, web};
use std::sync::Arc;

/// Validate a task locally, then forward it to the scheduling server.
#[post("")]
pub async fn create_task(
    writer: web::Data<Arc<dyn TaskWriter>>,
    body: web::Json<NewTask>,
) -> impl Responder {
    let new_task = body.into_inner();
    if let Err(e) = new_task.validate() {
        return HttpResponse::BadRequest().body(e.to_string());
    }

    match writer.create_task(&new_task).await {
        Ok(task) => {
            log::info!("Created task {} for device {}", task.id, task.device_id);
            HttpResponse::Created().json(task)
        }
        Err(e) => source_error_response(&e),
    }
}
